//! Gameplay defaults.

use serde::{Deserialize, Serialize};

/// Parameters sent when creating a match.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchSettings {
    /// Player limit used when `create_match` is given no argument.
    pub max_players: u32,
    /// Whether new matches are listed publicly.
    pub is_public: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            max_players: 4,
            is_public: true,
        }
    }
}
