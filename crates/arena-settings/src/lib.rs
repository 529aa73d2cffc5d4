//! # arena-settings
//!
//! Configuration management with layered sources for the arena console.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ConsoleSettings::default()`]
//! 2. **User file**: `~/.arena/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ARENA_*` overrides (highest priority)
//!
//! The binary loads settings once at startup and passes them down
//! explicitly; there is no global cache.
//!
//! # Usage
//!
//! ```no_run
//! use arena_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("game server: {}", settings.server.base_url);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
