//! Decoded outcome of a correlated exchange.

use serde_json::Value;

/// Status carried by a reply's `result` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    /// `result: "SUCCESS"`.
    Success,
    /// `result: "ERROR"`.
    Failure,
    /// No recognised `result` field.
    Unspecified,
}

/// What the server answered to a correlated exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeOutcome {
    /// Reply status.
    pub status: ReplyStatus,
    /// The reply's `data` field, or the whole reply when it has none.
    pub result: Value,
    /// The reply's `message` field, if it is a string.
    pub message: Option<String>,
}

impl ExchangeOutcome {
    /// Decode the acknowledgement arguments of a reply.
    ///
    /// Only the first argument is considered. No arguments yields an
    /// unspecified status with a `null` result.
    pub fn from_reply(args: Vec<Value>) -> Self {
        let Some(reply) = args.into_iter().next() else {
            return Self {
                status: ReplyStatus::Unspecified,
                result: Value::Null,
                message: None,
            };
        };

        let status = match reply.get("result").and_then(Value::as_str) {
            Some("SUCCESS") => ReplyStatus::Success,
            Some("ERROR") => ReplyStatus::Failure,
            _ => ReplyStatus::Unspecified,
        };
        let message = reply
            .get("message")
            .and_then(Value::as_str)
            .map(String::from);
        let result = match reply.get("data") {
            Some(data) => data.clone(),
            None => reply,
        };

        Self {
            status,
            result,
            message,
        }
    }

    /// Whether the server reported success.
    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// Whether the server reported an error.
    pub fn is_failure(&self) -> bool {
        self.status == ReplyStatus::Failure
    }
}
