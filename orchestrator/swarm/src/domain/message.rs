// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Mailbox Messages
//!
//! One JSON file per message. Common fields sit beside a `type` tag that
//! selects the variant:
//!
//! ```json
//! {"id":"7f3c…","from":"Bob","to":"Alice","timestamp":"2026-…Z",
//!  "type":"query","query":"status?"}
//! ```
//!
//! Per-variant required fields are enforced by the closed [`MessageBody`]
//! union plus [`Message::validate`] at the router boundary.

use chrono::{DateTime, Utc};
use colony_core::domain::naming::validate_agent_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Sender name on messages the router synthesizes.
pub const SYSTEM_SENDER: &str = "colony";

pub const MESSAGE_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Filled from the file stem when absent.
    #[serde(default)]
    pub id: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<serde_json::Value>,
    },
    Query {
        query: String,
    },
    Response {
        in_reply_to: String,
        content: serde_json::Value,
    },
    Notification {
        content: serde_json::Value,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_reply_to: Option<String>,
    },
    Shutdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Command { .. } => "command",
            MessageBody::Query { .. } => "query",
            MessageBody::Response { .. } => "response",
            MessageBody::Notification { .. } => "notification",
            MessageBody::Error { .. } => "error",
            MessageBody::Shutdown { .. } => "shutdown",
        }
    }
}

/// Machine-readable error class carried by `error` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    DeliveryError,
    InvalidMessage,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::DeliveryError => "DELIVERY_ERROR",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "DELIVERY_ERROR" => ErrorCode::DeliveryError,
            "INVALID_MESSAGE" => ErrorCode::InvalidMessage,
            _ => ErrorCode::Other(code),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MessageError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid agent in '{field}': {reason}")]
    InvalidAgent { field: &'static str, reason: String },

    #[error("Sender '{claimed}' does not own this outbox (owner is '{owner}')")]
    SenderMismatch { claimed: String, owner: String },
}

impl Message {
    pub fn new(from: impl Into<String>, to: impl Into<String>, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
            body,
        }
    }

    /// Decode a mail file; `fallback_id` (the file stem) fills a missing id.
    pub fn parse(bytes: &[u8], fallback_id: &str) -> Result<Self, MessageError> {
        let mut message: Message =
            serde_json::from_slice(bytes).map_err(|e| MessageError::Malformed(e.to_string()))?;
        if message.id.trim().is_empty() {
            message.id = fallback_id.to_string();
        }
        Ok(message)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Field-level checks serde cannot express.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.id.trim().is_empty() {
            return Err(MessageError::MissingField("id"));
        }
        validate_agent_name(&self.from).map_err(|e| MessageError::InvalidAgent {
            field: "from",
            reason: e.to_string(),
        })?;
        validate_agent_name(&self.to).map_err(|e| MessageError::InvalidAgent {
            field: "to",
            reason: e.to_string(),
        })?;

        match &self.body {
            MessageBody::Command { command, .. } if command.trim().is_empty() => {
                Err(MessageError::MissingField("command"))
            }
            MessageBody::Query { query } if query.trim().is_empty() => {
                Err(MessageError::MissingField("query"))
            }
            MessageBody::Response { in_reply_to, .. } if in_reply_to.trim().is_empty() => {
                Err(MessageError::MissingField("in_reply_to"))
            }
            MessageBody::Error { error, .. } if error.trim().is_empty() => {
                Err(MessageError::MissingField("error"))
            }
            _ => Ok(()),
        }
    }

    /// Error message sent back to `to` about the message `in_reply_to`.
    pub fn error_reply(
        to: impl Into<String>,
        in_reply_to: impl Into<String>,
        code: ErrorCode,
        reason: impl Into<String>,
    ) -> Self {
        let in_reply_to = in_reply_to.into();
        Self {
            id: format!("{}-{}", in_reply_to, code.as_str().to_lowercase()),
            from: SYSTEM_SENDER.to_string(),
            to: to.into(),
            timestamp: Utc::now(),
            body: MessageBody::Error {
                error: reason.into(),
                code: Some(code),
                in_reply_to: Some(in_reply_to),
            },
        }
    }

    /// Id of the message this one answers, for responses and errors.
    pub fn replies_to(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Response { in_reply_to, .. } => Some(in_reply_to),
            MessageBody::Error { in_reply_to, .. } => in_reply_to.as_deref(),
            _ => None,
        }
    }

    /// `<UTC %Y%m%d%H%M%S%3f>_<from>_<id8>.json`
    pub fn file_name(&self) -> String {
        let short_id: String = self
            .id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect();
        format!(
            "{}_{}_{}.{}",
            self.timestamp.format("%Y%m%d%H%M%S%3f"),
            self.from,
            short_id,
            MESSAGE_EXTENSION
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_each_variant() {
        let samples = [
            (json!({"type":"command","command":"sync","params":{"depth":2}}), "command"),
            (json!({"type":"query","query":"status?"}), "query"),
            (json!({"type":"response","in_reply_to":"m-1","content":{"ok":true}}), "response"),
            (json!({"type":"notification","content":"hello"}), "notification"),
            (json!({"type":"error","error":"boom","code":"DELIVERY_ERROR"}), "error"),
            (json!({"type":"shutdown"}), "shutdown"),
        ];

        for (mut body, kind) in samples {
            body["from"] = json!("Bob");
            body["to"] = json!("Alice");
            body["timestamp"] = json!("2026-03-01T12:00:00Z");
            let message = Message::parse(body.to_string().as_bytes(), "fallback").unwrap();
            assert_eq!(message.body.kind(), kind);
            assert_eq!(message.id, "fallback");
            assert!(message.validate().is_ok(), "{} should validate", kind);
        }
    }

    #[test]
    fn test_required_fields() {
        let missing_reply = json!({
            "from":"Bob","to":"Alice","timestamp":"2026-03-01T12:00:00Z",
            "type":"response","content":"x"
        });
        assert!(matches!(
            Message::parse(missing_reply.to_string().as_bytes(), "m"),
            Err(MessageError::Malformed(_))
        ));

        let missing_type = json!({"from":"Bob","to":"Alice","timestamp":"2026-03-01T12:00:00Z"});
        assert!(Message::parse(missing_type.to_string().as_bytes(), "m").is_err());

        let empty_error = Message::new(
            "Bob",
            "Alice",
            MessageBody::Error { error: " ".into(), code: None, in_reply_to: None },
        );
        assert_eq!(empty_error.validate(), Err(MessageError::MissingField("error")));

        let bad_recipient = Message::new("Bob", "../Alice", MessageBody::Query { query: "q".into() });
        assert!(matches!(
            bad_recipient.validate(),
            Err(MessageError::InvalidAgent { field: "to", .. })
        ));
    }

    #[test]
    fn test_error_codes_round_trip_as_strings() {
        let reply = Message::error_reply("Bob", "m-42", ErrorCode::DeliveryError, "no such agent");
        let value: serde_json::Value = serde_json::from_slice(&reply.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "DELIVERY_ERROR");
        assert_eq!(value["in_reply_to"], "m-42");
        assert_eq!(value["from"], SYSTEM_SENDER);

        let custom: ErrorCode = serde_json::from_value(json!("RATE_LIMITED")).unwrap();
        assert_eq!(custom, ErrorCode::Other("RATE_LIMITED".to_string()));
    }

    #[test]
    fn test_file_name_format() {
        let mut message = Message::new("Bob", "Alice", MessageBody::Shutdown { reason: None });
        message.id = "3f2b-9c1d-aaaa-bbbb".to_string();
        message.timestamp = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(message.file_name(), "20260301123005000_Bob_3f2b9c1d.json");
    }
}
