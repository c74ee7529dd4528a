//! JSON message envelope.
//!
//! Every WebSocket text frame in either direction carries exactly one
//! envelope:
//!
//! ```text
//! { "mode"?: string, "channel": string, "message": any }
//! ```
//!
//! `mode` absent means the message targets a global channel.  `message` is
//! left as an untyped [`serde_json::Value`]; each channel's validator turns
//! it into a concrete type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when parsing or encoding an envelope.
#[derive(Debug, Error, PartialEq)]
pub enum EnvelopeError {
    /// The text was not valid JSON or did not have the envelope shape.
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope could not be serialised.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub channel: String,
    #[serde(default)]
    pub message: Value,
}

impl Envelope {
    /// Envelope addressed to a global channel.
    pub fn global(channel: impl Into<String>, message: Value) -> Self {
        Self {
            mode: None,
            channel: channel.into(),
            message,
        }
    }

    /// Envelope tagged with a mode name.
    pub fn for_mode(mode: impl Into<String>, channel: impl Into<String>, message: Value) -> Self {
        Self {
            mode: Some(mode.into()),
            channel: channel.into(),
            message,
        }
    }

    /// Parses one envelope from a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] for invalid JSON, a missing
    /// `channel`, or a non-string `mode`.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Serialises the envelope to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_without_mode_is_global() {
        // Arrange / Act
        let env = Envelope::parse(r#"{"channel":"ping","message":1}"#).unwrap();

        // Assert
        assert_eq!(env, Envelope::global("ping", json!(1)));
    }

    #[test]
    fn test_parse_with_mode() {
        let env = Envelope::parse(r#"{"mode":"pong","channel":"paddle","message":0.5}"#).unwrap();
        assert_eq!(env.mode.as_deref(), Some("pong"));
        assert_eq!(env.channel, "paddle");
        assert_eq!(env.message, json!(0.5));
    }

    #[test]
    fn test_missing_message_defaults_to_null() {
        let env = Envelope::parse(r#"{"channel":"clear"}"#).unwrap();
        assert_eq!(env.message, Value::Null);
    }

    #[test]
    fn test_missing_channel_is_malformed() {
        assert!(matches!(
            Envelope::parse(r#"{"message":1}"#),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            Envelope::parse("not json"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_global_envelope_omits_mode_on_the_wire() {
        // Arrange
        let env = Envelope::global("mode", json!("draw"));

        // Act
        let text = env.to_json().unwrap();

        // Assert
        assert_eq!(text, r#"{"channel":"mode","message":"draw"}"#);
    }

    #[test]
    fn test_mode_envelope_includes_mode_on_the_wire() {
        let text = Envelope::for_mode("draw", "paint", json!({})).to_json().unwrap();
        assert_eq!(text, r#"{"mode":"draw","channel":"paint","message":{}}"#);
    }
}
