//! Queue payloads and the taxonomy broadcast event
//!
//! Wire format is JSON with epoch-millisecond timestamps:
//! - submission / decision: `{setup, punchline, type, timestamp}`
//! - taxonomy broadcast: `{types: [..], timestamp}`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Current time as milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Case-normalize a type name
pub fn normalize_type(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A joke travelling through `SUBMITTED_QUESTIONS` or `MODERATED_QUESTIONS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JokePayload {
    pub setup: String,
    pub punchline: String,
    #[serde(rename = "type")]
    pub joke_type: String,
    pub timestamp: i64,
}

impl JokePayload {
    /// Build a payload stamped with the current time; `joke_type` is lower-cased
    pub fn new(setup: impl Into<String>, punchline: impl Into<String>, joke_type: &str) -> Self {
        Self {
            setup: setup.into(),
            punchline: punchline.into(),
            joke_type: normalize_type(joke_type),
            timestamp: now_millis(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a queue payload
    ///
    /// Blank fields are rejected here as well as at the HTTP edge.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::Processing(format!("malformed joke payload: {}", e)))?;
        let missing = missing_fields(&[
            ("setup", Some(payload.setup.as_str())),
            ("punchline", Some(payload.punchline.as_str())),
            ("type", Some(payload.joke_type.as_str())),
        ]);
        if !missing.is_empty() {
            return Err(Error::Processing(format!(
                "joke payload has blank fields: {}",
                missing.join(", ")
            )));
        }
        Ok(payload)
    }
}

/// Joke fields as they arrive in an HTTP body; any of them may be absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JokeDraft {
    pub setup: Option<String>,
    pub punchline: Option<String>,
    #[serde(rename = "type")]
    pub joke_type: Option<String>,
}

impl JokeDraft {
    /// Validate that every field is present and non-blank, then build the
    /// queue payload
    pub fn into_payload(self) -> Result<JokePayload> {
        let missing = missing_fields(&[
            ("setup", self.setup.as_deref()),
            ("punchline", self.punchline.as_deref()),
            ("type", self.joke_type.as_deref()),
        ]);
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        match (self.setup, self.punchline, self.joke_type) {
            (Some(setup), Some(punchline), Some(joke_type)) => {
                Ok(JokePayload::new(setup, punchline, &joke_type))
            }
            _ => Err(Error::Validation("missing required fields".to_string())),
        }
    }
}

fn missing_fields<'a>(fields: &[(&'a str, Option<&str>)]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect()
}

/// Full taxonomy snapshot broadcast on the `type_update` exchange
///
/// Always carries every known type, never a delta, so applying the same
/// event twice or out of order converges to the same cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeUpdateEvent {
    pub types: Vec<String>,
    pub timestamp: i64,
}

impl TypeUpdateEvent {
    pub fn new(types: Vec<String>) -> Self {
        Self {
            types,
            timestamp: now_millis(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Processing(format!("malformed type update: {}", e)))
    }
}
