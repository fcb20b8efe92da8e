// ABOUTME: Validated version identifier (semver, git SHA, or user tag).
// ABOUTME: Version ids name snapshot directories, so separators and dot-prefixes are rejected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const MAX_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum VersionIdError {
    #[error("version id cannot be empty")]
    Empty,

    #[error("version id exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("version id cannot start with '.'")]
    LeadingDot,

    #[error("invalid character in version id: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(value: &str) -> Result<Self, VersionIdError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(VersionIdError::Empty);
        }

        if value.len() > MAX_LEN {
            return Err(VersionIdError::TooLong);
        }

        if value.starts_with('.') {
            return Err(VersionIdError::LeadingDot);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '+' | '-'))
        {
            return Err(VersionIdError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    /// Version id derived from the current UTC time, used when neither a tag
    /// nor a commit is available.
    pub fn from_timestamp(at: chrono::DateTime<chrono::Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for VersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionId::new(&s).map_err(serde::de::Error::custom)
    }
}
