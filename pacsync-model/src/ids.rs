use crate::error::{ModelError, Result};
use std::fmt;

const MAX_UID_LEN: usize = 64;
const MAX_AE_LEN: usize = 16;

fn validate_uid(kind: &str, raw: &str) -> Result<String> {
    // UI values on disk are space/NUL padded to even length.
    let trimmed = raw.trim_end_matches(['\0', ' ']);
    if trimmed.is_empty() {
        return Err(ModelError::InvalidIdentifier(format!("{kind} is empty")));
    }
    if trimmed.len() > MAX_UID_LEN {
        return Err(ModelError::InvalidIdentifier(format!(
            "{kind} '{trimmed}' exceeds {MAX_UID_LEN} characters"
        )));
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(ModelError::InvalidIdentifier(format!(
            "{kind} '{trimmed}' contains characters outside [0-9.]"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Strongly typed Study Instance UID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StudyUid(String);

impl StudyUid {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        validate_uid("study instance UID", raw.as_ref()).map(StudyUid)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StudyUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudyUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed Series Instance UID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SeriesUid(String);

impl SeriesUid {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        validate_uid("series instance UID", raw.as_ref()).map(SeriesUid)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SeriesUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed SOP Instance UID
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SopInstanceUid(String);

impl SopInstanceUid {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        validate_uid("SOP instance UID", raw.as_ref()).map(SopInstanceUid)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SopInstanceUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SopInstanceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application entity title identifying one side of an association.
///
/// AE titles are at most 16 characters and may not be blank; the comparison
/// the listener performs against its configured peers is exact, so leading
/// and trailing padding is stripped on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AeTitle(String);

impl AeTitle {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim_matches(['\0', ' ']);
        if trimmed.is_empty() {
            return Err(ModelError::InvalidAeTitle("title is blank".into()));
        }
        if trimmed.len() > MAX_AE_LEN {
            return Err(ModelError::InvalidAeTitle(format!(
                "'{trimmed}' exceeds {MAX_AE_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
            return Err(ModelError::InvalidAeTitle(format!(
                "'{trimmed}' contains non-printable characters"
            )));
        }
        Ok(AeTitle(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AeTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AeTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
