//! Winner flags.
//!
//! A winner flag is a boolean attribute of which at most one resource per
//! parent may hold `true`. Flags are addressed by name so that a single code
//! path enforces the invariant for every flag; the registry decides which
//! names a deployment recognizes and in which order the projector ranks them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

pub const PRIMARY: &str = "primary";
pub const MAIN: &str = "main";

/// A validated flag name: non-empty, lowercase ASCII letters, digits and `_`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlagName(String);

impl FlagName {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if !valid {
            return Err(CoreError::InvalidFlagName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FlagName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FlagName> for String {
    fn from(value: FlagName) -> Self {
        value.0
    }
}

impl fmt::Debug for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlagName({})", self.0)
    }
}

impl fmt::Display for FlagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of recognized flags, in presentation priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRegistry {
    flags: Vec<FlagName>,
}

impl FlagRegistry {
    pub fn new<I, S>(names: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut flags: Vec<FlagName> = Vec::new();
        for name in names {
            let flag = FlagName::new(name)?;
            if flags.contains(&flag) {
                return Err(CoreError::DuplicateFlag(flag.0));
            }
            flags.push(flag);
        }
        Ok(Self { flags })
    }

    /// Look up a caller-supplied name. Only registered names resolve.
    pub fn resolve(&self, name: &str) -> Result<FlagName, CoreError> {
        self.flags
            .iter()
            .find(|f| f.as_str() == name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownFlag(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.as_str() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagName> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self {
            flags: vec![FlagName(PRIMARY.to_string()), FlagName(MAIN.to_string())],
        }
    }
}
