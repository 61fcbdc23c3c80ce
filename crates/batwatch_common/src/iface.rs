//! Network interface names.
//!
//! Interface names end up as arguments of `ip` and `batctl`, so they are
//! checked against a strict allow-list before any command is built.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Linux IFNAMSIZ minus the trailing NUL
pub const MAX_INTERFACE_LEN: usize = 15;

static INTERFACE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// Validate an interface name, returning it unchanged on success
pub fn validate_interface_name(name: &str) -> Result<&str, ValidationError> {
    if name.is_empty() || name.len() > MAX_INTERFACE_LEN {
        return Err(ValidationError::InterfaceLength(name.to_string()));
    }
    if !INTERFACE_NAME_PATTERN.is_match(name) {
        return Err(ValidationError::InterfaceCharacters(name.to_string()));
    }
    Ok(name)
}

/// An interface name that passed `validate_interface_name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InterfaceName(String);

impl InterfaceName {
    pub fn new(name: impl AsRef<str>) -> Result<Self, ValidationError> {
        validate_interface_name(name.as_ref()).map(|n| Self(n.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InterfaceName {
    fn default() -> Self {
        Self("bat0".to_string())
    }
}

impl FromStr for InterfaceName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InterfaceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        InterfaceName::new(&raw).map_err(serde::de::Error::custom)
    }
}
