//! Core value types shared by every facematch component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A person's name as shown on an answer button.
pub type Name = String;

/// Stable proxy identifier for a presented image.
///
/// Keys are opaque: callers compare them, store them and print them, but
/// never interpret their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How a guess was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuessMethod {
    /// Key already has a confirmed name among the candidates
    Known,
    /// Random pick among candidates surviving elimination
    Smart,
    /// Every candidate was eliminated; pick from the full list
    Random,
}

impl GuessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuessMethod::Known => "KNOWN",
            GuessMethod::Smart => "SMART",
            GuessMethod::Random => "RANDOM",
        }
    }
}

impl fmt::Display for GuessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chosen answer together with the method that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    pub name: Name,
    pub method: GuessMethod,
}

/// Session operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Poll for new rounds and learn from every revealed answer
    Learning,
    /// React to presentation changes, answer known images immediately
    #[default]
    Guessing,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Learning => "LEARNING",
            Mode::Guessing => "GUESSING",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "learning" | "learn" => Ok(Mode::Learning),
            "guessing" | "guess" => Ok(Mode::Guessing),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// One answer option offered by the candidate surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position on the surface, used to address the option on submit
    pub index: usize,
    pub name: Name,
    /// Already-answered options are never part of a candidate set
    pub already_answered: bool,
}

impl Candidate {
    pub fn new(index: usize, name: impl Into<Name>) -> Self {
        Self {
            index,
            name: name.into(),
            already_answered: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("learning".parse::<Mode>().unwrap(), Mode::Learning);
        assert_eq!("GUESS".parse::<Mode>().unwrap(), Mode::Guessing);
        assert!("stopped".parse::<Mode>().is_err());
    }

    #[test]
    fn test_method_tags() {
        assert_eq!(GuessMethod::Known.to_string(), "KNOWN");
        let json = serde_json::to_string(&GuessMethod::Random).unwrap();
        assert_eq!(json, "\"RANDOM\"");
    }

    #[test]
    fn test_identity_key_serializes_as_plain_string() {
        let key = IdentityKey::new("q1042");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"q1042\"");
    }
}
