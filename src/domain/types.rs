//! Shared domain enumerations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Languages the sites publish content in.
///
/// The set is closed: a record whose language select holds any other code is
/// treated as if the language were missing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    De,
    #[default]
    En,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::De, Locale::En];

    pub fn as_str(self) -> &'static str {
        match self {
            Locale::De => "de",
            Locale::En => "en",
        }
    }

    /// Match a CMS select value against the supported codes.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|locale| locale.as_str() == code)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_code(value.trim()).ok_or_else(|| DomainError::unsupported_locale(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_codes() {
        assert_eq!("de".parse::<Locale>().unwrap(), Locale::De);
        assert_eq!(" en ".parse::<Locale>().unwrap(), Locale::En);
    }

    #[test]
    fn rejects_unknown_codes() {
        assert!(Locale::from_code("fr").is_none());
        assert!(Locale::from_code("EN").is_none());
        assert!(matches!(
            "fr".parse::<Locale>(),
            Err(DomainError::UnsupportedLocale { .. })
        ));
    }

    #[test]
    fn serializes_as_lowercase_code() {
        let json = serde_json::to_string(&Locale::De).unwrap();
        assert_eq!(json, "\"de\"");
    }
}
