use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selectel region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "ru-1")]
    Ru1,
    #[serde(rename = "ru-2")]
    Ru2,
    #[serde(rename = "ru-3")]
    Ru3,
    #[serde(rename = "ru-7")]
    Ru7,
    #[serde(rename = "ru-8")]
    Ru8,
    #[serde(rename = "ru-9")]
    Ru9,
    #[serde(rename = "uz-1")]
    Uz1,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Ru1,
        Region::Ru2,
        Region::Ru3,
        Region::Ru7,
        Region::Ru8,
        Region::Ru9,
        Region::Uz1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Ru1 => "ru-1",
            Region::Ru2 => "ru-2",
            Region::Ru3 => "ru-3",
            Region::Ru7 => "ru-7",
            Region::Ru8 => "ru-8",
            Region::Ru9 => "ru-9",
            Region::Uz1 => "uz-1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidRegion(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_regions() {
        for region in Region::ALL {
            assert_eq!(region.as_str().parse::<Region>().unwrap(), region);
        }
    }

    #[test]
    fn test_parse_unknown() {
        let err = "ru-5".parse::<Region>().unwrap_err();
        assert_eq!(err.to_string(), "region is invalid: ru-5");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_yaml::to_string(&Region::Uz1).unwrap();
        assert_eq!(json.trim(), "uz-1");
        let back: Region = serde_yaml::from_str("ru-8").unwrap();
        assert_eq!(back, Region::Ru8);
    }
}
