use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Walk mood requested by the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Exercise,
    Think,
    Refresh,
    Nature,
}

impl Theme {
    pub const ALL: [Theme; 4] = [Theme::Exercise, Theme::Think, Theme::Refresh, Theme::Nature];

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Exercise => "exercise",
            Theme::Think => "think",
            Theme::Refresh => "refresh",
            Theme::Nature => "nature",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exercise" => Ok(Theme::Exercise),
            "think" => Ok(Theme::Think),
            "refresh" => Ok(Theme::Refresh),
            "nature" => Ok(Theme::Nature),
            _ => Err(format!("Invalid theme: '{}'", s)),
        }
    }
}
