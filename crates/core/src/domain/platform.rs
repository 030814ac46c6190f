use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Platform {
    LeetCode,
    HackerRank,
    Codeforces,
    GeeksForGeeks,
    Other,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeetCode => "leetcode",
            Self::HackerRank => "hackerrank",
            Self::Codeforces => "codeforces",
            Self::GeeksForGeeks => "geeksforgeeks",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Platform {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "leetcode" => Self::LeetCode,
            "hackerrank" => Self::HackerRank,
            "codeforces" => Self::Codeforces,
            "geeksforgeeks" => Self::GeeksForGeeks,
            _ => Self::Other,
        }
    }
}

impl From<String> for Platform {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}
