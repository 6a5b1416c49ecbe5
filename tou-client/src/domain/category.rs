use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Customer tariff category. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Domestic,
    Industrial,
    NonDomestic,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Domestic, Category::Industrial, Category::NonDomestic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Domestic => "DOMESTIC",
            Category::Industrial => "INDUSTRIAL",
            Category::NonDomestic => "NON_DOMESTIC",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tariff category '{0}'")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    /// Accepts the stored upper-case names as well as the lower-case profile
    /// spellings (`domestic`, `non_domestic`, `industry`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOMESTIC" => Ok(Category::Domestic),
            "INDUSTRIAL" | "INDUSTRY" => Ok(Category::Industrial),
            "NON_DOMESTIC" => Ok(Category::NonDomestic),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}
