use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderCategory {
    Mens,
    Womens,
    Unisex,
}

impl GenderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenderCategory::Mens => "mens",
            GenderCategory::Womens => "womens",
            GenderCategory::Unisex => "unisex",
        }
    }
}

impl fmt::Display for GenderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenderCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mens" => Ok(GenderCategory::Mens),
            "womens" => Ok(GenderCategory::Womens),
            "unisex" => Ok(GenderCategory::Unisex),
            other => Err(format!("Unknown gender category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Casual,
    Party,
    Cocktail,
    Formal,
    Street,
    Vacation,
    Wedding,
    Office,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Casual => "casual",
            EventCategory::Party => "party",
            EventCategory::Cocktail => "cocktail",
            EventCategory::Formal => "formal",
            EventCategory::Street => "street",
            EventCategory::Vacation => "vacation",
            EventCategory::Wedding => "wedding",
            EventCategory::Office => "office",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "casual" => Ok(EventCategory::Casual),
            "party" => Ok(EventCategory::Party),
            "cocktail" => Ok(EventCategory::Cocktail),
            "formal" => Ok(EventCategory::Formal),
            "street" => Ok(EventCategory::Street),
            "vacation" => Ok(EventCategory::Vacation),
            "wedding" => Ok(EventCategory::Wedding),
            "office" => Ok(EventCategory::Office),
            other => Err(format!("Unknown event category: {other}")),
        }
    }
}
