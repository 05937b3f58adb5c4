use crate::domain::value_objects::{EventCategory, GenderCategory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    Excellent,
    Good,
    Fair,
    NeedsRepair,
}

/// レンタル商品。リモートの `products` コレクションの行と同じ形。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub rental_price: Option<f64>,
    pub gender: GenderCategory,
    pub event_category: EventCategory,
    pub image_url: String,
    #[serde(default)]
    pub video_url: Option<String>,
    pub color: String,
    #[serde(default)]
    pub sizes: Option<Vec<String>>,
    #[serde(default)]
    pub lead_time_minutes: Option<i64>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub is_available: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    // Hygiene workflow fields
    #[serde(default)]
    pub fabric_type: Option<String>,
    #[serde(default)]
    pub fabric_hint: Option<String>,
    #[serde(default)]
    pub hygiene_sop_id: Option<String>,
    #[serde(default)]
    pub rental_count: Option<i64>,
    #[serde(default)]
    pub last_cleaned_at: Option<String>,
    #[serde(default)]
    pub condition_status: Option<ConditionStatus>,
}

const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("t-shirt", "t-shirt"),
    ("tshirt", "t-shirt"),
    ("dress", "dress"),
    ("blazer", "blazer"),
    ("suit", "suit"),
    ("shirt", "shirt"),
    ("kurta", "kurta"),
    ("saree", "saree"),
    ("lehenga", "lehenga"),
    ("gown", "gown"),
    ("skirt", "skirt"),
    ("pants", "pants"),
    ("trousers", "pants"),
    ("jeans", "jeans"),
    ("jacket", "jacket"),
    ("coat", "coat"),
    ("blouse", "blouse"),
    ("top", "top"),
    ("sweater", "sweater"),
    ("hoodie", "hoodie"),
];

impl Product {
    /// Derive a garment category from the product name, falling back to the
    /// event category when no keyword matches.
    pub fn garment_category(&self) -> String {
        let name = self.name.to_lowercase();
        for (keyword, category) in CATEGORY_KEYWORDS {
            if name.contains(keyword) {
                return (*category).to_string();
            }
        }
        self.event_category.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(name: &str) -> Product {
        serde_json::from_value(json!({
            "id": "p1",
            "name": name,
            "price": 1200.0,
            "gender": "womens",
            "event_category": "party",
            "image_url": "https://example.com/p1.jpg",
            "color": "red"
        }))
        .unwrap()
    }

    #[test]
    fn garment_category_prefers_name_keywords() {
        assert_eq!(sample("Sequin Party Dress").garment_category(), "dress");
        assert_eq!(sample("Classic T-Shirt").garment_category(), "t-shirt");
    }

    #[test]
    fn garment_category_falls_back_to_event() {
        assert_eq!(sample("Mystery Garment").garment_category(), "party");
    }

    #[test]
    fn deserializes_remote_row_with_optional_fields_missing() {
        let product = sample("Linen Kurta");
        assert_eq!(product.rating, 0.0);
        assert!(product.hygiene_sop_id.is_none());
    }
}
