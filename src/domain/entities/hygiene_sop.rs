use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// 生地推定の結果。AI応答のJSONキーに合わせて camelCase。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricInference {
    pub fabric_type: String,
    pub composition: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningProcedure {
    pub method: String,
    pub temperature: String,
    pub detergent: String,
    pub drying: String,
    #[serde(default)]
    pub ironing_temp: Option<String>,
    pub special_care: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HygieneSteps {
    pub pre_cleaning: Vec<String>,
    pub sanitization: Vec<String>,
    pub post_cleaning: Vec<String>,
    pub quality_check: Vec<String>,
}

/// Cleaning and sanitization procedure for one garment, either AI-drafted
/// or produced by the deterministic fallback rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HygieneSop {
    pub cleaning_procedure: CleaningProcedure,
    pub hygiene_steps: HygieneSteps,
    pub storage_guidelines: String,
    pub inspection_checklist: Vec<String>,
    pub special_instructions: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SopSource {
    Ai,
    Fallback,
}

/// リモートの `hygiene_sops` コレクションに保存されるレコード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SopRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub product_id: String,
    pub fabric_type: String,
    pub composition: String,
    pub confidence: Confidence,
    pub sop: HygieneSop,
    pub generated_by: SopSource,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
