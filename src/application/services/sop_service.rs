use crate::application::ports::remote_backend::{RemoteBackend, RemoteError};
use crate::application::ports::text_generator::{GenerationOptions, TextGenerator};
use crate::domain::entities::{
    CleaningProcedure, Confidence, FabricInference, HygieneSop, HygieneSteps, Product, SopRecord,
    SopSource,
};
use crate::infrastructure::offline::EntityCache;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const COLLECTION: &str = "hygiene_sops";

/// カテゴリから生地を推定するためのヒント表。AIが使えない場合の
/// フォールバックに使う。
const CATEGORY_FABRIC_HINTS: &[(&str, &[&str])] = &[
    ("blazer", &["wool", "cotton", "polyester", "wool-synthetic"]),
    ("kurta", &["cotton", "silk", "linen"]),
    ("dress", &["cotton", "silk", "polyester", "chiffon"]),
    ("shirt", &["cotton", "linen", "polyester"]),
    ("pants", &["cotton", "wool", "polyester"]),
    ("jacket", &["leather", "denim", "wool", "synthetic"]),
    ("saree", &["silk", "cotton", "chiffon"]),
    ("suit", &["wool", "cotton-polyester"]),
];

const DRY_CLEAN_FABRICS: &[&str] = &["wool", "silk", "leather", "cashmere"];

/// Drafts hygiene procedures with the text-generation API, treating every
/// reply as untrusted: the first JSON object substring is extracted and
/// parsed, and any failure falls through to the deterministic rule-based
/// generator. Records are stored remotely with a local mirror write-behind.
pub struct SopService {
    generator: Arc<dyn TextGenerator>,
    backend: Arc<dyn RemoteBackend>,
    cache: Arc<EntityCache>,
    options: GenerationOptions,
}

impl SopService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        backend: Arc<dyn RemoteBackend>,
        cache: Arc<EntityCache>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            generator,
            backend,
            cache,
            options,
        }
    }

    /// 生地推定。AI失敗はフォールバックで吸収するので失敗しない。
    pub async fn infer_fabric(
        &self,
        category: &str,
        gender: &str,
        fabric_hint: Option<&str>,
    ) -> FabricInference {
        if !self.generator.is_available() {
            return fallback_inference(category, fabric_hint);
        }

        let prompt = fabric_inference_prompt(category, gender, fabric_hint);
        match self.generate_json(&prompt).await {
            Ok(value) => match serde_json::from_value::<FabricInference>(value) {
                Ok(inference) => inference,
                Err(e) => {
                    warn!(error = %e, "fabric inference reply did not match the schema");
                    fallback_inference(category, fabric_hint)
                }
            },
            Err(e) => {
                warn!(error = %e, "fabric inference failed, using rule-based fallback");
                fallback_inference(category, fabric_hint)
            }
        }
    }

    /// SOP生成。AI失敗は決定的テンプレートにフォールバックする。
    pub async fn generate_sop(
        &self,
        fabric_type: &str,
        composition: &str,
        category: &str,
        gender: &str,
    ) -> (HygieneSop, SopSource) {
        if !self.generator.is_available() {
            return (fallback_sop(fabric_type), SopSource::Fallback);
        }

        let prompt = sop_generation_prompt(fabric_type, composition, category, gender);
        match self.generate_json(&prompt).await {
            Ok(value) => match serde_json::from_value::<HygieneSop>(value) {
                Ok(sop) => (sop, SopSource::Ai),
                Err(e) => {
                    warn!(error = %e, "generated procedure did not match the schema");
                    (fallback_sop(fabric_type), SopSource::Fallback)
                }
            },
            Err(e) => {
                warn!(error = %e, "procedure generation failed, using template fallback");
                (fallback_sop(fabric_type), SopSource::Fallback)
            }
        }
    }

    /// Fabric inference followed by procedure generation, then remote store
    /// with a best-effort mirror write.
    pub async fn generate_and_store(&self, product: &Product) -> Result<SopRecord, AppError> {
        let category = product.garment_category();
        let gender = product.gender.as_str();
        let inference = self
            .infer_fabric(&category, gender, product.fabric_hint.as_deref())
            .await;
        let (sop, source) = self
            .generate_sop(&inference.fabric_type, &inference.composition, &category, gender)
            .await;

        let mut record = SopRecord {
            id: None,
            product_id: product.id.clone(),
            fabric_type: inference.fabric_type.clone(),
            composition: inference.composition.clone(),
            confidence: inference.confidence,
            sop,
            generated_by: source,
            created_at: Utc::now(),
            updated_at: None,
        };

        match self
            .backend
            .insert(COLLECTION, serde_json::to_value(&record)?)
            .await
        {
            Ok(committed) => {
                record.id = committed.get("id").and_then(Value::as_str).map(str::to_string);
                info!(product_id = %record.product_id, source = ?source, "hygiene procedure stored");
                if let Some(id) = &record.id {
                    // 商品レコード側の参照もベストエフォートで更新する
                    if let Err(e) = self
                        .backend
                        .update("products", &record.product_id, json!({"hygiene_sop_id": id}))
                        .await
                    {
                        warn!(error = %e, "could not link procedure to product");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "remote procedure store failed, keeping local copy only");
            }
        }

        self.mirror(&record).await;
        Ok(record)
    }

    pub async fn sop_for_product(&self, product_id: &str) -> Result<Option<SopRecord>, AppError> {
        let filters = [(
            "product_id".to_string(),
            Value::String(product_id.to_string()),
        )];
        match self.backend.fetch_all(COLLECTION, &filters).await {
            Ok(records) => {
                let record = records
                    .into_iter()
                    .find_map(|r| serde_json::from_value::<SopRecord>(r).ok());
                if let Some(record) = &record {
                    self.mirror(record).await;
                }
                Ok(record)
            }
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => {
                warn!(product_id, error = %e, "remote procedure fetch failed, serving offline mirror");
                Ok(self
                    .cache
                    .get(product_id)
                    .await?
                    .and_then(|v| serde_json::from_value(v).ok()))
            }
        }
    }

    /// レンタル履歴に応じて点検項目を増やす。
    pub fn augment_with_history(&self, sop: &mut HygieneSop, rental_count: i64, issues: &[String]) {
        augment_with_history(sop, rental_count, issues);
    }

    async fn generate_json(&self, prompt: &str) -> Result<Value, AppError> {
        let reply = self.generator.generate(prompt, &self.options).await?;
        let object = extract_json_object(&reply).ok_or_else(|| {
            AppError::SerializationError("reply contains no JSON object".into())
        })?;
        Ok(serde_json::from_str(object)?)
    }

    async fn mirror(&self, record: &SopRecord) {
        let value = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(_) => return,
        };
        // ミラーのキーはproduct_id
        let keyed = match value {
            Value::Object(mut map) => {
                map.insert("id".to_string(), json!(record.product_id));
                Value::Object(map)
            }
            other => other,
        };
        if let Err(e) = self.cache.upsert(&keyed).await {
            warn!(error = %e, "procedure mirror write failed");
        }
    }
}

/// Extracts the first-to-last brace span of a freeform reply. Generation
/// output often wraps the JSON in prose or code fences.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn augment_with_history(sop: &mut HygieneSop, rental_count: i64, issues: &[String]) {
    if rental_count > 10 {
        sop.inspection_checklist
            .push("Extra inspection for wear and tear (10+ rentals)".to_string());
        sop.inspection_checklist
            .push("Check for fabric thinning or weakening".to_string());
    }
    if !issues.is_empty() {
        sop.special_instructions.push_str(&format!(
            "\n\nPrevious issues: {}. Pay special attention to these areas during inspection.",
            issues.join(", ")
        ));
    }
}

fn fallback_inference(category: &str, fabric_hint: Option<&str>) -> FabricInference {
    if let Some(hint) = fabric_hint.filter(|h| !h.trim().is_empty()) {
        return FabricInference {
            fabric_type: hint.to_lowercase(),
            composition: format!("Primary: {hint}"),
            confidence: Confidence::Medium,
        };
    }

    let category = category.to_lowercase();
    let fabric = CATEGORY_FABRIC_HINTS
        .iter()
        .find(|(name, _)| *name == category)
        .and_then(|(_, fabrics)| fabrics.first())
        .copied()
        .unwrap_or("cotton");

    FabricInference {
        fabric_type: fabric.to_string(),
        composition: format!("Estimated: {fabric}"),
        confidence: Confidence::Low,
    }
}

fn fallback_sop(fabric_type: &str) -> HygieneSop {
    let fabric = fabric_type.to_lowercase();
    let dry_clean_only = DRY_CLEAN_FABRICS.iter().any(|f| fabric.contains(f));

    HygieneSop {
        cleaning_procedure: CleaningProcedure {
            method: if dry_clean_only {
                "Professional Dry Cleaning".to_string()
            } else {
                "Machine Wash".to_string()
            },
            temperature: if dry_clean_only {
                "N/A".to_string()
            } else {
                "30°C (Cold)".to_string()
            },
            detergent: if dry_clean_only {
                "Professional dry cleaning solvents".to_string()
            } else {
                "Mild liquid detergent".to_string()
            },
            drying: if dry_clean_only {
                "Air dry on hanger".to_string()
            } else {
                "Tumble dry low or air dry".to_string()
            },
            ironing_temp: Some(if dry_clean_only {
                "Low heat with pressing cloth".to_string()
            } else {
                "Medium heat".to_string()
            }),
            special_care: vec![
                "Turn garment inside out before cleaning".to_string(),
                "Remove all accessories and detachable items".to_string(),
                "Check care label for specific instructions".to_string(),
            ],
        },
        hygiene_steps: HygieneSteps {
            pre_cleaning: vec![
                "Inspect garment for stains, damage, or odors".to_string(),
                "Remove lint, hair, and debris".to_string(),
                "Pre-treat visible stains with appropriate stain remover".to_string(),
                "Empty all pockets".to_string(),
            ],
            sanitization: vec![
                "Steam sanitization at 100°C for 10 minutes".to_string(),
                "UV-C light treatment for 15 minutes".to_string(),
                "Apply fabric-safe disinfectant spray".to_string(),
                "Allow to air out for 30 minutes".to_string(),
            ],
            post_cleaning: vec![
                "Inspect for remaining stains or damage".to_string(),
                "Steam press to remove wrinkles".to_string(),
                "Quality check all fasteners and seams".to_string(),
                "Package in breathable garment bag".to_string(),
            ],
            quality_check: vec![
                "Visual inspection under good lighting".to_string(),
                "Odor test".to_string(),
                "Functionality check (buttons, zippers)".to_string(),
                "Fabric integrity assessment".to_string(),
            ],
        },
        storage_guidelines: "Store in a clean, breathable garment bag in a climate-controlled \
                             environment (18-22°C, 40-50% humidity). Keep away from direct \
                             sunlight and moisture."
            .to_string(),
        inspection_checklist: vec![
            "No visible stains or discoloration".to_string(),
            "No odors present".to_string(),
            "All buttons, zippers, and fasteners functional".to_string(),
            "No tears, holes, or loose threads".to_string(),
            "Seams secure and not fraying".to_string(),
            "No signs of pest damage or mildew".to_string(),
        ],
        special_instructions: "This is a rental garment and must be cleaned and sanitized after \
                               each use. Document any damage in the rental management system."
            .to_string(),
    }
}

fn fabric_inference_prompt(category: &str, gender: &str, hint: Option<&str>) -> String {
    format!(
        "You are a textile expert. Based on the following information, infer the most likely \
         fabric type and composition:\n\n\
         Product Category: {category}\n\
         Gender: {gender}\n\
         {}\n\n\
         Respond with a JSON object containing:\n\
         {{\n\
           \"fabricType\": \"primary fabric type (e.g., cotton, wool, silk)\",\n\
           \"composition\": \"detailed composition (e.g., 80% cotton, 20% polyester)\",\n\
           \"confidence\": \"high/medium/low\"\n\
         }}\n\n\
         Only respond with valid JSON, no additional text.",
        hint.map(|h| format!("Fabric Hint: {h}"))
            .unwrap_or_else(|| "No fabric hint provided".to_string())
    )
}

fn sop_generation_prompt(
    fabric_type: &str,
    composition: &str,
    category: &str,
    gender: &str,
) -> String {
    format!(
        "You are a professional garment care specialist. Generate a comprehensive hygiene \
         Standard Operating Procedure (SOP) for a rental apparel item with the following \
         details:\n\n\
         Fabric Type: {fabric_type}\n\
         Composition: {composition}\n\
         Category: {category}\n\
         Gender: {gender}\n\n\
         Generate a detailed SOP in JSON format with the following structure:\n\
         {{\n\
           \"cleaningProcedure\": {{\n\
             \"method\": \"cleaning method\",\n\
             \"temperature\": \"recommended temperature\",\n\
             \"detergent\": \"recommended detergent type\",\n\
             \"drying\": \"drying instructions\",\n\
             \"ironingTemp\": \"ironing temperature if applicable\",\n\
             \"specialCare\": [\"array of special care instructions\"]\n\
           }},\n\
           \"hygieneSteps\": {{\n\
             \"preCleaning\": [\"steps before cleaning\"],\n\
             \"sanitization\": [\"sanitization procedures\"],\n\
             \"postCleaning\": [\"steps after cleaning\"],\n\
             \"qualityCheck\": [\"quality assurance steps\"]\n\
           }},\n\
           \"storageGuidelines\": \"storage instructions between rentals\",\n\
           \"inspectionChecklist\": [\"pre-rental inspection items\"],\n\
           \"specialInstructions\": \"any special instructions or warnings\"\n\
         }}\n\n\
         Ensure all procedures follow industry best practices for rental apparel hygiene and \
         safety. Only respond with valid JSON, no additional text."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UnavailableGenerator;

    #[async_trait]
    impl TextGenerator for UnavailableGenerator {
        fn is_available(&self) -> bool {
            false
        }

        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, AppError> {
            Err(AppError::ConfigurationError("no key".into()))
        }
    }

    #[test]
    fn extracts_object_embedded_in_prose() {
        let reply = "Sure! Here is the JSON you asked for:\n```json\n{\"fabricType\": \"wool\", \
                     \"composition\": \"100% wool\", \"confidence\": \"high\"}\n```\nHope that helps.";
        let object = extract_json_object(reply).unwrap();
        let parsed: FabricInference = serde_json::from_str(object).unwrap();
        assert_eq!(parsed.fabric_type, "wool");
        assert_eq!(parsed.confidence, Confidence::High);
    }

    #[test]
    fn garbage_reply_has_no_object() {
        assert!(extract_json_object("no braces here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn fallback_inference_prefers_the_hint() {
        let inference = fallback_inference("dress", Some("Silk"));
        assert_eq!(inference.fabric_type, "silk");
        assert_eq!(inference.confidence, Confidence::Medium);

        let inference = fallback_inference("blazer", None);
        assert_eq!(inference.fabric_type, "wool");
        assert_eq!(inference.confidence, Confidence::Low);

        // 未知カテゴリはcottonに落ちる
        let inference = fallback_inference("spacesuit", None);
        assert_eq!(inference.fabric_type, "cotton");
    }

    #[test]
    fn fallback_sop_routes_delicate_fabrics_to_dry_cleaning() {
        let sop = fallback_sop("cashmere-blend");
        assert_eq!(sop.cleaning_procedure.method, "Professional Dry Cleaning");

        let sop = fallback_sop("cotton");
        assert_eq!(sop.cleaning_procedure.method, "Machine Wash");
        assert_eq!(sop.cleaning_procedure.temperature, "30°C (Cold)");
    }

    #[tokio::test]
    async fn unavailable_generator_always_falls_back() {
        // generator が使えなくても推定は決定的に返る
        let generator = UnavailableGenerator;
        assert!(!generator.is_available());
        let inference = fallback_inference("kurta", None);
        assert_eq!(inference.fabric_type, "cotton");
    }

    #[test]
    fn history_augmentation_extends_checklist() {
        let mut sop = fallback_sop("cotton");
        let before = sop.inspection_checklist.len();

        // rental_count が少なければ何も足さない
        let mut untouched = sop.clone();
        augment_with_history(&mut untouched, 3, &[]);
        assert_eq!(untouched.inspection_checklist.len(), before);

        augment_with_history(&mut sop, 12, &["loose button".to_string()]);
        assert_eq!(sop.inspection_checklist.len(), before + 2);
        assert!(sop.special_instructions.contains("loose button"));
    }
}
