use crate::domain::entities::scan_log::ScanLog;
use crate::domain::value_objects::QueueAction;
use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 永続化されたキューエントリ。`id` はストアが採番し、再利用されない。
/// `synced` は false→true の一方向にしか遷移しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub action: QueueAction,
    pub data: Value,
    pub timestamp: i64,
    pub synced: bool,
}

impl QueueEntry {
    /// Re-validate the opaque `data` against the entry's action kind.
    pub fn payload(&self) -> Result<QueuePayload, AppError> {
        QueuePayload::from_parts(self.action, &self.data)
    }
}

/// Mutation payloads, tagged by the action kind they belong to. Shapes are
/// validated at the boundary (on enqueue and on read-back) instead of
/// trusting untyped JSON through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuePayload {
    AddToCart { product_id: String, quantity: i64 },
    RemoveFromCart { product_id: String },
    AddToWishlist { product_id: String },
    RemoveFromWishlist { product_id: String },
    EmailSignup { email: String },
    QrScan(ScanLog),
}

impl QueuePayload {
    pub fn action(&self) -> QueueAction {
        match self {
            QueuePayload::AddToCart { .. } => QueueAction::AddToCart,
            QueuePayload::RemoveFromCart { .. } => QueueAction::RemoveFromCart,
            QueuePayload::AddToWishlist { .. } => QueueAction::AddToWishlist,
            QueuePayload::RemoveFromWishlist { .. } => QueueAction::RemoveFromWishlist,
            QueuePayload::EmailSignup { .. } => QueueAction::EmailSignup,
            QueuePayload::QrScan(_) => QueueAction::QrScan,
        }
    }

    pub fn to_data(&self) -> Result<Value, AppError> {
        Ok(match self {
            QueuePayload::AddToCart {
                product_id,
                quantity,
            } => json!({ "product_id": product_id, "quantity": quantity }),
            QueuePayload::RemoveFromCart { product_id }
            | QueuePayload::AddToWishlist { product_id }
            | QueuePayload::RemoveFromWishlist { product_id } => {
                json!({ "product_id": product_id })
            }
            QueuePayload::EmailSignup { email } => json!({ "email": email }),
            QueuePayload::QrScan(log) => serde_json::to_value(log)?,
        })
    }

    pub fn from_parts(action: QueueAction, data: &Value) -> Result<Self, AppError> {
        match action {
            QueueAction::AddToCart => Ok(QueuePayload::AddToCart {
                product_id: required_str(data, "product_id")?,
                quantity: data
                    .get("quantity")
                    .and_then(Value::as_i64)
                    .unwrap_or(1)
                    .max(1),
            }),
            QueueAction::RemoveFromCart => Ok(QueuePayload::RemoveFromCart {
                product_id: required_str(data, "product_id")?,
            }),
            QueueAction::AddToWishlist => Ok(QueuePayload::AddToWishlist {
                product_id: required_str(data, "product_id")?,
            }),
            QueueAction::RemoveFromWishlist => Ok(QueuePayload::RemoveFromWishlist {
                product_id: required_str(data, "product_id")?,
            }),
            QueueAction::EmailSignup => Ok(QueuePayload::EmailSignup {
                email: required_str(data, "email")?,
            }),
            QueueAction::QrScan => serde_json::from_value(data.clone())
                .map(QueuePayload::QrScan)
                .map_err(|e| {
                    AppError::ValidationError(format!("qr_scan payload does not parse: {e}"))
                }),
        }
    }
}

fn required_str(data: &Value, field: &str) -> Result<String, AppError> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::ValidationError(format!("payload is missing required field `{field}`"))
        })
}
