use crate::application::ports::remote_backend::{RemoteBackend, RemoteError};
use crate::domain::entities::{CartItem, QueuePayload, WishlistItem};
use crate::infrastructure::connectivity::ConnectivityMonitor;
use crate::infrastructure::database::schema::{CART, PREFERENCES, WISHLIST};
use crate::infrastructure::database::LocalStore;
use crate::infrastructure::offline::MutationQueue;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Cart, wishlist and preferences. These live authoritatively on the
/// client: every mutation lands in the local store first, and while offline
/// it is also appended to the mutation queue so the action survives until
/// the next drain confirms it.
pub struct StorefrontService {
    store: Arc<LocalStore>,
    queue: Arc<MutationQueue>,
    backend: Arc<dyn RemoteBackend>,
    monitor: Arc<ConnectivityMonitor>,
}

impl StorefrontService {
    pub fn new(
        store: Arc<LocalStore>,
        queue: Arc<MutationQueue>,
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            queue,
            backend,
            monitor,
        }
    }

    // ---- cart ----

    /// 既存行があれば数量を加算する。読み書きは1トランザクション。
    pub async fn add_to_cart(&self, product_id: &str, quantity: i64) -> Result<CartItem, AppError> {
        let quantity = quantity.max(1);
        let now = Utc::now().timestamp();
        let id = product_id.to_string();
        let written = self
            .store
            .read_modify_write(CART, product_id, move |current| {
                let existing = current
                    .as_ref()
                    .and_then(|v| v["quantity"].as_i64())
                    .unwrap_or(0);
                Some(json!({
                    "product_id": id,
                    "quantity": existing + quantity,
                    "added_at": now,
                }))
            })
            .await?;

        self.enqueue_if_offline(QueuePayload::AddToCart {
            product_id: product_id.to_string(),
            quantity,
        })
        .await?;

        parse_cart_item(written.unwrap_or_default())
            .ok_or_else(|| AppError::Internal("cart write produced no row".into()))
    }

    pub async fn remove_from_cart(&self, product_id: &str) -> Result<(), AppError> {
        self.store.delete(CART, product_id).await?;
        self.enqueue_if_offline(QueuePayload::RemoveFromCart {
            product_id: product_id.to_string(),
        })
        .await
    }

    /// 0以下は削除と同義。
    pub async fn update_cart_quantity(
        &self,
        product_id: &str,
        quantity: i64,
    ) -> Result<(), AppError> {
        if quantity <= 0 {
            return self.remove_from_cart(product_id).await;
        }
        let now = Utc::now().timestamp();
        let id = product_id.to_string();
        self.store
            .read_modify_write(CART, product_id, move |_| {
                Some(json!({
                    "product_id": id,
                    "quantity": quantity,
                    "added_at": now,
                }))
            })
            .await?;
        self.enqueue_if_offline(QueuePayload::AddToCart {
            product_id: product_id.to_string(),
            quantity,
        })
        .await
    }

    pub async fn cart_items(&self) -> Result<Vec<CartItem>, AppError> {
        let rows = self.store.get_all(CART).await?;
        Ok(rows.into_iter().filter_map(parse_cart_item).collect())
    }

    pub async fn clear_cart(&self) -> Result<(), AppError> {
        self.store.clear(CART).await
    }

    // ---- wishlist ----

    pub async fn add_to_wishlist(&self, product_id: &str) -> Result<(), AppError> {
        self.store
            .put(
                WISHLIST,
                &json!({
                    "product_id": product_id,
                    "added_at": Utc::now().timestamp(),
                }),
                None,
            )
            .await?;
        self.enqueue_if_offline(QueuePayload::AddToWishlist {
            product_id: product_id.to_string(),
        })
        .await
    }

    pub async fn remove_from_wishlist(&self, product_id: &str) -> Result<(), AppError> {
        self.store.delete(WISHLIST, product_id).await?;
        self.enqueue_if_offline(QueuePayload::RemoveFromWishlist {
            product_id: product_id.to_string(),
        })
        .await
    }

    pub async fn wishlist_items(&self) -> Result<Vec<WishlistItem>, AppError> {
        let rows = self.store.get_all(WISHLIST).await?;
        Ok(rows
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    pub async fn is_in_wishlist(&self, product_id: &str) -> Result<bool, AppError> {
        Ok(self.store.get(WISHLIST, product_id).await?.is_some())
    }

    // ---- email signup ----

    /// Returns true when the signup reached the remote directly, false when
    /// it was queued for the next drain.
    pub async fn signup_email(&self, email: &str) -> Result<bool, AppError> {
        if email.trim().is_empty() || !email.contains('@') {
            return Err(AppError::ValidationError(format!(
                "not an email address: `{email}`"
            )));
        }

        if self.monitor.is_online() {
            let record = json!({ "email": email, "signed_up_at": Utc::now() });
            match self.backend.insert("email_signups", record).await {
                Ok(_) => return Ok(true),
                Err(RemoteError::Conflict(_)) => return Ok(true),
                Err(e) => {
                    warn!(error = %e, "email signup failed remotely, queueing");
                }
            }
        }

        self.queue
            .enqueue(&QueuePayload::EmailSignup {
                email: email.to_string(),
            })
            .await?;
        Ok(false)
    }

    // ---- preferences ----

    pub async fn set_preference(&self, key: &str, value: &Value) -> Result<(), AppError> {
        self.store.put(PREFERENCES, value, Some(key)).await?;
        Ok(())
    }

    pub async fn get_preference(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.store.get(PREFERENCES, key).await
    }

    async fn enqueue_if_offline(&self, payload: QueuePayload) -> Result<(), AppError> {
        if !self.monitor.is_online() {
            self.queue.enqueue(&payload).await?;
        }
        Ok(())
    }
}

fn parse_cart_item(value: Value) -> Option<CartItem> {
    serde_json::from_value(value).ok()
}
