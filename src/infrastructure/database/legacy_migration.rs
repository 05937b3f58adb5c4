//! One-time import from the legacy flat key-value file (a JSON map with
//! `cart`, `wishlist` and `theme` entries) into the partitioned store.
//! Gated by the `legacy_migrated` preference so it runs at most once per
//! installation; invoked explicitly by the composition root, never as a
//! hidden side effect of opening the store.

use crate::infrastructure::database::local_store::LocalStore;
use crate::infrastructure::database::schema::{CART, PREFERENCES, WISHLIST};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};

pub const LEGACY_FLAG_KEY: &str = "legacy_migrated";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LegacyImportReport {
    pub imported: bool,
    pub cart_items: usize,
    pub wishlist_items: usize,
    pub theme: bool,
}

/// Best-effort: a malformed legacy file is logged and skipped, it never
/// fails the caller. A missing file still marks the migration done.
pub async fn import_if_needed(
    store: &LocalStore,
    path: &Path,
) -> Result<LegacyImportReport, AppError> {
    let already = store
        .get(PREFERENCES, LEGACY_FLAG_KEY)
        .await?
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if already {
        return Ok(LegacyImportReport::default());
    }

    let mut report = LegacyImportReport {
        imported: true,
        ..Default::default()
    };

    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(legacy) => {
                import_entries(store, &legacy, &mut report).await?;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "legacy store is not valid JSON, skipping");
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // インポート対象なし。フラグだけ立てる。
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "legacy store unreadable, skipping");
        }
    }

    store
        .put(PREFERENCES, &json!(true), Some(LEGACY_FLAG_KEY))
        .await?;
    info!(
        cart = report.cart_items,
        wishlist = report.wishlist_items,
        theme = report.theme,
        "legacy store import finished"
    );
    Ok(report)
}

async fn import_entries(
    store: &LocalStore,
    legacy: &Value,
    report: &mut LegacyImportReport,
) -> Result<(), AppError> {
    let now = Utc::now().timestamp();

    if let Some(cart) = legacy.get("cart").and_then(Value::as_object) {
        for (product_id, quantity) in cart {
            let quantity = quantity.as_i64().unwrap_or(1).max(1);
            let key = product_id.clone();
            store
                .read_modify_write(CART, product_id, move |current| {
                    let existing = current
                        .as_ref()
                        .and_then(|v| v["quantity"].as_i64())
                        .unwrap_or(0);
                    Some(json!({
                        "product_id": key,
                        "quantity": existing + quantity,
                        "added_at": now,
                    }))
                })
                .await?;
            report.cart_items += 1;
        }
    }

    if let Some(wishlist) = legacy.get("wishlist").and_then(Value::as_array) {
        for product_id in wishlist.iter().filter_map(Value::as_str) {
            store
                .put(
                    WISHLIST,
                    &json!({"product_id": product_id, "added_at": now}),
                    None,
                )
                .await?;
            report.wishlist_items += 1;
        }
    }

    if let Some(theme) = legacy.get("theme").and_then(Value::as_str) {
        store
            .put(PREFERENCES, &json!(theme), Some("theme"))
            .await?;
        report.theme = true;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::schema::storefront_schema;
    use crate::infrastructure::database::ConnectionPool;
    use std::io::Write;

    async fn memory_store() -> LocalStore {
        let pool = ConnectionPool::from_memory().await.unwrap();
        LocalStore::open(pool.pool().clone(), storefront_schema())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn imports_cart_wishlist_and_theme_once() {
        let store = memory_store().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cart": {{"p1": 2, "p2": 1}}, "wishlist": ["p3"], "theme": "dark"}}"#
        )
        .unwrap();

        let report = import_if_needed(&store, file.path()).await.unwrap();
        assert!(report.imported);
        assert_eq!(report.cart_items, 2);
        assert_eq!(report.wishlist_items, 1);
        assert!(report.theme);

        let cart_item = store.get(CART, "p1").await.unwrap().unwrap();
        assert_eq!(cart_item["quantity"], 2);
        assert_eq!(
            store.get(PREFERENCES, "theme").await.unwrap(),
            Some(json!("dark"))
        );

        // 2回目はフラグで弾かれてno-op
        let again = import_if_needed(&store, file.path()).await.unwrap();
        assert!(!again.imported);
        let cart_item = store.get(CART, "p1").await.unwrap().unwrap();
        assert_eq!(cart_item["quantity"], 2);
    }

    #[tokio::test]
    async fn missing_file_still_sets_the_flag() {
        let store = memory_store().await;
        let report = import_if_needed(&store, Path::new("/nonexistent/legacy.json"))
            .await
            .unwrap();
        assert!(report.imported);
        assert_eq!(report.cart_items, 0);

        let flag = store.get(PREFERENCES, LEGACY_FLAG_KEY).await.unwrap();
        assert_eq!(flag, Some(json!(true)));
    }
}
