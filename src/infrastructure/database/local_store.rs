use crate::infrastructure::database::schema::{PartitionKind, PartitionSpec, StoreSchema};
use crate::shared::error::AppError;
use serde_json::Value;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>;

/// Versioned, transactional local store. Partitions are SQLite tables of
/// `(key, value)` or `(id, value)` rows holding one JSON document each;
/// secondary indexes are expression indexes over `json_extract` of the
/// stored value, so they can never drift from the base rows.
pub struct LocalStore {
    pool: SqlitePool,
    schema: StoreSchema,
}

impl LocalStore {
    /// Opens the store, upgrading the on-disk schema when the requested
    /// version exceeds `PRAGMA user_version`. The upgrade applies the
    /// declared partitions and indexes; it runs at most once per version
    /// step. Every partition named by the schema must exist afterwards.
    pub async fn open(pool: SqlitePool, schema: StoreSchema) -> Result<Self, AppError> {
        schema.validate().map_err(AppError::Schema)?;

        let stored: i32 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await?;

        if schema.version > stored {
            info!(
                store = %schema.name,
                from = stored,
                to = schema.version,
                "upgrading local store schema"
            );
            apply_schema(&pool, &schema).await?;
            sqlx::query(&format!("PRAGMA user_version = {}", schema.version))
                .execute(&pool)
                .await?;
        }

        // アップグレード後に必要なパーティションが揃っているか検証する
        for partition in &schema.partitions {
            let exists =
                sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")
                    .bind(&partition.name)
                    .fetch_optional(&pool)
                    .await?;
            if exists.is_none() {
                return Err(AppError::Schema(format!(
                    "partition `{}` missing after upgrade to version {}",
                    partition.name, schema.version
                )));
            }
        }

        Ok(Self { pool, schema })
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    // ---- keyed partitions ----

    pub async fn get(&self, partition: &str, key: &str) -> Result<Option<Value>, AppError> {
        let spec = self.keyed(partition)?;
        let sql = format!("SELECT value FROM {} WHERE key = ?1", spec.name);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_value(&r)).transpose()
    }

    pub async fn get_all(&self, partition: &str) -> Result<Vec<Value>, AppError> {
        let spec = self.keyed(partition)?;
        let sql = format!("SELECT value FROM {}", spec.name);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_value).collect()
    }

    pub async fn get_all_by_index(
        &self,
        partition: &str,
        index: &str,
        keys: &[Value],
    ) -> Result<Vec<Value>, AppError> {
        let spec = self.keyed(partition)?;
        let clause = index_where(spec, index, keys.len())?;
        let sql = format!("SELECT value FROM {} WHERE {}", spec.name, clause);
        let mut query = sqlx::query(&sql);
        for key in keys {
            query = bind_index_key(query, key)?;
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(parse_value).collect()
    }

    /// Upsert. The committed key is returned; when `key` is not passed it is
    /// taken from the partition's key path field on the value.
    pub async fn put(
        &self,
        partition: &str,
        value: &Value,
        key: Option<&str>,
    ) -> Result<String, AppError> {
        let spec = self.keyed(partition)?;
        let key = resolve_key(spec, value, key)?;
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            spec.name
        );
        sqlx::query(&sql)
            .bind(&key)
            .bind(value.to_string())
            .execute(&self.pool)
            .await?;
        Ok(key)
    }

    /// Idempotent: deleting an absent key is a no-op.
    pub async fn delete(&self, partition: &str, key: &str) -> Result<(), AppError> {
        let spec = self.keyed(partition)?;
        let sql = format!("DELETE FROM {} WHERE key = ?1", spec.name);
        sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    /// Atomically replaces the whole partition content. Either every entry
    /// commits or none does.
    pub async fn replace_all(
        &self,
        partition: &str,
        entries: &[(String, Value)],
    ) -> Result<(), AppError> {
        let spec = self.keyed(partition)?;
        let delete_sql = format!("DELETE FROM {}", spec.name);
        let insert_sql = format!("INSERT INTO {} (key, value) VALUES (?1, ?2)", spec.name);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&delete_sql).execute(&mut *tx).await?;
        for (key, value) in entries {
            sqlx::query(&insert_sql)
                .bind(key)
                .bind(value.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Read-modify-write inside one immediate transaction, so concurrent
    /// writers to the same key cannot lose an update. Returning `None` from
    /// the closure deletes the row.
    pub async fn read_modify_write<F>(
        &self,
        partition: &str,
        key: &str,
        f: F,
    ) -> Result<Option<Value>, AppError>
    where
        F: FnOnce(Option<Value>) -> Option<Value>,
    {
        let spec = self.keyed(partition)?;
        let select_sql = format!("SELECT value FROM {} WHERE key = ?1", spec.name);
        let upsert_sql = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            spec.name
        );
        let delete_sql = format!("DELETE FROM {} WHERE key = ?1", spec.name);

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Option<Value>, AppError> = async {
            let row = sqlx::query(&select_sql)
                .bind(key)
                .fetch_optional(&mut *conn)
                .await?;
            let current = row.as_ref().map(parse_value).transpose()?;
            let next = f(current);
            match &next {
                Some(value) => {
                    sqlx::query(&upsert_sql)
                        .bind(key)
                        .bind(value.to_string())
                        .execute(&mut *conn)
                        .await?;
                }
                None => {
                    sqlx::query(&delete_sql)
                        .bind(key)
                        .execute(&mut *conn)
                        .await?;
                }
            }
            Ok(next)
        }
        .await;

        finish_tx(&mut conn, result).await
    }

    // ---- auto-increment partitions ----

    /// Appends a value; the store assigns the id exactly once, ids are never
    /// reused.
    pub async fn append(&self, partition: &str, value: &Value) -> Result<i64, AppError> {
        let spec = self.auto(partition)?;
        let sql = format!("INSERT INTO {} (value) VALUES (?1)", spec.name);
        let result = sqlx::query(&sql)
            .bind(value.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn row(&self, partition: &str, id: i64) -> Result<Option<Value>, AppError> {
        let spec = self.auto(partition)?;
        let sql = format!("SELECT value FROM {} WHERE id = ?1", spec.name);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_value(&r)).transpose()
    }

    pub async fn rows(&self, partition: &str) -> Result<Vec<(i64, Value)>, AppError> {
        let spec = self.auto(partition)?;
        let sql = format!("SELECT id, value FROM {} ORDER BY id ASC", spec.name);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_row).collect()
    }

    pub async fn rows_by_index(
        &self,
        partition: &str,
        index: &str,
        keys: &[Value],
    ) -> Result<Vec<(i64, Value)>, AppError> {
        let spec = self.auto(partition)?;
        let clause = index_where(spec, index, keys.len())?;
        let sql = format!(
            "SELECT id, value FROM {} WHERE {} ORDER BY id ASC",
            spec.name, clause
        );
        let mut query = sqlx::query(&sql);
        for key in keys {
            query = bind_index_key(query, key)?;
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(parse_row).collect()
    }

    /// Rewrites one field of the stored JSON value in place, atomically.
    /// Returns false when the id does not exist.
    pub async fn set_field(
        &self,
        partition: &str,
        id: i64,
        field: &str,
        value: &Value,
    ) -> Result<bool, AppError> {
        let spec = self.auto(partition)?;
        validate_field(field)?;
        let sql = format!(
            "UPDATE {} SET value = json_set(value, '$.{}', json(?1)) WHERE id = ?2",
            spec.name, field
        );
        let result = sqlx::query(&sql)
            .bind(value.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_row(&self, partition: &str, id: i64) -> Result<(), AppError> {
        let spec = self.auto(partition)?;
        let sql = format!("DELETE FROM {} WHERE id = ?1", spec.name);
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn delete_by_index(
        &self,
        partition: &str,
        index: &str,
        keys: &[Value],
    ) -> Result<u64, AppError> {
        let spec = self.auto(partition)?;
        let clause = index_where(spec, index, keys.len())?;
        let sql = format!("DELETE FROM {} WHERE {}", spec.name, clause);
        let mut query = sqlx::query(&sql);
        for key in keys {
            query = bind_index_key(query, key)?;
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // ---- operations over either partition kind ----

    pub async fn count(&self, partition: &str) -> Result<i64, AppError> {
        let spec = self.any(partition)?;
        let sql = format!("SELECT COUNT(*) FROM {}", spec.name);
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    pub async fn clear(&self, partition: &str) -> Result<(), AppError> {
        let spec = self.any(partition)?;
        let sql = format!("DELETE FROM {}", spec.name);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Deletes every row whose numeric `field` is older than `cutoff`.
    /// Returns the number of rows removed.
    pub async fn delete_where_older(
        &self,
        partition: &str,
        field: &str,
        cutoff: i64,
    ) -> Result<u64, AppError> {
        let spec = self.any(partition)?;
        validate_field(field)?;
        let sql = format!(
            "DELETE FROM {} WHERE json_extract(value, '$.{}') IS NOT NULL \
             AND json_extract(value, '$.{}') < ?1",
            spec.name, field, field
        );
        let result = sqlx::query(&sql).bind(cutoff).execute(&self.pool).await?;
        debug!(partition, removed = result.rows_affected(), "age sweep");
        Ok(result.rows_affected())
    }

    // ---- partition lookup ----

    fn any(&self, partition: &str) -> Result<&PartitionSpec, AppError> {
        self.schema.find(partition).ok_or_else(|| {
            AppError::Schema(format!("partition `{partition}` is not declared by the schema"))
        })
    }

    fn keyed(&self, partition: &str) -> Result<&PartitionSpec, AppError> {
        let spec = self.any(partition)?;
        match spec.kind {
            PartitionKind::Keyed { .. } => Ok(spec),
            PartitionKind::AutoIncrement => Err(AppError::Schema(format!(
                "partition `{partition}` is id-addressed, not key-addressed"
            ))),
        }
    }

    fn auto(&self, partition: &str) -> Result<&PartitionSpec, AppError> {
        let spec = self.any(partition)?;
        match spec.kind {
            PartitionKind::AutoIncrement => Ok(spec),
            PartitionKind::Keyed { .. } => Err(AppError::Schema(format!(
                "partition `{partition}` is key-addressed, not id-addressed"
            ))),
        }
    }
}

async fn apply_schema(pool: &SqlitePool, schema: &StoreSchema) -> Result<(), AppError> {
    for partition in &schema.partitions {
        let create = match partition.kind {
            PartitionKind::Keyed { .. } => format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
                partition.name
            ),
            PartitionKind::AutoIncrement => format!(
                "CREATE TABLE IF NOT EXISTS {} \
                 (id INTEGER PRIMARY KEY AUTOINCREMENT, value TEXT NOT NULL)",
                partition.name
            ),
        };
        sqlx::query(&create).execute(pool).await?;

        for index in &partition.indexes {
            let exprs = index
                .fields
                .iter()
                .map(|f| format!("json_extract(value, '$.{f}')"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                sql_name(&partition.name),
                sql_name(&index.name),
                partition.name,
                exprs
            );
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

async fn finish_tx(
    conn: &mut SqliteConnection,
    result: Result<Option<Value>, AppError>,
) -> Result<Option<Value>, AppError> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        }
        Err(err) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(err)
        }
    }
}

fn index_where(spec: &PartitionSpec, index: &str, key_len: usize) -> Result<String, AppError> {
    let index_spec = spec.index(index).ok_or_else(|| {
        AppError::Schema(format!(
            "index `{index}` is not declared on partition `{}`",
            spec.name
        ))
    })?;
    if index_spec.fields.len() != key_len {
        return Err(AppError::InvalidInput(format!(
            "index `{index}` expects {} key component(s), got {key_len}",
            index_spec.fields.len()
        )));
    }
    Ok(index_spec
        .fields
        .iter()
        .map(|f| format!("json_extract(value, '$.{f}') = ?"))
        .collect::<Vec<_>>()
        .join(" AND "))
}

fn bind_index_key<'q>(query: SqliteQuery<'q>, key: &Value) -> Result<SqliteQuery<'q>, AppError> {
    Ok(match key {
        Value::String(s) => query.bind(s.clone()),
        // SQLiteのjson_extractはJSON真偽値を0/1で返す
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
        Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
        other => {
            return Err(AppError::InvalidInput(format!(
                "unsupported index key component: {other}"
            )))
        }
    })
}

fn resolve_key(
    spec: &PartitionSpec,
    value: &Value,
    explicit: Option<&str>,
) -> Result<String, AppError> {
    if let Some(key) = explicit {
        return Ok(key.to_string());
    }
    let key_path = match &spec.kind {
        PartitionKind::Keyed { key_path } => key_path.as_deref(),
        PartitionKind::AutoIncrement => None,
    };
    let path = key_path.ok_or_else(|| {
        AppError::InvalidInput(format!(
            "partition `{}` has no key path; pass the key explicitly",
            spec.name
        ))
    })?;
    value
        .get(path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "value has no string field `{path}` to use as the key"
            ))
        })
}

fn validate_field(field: &str) -> Result<(), AppError> {
    let ok = !field.is_empty()
        && field.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        });
    if ok {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!("invalid field path `{field}`")))
    }
}

fn sql_name(name: &str) -> String {
    name.replace('-', "_")
}

fn parse_value(row: &sqlx::sqlite::SqliteRow) -> Result<Value, AppError> {
    let raw: String = row.try_get("value")?;
    Ok(serde_json::from_str(&raw)?)
}

fn parse_row(row: &sqlx::sqlite::SqliteRow) -> Result<(i64, Value), AppError> {
    let id: i64 = row.try_get("id")?;
    let raw: String = row.try_get("value")?;
    Ok((id, serde_json::from_str(&raw)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::schema::{PartitionSpec, StoreSchema};
    use crate::infrastructure::database::ConnectionPool;
    use serde_json::json;
    use std::sync::Arc;

    fn v1_schema() -> StoreSchema {
        StoreSchema::new("popclozet", 1).partition(
            PartitionSpec::keyed("products", Some("id")).with_index("by-category", &["category"]),
        )
    }

    fn v2_schema() -> StoreSchema {
        v1_schema()
            .partition(
                PartitionSpec::auto_increment("offline_queue").with_index("by-synced", &["synced"]),
            )
            .partition(PartitionSpec::keyed("preferences", None))
    }

    impl StoreSchema {
        fn at_version(mut self, version: i32) -> Self {
            self.version = version;
            self
        }
    }

    async fn memory_store(schema: StoreSchema) -> LocalStore {
        let pool = ConnectionPool::from_memory().await.unwrap();
        LocalStore::open(pool.pool().clone(), schema).await.unwrap()
    }

    #[tokio::test]
    async fn upgrade_creates_missing_partitions() {
        let pool = ConnectionPool::from_memory().await.unwrap();

        let store = LocalStore::open(pool.pool().clone(), v1_schema())
            .await
            .unwrap();
        store
            .put("products", &json!({"id": "p1", "category": "casual"}), None)
            .await
            .unwrap();
        drop(store);

        // 同じDBをバージョン2で開き直すとアップグレードが走る
        let store = LocalStore::open(pool.pool().clone(), v2_schema().at_version(2))
            .await
            .unwrap();
        let id = store
            .append("offline_queue", &json!({"synced": false}))
            .await
            .unwrap();
        assert_eq!(id, 1);
        let unsynced = store
            .rows_by_index("offline_queue", "by-synced", &[json!(false)])
            .await
            .unwrap();
        assert_eq!(unsynced.len(), 1);

        let version: i32 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool.pool())
            .await
            .unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn undeclared_partition_is_a_schema_error() {
        let store = memory_store(v1_schema()).await;
        let err = store.get("wishlist", "p1").await.unwrap_err();
        assert!(matches!(err, AppError::Schema(_)));
    }

    #[tokio::test]
    async fn put_replaces_and_delete_is_idempotent() {
        let store = memory_store(v1_schema()).await;
        store
            .put("products", &json!({"id": "p1", "category": "casual"}), None)
            .await
            .unwrap();
        store
            .put("products", &json!({"id": "p1", "category": "formal"}), None)
            .await
            .unwrap();

        assert_eq!(store.count("products").await.unwrap(), 1);
        let stored = store.get("products", "p1").await.unwrap().unwrap();
        assert_eq!(stored["category"], "formal");

        store.delete("products", "p1").await.unwrap();
        store.delete("products", "p1").await.unwrap();
        assert!(store.get("products", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn index_lookup_returns_exact_matches() {
        let store = memory_store(v1_schema()).await;
        for (id, category) in [("p1", "casual"), ("p2", "formal"), ("p3", "casual")] {
            store
                .put("products", &json!({"id": id, "category": category}), None)
                .await
                .unwrap();
        }

        let mut casual = store
            .get_all_by_index("products", "by-category", &[json!("casual")])
            .await
            .unwrap()
            .into_iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        casual.sort();
        assert_eq!(casual, vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn concurrent_read_modify_write_loses_no_update() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("store.db").display()
        );
        let pool = ConnectionPool::new(&url, 4).await.unwrap();
        let store = Arc::new(
            LocalStore::open(pool.pool().clone(), v2_schema().at_version(2))
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .read_modify_write("products", "counter", |current| {
                        let count = current
                            .as_ref()
                            .and_then(|v| v["count"].as_i64())
                            .unwrap_or(0);
                        Some(json!({"id": "counter", "count": count + 1}))
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get("products", "counter").await.unwrap().unwrap();
        assert_eq!(stored["count"], 20);
    }

    #[tokio::test]
    async fn set_field_rewrites_json_in_place() {
        let store = memory_store(v2_schema().at_version(2)).await;
        let id = store
            .append("offline_queue", &json!({"synced": false, "action": "qr_scan"}))
            .await
            .unwrap();

        assert!(store
            .set_field("offline_queue", id, "synced", &json!(true))
            .await
            .unwrap());
        // 存在しないidはno-op
        assert!(!store
            .set_field("offline_queue", 999, "synced", &json!(true))
            .await
            .unwrap());

        let row = store.row("offline_queue", id).await.unwrap().unwrap();
        assert_eq!(row["synced"], json!(true));
        assert_eq!(row["action"], "qr_scan");
    }

    #[tokio::test]
    async fn explicit_key_partition_requires_key() {
        let store = memory_store(v2_schema().at_version(2)).await;
        let err = store
            .put("preferences", &json!("dark"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        store
            .put("preferences", &json!("dark"), Some("theme"))
            .await
            .unwrap();
        assert_eq!(
            store.get("preferences", "theme").await.unwrap(),
            Some(json!("dark"))
        );
    }
}
