//! Declarative schema for the local store: named partitions addressed by a
//! primary key (or an auto-incrementing id) with optional secondary indexes
//! over fields of the stored JSON value.

/// Partition names of the storefront store.
pub const PRODUCTS: &str = "products";
pub const CART: &str = "cart";
pub const WISHLIST: &str = "wishlist";
pub const OFFLINE_QUEUE: &str = "offline_queue";
pub const SOPS: &str = "sops";
pub const PREFERENCES: &str = "preferences";

pub const IDX_BY_GENDER: &str = "by-gender";
pub const IDX_BY_EVENT: &str = "by-event";
pub const IDX_BY_GENDER_EVENT: &str = "by-gender-event";
pub const IDX_BY_SYNCED: &str = "by-synced";

pub const STORE_NAME: &str = "popclozet";
pub const STORE_VERSION: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    /// Dotted paths into the stored JSON value, e.g. `payload.gender`.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionKind {
    /// Rows addressed by a string key. `key_path` names the value field the
    /// key is taken from when the caller does not pass one explicitly.
    Keyed { key_path: Option<String> },
    /// Rows addressed by a store-assigned auto-incrementing integer id.
    AutoIncrement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub name: String,
    pub kind: PartitionKind,
    pub indexes: Vec<IndexSpec>,
}

impl PartitionSpec {
    pub fn keyed(name: &str, key_path: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind: PartitionKind::Keyed {
                key_path: key_path.map(str::to_string),
            },
            indexes: Vec::new(),
        }
    }

    pub fn auto_increment(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: PartitionKind::AutoIncrement,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, name: &str, fields: &[&str]) -> Self {
        self.indexes.push(IndexSpec {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    pub name: String,
    pub version: i32,
    pub partitions: Vec<PartitionSpec>,
}

impl StoreSchema {
    pub fn new(name: &str, version: i32) -> Self {
        Self {
            name: name.to_string(),
            version,
            partitions: Vec::new(),
        }
    }

    pub fn partition(mut self, spec: PartitionSpec) -> Self {
        self.partitions.push(spec);
        self
    }

    pub fn find(&self, name: &str) -> Option<&PartitionSpec> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// SQL識別子として安全な名前だけを許可する。
    pub fn validate(&self) -> Result<(), String> {
        if !valid_identifier(&self.name) {
            return Err(format!("invalid store name `{}`", self.name));
        }
        for partition in &self.partitions {
            if !valid_identifier(&partition.name) {
                return Err(format!("invalid partition name `{}`", partition.name));
            }
            for index in &partition.indexes {
                if !valid_identifier(&index.name) {
                    return Err(format!("invalid index name `{}`", index.name));
                }
                if index.fields.is_empty() {
                    return Err(format!("index `{}` has no fields", index.name));
                }
                for field in &index.fields {
                    if !field.split('.').all(valid_identifier) {
                        return Err(format!("invalid index field `{field}`"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// The production storefront schema. Version 1 carried `products` only;
/// version 2 added the offline queue, cart, wishlist, SOP mirror and
/// preferences.
pub fn storefront_schema() -> StoreSchema {
    StoreSchema::new(STORE_NAME, STORE_VERSION)
        .partition(
            PartitionSpec::keyed(PRODUCTS, Some("id"))
                .with_index(IDX_BY_GENDER, &["payload.gender"])
                .with_index(IDX_BY_EVENT, &["payload.event_category"])
                .with_index(
                    IDX_BY_GENDER_EVENT,
                    &["payload.gender", "payload.event_category"],
                ),
        )
        .partition(PartitionSpec::keyed(CART, Some("product_id")))
        .partition(PartitionSpec::keyed(WISHLIST, Some("product_id")))
        .partition(
            PartitionSpec::auto_increment(OFFLINE_QUEUE).with_index(IDX_BY_SYNCED, &["synced"]),
        )
        .partition(PartitionSpec::keyed(SOPS, Some("id")))
        .partition(PartitionSpec::keyed(PREFERENCES, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storefront_schema_is_valid() {
        storefront_schema().validate().unwrap();
    }

    #[test]
    fn rejects_sql_unsafe_names() {
        let schema = StoreSchema::new("popclozet", 1)
            .partition(PartitionSpec::keyed("products; DROP TABLE", Some("id")));
        assert!(schema.validate().is_err());
    }
}
