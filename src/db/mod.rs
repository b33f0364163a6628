mod records;

use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const STORE_FILE_NAME: &str = "tenant_console.sqlite";

/// Migrations are additive only: each entry creates collections or indexes
/// and never drops or reshapes what an earlier version created.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("migrations/v1.sql")),
    (2, include_str!("migrations/v2.sql")),
];

pub const STORE_VERSION: i64 = MIGRATIONS[MIGRATIONS.len() - 1].0;

static OPEN_STORES: Lazy<Mutex<HashMap<PathBuf, Arc<Store>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tenants,
    Settings,
    SnapshotHistory,
    Notes,
    Schedule,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Tenants,
        Collection::Settings,
        Collection::SnapshotHistory,
        Collection::Notes,
        Collection::Schedule,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Self::Tenants => "tenants",
            Self::Settings => "settings",
            Self::SnapshotHistory => "snapshot_history",
            Self::Notes => "notes",
            Self::Schedule => "schedule",
        }
    }

    /// Auto-keyed collections assign an increasing integer key on insert.
    pub fn auto_keyed(self) -> bool {
        matches!(self, Self::SnapshotHistory | Self::Notes | Self::Schedule)
    }
}

/// Secondary index fields, as JSON paths into the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    Name,
    Status,
    TenantId,
    TakenAt,
    CreatedAt,
    Date,
    Completed,
}

impl IndexField {
    fn json_path(self) -> &'static str {
        match self {
            Self::Name => "$.name",
            Self::Status => "$.status",
            Self::TenantId => "$.tenantId",
            Self::TakenAt => "$.takenAt",
            Self::CreatedAt => "$.createdAt",
            Self::Date => "$.date",
            Self::Completed => "$.completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Text(String),
    Int(i64),
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for StoreKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StoreKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for StoreKey {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for StoreKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl ToSql for StoreKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(value) => value.to_sql(),
            Self::Int(value) => value.to_sql(),
        }
    }
}

/// A value persisted in one of the store's collections.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// `None` asks an auto-keyed collection to assign one on insert.
    fn key(&self) -> Option<StoreKey>;

    fn assign_key(&mut self, _key: i64) {}
}

#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

/// Opens the store at `path` or returns the handle already opened for it.
/// Concurrent callers converge on one shared handle.
pub fn open_store(path: &Path) -> AppResult<Arc<Store>> {
    let registry_key = normalize_store_path(path);
    let mut stores = OPEN_STORES
        .lock()
        .map_err(|_| AppError::Internal("store registry mutex poisoned".to_string()))?;
    if let Some(store) = stores.get(&registry_key) {
        return Ok(store.clone());
    }
    let store = Arc::new(Store::open(path)?);
    stores.insert(registry_key, store.clone());
    Ok(store)
}

fn normalize_store_path(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

impl Store {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::StoreUnavailable(err.to_string()))?;
        }
        let conn = Connection::open(path)
            .map_err(|err| AppError::StoreUnavailable(format!("{}: {}", path.display(), err)))?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|err| AppError::StoreUnavailable(err.to_string()))?;
        Self::from_connection(conn, None)
    }

    fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> AppResult<Self> {
        migrate(&mut conn).map_err(|err| match err {
            AppError::StoreUnavailable(message) => AppError::StoreUnavailable(message),
            other => AppError::StoreUnavailable(other.to_string()),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))
    }

    pub fn version(&self) -> AppResult<i64> {
        let conn = self.conn()?;
        Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    /// Names of the collections physically present, sorted.
    pub fn collections(&self) -> AppResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name ASC",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn list_all<T: Record>(&self) -> AppResult<Vec<T>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT key, value_json FROM {} ORDER BY key ASC",
            T::COLLECTION.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(decode_row::<T>(row)?);
        }
        Ok(items)
    }

    /// Records whose indexed field equals `value`, in key order.
    pub fn list_by_index<T: Record>(&self, field: IndexField, value: &dyn ToSql) -> AppResult<Vec<T>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT key, value_json FROM {} WHERE json_extract(value_json, '{}') = ?1 ORDER BY key ASC",
            T::COLLECTION.table(),
            field.json_path()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([value])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(decode_row::<T>(row)?);
        }
        Ok(items)
    }

    pub fn get_by_id<T: Record>(&self, key: impl Into<StoreKey>) -> AppResult<Option<T>> {
        let key = key.into();
        let conn = self.conn()?;
        let sql = format!(
            "SELECT key, value_json FROM {} WHERE key = ?1",
            T::COLLECTION.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([&key])?;
        match rows.next()? {
            Some(row) => Ok(Some(decode_row::<T>(row)?)),
            None => Ok(None),
        }
    }

    /// Inserts a new record; fails with `DuplicateKey` if the key is taken.
    pub fn insert<T: Record>(&self, mut item: T) -> AppResult<T> {
        let collection = T::COLLECTION;
        let key = item.key();
        if key.is_none() && !collection.auto_keyed() {
            return Err(AppError::InvalidInput(format!(
                "{} records require a key",
                collection.table()
            )));
        }
        let value_json = serde_json::to_string(&item)?;

        let conn = self.conn()?;
        let result = match &key {
            Some(key) => conn.execute(
                &format!("INSERT INTO {} (key, value_json) VALUES (?1, ?2)", collection.table()),
                params![key, value_json],
            ),
            None => conn.execute(
                &format!("INSERT INTO {} (value_json) VALUES (?1)", collection.table()),
                params![value_json],
            ),
        };

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _)) if failure.code == ErrorCode::ConstraintViolation => {
                return Err(AppError::DuplicateKey {
                    collection: collection.table().to_string(),
                    key: key.map(|key| key.to_string()).unwrap_or_default(),
                });
            }
            Err(other) => return Err(other.into()),
        }

        if key.is_none() {
            item.assign_key(conn.last_insert_rowid());
        }
        Ok(item)
    }

    /// Inserts or replaces the record stored under the item's key.
    pub fn upsert<T: Record>(&self, item: T) -> AppResult<T> {
        let Some(key) = item.key() else {
            return self.insert(item);
        };
        let value_json = serde_json::to_string(&item)?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (key, value_json) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
                T::COLLECTION.table()
            ),
            params![key, value_json],
        )?;
        Ok(item)
    }

    /// Deleting an absent key is a no-op.
    pub fn delete_by_id(&self, collection: Collection, key: impl Into<StoreKey>) -> AppResult<()> {
        let key = key.into();
        let conn = self.conn()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", collection.table()),
            [&key],
        )?;
        Ok(())
    }

    pub fn exists(&self, collection: Collection, key: impl Into<StoreKey>) -> AppResult<bool> {
        let key = key.into();
        let conn = self.conn()?;
        let found = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE key = ?1", collection.table()),
                [&key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn migrate(conn: &mut Connection) -> AppResult<()> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if current > STORE_VERSION {
        return Err(AppError::StoreUnavailable(format!(
            "store version {} is newer than supported version {}",
            current, STORE_VERSION
        )));
    }

    for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(version = *version, "local store upgraded");
    }
    Ok(())
}

fn decode_row<T: Record>(row: &rusqlite::Row<'_>) -> AppResult<T> {
    let key: rusqlite::types::Value = row.get(0)?;
    let raw: String = row.get(1)?;
    let mut item: T = serde_json::from_str(&raw)?;
    if let rusqlite::types::Value::Integer(key) = key {
        item.assign_key(key);
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::{open_store, Collection, IndexField, Store, MIGRATIONS, STORE_VERSION};
    use crate::errors::AppError;
    use crate::models::{Note, SettingEntry, Snapshot, Tenant};
    use chrono::Utc;
    use rusqlite::Connection;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(&dir.path().join("store.sqlite")).expect("open store");
        (dir, store)
    }

    #[test]
    fn open_creates_every_collection_at_current_version() {
        let (_dir, store) = temp_store();
        assert_eq!(store.version().expect("version"), STORE_VERSION);
        let collections = store.collections().expect("collections");
        for collection in Collection::ALL {
            assert!(collections.iter().any(|name| name == collection.table()));
        }
    }

    #[test]
    fn reopening_keeps_records_and_collections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.sqlite");

        let store = Store::open(&path).expect("first open");
        store.insert(Tenant::new("t1", "Shop")).expect("insert");
        let collections_before = store.collections().expect("collections");
        drop(store);

        let store = Store::open(&path).expect("second open");
        assert_eq!(store.collections().expect("collections"), collections_before);
        let tenants: Vec<Tenant> = store.list_all().expect("list");
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].id, "t1");
    }

    #[test]
    fn shared_accessor_returns_one_handle_per_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shared.sqlite");
        let first = open_store(&path).expect("first");
        let second = open_store(&path).expect("second");
        assert!(std::sync::Arc::ptr_eq(&first, &second));

        first.insert(Tenant::new("t1", "Shop")).expect("insert");
        let tenants: Vec<Tenant> = second.list_all().expect("list");
        assert_eq!(tenants.len(), 1);
    }

    #[test]
    fn insert_rejects_duplicate_keys() {
        let (_dir, store) = temp_store();
        store.insert(Tenant::new("t1", "Shop")).expect("insert");
        let error = store.insert(Tenant::new("t1", "Other")).expect_err("duplicate");
        assert!(matches!(error, AppError::DuplicateKey { ref key, .. } if key == "t1"));

        let stored: Tenant = store.get_by_id("t1").expect("get").expect("present");
        assert_eq!(stored.name, "Shop");
    }

    #[test]
    fn upsert_replaces_and_delete_is_idempotent() {
        let (_dir, store) = temp_store();
        store.upsert(Tenant::new("t1", "Shop")).expect("upsert insert");
        store.upsert(Tenant::new("t1", "Renamed")).expect("upsert replace");
        let stored: Tenant = store.get_by_id("t1").expect("get").expect("present");
        assert_eq!(stored.name, "Renamed");

        store.delete_by_id(Collection::Tenants, "t1").expect("delete");
        store.delete_by_id(Collection::Tenants, "t1").expect("delete absent");
        assert!(store.get_by_id::<Tenant>("t1").expect("get").is_none());
    }

    #[test]
    fn auto_keyed_records_get_increasing_ids() {
        let (_dir, store) = temp_store();
        let tenant = Tenant::new("t1", "Shop");
        let first = store.insert(Snapshot::failed(&tenant, Utc::now())).expect("first");
        let second = store.insert(Snapshot::failed(&tenant, Utc::now())).expect("second");
        let (Some(first_id), Some(second_id)) = (first.id, second.id) else {
            panic!("ids were not assigned");
        };
        assert!(second_id > first_id);

        let loaded: Snapshot = store.get_by_id(second_id).expect("get").expect("present");
        assert_eq!(loaded.id, Some(second_id));
    }

    #[test]
    fn keyed_collections_require_a_key_value() {
        let (_dir, store) = temp_store();
        store
            .upsert(SettingEntry {
                key: "bot_token".to_string(),
                value: "abc".to_string(),
            })
            .expect("setting");
        assert!(store.exists(Collection::Settings, "bot_token").expect("exists"));
    }

    #[test]
    fn index_lookup_filters_by_tenant() {
        let (_dir, store) = temp_store();
        let shop = Tenant::new("t1", "Shop");
        let other = Tenant::new("t2", "Other");
        store.insert(Snapshot::failed(&shop, Utc::now())).expect("insert");
        store.insert(Snapshot::failed(&other, Utc::now())).expect("insert");
        store.insert(Snapshot::failed(&shop, Utc::now())).expect("insert");

        let history: Vec<Snapshot> = store
            .list_by_index(IndexField::TenantId, &"t1")
            .expect("index lookup");
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|snapshot| snapshot.tenant_id == "t1"));
    }

    #[test]
    fn upgrade_from_first_version_is_additive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.sqlite");
        {
            let conn = Connection::open(&path).expect("raw open");
            conn.execute_batch(MIGRATIONS[0].1).expect("v1 schema");
            conn.pragma_update(None, "user_version", 1).expect("version");
            conn.execute(
                "INSERT INTO tenants (key, value_json) VALUES ('t1', ?1)",
                [serde_json::to_string(&Tenant::new("t1", "Legacy")).expect("json")],
            )
            .expect("legacy tenant");
        }

        let store = Store::open(&path).expect("upgrade");
        assert_eq!(store.version().expect("version"), STORE_VERSION);
        let tenant: Tenant = store.get_by_id("t1").expect("get").expect("kept");
        assert_eq!(tenant.name, "Legacy");

        let note = store
            .insert(Note {
                id: None,
                tenant_id: "t1".to_string(),
                body: "call back".to_string(),
                created_at: Utc::now(),
            })
            .expect("notes collection exists after upgrade");
        assert!(note.id.is_some());
    }

    #[test]
    fn newer_store_version_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("future.sqlite");
        {
            let conn = Connection::open(&path).expect("raw open");
            conn.pragma_update(None, "user_version", STORE_VERSION + 1)
                .expect("version");
        }
        let error = Store::open(&path).expect_err("newer version");
        assert!(matches!(error, AppError::StoreUnavailable(_)));
    }
}
