//! In-memory [`Repository`] backed by [`DashMap`].
//!
//! Rows are keyed by their serialized primary key and carry an insertion
//! sequence number so unordered reads are stable. Executes selections with
//! [`Selection`]'s in-memory evaluation. Suitable for development, tests,
//! and demos; call statistics let tests prove that a guard fired before any
//! store access.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use crudkit_core::filter::values_equal;
use crudkit_core::Entity;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::query::{ConcreteQuery, Selection};
use crate::traits::{
    CacheStore, DuplicateKeyError, EntityMetadata, QueryExecutor, Repository, SaveOptions,
};

/// Counts of store calls, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    pub fetches: u64,
    pub counts: u64,
    pub saves: u64,
    pub save_chunks: u64,
    pub removes: u64,
    pub soft_removes: u64,
    pub recovers: u64,
}

impl RepositoryStats {
    /// Every read and write call.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.fetches + self.counts + self.saves + self.removes + self.soft_removes + self.recovers
    }

    /// Write calls only.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.saves + self.removes + self.soft_removes + self.recovers
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    seq: u64,
    entity: Entity,
}

struct MemoryTable {
    metadata: EntityMetadata,
    unique_fields: Vec<String>,
    rows: DashMap<String, StoredRow>,
    next_seq: AtomicU64,
    stats: Mutex<RepositoryStats>,
    fail_writes: AtomicBool,
    fail_reads: Mutex<Option<String>>,
}

impl MemoryTable {
    fn snapshot(&self, selection: &Selection) -> Vec<Entity> {
        let soft_delete = self.metadata.soft_delete_column.as_deref();
        let mut rows: Vec<StoredRow> = self
            .rows
            .iter()
            .filter(|row| selection.admits(&row.value().entity, soft_delete))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|row| row.seq);
        rows.into_iter().map(|row| row.entity).collect()
    }

    fn row_key(&self, entity: &Entity) -> anyhow::Result<String> {
        let mut parts = Vec::with_capacity(self.metadata.primary_keys.len());
        for key in &self.metadata.primary_keys {
            match entity.get(key) {
                Some(value) if !value.is_null() => parts.push(value),
                _ => bail!("primary key field `{key}` is missing"),
            }
        }
        Ok(serde_json::to_string(&parts)?)
    }

    fn check_unique(&self, key: &str, entity: &Entity) -> anyhow::Result<()> {
        for field in &self.unique_fields {
            let Some(value) = entity.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self.rows.iter().any(|row| {
                row.key() != key
                    && row
                        .value()
                        .entity
                        .get(field)
                        .is_some_and(|other| values_equal(other, value))
            });
            if taken {
                return Err(DuplicateKeyError {
                    constraint: format!("UQ_{}_{field}", self.metadata.alias),
                    detail: format!("Key ({field})=({value}) already exists."),
                }
                .into());
            }
        }
        Ok(())
    }

    fn ensure_writable(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store is read-only");
        }
        Ok(())
    }

    fn ensure_readable(&self) -> anyhow::Result<()> {
        if let Some(message) = self.fail_reads.lock().clone() {
            bail!(message);
        }
        Ok(())
    }

    fn soft_delete_column(&self) -> anyhow::Result<&str> {
        self.metadata
            .soft_delete_column
            .as_deref()
            .ok_or_else(|| anyhow!("entity `{}` has no soft-delete column", self.metadata.name))
    }

    /// Sets `column` on every stored row matching the given entities.
    fn set_column(&self, entities: Vec<Entity>, column: &str, value: &Value) -> anyhow::Result<Vec<Entity>> {
        let mut updated = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = self.row_key(&entity)?;
            let mut row = self
                .rows
                .get_mut(&key)
                .ok_or_else(|| anyhow!("row {key} does not exist"))?;
            row.entity.insert(column.to_string(), value.clone());
            updated.push(row.entity.clone());
        }
        Ok(updated)
    }
}

struct MemoryExecutor {
    table: Arc<MemoryTable>,
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn fetch(&self, selection: &Selection) -> anyhow::Result<Vec<Entity>> {
        self.table.stats.lock().fetches += 1;
        self.table.ensure_readable()?;
        let mut rows = self.table.snapshot(selection);
        selection.sort(&mut rows);
        Ok(selection
            .window(rows)
            .into_iter()
            .map(|row| selection.project(row))
            .collect())
    }

    async fn count(&self, selection: &Selection) -> anyhow::Result<u64> {
        self.table.stats.lock().counts += 1;
        self.table.ensure_readable()?;
        Ok(self.table.snapshot(selection).len() as u64)
    }

    async fn count_distinct(&self, selection: &Selection, field: &str) -> anyhow::Result<u64> {
        self.table.stats.lock().counts += 1;
        self.table.ensure_readable()?;
        let distinct: HashSet<String> = self
            .table
            .snapshot(selection)
            .iter()
            .filter_map(|row| row.get(field).filter(|v| !v.is_null()))
            .map(Value::to_string)
            .collect();
        Ok(distinct.len() as u64)
    }

    async fn fetch_and_count(&self, selection: &Selection) -> anyhow::Result<(Vec<Entity>, u64)> {
        self.table.stats.lock().fetches += 1;
        self.table.ensure_readable()?;
        let mut rows = self.table.snapshot(selection);
        let total = rows.len() as u64;
        selection.sort(&mut rows);
        let page = selection
            .window(rows)
            .into_iter()
            .map(|row| selection.project(row))
            .collect();
        Ok((page, total))
    }
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// Repository holding one entity type's rows in memory.
pub struct MemoryRepository {
    table: Arc<MemoryTable>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl MemoryRepository {
    /// Creates a new, empty repository.
    #[must_use]
    pub fn new(metadata: EntityMetadata) -> Self {
        Self {
            table: Arc::new(MemoryTable {
                metadata,
                unique_fields: Vec::new(),
                rows: DashMap::new(),
                next_seq: AtomicU64::new(0),
                stats: Mutex::new(RepositoryStats::default()),
                fail_writes: AtomicBool::new(false),
                fail_reads: Mutex::new(None),
            }),
            cache: None,
        }
    }

    /// Attaches a result cache store.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Declares single-field unique constraints. Call before sharing.
    ///
    /// # Panics
    ///
    /// Panics if the repository has already been shared.
    #[must_use]
    pub fn with_unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        match Arc::get_mut(&mut self.table) {
            Some(table) => table.unique_fields = fields,
            None => panic!("unique constraints must be declared before the repository is shared"),
        }
        self
    }

    /// Seeds rows directly, bypassing validation and statistics.
    /// Non-object values and rows without a primary key are skipped.
    pub fn insert_rows(&self, rows: Vec<Value>) {
        for row in rows {
            let Value::Object(entity) = row else {
                continue;
            };
            if let Ok(key) = self.table.row_key(&entity) {
                let seq = self.table.next_seq.fetch_add(1, Ordering::SeqCst);
                self.table.rows.insert(key, StoredRow { seq, entity });
            }
        }
    }

    /// Every stored row, soft-deleted ones included, in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<Entity> {
        let everything = Selection {
            deleted: crate::query::DeletedScope::Include,
            ..Selection::default()
        };
        self.table.snapshot(&everything)
    }

    #[must_use]
    pub fn stats(&self) -> RepositoryStats {
        *self.table.stats.lock()
    }

    /// Makes every subsequent write fail, to exercise store-failure paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.table.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent read fail with `message`, or restores reads on `None`.
    pub fn set_fail_reads(&self, message: Option<&str>) {
        *self.table.fail_reads.lock() = message.map(str::to_string);
    }

    fn assign_key(&self, entity: &mut Entity) {
        let keys = &self.table.metadata.primary_keys;
        if let [key] = keys.as_slice() {
            if entity.get(key).is_none_or(Value::is_null) {
                entity.insert(key.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
        }
    }
}

fn now_millis() -> Value {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    Value::from(millis)
}

#[async_trait]
impl Repository for MemoryRepository {
    fn metadata(&self) -> &EntityMetadata {
        &self.table.metadata
    }

    fn new_query(&self) -> ConcreteQuery {
        let executor = Arc::new(MemoryExecutor {
            table: Arc::clone(&self.table),
        });
        ConcreteQuery::new(&self.table.metadata, executor)
    }

    async fn save(&self, entities: Vec<Entity>, options: SaveOptions) -> anyhow::Result<Vec<Entity>> {
        self.table.stats.lock().saves += 1;
        self.table.ensure_writable()?;

        let mut saved = Vec::with_capacity(entities.len());
        for chunk in entities.chunks(options.chunk.max(1)) {
            self.table.stats.lock().save_chunks += 1;
            for entity in chunk {
                let mut entity = entity.clone();
                self.assign_key(&mut entity);
                let key = self.table.row_key(&entity)?;
                self.table.check_unique(&key, &entity)?;

                let stored = match self.table.rows.get_mut(&key) {
                    Some(mut row) => {
                        for (field, value) in entity {
                            row.entity.insert(field, value);
                        }
                        row.entity.clone()
                    }
                    None => {
                        let seq = self.table.next_seq.fetch_add(1, Ordering::SeqCst);
                        self.table.rows.insert(
                            key,
                            StoredRow {
                                seq,
                                entity: entity.clone(),
                            },
                        );
                        entity
                    }
                };
                saved.push(stored);
            }
        }
        Ok(saved)
    }

    async fn remove(&self, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>> {
        self.table.stats.lock().removes += 1;
        self.table.ensure_writable()?;

        let mut removed = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = self.table.row_key(&entity)?;
            if let Some((_, row)) = self.table.rows.remove(&key) {
                removed.push(row.entity);
            }
        }
        Ok(removed)
    }

    async fn soft_remove(&self, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>> {
        self.table.stats.lock().soft_removes += 1;
        self.table.ensure_writable()?;
        let column = self.table.soft_delete_column()?;
        self.table.set_column(entities, column, &now_millis())
    }

    async fn recover(&self, entities: Vec<Entity>) -> anyhow::Result<Vec<Entity>> {
        self.table.stats.lock().recovers += 1;
        self.table.ensure_writable()?;
        let column = self.table.soft_delete_column()?;
        self.table.set_column(entities, column, &Value::Null)
    }

    fn cache_store(&self) -> Option<Arc<dyn CacheStore>> {
        self.cache.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crudkit_core::PredicateNode;
    use serde_json::json;

    use super::*;

    fn entity(value: Value) -> Entity {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn users() -> MemoryRepository {
        MemoryRepository::new(EntityMetadata::new("User", "user").soft_delete("deletedAt"))
            .with_unique(["email"])
    }

    const CHUNK: SaveOptions = SaveOptions { chunk: 20 };

    #[tokio::test]
    async fn save_get_remove_round_trip() {
        let repo = users();
        let saved = repo
            .save(vec![entity(json!({"id": 1, "email": "a@x"}))], CHUNK)
            .await
            .unwrap();
        assert_eq!(saved[0]["email"], json!("a@x"));

        let query = repo.new_query().and_where(PredicateNode::equals("id", json!(1)));
        assert_eq!(query.get_many().await.unwrap().len(), 1);

        let removed = repo.remove(saved).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(query.get_many().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_generates_missing_single_key() {
        let repo = users();
        let saved = repo.save(vec![entity(json!({"email": "a@x"}))], CHUNK).await.unwrap();

        assert!(saved[0]["id"].is_string());
        assert_eq!(repo.rows().len(), 1);
    }

    #[tokio::test]
    async fn save_merges_into_existing_row() {
        let repo = users();
        repo.insert_rows(vec![json!({"id": 1, "email": "a@x", "name": "old"})]);

        let saved = repo
            .save(vec![entity(json!({"id": 1, "name": "new"}))], CHUNK)
            .await
            .unwrap();

        assert_eq!(Value::Object(saved[0].clone()), json!({"id": 1, "email": "a@x", "name": "new"}));
    }

    #[tokio::test]
    async fn save_is_chunked() {
        let repo = users();
        let batch = (0..45).map(|i| entity(json!({"id": i}))).collect();

        repo.save(batch, CHUNK).await.unwrap();
        assert_eq!(repo.stats().save_chunks, 3);
        assert_eq!(repo.stats().saves, 1);
    }

    #[tokio::test]
    async fn unique_violation_is_a_duplicate_key_error() {
        let repo = users();
        repo.insert_rows(vec![json!({"id": 1, "email": "a@x"})]);

        let err = repo
            .save(vec![entity(json!({"id": 2, "email": "a@x"}))], CHUNK)
            .await
            .unwrap_err();
        let dup = err.downcast_ref::<DuplicateKeyError>().unwrap();
        assert_eq!(dup.constraint, "UQ_user_email");
        assert!(dup.detail.contains("(email)"));
    }

    #[tokio::test]
    async fn soft_remove_and_recover() {
        let repo = users();
        repo.insert_rows(vec![json!({"id": 1}), json!({"id": 2})]);
        let target = vec![entity(json!({"id": 1}))];

        repo.soft_remove(target.clone()).await.unwrap();
        assert_eq!(repo.new_query().get_count().await.unwrap(), 1);
        assert_eq!(repo.new_query().with_deleted().get_count().await.unwrap(), 2);

        let recovered = repo.recover(target).await.unwrap();
        assert!(recovered[0]["deletedAt"].is_null());
        assert_eq!(repo.new_query().get_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn soft_remove_requires_column() {
        let repo = MemoryRepository::new(EntityMetadata::new("Tag", "tag"));
        repo.insert_rows(vec![json!({"id": 1})]);

        assert!(repo.soft_remove(vec![entity(json!({"id": 1}))]).await.is_err());
    }

    #[tokio::test]
    async fn failing_writes_and_stats() {
        let repo = users();
        repo.set_fail_writes(true);

        assert!(repo.save(vec![entity(json!({"id": 1}))], CHUNK).await.is_err());
        assert_eq!(repo.stats().writes(), 1);
        assert_eq!(repo.stats().fetches, 0);
    }

    #[tokio::test]
    async fn failing_reads_carry_the_driver_message() {
        let repo = users();
        repo.insert_rows(vec![json!({"id": 1})]);
        repo.set_fail_reads(Some("connection refused"));

        let err = repo.new_query().get_count().await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert!(repo.new_query().get_many().await.is_err());

        repo.set_fail_reads(None);
        assert_eq!(repo.new_query().get_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_count_ignores_nulls() {
        let repo = users();
        repo.insert_rows(vec![
            json!({"id": 1, "city": "a"}),
            json!({"id": 2, "city": "a"}),
            json!({"id": 3, "city": "b"}),
            json!({"id": 4}),
        ]);

        assert_eq!(repo.new_query().get_distinct_count("city").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn composite_keys() {
        let repo = MemoryRepository::new(
            EntityMetadata::new("Member", "member").primary_keys(["groupId", "userId"]),
        );
        repo.insert_rows(vec![json!({"groupId": 1, "userId": 1}), json!({"groupId": 1, "userId": 2})]);

        assert_eq!(repo.rows().len(), 2);
        assert!(repo
            .save(vec![entity(json!({"groupId": 1}))], CHUNK)
            .await
            .is_err());
    }
}
