//! Persistent Store (4.C): an ordered, transactional key-value map backed
//! by a local tantivy index, used purely as a durable key-value substrate.
//! `ImportTransaction` is the single-writer write path; `ReadTransaction` is
//! a point-in-time snapshot. Neither nests inside the other.

mod schema;

pub use schema::Table;

use crate::error::{StoreError, StoreResult};
use schema::StoreSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, IndexSettings, ReloadPolicy, TantivyDocument, Term};

pub struct PersistentStore {
    index: Index,
    reader: IndexReader,
    schema: StoreSchema,
    writer: Mutex<Option<tantivy::IndexWriter>>,
    map_size: AtomicUsize,
}

impl PersistentStore {
    pub fn open(path: impl AsRef<Path>, initial_map_size: usize) -> StoreResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| StoreError::Tantivy(tantivy::TantivyError::from(e)))?;

        let (schema, store_schema) = StoreSchema::build();
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            let dir = tantivy::directory::MmapDirectory::open(path)?;
            Index::create(dir, schema, IndexSettings::default())?
        };

        let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
        if path.join("meta.json").exists() {
            reader.reload()?;
        }

        let map_size = initial_map_size.max(15_000_000);
        let writer = index.writer(map_size)?;

        Ok(Self {
            index,
            reader,
            schema: store_schema,
            writer: Mutex::new(Some(writer)),
            map_size: AtomicUsize::new(map_size),
        })
    }

    /// Opens a write transaction. Callers that need MapFull-retry semantics
    /// should go through [`PersistentStore::run_import`] instead, which
    /// retries the whole closure with a doubled arena budget.
    pub fn import_transaction(&self) -> ImportTransaction<'_> {
        ImportTransaction { store: self, committed: false }
    }

    /// Runs `f` inside a fresh write transaction; if the transaction's
    /// commit fails, doubles the writer's arena budget and retries the
    /// whole closure, up to `max_doublings` times (§4.C, §7, invariant 8).
    pub fn run_import<T>(
        &self,
        max_doublings: u32,
        mut f: impl FnMut(&mut ImportTransaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        for attempt in 0..=max_doublings {
            let mut tx = self.import_transaction();
            let result = f(&mut tx).and_then(|value| tx.commit().map(|_| value));
            match result {
                Ok(value) => return Ok(value),
                Err(_) if attempt < max_doublings => {
                    let budget = self.map_size.load(Ordering::SeqCst).saturating_mul(2);
                    self.map_size.store(budget, Ordering::SeqCst);
                    self.replace_writer(budget)?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::MapFull { attempt: max_doublings, max_attempts: max_doublings })
    }

    fn replace_writer(&self, budget: usize) -> StoreResult<()> {
        let mut guard = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        *guard = Some(self.index.writer(budget)?);
        Ok(())
    }

    pub fn read_transaction(&self) -> ReadTransaction<'_> {
        ReadTransaction {
            searcher: self.reader.searcher(),
            schema: &self.schema,
        }
    }

    fn with_writer<T>(&self, f: impl FnOnce(&mut tantivy::IndexWriter) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let writer = guard.as_mut().ok_or(StoreError::NoActiveTransaction)?;
        f(writer)
    }

    fn doc_for(&self, table: Table, key: &str, value: &impl Serialize) -> StoreResult<TantivyDocument> {
        let payload = serde_json::to_vec(value)?;
        let mut doc = TantivyDocument::new();
        doc.add_text(self.schema.doc_type, table.as_str());
        doc.add_text(self.schema.key, key);
        doc.add_bytes(self.schema.payload, payload);
        Ok(doc)
    }

    fn key_term(&self, table: Table, key: &str) -> BooleanQuery {
        let type_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.schema.doc_type, table.as_str()),
            IndexRecordOption::Basic,
        ));
        let key_query: Box<dyn Query> =
            Box::new(TermQuery::new(Term::from_field_text(self.schema.key, key), IndexRecordOption::Basic));
        BooleanQuery::new(vec![(Occur::Must, type_query), (Occur::Must, key_query)])
    }
}

/// A single-writer write transaction (§5: all writes to the store happen
/// inside one of these, serialised by `PersistentStore::writer`).
pub struct ImportTransaction<'a> {
    store: &'a PersistentStore,
    committed: bool,
}

impl<'a> ImportTransaction<'a> {
    /// Overwrites the single row at `(table, key)`.
    pub fn put<V: Serialize>(&mut self, table: Table, key: &str, value: &V) -> StoreResult<()> {
        self.delete(table, key)?;
        self.append(table, key, value)
    }

    /// Appends a row without deleting any existing rows at the same key
    /// (for multi-valued tables like `provider_by_usr`).
    pub fn append<V: Serialize>(&mut self, table: Table, key: &str, value: &V) -> StoreResult<()> {
        let doc = self.store.doc_for(table, key, value)?;
        self.store.with_writer(|writer| {
            writer.add_document(doc).map_err(StoreError::Tantivy)?;
            Ok(())
        })
    }

    pub fn delete(&mut self, table: Table, key: &str) -> StoreResult<()> {
        let query = self.store.key_term(table, key);
        self.store.with_writer(|writer| {
            writer.delete_query(Box::new(query)).map_err(StoreError::Tantivy)?;
            Ok(())
        })
    }

    pub fn commit(mut self) -> StoreResult<()> {
        self.store.with_writer(|writer| {
            writer.commit().map_err(StoreError::Tantivy)?;
            Ok(())
        })?;
        self.store.reader.reload()?;
        self.committed = true;
        Ok(())
    }

    pub fn abort(mut self) -> StoreResult<()> {
        self.store.with_writer(|writer| {
            writer.rollback().map_err(StoreError::Tantivy)?;
            Ok(())
        })?;
        self.committed = true; // suppress the drop warning; rollback is a clean exit
        Ok(())
    }
}

impl Drop for ImportTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::warn!("ImportTransaction dropped without commit() or abort(); rolling back");
            let _ = self.store.with_writer(|writer| writer.rollback().map_err(StoreError::Tantivy));
        }
    }
}

/// A point-in-time read snapshot (§5: reads never block writes and never
/// see a concurrent writer's uncommitted state).
pub struct ReadTransaction<'a> {
    searcher: tantivy::Searcher,
    schema: &'a StoreSchema,
}

impl ReadTransaction<'_> {
    pub fn get<V: DeserializeOwned>(&self, table: Table, key: &str) -> StoreResult<Option<V>> {
        Ok(self.get_all::<V>(table, key)?.into_iter().next())
    }

    pub fn get_all<V: DeserializeOwned>(&self, table: Table, key: &str) -> StoreResult<Vec<V>> {
        let query = self.key_query(table, key);
        self.collect(&query, 10_000)
    }

    pub fn contains(&self, table: Table, key: &str) -> StoreResult<bool> {
        let query = self.key_query(table, key);
        let top = self.searcher.search(&query, &TopDocs::with_limit(1))?;
        Ok(!top.is_empty())
    }

    /// Every row in `table` (for dump/diagnostic paths, e.g. counting
    /// unreferenced providers).
    pub fn scan_table<V: DeserializeOwned>(&self, table: Table) -> StoreResult<Vec<(String, V)>> {
        let type_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.schema.doc_type, table.as_str()),
            IndexRecordOption::Basic,
        ));
        let top = self.searcher.search(&*type_query, &TopDocs::with_limit(1_000_000))?;
        let mut out = Vec::with_capacity(top.len());
        for (_, addr) in top {
            let doc: TantivyDocument = self.searcher.doc(addr)?;
            out.push(self.decode(&doc)?);
        }
        Ok(out)
    }

    fn key_query(&self, table: Table, key: &str) -> BooleanQuery {
        let type_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.schema.doc_type, table.as_str()),
            IndexRecordOption::Basic,
        ));
        let key_query: Box<dyn Query> =
            Box::new(TermQuery::new(Term::from_field_text(self.schema.key, key), IndexRecordOption::Basic));
        BooleanQuery::new(vec![(Occur::Must, type_query), (Occur::Must, key_query)])
    }

    fn collect<V: DeserializeOwned>(&self, query: &dyn Query, limit: usize) -> StoreResult<Vec<V>> {
        let top = self.searcher.search(query, &TopDocs::with_limit(limit))?;
        let mut out = Vec::with_capacity(top.len());
        for (_, addr) in top {
            let doc: TantivyDocument = self.searcher.doc(addr)?;
            out.push(self.decode_value(&doc)?);
        }
        Ok(out)
    }

    fn decode<V: DeserializeOwned>(&self, doc: &TantivyDocument) -> StoreResult<(String, V)> {
        use tantivy::schema::document::Value as _;
        let key = doc
            .get_first(self.schema.key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let payload = doc
            .get_first(self.schema.payload)
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| StoreError::DocumentNotFound(crate::types::IdCode::of(&key)))?;
        let value = serde_json::from_slice(payload)?;
        Ok((key, value))
    }
}

// `decode` returns `(String, V)` but most single-key callers only want `V`.
impl ReadTransaction<'_> {
    fn decode_value<V: DeserializeOwned>(&self, doc: &TantivyDocument) -> StoreResult<V> {
        self.decode(doc).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_then_commit_is_visible_to_a_fresh_read_transaction() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path(), 15_000_000).unwrap();

        let mut tx = store.import_transaction();
        tx.put(Table::ProviderName, "p0", &"record0.o".to_string()).unwrap();
        tx.commit().unwrap();

        let read = store.read_transaction();
        let value: Option<String> = read.get(Table::ProviderName, "p0").unwrap();
        assert_eq!(value.as_deref(), Some("record0.o"));
    }

    #[test]
    fn append_accumulates_multiple_rows_under_one_key() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path(), 15_000_000).unwrap();

        store
            .run_import(0, |tx| {
                tx.append(Table::ProviderByUsr, "c:@F@foo", &1u64)?;
                tx.append(Table::ProviderByUsr, "c:@F@foo", &2u64)?;
                Ok(())
            })
            .unwrap();

        let read = store.read_transaction();
        let mut values: Vec<u64> = read.get_all(Table::ProviderByUsr, "c:@F@foo").unwrap();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn put_overwrites_prior_value_at_the_same_key() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path(), 15_000_000).unwrap();

        store.run_import(0, |tx| tx.put(Table::UnitInfo, "U0", &1u64)).unwrap();
        store.run_import(0, |tx| tx.put(Table::UnitInfo, "U0", &2u64)).unwrap();

        let read = store.read_transaction();
        let values: Vec<u64> = read.get_all(Table::UnitInfo, "U0").unwrap();
        assert_eq!(values, vec![2]);
    }

    #[test]
    fn dropping_an_uncommitted_transaction_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path(), 15_000_000).unwrap();

        {
            let mut tx = store.import_transaction();
            tx.put(Table::UnitInfo, "U0", &1u64).unwrap();
            // tx dropped here without commit()
        }

        let read = store.read_transaction();
        assert!(!read.contains(Table::UnitInfo, "U0").unwrap());
    }
}
