//! In-memory document store.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    Collection, Document, DocumentStore, Page, Query, SortOrder, StoreError, compare_values,
    merge_patch,
};

type Collections = HashMap<Collection, BTreeMap<String, Document>>;

/// [`DocumentStore`] kept in process memory. Used for tests and single-node demos.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<Collections>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: Collection) -> usize {
        self.read().get(&collection).map_or(0, BTreeMap::len)
    }
}

/// Missing fields sort before present ones, then by value, then by id.
fn compare_docs(a: &Document, b: &Document, field: &str) -> Ordering {
    let left = a.get(field).filter(|v| !v.is_null());
    let right = b.get(field).filter(|v| !v.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
    }
}

fn doc_id(doc: &Document) -> &str {
    doc.get("id").and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Page<Document>, StoreError> {
        let mut matched: Vec<Document> = self
            .read()
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| query.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &query.sort {
            matched.sort_by(|a, b| {
                let ord = compare_docs(a, b, &sort.field);
                let ord = match sort.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                };
                ord.then_with(|| doc_id(a).cmp(doc_id(b)))
            });
        }

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(Page { items, total })
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        self.read()
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        mut fields: Document,
    ) -> Result<Document, StoreError> {
        let mut collections = self.write();
        let docs = collections.entry(collection).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::Conflict {
                collection,
                id: id.to_string(),
            });
        }

        fields.insert("id".to_string(), Value::String(id.to_string()));
        docs.insert(id.to_string(), fields.clone());
        Ok(fields)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<Document, StoreError> {
        let mut collections = self.write();
        let doc = collections
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        merge_patch(doc, &patch);
        doc.insert("id".to_string(), Value::String(id.to_string()));
        Ok(doc.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.write()
            .get_mut(&collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(collection, id))
    }
}
