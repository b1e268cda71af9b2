//! Document store: JSON documents grouped into collections.
//!
//! Queries combine filters, a sort and offset pagination. Updates are shallow
//! JSON merge patches built from typed patch structs, never free-form maps.

mod memory;
mod retry;
mod sqlite;

pub use memory::InMemoryDocumentStore;
pub use retry::{RetryPolicy, RetryingDocumentStore};
pub use sqlite::{SqliteDocumentStore, SqliteStoreConfig};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{ApiError, ErrorKind};

/// A stored document: an ordered JSON object carrying its own `id`.
pub type Document = serde_json::Map<String, Value>;

/// Collections known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Orders,
    Restaurants,
    MenuItems,
    Addresses,
    Coupons,
    DeliveryPartners,
    Payments,
    Reviews,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Orders => "orders",
            Collection::Restaurants => "restaurants",
            Collection::MenuItems => "menu_items",
            Collection::Addresses => "addresses",
            Collection::Coupons => "coupons",
            Collection::DeliveryPartners => "delivery_partners",
            Collection::Payments => "payments",
            Collection::Reviews => "reviews",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Equal. `null` also matches a missing field.
    Eq(String, Value),
    /// Not equal. A missing field is never equal.
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Case-insensitive substring match on a string field.
    Search(String, String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lte(field.into(), value.into())
    }

    pub fn search(field: impl Into<String>, term: impl Into<String>) -> Self {
        Filter::Search(field.into(), term.into())
    }

    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _)
            | Filter::Ne(f, _)
            | Filter::Gt(f, _)
            | Filter::Gte(f, _)
            | Filter::Lt(f, _)
            | Filter::Lte(f, _)
            | Filter::Search(f, _) => f,
        }
    }

    /// Evaluates the predicate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        let actual = doc.get(self.field()).filter(|v| !v.is_null());
        match self {
            Filter::Eq(_, expected) if expected.is_null() => actual.is_none(),
            Filter::Eq(_, expected) => actual.is_some_and(|a| values_equal(a, expected)),
            Filter::Ne(_, expected) if expected.is_null() => actual.is_some(),
            Filter::Ne(_, expected) => !actual.is_some_and(|a| values_equal(a, expected)),
            Filter::Gt(_, bound) => ordering(actual, bound) == Some(Ordering::Greater),
            Filter::Gte(_, bound) => matches!(
                ordering(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt(_, bound) => ordering(actual, bound) == Some(Ordering::Less),
            Filter::Lte(_, bound) => {
                matches!(ordering(actual, bound), Some(Ordering::Less | Ordering::Equal))
            }
            Filter::Search(_, term) => actual
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase().contains(&term.to_lowercase())),
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    compare_values(actual?, bound)
}

/// Orders two scalars of the same JSON type (numbers, strings, bools).
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// Filters, sort and pagination for [`DocumentStore::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order: SortOrder::Asc,
        });
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order: SortOrder::Desc,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether `doc` satisfies every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// StoreError represents errors that can occur during document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection}/{id} already exists")]
    Conflict { collection: Collection, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl StoreError {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection,
            id: id.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

impl ApiError for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            _ => ErrorKind::UpstreamUnavailable,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict { .. } => "already_exists",
            _ => "store_unavailable",
        }
    }
}

/// Persistence contract for documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the page of documents matching `query` and the total match count.
    async fn list(&self, collection: Collection, query: &Query)
    -> Result<Page<Document>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Document, StoreError>;

    /// Inserts a new document under `id`. Fails with `Conflict` if it exists.
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        fields: Document,
    ) -> Result<Document, StoreError>;

    /// Applies a JSON merge patch and returns the updated document.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<Document, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;
}

/// Explicit field whitelist for an update. `None` fields are left untouched.
pub trait Patch: Serialize + Send + Sync {}

/// Serializes a value into a document. Fails unless it is a JSON object.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidData(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Typed access on top of any [`DocumentStore`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get_as<T>(&self, collection: Collection, id: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        from_document(self.get(collection, id).await?)
    }

    /// Like `get_as` but maps `NotFound` to `None`.
    async fn find_by_id<T>(&self, collection: Collection, id: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(collection, id).await {
            Ok(doc) => Ok(Some(from_document(doc)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// First document matching `query`.
    async fn find_one<T>(&self, collection: Collection, query: Query) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let page = self.list(collection, &query.limit(1)).await?;
        page.items.into_iter().next().map(from_document).transpose()
    }

    async fn list_as<T>(&self, collection: Collection, query: &Query) -> Result<Page<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        let page = self.list(collection, query).await?;
        let items = page
            .items
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Page {
            items,
            total: page.total,
        })
    }

    async fn create_from<T>(&self, collection: Collection, id: &str, value: &T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let doc = to_document(value)?;
        from_document(self.create(collection, id, doc).await?)
    }

    async fn update_with<T, P>(&self, collection: Collection, id: &str, patch: &P) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Send,
        P: Patch,
    {
        let patch = to_document(patch)?;
        from_document(self.update(collection, id, patch).await?)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Field names are restricted to identifiers so they can be used as JSON paths.
pub(crate) fn validate_field(field: &str) -> Result<(), StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!("invalid field name: {:?}", field)))
    }
}

/// RFC 7396 merge patch: objects merge recursively, `null` removes a field.
pub(crate) fn merge_patch(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(inner) => match target.get_mut(key) {
                Some(Value::Object(existing)) => merge_patch(existing, inner),
                _ => {
                    let mut fresh = Document::new();
                    merge_patch(&mut fresh, inner);
                    target.insert(key.clone(), Value::Object(fresh));
                }
            },
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
