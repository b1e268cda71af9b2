//! SQLite implementation of DocumentStore.
//!
//! Every collection shares one table holding the JSON body per `(collection, id)`.
//! Filters and sorts go through `json_extract`; updates go through `json_patch`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query as SqlQuery;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

use super::{
    Collection, Document, DocumentStore, Filter, Page, Query, SortOrder, StoreError,
    validate_field,
};
use crate::config::StorageConfig;

/// SqliteStoreConfig holds SQLite connection settings.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: "fulfillment.db".to_string(),
            max_connections: 5,
        }
    }
}

impl From<&StorageConfig> for SqliteStoreConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            path: config.path.clone(),
            max_connections: config.max_connections,
        }
    }
}

/// SqliteDocumentStore implements DocumentStore using SQLite's JSON1 functions.
pub struct SqliteDocumentStore {
    pool: Pool<Sqlite>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone)]
enum Arg {
    Text(String),
    Int(i64),
    Real(f64),
}

impl Arg {
    fn from_value(value: &Value) -> Result<Self, StoreError> {
        match value {
            Value::String(s) => Ok(Arg::Text(s.clone())),
            Value::Bool(b) => Ok(Arg::Int(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Arg::Int(i)),
                None => n
                    .as_f64()
                    .map(Arg::Real)
                    .ok_or_else(|| StoreError::InvalidQuery(format!("unsupported number {}", n))),
            },
            other => Err(StoreError::InvalidQuery(format!(
                "cannot filter on non-scalar value {}",
                other
            ))),
        }
    }
}

fn bind_args<'q>(
    mut query: SqlQuery<'q, Sqlite, SqliteArguments<'q>>,
    args: &[Arg],
) -> SqlQuery<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Arg::Text(s) => query.bind(s.clone()),
            Arg::Int(i) => query.bind(*i),
            Arg::Real(f) => query.bind(*f),
        };
    }
    query
}

fn json_path(field: &str) -> Result<Arg, StoreError> {
    validate_field(field)?;
    Ok(Arg::Text(format!("$.{}", field)))
}

/// Builds the WHERE clause (after the collection predicate) and its arguments.
fn where_clause(filters: &[Filter]) -> Result<(String, Vec<Arg>), StoreError> {
    let mut sql = String::new();
    let mut args = Vec::new();

    for filter in filters {
        args.push(json_path(filter.field())?);
        let (op, value) = match filter {
            Filter::Eq(_, v) if v.is_null() => {
                sql.push_str(" AND json_extract(body, ?) IS NULL");
                continue;
            }
            Filter::Ne(_, v) if v.is_null() => {
                sql.push_str(" AND json_extract(body, ?) IS NOT NULL");
                continue;
            }
            Filter::Search(_, term) => {
                sql.push_str(" AND json_extract(body, ?) LIKE ?");
                args.push(Arg::Text(format!("%{}%", term)));
                continue;
            }
            Filter::Eq(_, v) => ("=", v),
            Filter::Ne(_, v) => ("IS NOT", v),
            Filter::Gt(_, v) => (">", v),
            Filter::Gte(_, v) => (">=", v),
            Filter::Lt(_, v) => ("<", v),
            Filter::Lte(_, v) => ("<=", v),
        };
        sql.push_str(&format!(" AND json_extract(body, ?) {} ?", op));
        args.push(Arg::from_value(value)?);
    }

    Ok((sql, args))
}

fn parse_body(body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidData("stored body is not an object".into())),
    }
}

impl SqliteDocumentStore {
    /// Creates a new SQLite document store and runs migrations.
    pub async fn new(config: SqliteStoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };

        store.migrate().await?;

        info!(path = %config.path, "SQLite document store initialized");
        Ok(store)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Page<Document>, StoreError> {
        let (clause, mut args) = where_clause(&query.filters)?;
        let mut where_args = vec![Arg::Text(collection.as_str().to_string())];
        where_args.append(&mut args);

        let count_sql = format!(
            "SELECT COUNT(*) AS count FROM documents WHERE collection = ?{}",
            clause
        );
        let row = bind_args(sqlx::query(&count_sql), &where_args)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("count")?;

        let mut list_args = where_args;
        let order = match &query.sort {
            Some(sort) => {
                list_args.push(json_path(&sort.field)?);
                let dir = match sort.order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                format!(" ORDER BY json_extract(body, ?) {}, id ASC", dir)
            }
            None => " ORDER BY id ASC".to_string(),
        };
        let limit = query
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        list_args.push(Arg::Int(limit));
        list_args.push(Arg::Int(offset));

        let list_sql = format!(
            "SELECT body FROM documents WHERE collection = ?{}{} LIMIT ? OFFSET ?",
            clause, order
        );
        let rows = bind_args(sqlx::query(&list_sql), &list_args)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(|row| {
                let body: String = row.try_get("body")?;
                parse_body(&body)
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        debug!(
            collection = %collection,
            total,
            returned = items.len(),
            "Listed documents"
        );

        Ok(Page {
            items,
            total: usize::try_from(total).unwrap_or_default(),
        })
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                parse_body(&body)
            }
            None => Err(StoreError::not_found(collection, id)),
        }
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        mut fields: Document,
    ) -> Result<Document, StoreError> {
        fields.insert("id".to_string(), Value::String(id.to_string()));
        let body = serde_json::to_string(&fields)?;

        let result = sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)")
            .bind(collection.as_str())
            .bind(id)
            .bind(&body)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!(collection = %collection, id = %id, "Document created");
                Ok(fields)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict {
                collection,
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<Document, StoreError> {
        let patch = serde_json::to_string(&patch)?;

        let row = sqlx::query(
            r#"
            UPDATE documents SET body = json_patch(body, ?1)
            WHERE collection = ?2 AND id = ?3
            RETURNING body
            "#,
        )
        .bind(&patch)
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                parse_body(&body)
            }
            None => Err(StoreError::not_found(collection, id)),
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        Ok(())
    }
}
