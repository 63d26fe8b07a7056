//! PostgreSQL document store.
//!
//! Each collection is a table of JSONB documents keyed by an insertion-ordered
//! sequence:
//!
//! ```sql
//! CREATE TABLE "transactions" (id BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL);
//! ```
//!
//! The store is read-only and never creates or migrates tables; the ingestion
//! side owns the schema. Query conditions are translated to JSONB operators
//! (`#>`, `@>`, `#-`) and bound as parameters.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! chainquery-storage = { version = "0.2", features = ["postgres"] }
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use chainquery_core::error::QueryError;
use chainquery_core::query::{
    Condition, FieldPath, FindQuery, Projection, Sort, SortDirection, SortField,
};
use chainquery_core::store::{DocumentStore, StoreConnector};
use chainquery_core::types::{StorageId, StoredDocument};

// ─── Connection options ────────────────────────────────────────────────────────

/// Pool options for the Postgres backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Pool acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: u64,
    /// Statement cache size per connection (default: 100)
    pub statement_cache_capacity: usize,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            statement_cache_capacity: 100,
        }
    }
}

// ─── PostgresStore ────────────────────────────────────────────────────────────

/// JSONB document store over a `sqlx` connection pool.
///
/// Cheaply cloneable; the pool is shared.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `database_name` on the server at `url`.
    ///
    /// The URL follows libpq convention; its path component, if any, is
    /// replaced by `database_name`.
    pub async fn connect(url: &str, database_name: &str) -> Result<Self, QueryError> {
        Self::connect_with_options(url, database_name, PostgresOptions::default()).await
    }

    pub async fn connect_with_options(
        url: &str,
        database_name: &str,
        opts: PostgresOptions,
    ) -> Result<Self, QueryError> {
        let connect_options = PgConnectOptions::from_str(url)
            .map_err(|e| QueryError::Configuration(format!("database url: {e}")))?
            .database(database_name)
            .statement_cache_capacity(opts.statement_cache_capacity);

        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(Duration::from_secs(opts.acquire_timeout_secs))
            .connect_with(connect_options)
            .await
            .map_err(|e| QueryError::Connection(format!("postgres connect: {e}")))?;

        info!(database = database_name, "PostgresStore connected");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage_err(e: sqlx::Error) -> QueryError {
    QueryError::Storage(e.to_string())
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn find(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<StoredDocument>, QueryError> {
        let mut select = build_select(collection, query, false)?;
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(|row| decode_row(row, query)).collect()
    }

    async fn find_with_count(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<(u64, Vec<StoredDocument>), QueryError> {
        let mut select = build_select(collection, query, true)?;
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        let total = match rows.first() {
            Some(row) => {
                let total: i64 = row.try_get("total").map_err(storage_err)?;
                u64::try_from(total).unwrap_or(0)
            }
            // past the last page: the window count is unavailable
            None if query.skip > 0 => self.count(collection, &query.filter).await?,
            None => 0,
        };
        let docs = rows
            .iter()
            .map(|row| decode_row(row, query))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(collection, total, returned = docs.len(), "find_with_count");
        Ok((total, docs))
    }

    async fn count(&self, collection: &str, filter: &[Condition]) -> Result<u64, QueryError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM ");
        qb.push(quote_collection(collection)?);
        push_where(&mut qb, filter)?;
        let total: i64 = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?
            .try_get("total")
            .map_err(storage_err)?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn close(&self) -> Result<(), QueryError> {
        self.pool.close().await;
        Ok(())
    }
}

// ─── Connector ────────────────────────────────────────────────────────────────

/// Opens [`PostgresStore`]s with fixed pool options.
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector {
    options: PostgresOptions,
}

impl PostgresConnector {
    pub fn new(options: PostgresOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl StoreConnector for PostgresConnector {
    async fn connect(
        &self,
        url: &str,
        database_name: &str,
    ) -> Result<Arc<dyn DocumentStore>, QueryError> {
        let store =
            PostgresStore::connect_with_options(url, database_name, self.options.clone()).await?;
        Ok(Arc::new(store))
    }
}

// ─── SQL translation ──────────────────────────────────────────────────────────

/// Quote a collection name as an identifier. Only `[A-Za-z_][A-Za-z0-9_]*`
/// is accepted.
fn quote_collection(name: &str) -> Result<String, QueryError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(QueryError::InvalidQuery(format!(
            "invalid collection name '{name}'"
        )));
    }
    Ok(format!("\"{name}\""))
}

fn path_array(path: &FieldPath) -> Vec<String> {
    path.segments().map(str::to_string).collect()
}

fn to_i64(id: StorageId) -> Result<i64, QueryError> {
    i64::try_from(id.as_u64())
        .map_err(|_| QueryError::InvalidQuery(format!("storage id {id} out of range")))
}

fn build_select(
    collection: &str,
    query: &FindQuery,
    with_count: bool,
) -> Result<QueryBuilder<'static, Postgres>, QueryError> {
    let table = quote_collection(collection)?;

    let mut qb = QueryBuilder::<Postgres>::new("SELECT id, doc");
    for path in &query.projection.exclude {
        qb.push(" #- ");
        qb.push_bind(path_array(path));
    }
    qb.push(" AS doc");
    if with_count {
        qb.push(", COUNT(*) OVER () AS total");
    }
    qb.push(" FROM ");
    qb.push(table);

    push_where(&mut qb, &query.filter)?;
    push_order(&mut qb, &query.effective_sort());

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if query.skip > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
    }
    Ok(qb)
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, filter: &[Condition]) -> Result<(), QueryError> {
    if filter.is_empty() {
        return Ok(());
    }
    qb.push(" WHERE ");
    push_conjunction(qb, filter)
}

fn push_conjunction(
    qb: &mut QueryBuilder<'static, Postgres>,
    conditions: &[Condition],
) -> Result<(), QueryError> {
    if conditions.is_empty() {
        qb.push("TRUE");
        return Ok(());
    }
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        push_condition(qb, condition)?;
    }
    Ok(())
}

fn push_field(qb: &mut QueryBuilder<'static, Postgres>, path: &FieldPath) {
    qb.push("(doc #> ");
    qb.push_bind(path_array(path));
    qb.push(")");
}

/// Typed comparison; values of different JSON types never compare.
fn push_comparison(
    qb: &mut QueryBuilder<'static, Postgres>,
    path: &FieldPath,
    op: &str,
    bound: &Value,
) {
    qb.push("(jsonb_typeof");
    push_field(qb, path);
    qb.push(" = jsonb_typeof(");
    qb.push_bind(bound.clone());
    qb.push(") AND ");
    push_field(qb, path);
    qb.push(op);
    qb.push_bind(bound.clone());
    qb.push(")");
}

fn push_condition(
    qb: &mut QueryBuilder<'static, Postgres>,
    condition: &Condition,
) -> Result<(), QueryError> {
    match condition {
        Condition::Eq(path, value) => {
            push_field(qb, path);
            qb.push(" = ");
            qb.push_bind(value.clone());
        }
        Condition::In(path, values) => {
            qb.push("(");
            qb.push_bind(Value::Array(values.clone()));
            qb.push(" @> jsonb_build_array");
            push_field(qb, path);
            qb.push(")");
        }
        Condition::Gt(path, bound) => push_comparison(qb, path, " > ", bound),
        Condition::Gte(path, bound) => push_comparison(qb, path, " >= ", bound),
        Condition::Lt(path, bound) => push_comparison(qb, path, " < ", bound),
        Condition::Contains(path, needle) => {
            qb.push("(jsonb_typeof");
            push_field(qb, path);
            qb.push(" = 'array' AND ");
            push_field(qb, path);
            qb.push(" @> ");
            qb.push_bind(Value::Array(vec![needle.clone()]));
            qb.push(")");
        }
        Condition::Exists(path, present) => {
            push_field(qb, path);
            qb.push(if *present { " IS NOT NULL" } else { " IS NULL" });
        }
        Condition::IdGt(id) => {
            qb.push("id > ");
            qb.push_bind(to_i64(*id)?);
        }
        Condition::IdLt(id) => {
            qb.push("id < ");
            qb.push_bind(to_i64(*id)?);
        }
        Condition::IdIn(ids) => {
            let ids = ids.iter().map(|id| to_i64(*id)).collect::<Result<Vec<_>, _>>()?;
            qb.push("id = ANY(");
            qb.push_bind(ids);
            qb.push(")");
        }
        Condition::And(conditions) => {
            qb.push("(");
            push_conjunction(qb, conditions)?;
            qb.push(")");
        }
    }
    Ok(())
}

fn push_order(qb: &mut QueryBuilder<'static, Postgres>, sort: &Sort) {
    let direction = match sort.direction {
        SortDirection::Ascending => " ASC NULLS FIRST",
        SortDirection::Descending => " DESC NULLS LAST",
    };
    qb.push(" ORDER BY ");
    match &sort.field {
        SortField::Id => {
            qb.push("id");
            qb.push(direction);
        }
        SortField::Path(path) => {
            push_field(qb, path);
            qb.push(direction);
            qb.push(", id ASC");
        }
    }
}

fn decode_row(row: &PgRow, query: &FindQuery) -> Result<StoredDocument, QueryError> {
    let id: i64 = row.try_get("id").map_err(storage_err)?;
    let mut body: Value = row.try_get("doc").map_err(storage_err)?;
    let id = u64::try_from(id)
        .map_err(|_| QueryError::Storage(format!("negative storage id {id}")))?;

    // exclusions already ran server-side
    if !query.projection.include.is_empty() {
        let include_only = Projection {
            include: query.projection.include.clone(),
            exclude: Vec::new(),
        };
        include_only.apply(&mut body);
    }
    Ok(StoredDocument::new(id, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_names_are_validated_and_quoted() {
        assert_eq!(quote_collection("unconfirmedTransactions").unwrap(), "\"unconfirmedTransactions\"");
        assert!(quote_collection("blocks; DROP TABLE x").is_err());
        assert!(quote_collection("").is_err());
        assert!(quote_collection("1blocks").is_err());
    }

    #[test]
    fn select_sql_shape() {
        let query = FindQuery::new(vec![
            Condition::eq("block.height", 5u64),
            Condition::missing("meta.aggregateId"),
        ])
        .sort(Sort::new(SortField::path("block.height"), SortDirection::Descending))
        .skip(20)
        .limit(10)
        .exclude([FieldPath::new("meta.addresses")]);

        let qb = build_select("blocks", &query, true).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, doc #- $1 AS doc, COUNT(*) OVER () AS total FROM \"blocks\" \
             WHERE (doc #> $2) = $3 AND (doc #> $4) IS NULL \
             ORDER BY (doc #> $5) DESC NULLS LAST, id ASC LIMIT $6 OFFSET $7"
        );
    }

    #[test]
    fn default_order_is_storage_id() {
        let qb = build_select("accounts", &FindQuery::default(), false).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT id, doc AS doc FROM \"accounts\" ORDER BY id ASC NULLS FIRST"
        );
    }

    #[test]
    fn oversized_ids_are_rejected() {
        let query = FindQuery::new(vec![Condition::IdGt(StorageId(u64::MAX))]);
        assert!(matches!(
            build_select("blocks", &query, false),
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn nested_and_and_contains() {
        let query = FindQuery::new(vec![Condition::And(vec![
            Condition::contains("meta.addresses", "98AA"),
            Condition::IdIn(vec![StorageId(1), StorageId(2)]),
        ])]);
        let qb = build_select("transactions", &query, false).unwrap();
        assert!(qb.sql().contains(
            "WHERE ((jsonb_typeof(doc #> $1) = 'array' AND (doc #> $2) @> $3) AND id = ANY($4))"
        ));
    }

    // Integration tests require a running PostgreSQL instance.
    // Example: DATABASE_URL=postgresql://localhost:5432 cargo test --features postgres -- --ignored

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn test_postgres_find_and_count() {
        let url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests");
        let database = std::env::var("DATABASE_NAME").unwrap_or_else(|_| "postgres".into());
        let store = PostgresStore::connect(&url, &database).await.unwrap();

        sqlx::query("DROP TABLE IF EXISTS \"cq_test_blocks\"")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("CREATE TABLE \"cq_test_blocks\" (id BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL)")
            .execute(store.pool())
            .await
            .unwrap();
        for h in 1u64..=5 {
            sqlx::query("INSERT INTO \"cq_test_blocks\" (doc) VALUES ($1)")
                .bind(json!({"block": {"height": h}, "meta": {"hash": format!("H{h}")}}))
                .execute(store.pool())
                .await
                .unwrap();
        }

        let query = FindQuery::new(vec![Condition::Gte("block.height".into(), json!(2))])
            .sort(Sort::new(SortField::path("block.height"), SortDirection::Descending))
            .limit(2)
            .exclude([FieldPath::new("meta.hash")]);
        let (total, rows) = store.find_with_count("cq_test_blocks", &query).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].body, json!({"block": {"height": 5}, "meta": {}}));

        let past_end = query.clone().skip(10);
        let (total, rows) = store.find_with_count("cq_test_blocks", &past_end).await.unwrap();
        assert_eq!(total, 4);
        assert!(rows.is_empty());

        sqlx::query("DROP TABLE \"cq_test_blocks\"")
            .execute(store.pool())
            .await
            .unwrap();
        store.close().await.unwrap();
    }
}
