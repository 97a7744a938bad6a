//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{FormatRepo, RecordFilter, RecordRepo, ResumptionTokenRepo, SetRepo, TokenLookup};
use crate::store::{MetadataStore, sql_int};
use async_trait::async_trait;
use harvest_core::DeletedRecords;
use harvest_core::config::PgSslMode;
use harvest_core::datestamp::normalize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// Lets the password come from the environment instead of a URL in the
    /// configuration file.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// WHERE clause selecting records (aliased `r`) that match a filter.
///
/// Returns the clause and the next free placeholder index.
fn postgres_record_filter(filter: &RecordFilter) -> (String, usize) {
    let mut sql = String::from("r.metadata_prefix = $1");
    let mut next = 2;
    if filter.from.is_some() {
        sql.push_str(&format!(" AND r.datestamp >= ${next}"));
        next += 1;
    }
    if filter.until.is_some() {
        sql.push_str(&format!(" AND r.datestamp <= ${next}"));
        next += 1;
    }
    if filter.set_spec.is_some() {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM record_sets rs \
               WHERE rs.identifier = r.identifier \
                 AND rs.metadata_prefix = r.metadata_prefix \
                 AND (rs.set_spec = ${} OR starts_with(rs.set_spec, ${})))",
            next,
            next + 1
        ));
        next += 2;
    }
    (sql, next)
}

/// Bind the parameters of [`postgres_record_filter`] in placeholder order.
macro_rules! bind_record_filter {
    ($query:expr, $filter:expr) => {{
        let filter: &RecordFilter = $filter;
        let mut query = $query.bind(filter.metadata_prefix.clone());
        if let Some(from) = filter.from {
            query = query.bind(normalize(from));
        }
        if let Some(until) = filter.until {
            query = query.bind(normalize(until));
        }
        if let Some(spec) = &filter.set_spec {
            query = query.bind(spec.clone()).bind(format!("{spec}:"));
        }
        query
    }};
}

#[async_trait]
impl FormatRepo for PostgresStore {
    async fn upsert_format(&self, format: &FormatRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO formats (prefix, namespace, schema_url) VALUES ($1, $2, $3)
            ON CONFLICT(prefix) DO UPDATE
            SET namespace = EXCLUDED.namespace, schema_url = EXCLUDED.schema_url
            "#,
        )
        .bind(&format.prefix)
        .bind(&format.namespace)
        .bind(&format.schema_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_format(&self, prefix: &str) -> MetadataResult<Option<FormatRow>> {
        let row = sqlx::query_as::<_, FormatRow>("SELECT * FROM formats WHERE prefix = $1")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_formats(&self) -> MetadataResult<Vec<FormatRow>> {
        let rows = sqlx::query_as::<_, FormatRow>("SELECT * FROM formats ORDER BY prefix")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_formats_for_identifier(
        &self,
        identifier: &str,
    ) -> MetadataResult<Vec<FormatRow>> {
        let rows = sqlx::query_as::<_, FormatRow>(
            r#"
            SELECT f.prefix, f.namespace, f.schema_url
            FROM formats f
            INNER JOIN records r ON r.metadata_prefix = f.prefix
            WHERE r.identifier = $1
            ORDER BY f.prefix
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_format(&self, prefix: &str) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM formats WHERE prefix = $1")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RecordRepo for PostgresStore {
    async fn add_or_update_record(
        &self,
        record: &RecordRow,
        set_specs: &[String],
        policy: DeletedRecords,
    ) -> MetadataResult<RecordChange> {
        let mut tx = self.pool.begin().await?;

        let format_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM formats WHERE prefix = $1)")
                .bind(&record.metadata_prefix)
                .fetch_one(&mut *tx)
                .await?;
        if !format_exists {
            return Err(MetadataError::NotFound(format!(
                "metadata format '{}'",
                record.metadata_prefix
            )));
        }

        if record.is_deleted() && !policy.keeps_tombstones() {
            sqlx::query("DELETE FROM records WHERE identifier = $1 AND metadata_prefix = $2")
                .bind(&record.identifier)
                .bind(&record.metadata_prefix)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(RecordChange::Removed);
        }

        sqlx::query(
            r#"
            INSERT INTO records (identifier, metadata_prefix, datestamp, content)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(identifier, metadata_prefix) DO UPDATE
            SET datestamp = EXCLUDED.datestamp, content = EXCLUDED.content
            "#,
        )
        .bind(&record.identifier)
        .bind(&record.metadata_prefix)
        .bind(normalize(record.datestamp))
        .bind(&record.content)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM record_sets WHERE identifier = $1 AND metadata_prefix = $2")
            .bind(&record.identifier)
            .bind(&record.metadata_prefix)
            .execute(&mut *tx)
            .await?;

        for spec in set_specs {
            sqlx::query("INSERT INTO sets (spec, name) VALUES ($1, $1) ON CONFLICT DO NOTHING")
                .bind(spec)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO record_sets (identifier, metadata_prefix, set_spec)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&record.identifier)
            .bind(&record.metadata_prefix)
            .bind(spec)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(if record.is_deleted() {
            RecordChange::Tombstoned
        } else {
            RecordChange::Stored
        })
    }

    async fn delete_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
        policy: DeletedRecords,
        now: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let result = if policy.keeps_tombstones() {
            sqlx::query(
                r#"
                UPDATE records SET content = NULL, datestamp = $1
                WHERE identifier = $2 AND metadata_prefix = $3 AND content IS NOT NULL
                "#,
            )
            .bind(normalize(now))
            .bind(identifier)
            .bind(metadata_prefix)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("DELETE FROM records WHERE identifier = $1 AND metadata_prefix = $2")
                .bind(identifier)
                .bind(metadata_prefix)
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected() > 0)
    }

    async fn get_record(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> MetadataResult<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM records WHERE identifier = $1 AND metadata_prefix = $2",
        )
        .bind(identifier)
        .bind(metadata_prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM records WHERE identifier = $1)")
                .bind(identifier)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn get_record_sets(
        &self,
        identifier: &str,
        metadata_prefix: &str,
    ) -> MetadataResult<Vec<String>> {
        let specs = sqlx::query_scalar::<_, String>(
            r#"
            SELECT set_spec FROM record_sets
            WHERE identifier = $1 AND metadata_prefix = $2
            ORDER BY set_spec
            "#,
        )
        .bind(identifier)
        .bind(metadata_prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(specs)
    }

    async fn get_sets_for_records(
        &self,
        metadata_prefix: &str,
        identifiers: &[String],
    ) -> MetadataResult<HashMap<String, Vec<String>>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT identifier, set_spec FROM record_sets
            WHERE metadata_prefix = $1 AND identifier = ANY($2)
            ORDER BY identifier, set_spec
            "#,
        )
        .bind(metadata_prefix)
        .bind(identifiers)
        .fetch_all(&self.pool)
        .await?;

        let mut result: HashMap<String, Vec<String>> = HashMap::new();
        for (identifier, spec) in rows {
            result.entry(identifier).or_default().push(spec);
        }
        Ok(result)
    }

    async fn query_records_page(
        &self,
        filter: &RecordFilter,
        offset: u64,
        limit: u64,
    ) -> MetadataResult<Vec<RecordRow>> {
        let (clause, next) = postgres_record_filter(filter);
        let query = format!(
            "SELECT r.identifier, r.metadata_prefix, r.datestamp, r.content \
             FROM records r WHERE {} \
             ORDER BY r.identifier LIMIT ${} OFFSET ${}",
            clause,
            next,
            next + 1
        );
        let rows = bind_record_filter!(sqlx::query_as::<_, RecordRow>(&query), filter)
            .bind(sql_int(limit))
            .bind(sql_int(offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_records(&self, filter: &RecordFilter) -> MetadataResult<u64> {
        let (clause, _) = postgres_record_filter(filter);
        let query = format!("SELECT COUNT(*) FROM records r WHERE {clause}");
        let count: i64 = bind_record_filter!(sqlx::query_scalar(&query), filter)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn earliest_datestamp(&self) -> MetadataResult<Option<OffsetDateTime>> {
        let earliest = sqlx::query_scalar::<_, OffsetDateTime>(
            "SELECT datestamp FROM records ORDER BY datestamp ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(earliest)
    }

    async fn purge_deleted_records(&self) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM records WHERE content IS NULL")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SetRepo for PostgresStore {
    async fn upsert_set(&self, set: &SetRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sets (spec, name, description) VALUES ($1, $2, $3)
            ON CONFLICT(spec) DO UPDATE
            SET name = EXCLUDED.name, description = EXCLUDED.description
            "#,
        )
        .bind(&set.spec)
        .bind(&set.name)
        .bind(&set.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_set(&self, spec: &str) -> MetadataResult<Option<SetRow>> {
        let row = sqlx::query_as::<_, SetRow>("SELECT * FROM sets WHERE spec = $1")
            .bind(spec)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn any_set_exists(&self) -> MetadataResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sets)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_sets_page(&self, offset: u64, limit: u64) -> MetadataResult<Vec<SetRow>> {
        let rows =
            sqlx::query_as::<_, SetRow>("SELECT * FROM sets ORDER BY spec LIMIT $1 OFFSET $2")
                .bind(sql_int(limit))
                .bind(sql_int(offset))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn count_sets(&self) -> MetadataResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn prune_orphaned_sets(&self) -> MetadataResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM sets
            WHERE NOT EXISTS (
                SELECT 1 FROM record_sets rs
                WHERE rs.set_spec = sets.spec
                   OR starts_with(rs.set_spec, sets.spec || ':')
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ResumptionTokenRepo for PostgresStore {
    async fn insert_token(&self, token: &ResumptionTokenRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO resumption_tokens (token, verb, parameters, valid_until)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.token)
        .bind(&token.verb)
        .bind(&token.parameters)
        .bind(normalize(token.valid_until))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, token: &str) -> MetadataResult<Option<ResumptionTokenRow>> {
        let row = sqlx::query_as::<_, ResumptionTokenRow>(
            "SELECT * FROM resumption_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_live_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<TokenLookup> {
        let mut tx = self.pool.begin().await?;

        // Row lock so a concurrent sweep cannot delete the token mid-lookup.
        let row = sqlx::query_as::<_, ResumptionTokenRow>(
            "SELECT * FROM resumption_tokens WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let lookup = match row {
            None => TokenLookup::Missing,
            Some(row) if row.is_expired_at(now) => {
                sqlx::query("DELETE FROM resumption_tokens WHERE token = $1")
                    .bind(token)
                    .execute(&mut *tx)
                    .await?;
                TokenLookup::Expired
            }
            Some(row) => TokenLookup::Live(row),
        };

        tx.commit().await?;
        Ok(lookup)
    }

    async fn delete_token(&self, token: &str) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM resumption_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64> {
        let result = sqlx::query("DELETE FROM resumption_tokens WHERE valid_until < $1")
            .bind(normalize(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert!(statements.len() >= 5);
        assert!(statements.iter().all(|s| !s.ends_with(';')));
        assert!(
            statements
                .iter()
                .any(|s| s.contains("CREATE TABLE IF NOT EXISTS resumption_tokens"))
        );
    }

    #[test]
    fn comment_only_chunks_are_skipped() {
        let statements = postgres_schema_statements("-- header\n;\nSELECT 1;\n  ;");
        assert_eq!(statements, vec!["SELECT 1"]);
    }

    #[test]
    fn record_filter_numbers_placeholders_in_bind_order() {
        let filter = RecordFilter {
            metadata_prefix: "oai_dc".to_string(),
            from: Some(time::macros::datetime!(2024-01-01 0:00 UTC)),
            until: None,
            set_spec: Some("math".to_string()),
        };
        let (clause, next) = postgres_record_filter(&filter);
        assert!(clause.contains("r.datestamp >= $2"));
        assert!(clause.contains("rs.set_spec = $3"));
        assert!(clause.contains("starts_with(rs.set_spec, $4)"));
        assert_eq!(next, 5);
    }
}
