//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FormatRepo, RecordFilter, RecordRepo, ResumptionTokenRepo, SetRepo};
use async_trait::async_trait;
use harvest_core::datestamp::normalize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    FormatRepo + RecordRepo + SetRepo + ResumptionTokenRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite parameter limit is ~999; stay well below it for IN lists.
pub(crate) const IN_LIST_BATCH_SIZE: usize = 900;

/// Convert an unsigned page bound to the signed integer SQL expects.
pub(crate) fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout_secs: u64,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(30);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Format deletion cascades to records and memberships through foreign keys.
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serializes writers and keeps token redemption atomic.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout_secs,
        };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = store.query_timeout_secs,
            "SQLite metadata store ready"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Bind the parameters of [`sqlite_record_filter`] in placeholder order.
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
            let prefix = format!("{spec}:");
            query = query
                .bind(spec.clone())
                .bind(prefix.len() as i64)
                .bind(prefix);
        }
        query
    }};
}

/// WHERE clause selecting records (aliased `r`) that match a filter.
fn sqlite_record_filter(filter: &RecordFilter) -> String {
    let mut sql = String::from("r.metadata_prefix = ?");
    if filter.from.is_some() {
        sql.push_str(" AND r.datestamp >= ?");
    }
    if filter.until.is_some() {
        sql.push_str(" AND r.datestamp <= ?");
    }
    if filter.set_spec.is_some() {
        sql.push_str(
            " AND EXISTS (SELECT 1 FROM record_sets rs \
               WHERE rs.identifier = r.identifier \
                 AND rs.metadata_prefix = r.metadata_prefix \
                 AND (rs.set_spec = ? OR substr(rs.set_spec, 1, ?) = ?))",
        );
    }
    sql
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::TokenLookup;
    use harvest_core::DeletedRecords;
    use std::collections::HashMap;
    use time::OffsetDateTime;

    #[async_trait]
    impl FormatRepo for SqliteStore {
        async fn upsert_format(&self, format: &FormatRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO formats (prefix, namespace, schema_url) VALUES (?, ?, ?)
                ON CONFLICT(prefix) DO UPDATE
                SET namespace = excluded.namespace, schema_url = excluded.schema_url
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
            let row = sqlx::query_as::<_, FormatRow>("SELECT * FROM formats WHERE prefix = ?")
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
                WHERE r.identifier = ?
                ORDER BY f.prefix
                "#,
            )
            .bind(identifier)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_format(&self, prefix: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM formats WHERE prefix = ?")
                .bind(prefix)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }

    #[async_trait]
    impl RecordRepo for SqliteStore {
        async fn add_or_update_record(
            &self,
            record: &RecordRow,
            set_specs: &[String],
            policy: DeletedRecords,
        ) -> MetadataResult<RecordChange> {
            let mut tx = self.pool.begin().await?;

            let format_exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM formats WHERE prefix = ?)")
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
                sqlx::query("DELETE FROM records WHERE identifier = ? AND metadata_prefix = ?")
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
                VALUES (?, ?, ?, ?)
                ON CONFLICT(identifier, metadata_prefix) DO UPDATE
                SET datestamp = excluded.datestamp, content = excluded.content
                "#,
            )
            .bind(&record.identifier)
            .bind(&record.metadata_prefix)
            .bind(normalize(record.datestamp))
            .bind(&record.content)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM record_sets WHERE identifier = ? AND metadata_prefix = ?")
                .bind(&record.identifier)
                .bind(&record.metadata_prefix)
                .execute(&mut *tx)
                .await?;

            for spec in set_specs {
                sqlx::query("INSERT OR IGNORE INTO sets (spec, name) VALUES (?, ?)")
                    .bind(spec)
                    .bind(spec)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "INSERT OR IGNORE INTO record_sets (identifier, metadata_prefix, set_spec) VALUES (?, ?, ?)",
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
                    UPDATE records SET content = NULL, datestamp = ?
                    WHERE identifier = ? AND metadata_prefix = ? AND content IS NOT NULL
                    "#,
                )
                .bind(normalize(now))
                .bind(identifier)
                .bind(metadata_prefix)
                .execute(&self.pool)
                .await?
            } else {
                sqlx::query("DELETE FROM records WHERE identifier = ? AND metadata_prefix = ?")
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
                "SELECT * FROM records WHERE identifier = ? AND metadata_prefix = ?",
            )
            .bind(identifier)
            .bind(metadata_prefix)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn identifier_exists(&self, identifier: &str) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM records WHERE identifier = ?)")
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
                WHERE identifier = ? AND metadata_prefix = ?
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
            let mut result: HashMap<String, Vec<String>> = HashMap::new();

            for batch in identifiers.chunks(IN_LIST_BATCH_SIZE) {
                let placeholders: Vec<&str> = batch.iter().map(|_| "?").collect();
                let query = format!(
                    "SELECT identifier, set_spec FROM record_sets \
                     WHERE metadata_prefix = ? AND identifier IN ({}) \
                     ORDER BY identifier, set_spec",
                    placeholders.join(", ")
                );

                let mut query_builder =
                    sqlx::query_as::<_, (String, String)>(&query).bind(metadata_prefix);
                for identifier in batch {
                    query_builder = query_builder.bind(identifier);
                }

                for (identifier, spec) in query_builder.fetch_all(&self.pool).await? {
                    result.entry(identifier).or_default().push(spec);
                }
            }

            Ok(result)
        }

        async fn query_records_page(
            &self,
            filter: &RecordFilter,
            offset: u64,
            limit: u64,
        ) -> MetadataResult<Vec<RecordRow>> {
            let query = format!(
                "SELECT r.identifier, r.metadata_prefix, r.datestamp, r.content \
                 FROM records r WHERE {} \
                 ORDER BY r.identifier LIMIT ? OFFSET ?",
                sqlite_record_filter(filter)
            );
            let rows = bind_record_filter!(sqlx::query_as::<_, RecordRow>(&query), filter)
                .bind(sql_int(limit))
                .bind(sql_int(offset))
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_records(&self, filter: &RecordFilter) -> MetadataResult<u64> {
            let query = format!(
                "SELECT COUNT(*) FROM records r WHERE {}",
                sqlite_record_filter(filter)
            );
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
    impl SetRepo for SqliteStore {
        async fn upsert_set(&self, set: &SetRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sets (spec, name, description) VALUES (?, ?, ?)
                ON CONFLICT(spec) DO UPDATE
                SET name = excluded.name, description = excluded.description
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
            let row = sqlx::query_as::<_, SetRow>("SELECT * FROM sets WHERE spec = ?")
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
            let rows = sqlx::query_as::<_, SetRow>(
                "SELECT * FROM sets ORDER BY spec LIMIT ? OFFSET ?",
            )
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
                       OR substr(rs.set_spec, 1, length(sets.spec) + 1) = sets.spec || ':'
                )
                "#,
            )
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl ResumptionTokenRepo for SqliteStore {
        async fn insert_token(&self, token: &ResumptionTokenRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO resumption_tokens (token, verb, parameters, valid_until) VALUES (?, ?, ?, ?)",
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
                "SELECT * FROM resumption_tokens WHERE token = ?",
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

            let row = sqlx::query_as::<_, ResumptionTokenRow>(
                "SELECT * FROM resumption_tokens WHERE token = ?",
            )
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;

            let lookup = match row {
                None => TokenLookup::Missing,
                Some(row) if row.is_expired_at(now) => {
                    sqlx::query("DELETE FROM resumption_tokens WHERE token = ?")
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
            let result = sqlx::query("DELETE FROM resumption_tokens WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn delete_expired_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM resumption_tokens WHERE valid_until < ?")
                .bind(normalize(now))
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Metadata formats
CREATE TABLE IF NOT EXISTS formats (
    prefix TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    schema_url TEXT NOT NULL
);

-- Records: one row per (identifier, format); NULL content marks a deletion
CREATE TABLE IF NOT EXISTS records (
    identifier TEXT NOT NULL,
    metadata_prefix TEXT NOT NULL REFERENCES formats(prefix) ON DELETE CASCADE ON UPDATE CASCADE,
    datestamp TEXT NOT NULL,
    content TEXT,
    PRIMARY KEY (identifier, metadata_prefix)
);
CREATE INDEX IF NOT EXISTS idx_records_prefix_datestamp ON records(metadata_prefix, datestamp);
CREATE INDEX IF NOT EXISTS idx_records_datestamp ON records(datestamp);

-- Set hierarchy
CREATE TABLE IF NOT EXISTS sets (
    spec TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT
);

-- Record/set membership
CREATE TABLE IF NOT EXISTS record_sets (
    identifier TEXT NOT NULL,
    metadata_prefix TEXT NOT NULL,
    set_spec TEXT NOT NULL REFERENCES sets(spec) ON DELETE CASCADE ON UPDATE CASCADE,
    PRIMARY KEY (identifier, metadata_prefix, set_spec),
    FOREIGN KEY (identifier, metadata_prefix)
        REFERENCES records(identifier, metadata_prefix) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_record_sets_spec ON record_sets(set_spec);

-- Resumption tokens
CREATE TABLE IF NOT EXISTS resumption_tokens (
    token TEXT PRIMARY KEY,
    verb TEXT NOT NULL,
    parameters TEXT NOT NULL,
    valid_until TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_resumption_tokens_valid_until ON resumption_tokens(valid_until);
"#;
