//! Store maintenance operations behind the CLI commands.

use anyhow::{Context, Result};
use harvest_core::{DeletedRecords, SetSpec, validate_metadata_prefix};
use harvest_metadata::MetadataStore;
use harvest_metadata::models::{FormatRow, RecordChange, RecordRow, SetRow};
use time::OffsetDateTime;

/// What `prune` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PruneTarget {
    /// Expired resumption tokens
    Tokens,
    /// Sets without members in themselves or any descendant
    Sets,
    /// Tombstones of deleted records
    Records,
}

pub async fn add_format(
    store: &dyn MetadataStore,
    prefix: &str,
    namespace: &str,
    schema_url: &str,
) -> Result<()> {
    validate_metadata_prefix(prefix)?;
    store
        .upsert_format(&FormatRow {
            prefix: prefix.to_string(),
            namespace: namespace.to_string(),
            schema_url: schema_url.to_string(),
        })
        .await
        .with_context(|| format!("failed to store format '{prefix}'"))?;
    tracing::info!(prefix = %prefix, "Stored metadata format");
    Ok(())
}

/// Delete a format and, through the cascade, all of its records.
pub async fn delete_format(store: &dyn MetadataStore, prefix: &str) -> Result<()> {
    if !store.delete_format(prefix).await? {
        anyhow::bail!("metadata format '{prefix}' does not exist");
    }
    tracing::info!(prefix = %prefix, "Deleted metadata format and its records");
    Ok(())
}

pub async fn add_set(
    store: &dyn MetadataStore,
    spec: &str,
    name: &str,
    description: Option<String>,
) -> Result<()> {
    let spec = SetSpec::parse(spec)?;
    store
        .upsert_set(&SetRow {
            spec: spec.to_string(),
            name: name.to_string(),
            description,
        })
        .await
        .with_context(|| format!("failed to store set '{spec}'"))?;
    Ok(())
}

/// Every set, in spec order.
pub async fn all_sets(store: &dyn MetadataStore) -> Result<Vec<SetRow>> {
    let total = store.count_sets().await?;
    Ok(store.list_sets_page(0, total).await?)
}

/// Add or replace a record. Unknown sets are created.
pub async fn add_record(
    store: &dyn MetadataStore,
    record: RecordRow,
    set_specs: &[String],
    policy: DeletedRecords,
) -> Result<RecordChange> {
    for spec in set_specs {
        SetSpec::parse(spec)?;
    }
    let change = store
        .add_or_update_record(&record, set_specs, policy)
        .await
        .with_context(|| format!("failed to store record '{}'", record.identifier))?;
    tracing::info!(
        identifier = %record.identifier,
        prefix = %record.metadata_prefix,
        change = ?change,
        "Stored record"
    );
    Ok(change)
}

/// Delete a record under `policy`.
pub async fn delete_record(
    store: &dyn MetadataStore,
    identifier: &str,
    metadata_prefix: &str,
    policy: DeletedRecords,
) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    if !store
        .delete_record(identifier, metadata_prefix, policy, now)
        .await?
    {
        anyhow::bail!("no live record '{identifier}' in format '{metadata_prefix}'");
    }
    Ok(())
}

/// Run one prune pass. Returns the number of rows removed.
pub async fn prune(
    store: &dyn MetadataStore,
    target: PruneTarget,
    policy: DeletedRecords,
) -> Result<u64> {
    let removed = match target {
        PruneTarget::Tokens => {
            store
                .delete_expired_tokens(OffsetDateTime::now_utc())
                .await?
        }
        PruneTarget::Sets => store.prune_orphaned_sets().await?,
        PruneTarget::Records => {
            if policy == DeletedRecords::Persistent {
                anyhow::bail!(
                    "deleted records are kept permanently (deleted_records = \"persistent\"); \
                     refusing to purge tombstones"
                );
            }
            store.purge_deleted_records().await?
        }
    };
    tracing::info!(prune = ?target, removed, "Prune finished");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_metadata::SqliteStore;
    use tempfile::TempDir;
    use time::macros::datetime;

    async fn store() -> (TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("metadata.db"), None)
            .await
            .unwrap();
        (temp, store)
    }

    fn dc_record(identifier: &str) -> RecordRow {
        RecordRow {
            identifier: identifier.to_string(),
            metadata_prefix: "oai_dc".to_string(),
            datestamp: datetime!(2024-01-01 00:00:00 UTC),
            content: Some("<dc/>".to_string()),
        }
    }

    #[tokio::test]
    async fn rejects_malformed_names() {
        let (_temp, store) = store().await;
        assert!(add_format(&store, "oai dc", "ns", "xsd").await.is_err());
        assert!(add_set(&store, "math:", "Math", None).await.is_err());

        add_format(&store, "oai_dc", "ns", "xsd").await.unwrap();
        let result = add_record(
            &store,
            dc_record("oai:test:1"),
            &["bad set".to_string()],
            DeletedRecords::Transient,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn deleting_missing_format_fails() {
        let (_temp, store) = store().await;
        assert!(delete_format(&store, "oai_dc").await.is_err());
    }

    #[tokio::test]
    async fn record_lifecycle() {
        let (_temp, store) = store().await;
        add_format(&store, "oai_dc", "ns", "xsd").await.unwrap();
        let change = add_record(
            &store,
            dc_record("oai:test:1"),
            &["math:algebra".to_string()],
            DeletedRecords::Transient,
        )
        .await
        .unwrap();
        assert_eq!(change, RecordChange::Stored);

        let specs: Vec<String> = all_sets(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|set| set.spec)
            .collect();
        assert_eq!(specs, vec!["math:algebra"]);

        delete_record(&store, "oai:test:1", "oai_dc", DeletedRecords::Transient)
            .await
            .unwrap();
        // Already deleted
        assert!(
            delete_record(&store, "oai:test:1", "oai_dc", DeletedRecords::Transient)
                .await
                .is_err()
        );
        assert_eq!(
            prune(&store, PruneTarget::Records, DeletedRecords::Transient)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            prune(&store, PruneTarget::Sets, DeletedRecords::Transient)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn persistent_policy_keeps_tombstones() {
        let (_temp, store) = store().await;
        let result = prune(&store, PruneTarget::Records, DeletedRecords::Persistent).await;
        assert!(result.is_err());
    }
}
