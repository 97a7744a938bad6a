//! Maintenance CLI for the harvest repository.
//!
//! Operates directly on the metadata store named by the server configuration.

mod catalog;

use anyhow::{Context, Result};
use catalog::PruneTarget;
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use harvest_core::config::AppConfig;
use harvest_core::{Datestamp, metadata_fragment};
use harvest_metadata::MetadataStore;
use harvest_metadata::models::RecordRow;
use std::io::Read;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

#[derive(Parser)]
#[command(name = "harvestctl")]
#[command(about = "Maintenance CLI for the harvest OAI-PMH repository")]
#[command(version)]
struct Cli {
    /// Path to the server configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "HARVEST_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Metadata format management
    Format {
        #[command(subcommand)]
        command: FormatCommands,
    },
    /// Set management
    Set {
        #[command(subcommand)]
        command: SetCommands,
    },
    /// Record management
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Remove expired or unreferenced rows
    Prune {
        #[arg(value_enum)]
        target: PruneTarget,
    },
}

#[derive(Subcommand)]
enum FormatCommands {
    /// Add or update a metadata format
    Add {
        /// Metadata prefix (e.g. oai_dc)
        prefix: String,
        /// XML namespace of the format
        #[arg(long)]
        namespace: String,
        /// XML schema location of the format
        #[arg(long)]
        schema: String,
    },
    /// Delete a format together with all of its records
    Delete { prefix: String },
    /// List all formats
    List,
}

#[derive(Subcommand)]
enum SetCommands {
    /// Add or update a set
    Add {
        /// Set spec (e.g. math:algebra)
        spec: String,
        /// Human-readable set name
        name: String,
        /// File holding the XML set description
        #[arg(long)]
        description: Option<PathBuf>,
    },
    /// List all sets
    List,
}

#[derive(Subcommand)]
enum RecordCommands {
    /// Add or update a record
    Add {
        identifier: String,
        prefix: String,
        /// File holding the metadata XML ("-" for stdin)
        content: String,
        /// Set the record belongs to (repeatable)
        #[arg(long = "set")]
        sets: Vec<String>,
        /// Record datestamp (defaults to now)
        #[arg(long)]
        datestamp: Option<String>,
    },
    /// Delete a record according to the deleted-record policy
    Delete { identifier: String, prefix: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let Cli { config, command } = Cli::parse();
    let config = load_config(Path::new(&config))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let store = harvest_metadata::from_config(&config.metadata)
        .await
        .context("failed to open metadata store")?;

    run(command, store.as_ref(), &config).await
}

/// Load the server configuration: optional TOML file, then `HARVEST_` variables.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed("HARVEST_").split("__"))
        .extract()
        .context("failed to load configuration")
}

async fn run(command: Commands, store: &dyn MetadataStore, config: &AppConfig) -> Result<()> {
    let policy = config.repository.deleted_records;

    match command {
        Commands::Format { command } => match command {
            FormatCommands::Add {
                prefix,
                namespace,
                schema,
            } => {
                catalog::add_format(store, &prefix, &namespace, &schema).await?;
                println!("Format stored: {prefix}");
            }
            FormatCommands::Delete { prefix } => {
                catalog::delete_format(store, &prefix).await?;
                println!("Format deleted: {prefix}");
            }
            FormatCommands::List => {
                let formats = store.list_formats().await?;
                if formats.is_empty() {
                    println!("No formats found.");
                } else {
                    println!("{:<16} {:<50} Schema", "Prefix", "Namespace");
                    println!("{}", "-".repeat(120));
                    for format in formats {
                        println!(
                            "{:<16} {:<50} {}",
                            format.prefix, format.namespace, format.schema_url
                        );
                    }
                }
            }
        },
        Commands::Set { command } => match command {
            SetCommands::Add {
                spec,
                name,
                description,
            } => {
                let description = match description {
                    Some(path) => Some(
                        tokio::fs::read_to_string(&path)
                            .await
                            .with_context(|| format!("failed to read {}", path.display()))?,
                    ),
                    None => None,
                };
                catalog::add_set(store, &spec, &name, description).await?;
                println!("Set stored: {spec}");
            }
            SetCommands::List => {
                let sets = catalog::all_sets(store).await?;
                if sets.is_empty() {
                    println!("No sets found.");
                } else {
                    println!("{:<40} Name", "Spec");
                    println!("{}", "-".repeat(80));
                    for set in sets {
                        println!("{:<40} {}", set.spec, set.name);
                    }
                }
            }
        },
        Commands::Record { command } => match command {
            RecordCommands::Add {
                identifier,
                prefix,
                content,
                sets,
                datestamp,
            } => {
                let datestamp = match datestamp {
                    Some(value) => Datestamp::parse(&value)?.lower_bound(),
                    None => OffsetDateTime::now_utc(),
                };
                let record = RecordRow {
                    identifier: identifier.clone(),
                    metadata_prefix: prefix,
                    datestamp,
                    content: Some(read_content(&content).await?),
                };
                let change = catalog::add_record(store, record, &sets, policy).await?;
                println!("Record {identifier}: {change:?}");
            }
            RecordCommands::Delete { identifier, prefix } => {
                catalog::delete_record(store, &identifier, &prefix, policy).await?;
                if policy.keeps_tombstones() {
                    println!("Record deleted (tombstone kept): {identifier}");
                } else {
                    println!("Record deleted: {identifier}");
                }
            }
        },
        Commands::Prune { target } => {
            let removed = catalog::prune(store, target, policy).await?;
            println!("Removed {removed} row(s).");
        }
    }
    Ok(())
}

/// Read record content from a file, or stdin for "-".
async fn read_content(source: &str) -> Result<String> {
    let content = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read content from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read content file: {source}"))?
    };
    if content.trim().is_empty() {
        anyhow::bail!("record content is empty");
    }
    match metadata_fragment(&content) {
        Some(fragment) => Ok(fragment.to_string()),
        None => anyhow::bail!("record content is not an XML element: {source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn load_config_reads_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[repository]
deleted_records = "persistent"

[metadata]
type = "sqlite"
path = "/tmp/harvest-test.db"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.repository.deleted_records,
            harvest_core::DeletedRecords::Persistent
        );
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("empty.xml");
        std::fs::write(&path, "  \n").unwrap();
        assert!(read_content(path.to_str().unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn content_is_stored_without_declaration() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("record.xml");
        std::fs::write(
            &path,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<dc>\n  <title>T</title>\n</dc>\n",
        )
        .unwrap();
        assert_eq!(
            read_content(path.to_str().unwrap()).await.unwrap(),
            "<dc>\n  <title>T</title>\n</dc>"
        );
    }

    #[tokio::test]
    async fn non_element_content_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("note.txt");
        std::fs::write(&path, "just some text\n").unwrap();
        let err = read_content(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("not an XML element"));
    }
}
