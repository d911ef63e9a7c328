// SPDX-License-Identifier: PMPL-1.0-or-later
//! datagate: inspect and edit a local gateway store from the command line.
//!
//! Every app is routed to one driver (the embedded store unless `--driver`
//! says otherwise). Settings not given on the command line come from the
//! `DATAGATE_*` environment variables.

mod output;

use std::convert::Infallible;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use datagate_gateway::selector::EMBEDDED_DRIVER;
use datagate_gateway::{AppScope, CustomDriverConfig, DataStoreManager, GatewayConfig, PartitionKey};
use datagate_query::{Entity, QueryOptions, SortSpec};
use serde_json::{json, Value};

use output::{render, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "datagate", version, about = "Datagate store administration")]
struct Cli {
    /// redb file to operate on; in memory when omitted.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Driver serving every app.
    #[arg(long, global = true, default_value = EMBEDDED_DRIVER)]
    driver: String,

    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Partition {
    #[arg(long)]
    app: String,
    #[arg(long)]
    collection: String,
    #[arg(long)]
    owner: Option<String>,
}

impl Partition {
    fn key(&self) -> PartitionKey {
        PartitionKey {
            app_name: self.app.clone(),
            collection_name: self.collection.clone(),
            owner: self.owner.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List an app's collections.
    List {
        #[arg(long)]
        app: String,
    },
    /// Find records. QUERY is a JSON query or a bare id.
    Find {
        #[command(flatten)]
        partition: Partition,
        #[arg(value_parser = parse_target, default_value = "null")]
        query: Value,
        /// Sort spec, e.g. '{"rank": -1}'.
        #[arg(long, value_parser = parse_sort)]
        sort: Option<SortSpec>,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long)]
        key_only: bool,
    },
    /// Fetch one record by id.
    Get {
        #[command(flatten)]
        partition: Partition,
        id: String,
    },
    /// Insert a JSON object.
    Insert {
        #[command(flatten)]
        partition: Partition,
        #[arg(value_parser = parse_object)]
        data: Entity,
        #[arg(long)]
        id: Option<String>,
        /// Keep `_id`, `_owner` and dates from DATA.
        #[arg(long)]
        restore: bool,
    },
    /// Replace the first match of TARGET, or insert.
    Upsert {
        #[command(flatten)]
        partition: Partition,
        #[arg(value_parser = parse_target)]
        target: Value,
        #[arg(value_parser = parse_object)]
        data: Entity,
    },
    /// Patch records matching TARGET.
    Update {
        #[command(flatten)]
        partition: Partition,
        #[arg(value_parser = parse_target)]
        target: Value,
        #[arg(value_parser = parse_object)]
        data: Entity,
        #[arg(long)]
        multi: bool,
        /// Replace the whole record instead of merging fields.
        #[arg(long)]
        replace_all: bool,
    },
    /// Remove records matching TARGET.
    Remove {
        #[command(flatten)]
        partition: Partition,
        #[arg(value_parser = parse_target)]
        target: Value,
        #[arg(long)]
        multi: bool,
    },
}

/// JSON if it parses, otherwise a bare id.
fn parse_target(raw: &str) -> Result<Value, Infallible> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

fn parse_object(raw: &str) -> Result<Entity, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {other}")),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_sort(raw: &str) -> Result<SortSpec, String> {
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

fn config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::from_env().context("reading DATAGATE_* environment")?;
    if cli.store.is_some() {
        config.embedded_path = cli.store.clone();
    }
    config.custom_driver = Some(CustomDriverConfig {
        name: cli.driver.clone(),
        apps: AppScope::All,
    });
    Ok(config)
}

async fn run(cli: Cli) -> Result<Value> {
    let manager = DataStoreManager::in_memory(config(&cli)?)
        .await
        .context("opening store")?;

    let result = match cli.command {
        Command::List { app } => json!(manager.list_partition_names(&app).await?),
        Command::Find {
            partition,
            query,
            sort,
            count,
            skip,
            key_only,
        } => {
            let options = QueryOptions {
                sort,
                count,
                skip,
                key_only,
                ..QueryOptions::default()
            };
            json!(manager.find(&partition.key(), &query, &options).await?)
        }
        Command::Get { partition, id } => json!(manager.get_by_id(&partition.key(), &id).await?),
        Command::Insert {
            partition,
            data,
            id,
            restore,
        } => {
            let options = QueryOptions {
                restore_record: restore,
                ..QueryOptions::default()
            };
            let ack = manager
                .insert(&partition.key(), id.as_deref(), data, &options)
                .await?;
            for issue in &ack.issues {
                tracing::warn!("{issue}");
            }
            Value::Object(ack.entity)
        }
        Command::Upsert {
            partition,
            target,
            data,
        } => Value::Object(manager.upsert(&partition.key(), &target, data).await?),
        Command::Update {
            partition,
            target,
            data,
            multi,
            replace_all,
        } => {
            if multi && replace_all {
                bail!("--multi and --replace-all cannot be combined");
            }
            let options = QueryOptions {
                multi,
                replace_all_fields: replace_all,
                ..QueryOptions::default()
            };
            json!(manager.update(&partition.key(), &target, data, &options).await?)
        }
        Command::Remove {
            partition,
            target,
            multi,
        } => {
            let options = QueryOptions {
                multi,
                ..QueryOptions::default()
            };
            json!(manager.remove(&partition.key(), &target, &options).await?)
        }
    };

    manager.shutdown().await?;
    Ok(result)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let result = run(cli).await?;
    println!("{}", render(&result, format));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("abc").unwrap(), json!("abc"));
        assert_eq!(parse_target(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(parse_target("null").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_object() {
        assert!(parse_object(r#"{"a": 1}"#).is_ok());
        assert!(parse_object("[1]").is_err());
        assert!(parse_object("{").is_err());
    }

    #[test]
    fn test_parse_find_command() {
        let cli = Cli::try_parse_from([
            "datagate", "find", "--app", "a", "--collection", "c", "--owner", "o",
            r#"{"n": {"$gt": 1}}"#, "--sort", r#"{"n": -1}"#, "--count", "5",
        ])
        .unwrap();
        match cli.command {
            Command::Find { partition, query, sort, count, .. } => {
                assert_eq!(partition.key(), PartitionKey::new("a", "c", "o"));
                assert_eq!(query, json!({"n": {"$gt": 1}}));
                assert_eq!(sort, Some(SortSpec::new().descending("n")));
                assert_eq!(count, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_against_a_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("admin.redb");
        let store = store.to_str().unwrap();
        let args = |rest: &[&str]| {
            let mut argv = vec!["datagate", "--store", store, "--format", "json"];
            argv.extend_from_slice(rest);
            Cli::try_parse_from(argv).unwrap()
        };

        let inserted = run(args(&[
            "insert", "--app", "a", "--collection", "notes", "--owner", "o", "--id", "n1",
            r#"{"title": "hi"}"#,
        ]))
        .await
        .unwrap();
        assert_eq!(inserted["_id"], "n1");

        let found = run(args(&["get", "--app", "a", "--collection", "notes", "--owner", "o", "n1"]))
            .await
            .unwrap();
        assert_eq!(found["title"], "hi");

        let listed = run(args(&["list", "--app", "a"])).await.unwrap();
        assert_eq!(listed, json!(["notes"]));

        let removed = run(args(&["remove", "--app", "a", "--collection", "notes", "--owner", "o", "n1"]))
            .await
            .unwrap();
        assert_eq!(removed, json!({"n": 1}));
    }
}
