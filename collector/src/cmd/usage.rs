use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use usage_store::{IdentityRecord, SqliteStore, StoredSample, UsageStore};

use super::{OutputFormat, format_unix_secs, render_table};
use crate::config::{self, FileConfig};
use crate::error::{CollectorError, CollectorResult};
use crate::paths::CollectorPaths;

#[derive(Args)]
pub struct UsageArgs {
    /// YAML config file (only base_dir is used)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    /// Directory holding usage.db
    #[arg(long)]
    base_dir: Option<PathBuf>,
    /// Show one pod's identity and samples
    #[arg(long)]
    uid: Option<String>,
    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Serialize)]
struct PodUsage {
    identity: IdentityRecord,
    samples: Vec<StoredSample>,
}

/// Read-only report over the usage store.
pub async fn run_usage(args: UsageArgs) -> CollectorResult<()> {
    let base_dir = match (&args.base_dir, &args.config) {
        (Some(dir), _) => dir.clone(),
        (None, Some(path)) => config::load(path).await?.base_dir,
        (None, None) => FileConfig::default().base_dir,
    };
    let database = CollectorPaths::new(base_dir).database();
    if !tokio::fs::try_exists(&database).await? {
        return Err(CollectorError::Config(format!(
            "no usage database at {}",
            database.display()
        )));
    }
    let store = SqliteStore::open(database).await?;
    print!("{}", report(&store, args.uid.as_deref(), args.output).await?);
    Ok(())
}

async fn report(
    store: &dyn UsageStore,
    uid: Option<&str>,
    output: OutputFormat,
) -> CollectorResult<String> {
    let Some(uid) = uid else {
        let identities = store.identities().await?;
        return match output {
            OutputFormat::Json => to_json(&identities),
            OutputFormat::Table => {
                let rows: Vec<Vec<String>> = identities
                    .iter()
                    .map(|i| vec![i.uid.clone(), format_unix_secs(i.first_seen_at)])
                    .collect();
                Ok(render_table(&["UID", "FIRST SEEN"], &rows))
            }
        };
    };

    let identity = store
        .identity(uid)
        .await?
        .ok_or_else(|| CollectorError::Config(format!("no usage recorded for uid {uid}")))?;
    let samples = store.samples(uid).await?;
    match output {
        OutputFormat::Json => to_json(&PodUsage { identity, samples }),
        OutputFormat::Table => {
            let mut out = format!(
                "UID: {}\nFIRST SEEN: {}\nSAMPLES: {}\n\n",
                identity.uid,
                format_unix_secs(identity.first_seen_at),
                samples.len()
            );
            let rows: Vec<Vec<String>> = samples
                .iter()
                .map(|s| {
                    vec![
                        format_unix_secs(s.sample.observed_at),
                        s.sample.state.to_string(),
                    ]
                })
                .collect();
            out.push_str(&render_table(&["OBSERVED AT", "STATE"], &rows));
            Ok(out)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> CollectorResult<String> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| CollectorError::Internal(format!("encode report: {e}")))?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use cri_api::SandboxState;
    use usage_store::UsageSample;

    use super::*;

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for (uid, at) in [("uid-b", 1_700_000_100), ("uid-a", 1_700_000_000)] {
            store
                .ensure_identity(&IdentityRecord {
                    uid: uid.into(),
                    first_seen_at: at,
                })
                .await
                .unwrap();
        }
        for (at, state) in [
            (1_700_000_000, SandboxState::Ready),
            (1_700_000_060, SandboxState::NotReady),
        ] {
            store
                .append_sample(&UsageSample {
                    uid: "uid-a".into(),
                    observed_at: at,
                    state,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn lists_identities_oldest_first() {
        let store = seeded().await;
        let out = report(&store, None, OutputFormat::Table).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("UID"));
        assert!(lines[1].starts_with("uid-a"));
        assert!(lines[1].ends_with("2023-11-14T22:13:20Z"));
        assert!(lines[2].starts_with("uid-b"));
    }

    #[tokio::test]
    async fn shows_samples_for_uid() {
        let store = seeded().await;
        let out = report(&store, Some("uid-a"), OutputFormat::Table)
            .await
            .unwrap();
        assert!(out.contains("SAMPLES: 2"));
        assert!(out.contains("SANDBOX_NOTREADY"));
    }

    #[tokio::test]
    async fn json_report_for_uid() {
        let store = seeded().await;
        let out = report(&store, Some("uid-a"), OutputFormat::Json)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["identity"]["first_seen_at"], 1_700_000_000);
        assert_eq!(value["samples"].as_array().unwrap().len(), 2);
        assert_eq!(value["samples"][1]["state"], "SANDBOX_NOTREADY");
    }

    #[tokio::test]
    async fn unknown_uid_is_an_error() {
        let store = seeded().await;
        let err = report(&store, Some("uid-z"), OutputFormat::Table)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("uid-z"), "got: {err}");
    }

    #[tokio::test]
    async fn missing_database_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let args = UsageArgs {
            config: None,
            base_dir: Some(dir.path().to_path_buf()),
            uid: None,
            output: OutputFormat::Table,
        };
        let err = run_usage(args).await.unwrap_err();
        assert!(err.to_string().contains("no usage database"), "got: {err}");
        assert!(!dir.path().join("usage.db").exists());
    }
}
