use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use crud_store::{is_temp_file_name, RecordStore, StoreConfig, StoreError};
use serde_json::Value;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    debug!(dir = %config.directory.display(), format = %config.format, "opening store");
    let store = config.open::<Value>();

    match cli.command {
        Command::List => cmd_list(&store),
        Command::Show(args) => cmd_show(&store, &args.id),
        Command::Rm(args) => cmd_rm(&store, &args.id),
        Command::Check(args) => cmd_check(&store, args.sweep),
    }
}

/// Configuration file first, then command-line overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.directory = dir.clone();
    }
    if let Some(format) = cli.format {
        config.format = format;
    }
    Ok(config)
}

fn cmd_list(store: &RecordStore<Value>) -> anyhow::Result<()> {
    let ids = store.list_ids()?;
    if ids.is_empty() {
        println!("No records in {}.", store.directory().display().to_string().bold());
        return Ok(());
    }
    for id in &ids {
        println!("{}", id.yellow());
    }
    println!("{} record(s)", ids.len().to_string().bold());
    Ok(())
}

fn cmd_show(store: &RecordStore<Value>, id: &str) -> anyhow::Result<()> {
    match store.fetch(id)? {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => bail!("no record '{id}' in {}", store.directory().display()),
    }
}

fn cmd_rm(store: &RecordStore<Value>, id: &str) -> anyhow::Result<()> {
    if !store.delete(id)? {
        bail!("no record '{id}' in {}", store.directory().display());
    }
    println!("{} Removed {}", "✓".green(), id.yellow());
    Ok(())
}

fn cmd_check(store: &RecordStore<Value>, sweep: bool) -> anyhow::Result<()> {
    let summary = check_store(store, sweep)?;

    for (id, reason) in &summary.broken {
        println!("  {} {}: {}", "broken:".red(), id.yellow(), reason);
    }
    for id in &summary.mismatched {
        println!("  {} {} (stored id differs from file name)", "mismatch:".red(), id.yellow());
    }
    for path in &summary.temp_files {
        let action = if sweep { "removed:" } else { "stale:" };
        println!("  {} {}", action.cyan(), path.display());
    }

    println!(
        "{} record(s) checked, {} broken, {} mismatched, {} temp file(s){}",
        summary.checked.to_string().bold(),
        summary.broken.len(),
        summary.mismatched.len(),
        summary.temp_files.len(),
        if sweep { " removed" } else { "" },
    );

    if summary.is_healthy(sweep) {
        println!("{} No issues.", "✓".green().bold());
        Ok(())
    } else {
        bail!("store check found problems")
    }
}

/// What `check` found in a record directory.
#[derive(Debug, Default)]
pub struct CheckSummary {
    pub checked: usize,
    /// `(id, reason)` for records that could not be decoded.
    pub broken: Vec<(String, String)>,
    /// Records whose `id` field does not match their file name.
    pub mismatched: Vec<String>,
    pub temp_files: Vec<PathBuf>,
}

impl CheckSummary {
    fn is_healthy(&self, swept: bool) -> bool {
        self.broken.is_empty() && self.mismatched.is_empty() && (swept || self.temp_files.is_empty())
    }
}

pub fn check_store(store: &RecordStore<Value>, sweep: bool) -> anyhow::Result<CheckSummary> {
    let mut summary = CheckSummary {
        temp_files: temp_files(store)?,
        ..Default::default()
    };

    for id in store.list_ids()? {
        summary.checked += 1;
        match store.fetch(&id) {
            Ok(Some(value)) => {
                if let Some(stored) = value.get("id").and_then(Value::as_str) {
                    if stored != id {
                        summary.mismatched.push(id);
                    }
                }
            }
            Ok(None) => {}
            Err(e @ (StoreError::Parse { .. } | StoreError::InvalidId(_))) => {
                summary.broken.push((id, e.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if sweep && !summary.temp_files.is_empty() {
        store.sweep_temp_files()?;
    }
    Ok(summary)
}

fn temp_files(store: &RecordStore<Value>) -> anyhow::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(store.directory()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        if is_temp_file_name(&entry.file_name().to_string_lossy()) && entry.file_type()?.is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &std::path::Path) -> RecordStore<Value> {
        StoreConfig::at(dir).open()
    }

    #[test]
    fn config_overrides_apply_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        fs::write(&path, "directory = \"from-file\"\nformat = \"json\"\npretty = false\n").unwrap();

        let cli = Cli {
            command: Command::List,
            verbose: false,
            config: Some(path),
            dir: Some(PathBuf::from("from-flag")),
            format: Some(crud_store::Format::Toml),
        };
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.directory, PathBuf::from("from-flag"));
        assert_eq!(config.format, crud_store::Format::Toml);
        assert!(!config.pretty);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            command: Command::List,
            verbose: false,
            config: Some(dir.path().join("absent.toml")),
            dir: None,
            format: None,
        };
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn check_healthy_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_as("a", &json!({"id": "a", "n": 1})).unwrap();
        store.save_as("b", &json!({"n": 2})).unwrap();

        let summary = check_store(&store, false).unwrap();
        assert_eq!(summary.checked, 2);
        assert!(summary.is_healthy(false));
    }

    #[test]
    fn check_reports_broken_and_mismatched_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_as("a", &json!({"id": "other"})).unwrap();
        fs::write(store.path_for("b"), b"{ not json").unwrap();

        let summary = check_store(&store, false).unwrap();
        assert_eq!(summary.mismatched, vec!["a".to_string()]);
        assert_eq!(summary.broken.len(), 1);
        assert_eq!(summary.broken[0].0, "b");
        assert!(!summary.is_healthy(false));
    }

    #[test]
    fn check_sweeps_temp_files_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let stale = dir.path().join(".a.json.Ab12Cd.tmp");
        fs::write(&stale, b"partial").unwrap();

        let summary = check_store(&store, false).unwrap();
        assert_eq!(summary.temp_files, vec![stale.clone()]);
        assert!(!summary.is_healthy(false));
        assert!(stale.exists());

        let summary = check_store(&store, true).unwrap();
        assert!(summary.is_healthy(true));
        assert!(!stale.exists());
    }

    #[test]
    fn check_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir.path().join("nowhere"));
        let summary = check_store(&store, true).unwrap();
        assert_eq!(summary.checked, 0);
    }

    #[test]
    fn rm_and_show_missing_records_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(cmd_show(&store, "ghost").is_err());
        assert!(cmd_rm(&store, "ghost").is_err());

        store.save_as("real", &json!({"id": "real"})).unwrap();
        assert!(cmd_show(&store, "real").is_ok());
        assert!(cmd_rm(&store, "real").is_ok());
        assert!(!store.path_for("real").exists());
    }
}
