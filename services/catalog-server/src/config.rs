//! Sync tuning for the service: YAML overlay plus command-line overrides.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;

use ingestion::{IndexMode, SyncConfig};

/// Build the sync configuration.
///
/// Starts from the defaults, applies the YAML file if one is given, then
/// any flags set on the command line.
pub fn load_sync_config(
    path: Option<&Path>,
    workers: Option<usize>,
    index_mode: Option<IndexMode>,
    rewatch: Option<bool>,
) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => {
            let config = SyncConfig::load(path)
                .with_context(|| format!("Failed to load sync config {}", path.display()))?;
            info!(path = %path.display(), "Loaded sync config");
            config
        }
        None => SyncConfig::default(),
    };

    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(mode) = index_mode {
        config.index_mode = mode;
    }
    if let Some(rewatch) = rewatch {
        config.rewatch = rewatch;
    }

    config.validate().context("Invalid sync config")?;
    Ok(config)
}

/// Parse `--index-mode`.
pub fn parse_index_mode(value: &str) -> Result<IndexMode> {
    match value.to_lowercase().as_str() {
        "background" => Ok(IndexMode::Background),
        "inline" => Ok(IndexMode::Inline),
        other => bail!("unknown index mode '{}', expected 'background' or 'inline'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.yaml");
        std::fs::write(&path, "workers: 8\nqueue_capacity: 16\n").unwrap();

        let config = load_sync_config(Some(&path), Some(2), Some(IndexMode::Inline), None).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.index_mode, IndexMode::Inline);
        assert!(config.rewatch);
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load_sync_config(None, None, None, Some(false)).unwrap();
        assert_eq!(config.workers, 4);
        assert!(!config.rewatch);
    }

    #[test]
    fn test_zero_workers_flag_rejected() {
        tokio_test::assert_err!(load_sync_config(None, Some(0), None, None));
    }

    #[test]
    fn test_parse_index_mode() {
        assert_eq!(parse_index_mode("Inline").unwrap(), IndexMode::Inline);
        assert_eq!(parse_index_mode("background").unwrap(), IndexMode::Background);
        tokio_test::assert_err!(parse_index_mode("eager"));
    }
}
