use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub phase: Option<PhaseConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub links: Option<LinksConfig>,
    pub workers: Option<WorkersConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub meta_key: Option<String>,
    pub meta_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub abstract_folder_name: Option<String>,
    pub read_chunk_size: Option<usize>,
    pub max_archive_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinksConfig {
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub num_workers: Option<usize>,
}

/// Platform config directory path: `<config_dir>/isic-submission/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("isic-submission").join("config.toml"))
}

/// Load config by cascading CWD `.isic-submission.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".isic-submission.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        phase: Some(PhaseConfig {
            meta_key: overlay
                .phase
                .as_ref()
                .and_then(|p| p.meta_key.clone())
                .or_else(|| base.phase.as_ref().and_then(|p| p.meta_key.clone())),
            meta_value: overlay
                .phase
                .as_ref()
                .and_then(|p| p.meta_value.clone())
                .or_else(|| base.phase.as_ref().and_then(|p| p.meta_value.clone())),
        }),
        extraction: Some(ExtractionConfig {
            abstract_folder_name: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.abstract_folder_name.clone())
                .or_else(|| {
                    base.extraction
                        .as_ref()
                        .and_then(|e| e.abstract_folder_name.clone())
                }),
            read_chunk_size: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.read_chunk_size)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.read_chunk_size)),
            max_archive_size_mb: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.max_archive_size_mb)
                .or_else(|| {
                    base.extraction
                        .as_ref()
                        .and_then(|e| e.max_archive_size_mb)
                }),
        }),
        links: Some(LinksConfig {
            api_base_url: overlay
                .links
                .as_ref()
                .and_then(|l| l.api_base_url.clone())
                .or_else(|| base.links.as_ref().and_then(|l| l.api_base_url.clone())),
        }),
        workers: Some(WorkersConfig {
            num_workers: overlay
                .workers
                .as_ref()
                .and_then(|w| w.num_workers)
                .or_else(|| base.workers.as_ref().and_then(|w| w.num_workers)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_parses() {
        let config: ConfigFile = toml::from_str(
            r#"
            [links]
            api_base_url = "http://localhost:8080"
            "#,
        )
        .unwrap();
        assert!(config.phase.is_none());
        assert_eq!(
            config.links.unwrap().api_base_url.as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn overlay_wins_and_base_fills_gaps() {
        let base: ConfigFile = toml::from_str(
            r#"
            [phase]
            meta_key = "isic2018"
            meta_value = "final"

            [workers]
            num_workers = 3
            "#,
        )
        .unwrap();
        let overlay: ConfigFile = toml::from_str(
            r#"
            [phase]
            meta_value = "test"

            [extraction]
            max_archive_size_mb = 64
            "#,
        )
        .unwrap();

        let merged = merge(base, overlay);
        let phase = merged.phase.unwrap();
        assert_eq!(phase.meta_key.as_deref(), Some("isic2018"));
        assert_eq!(phase.meta_value.as_deref(), Some("test"));
        assert_eq!(merged.extraction.unwrap().max_archive_size_mb, Some(64));
        assert_eq!(merged.workers.unwrap().num_workers, Some(3));
    }

    #[test]
    fn load_from_path_reads_file_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[extraction]\nabstract_folder_name = \"Paper\"\n").unwrap();
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[extraction\nnot toml").unwrap();

        let loaded = load_from_path(&good).unwrap();
        assert_eq!(
            loaded.extraction.unwrap().abstract_folder_name.as_deref(),
            Some("Paper")
        );
        assert!(load_from_path(&bad).is_none());
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());
    }
}
