//! Converter configuration loading
//!
//! Loads `canvas-sync.toml` from the repository root, or from the path named
//! by `CANVAS_SYNC_CONFIG`. Every key is optional.

use crate::error::Result;
use crate::error::SyncError;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;

/// File names and switches shared by the packer, unpacker and collector.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Per-room snapshot file
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,

    /// Per-room metadata file (canvas identity, pages, clocks)
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// Storage file, used both for the room store and per-widget state
    #[serde(default = "default_storage_file")]
    pub storage_file: String,

    /// Link descriptor written into a child room by its parent
    #[serde(default = "default_link_info_file")]
    pub link_info_file: String,

    /// Widget geometry and identity
    #[serde(default = "default_properties_file")]
    pub properties_file: String,

    #[serde(default = "default_template_source_file")]
    pub template_source_file: String,

    #[serde(default = "default_template_output_file")]
    pub template_output_file: String,

    /// Directory-name prefix identifying rooms
    #[serde(default = "default_room_prefix")]
    pub room_prefix: String,

    /// Directory-name prefix identifying widgets
    #[serde(default = "default_widget_prefix")]
    pub widget_prefix: String,

    /// Treat a link back to an already visited room as fatal
    #[serde(default)]
    pub fail_on_cycle: bool,

    /// Delete unreachable rooms and widgets after an unpack run
    #[serde(default = "default_prune")]
    pub prune: bool,

    /// Report what pruning would delete without deleting it
    #[serde(default)]
    pub dry_run: bool,
}

fn default_snapshot_file() -> String {
    "snapshot.json".to_string()
}

fn default_metadata_file() -> String {
    "canvas-info.json".to_string()
}

fn default_storage_file() -> String {
    "storage.json".to_string()
}

fn default_link_info_file() -> String {
    "canvas-link-info.json".to_string()
}

fn default_properties_file() -> String {
    "properties.json".to_string()
}

fn default_template_source_file() -> String {
    "template.src".to_string()
}

fn default_template_output_file() -> String {
    "template.out".to_string()
}

fn default_room_prefix() -> String {
    "room-".to_string()
}

fn default_widget_prefix() -> String {
    "widget-".to_string()
}

fn default_prune() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
            metadata_file: default_metadata_file(),
            storage_file: default_storage_file(),
            link_info_file: default_link_info_file(),
            properties_file: default_properties_file(),
            template_source_file: default_template_source_file(),
            template_output_file: default_template_output_file(),
            room_prefix: default_room_prefix(),
            widget_prefix: default_widget_prefix(),
            fail_on_cycle: false,
            prune: default_prune(),
            dry_run: false,
        }
    }
}

impl SyncConfig {
    /// Environment variable overriding the config file location
    pub const ENV_CONFIG_PATH: &'static str = "CANVAS_SYNC_CONFIG";

    /// Config file looked up at the repository root
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "canvas-sync.toml";

    /// Load configuration for the repository at `repo_root`.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = Self::resolve_config_path(repo_root);

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "canvas-sync config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::fatal_config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: SyncConfig = toml::from_str(contents)
            .map_err(|e| SyncError::fatal_config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path(repo_root: &Path) -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }
        repo_root.join(Self::DEFAULT_CONFIG_FILENAME)
    }

    fn validate(&self) -> Result<()> {
        let file_names = [
            ("snapshot_file", &self.snapshot_file),
            ("metadata_file", &self.metadata_file),
            ("storage_file", &self.storage_file),
            ("link_info_file", &self.link_info_file),
            ("properties_file", &self.properties_file),
            ("template_source_file", &self.template_source_file),
            ("template_output_file", &self.template_output_file),
        ];
        for (key, name) in file_names {
            if !is_plain_name(name) {
                return Err(SyncError::fatal_config(format!(
                    "{key} must be a plain file name, got {name:?}"
                )));
            }
        }

        if !is_plain_name(&self.room_prefix) || !is_plain_name(&self.widget_prefix) {
            return Err(SyncError::fatal_config(
                "room_prefix and widget_prefix must be non-empty plain names",
            ));
        }
        if self.room_prefix.starts_with(&self.widget_prefix)
            || self.widget_prefix.starts_with(&self.room_prefix)
        {
            return Err(SyncError::fatal_config(format!(
                "room_prefix {:?} and widget_prefix {:?} overlap",
                self.room_prefix, self.widget_prefix
            )));
        }

        if self.dry_run && !self.prune {
            tracing::warn!("dry_run has no effect while prune is disabled");
        }

        Ok(())
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
