// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compiler settings.
//!
//! Settings live in a RON file next to the graphs being compiled and can be
//! overridden from the command line.

use ordoplay_shadergraph::{GenerationMode, GraphContext, Precision};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "shadergraph.ron";

/// Complete compiler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerSettings {
    /// Settings format version
    pub version: u32,
    /// Floating point precision of generated code
    #[serde(default)]
    pub precision: Precision,
    /// Name of the surface input struct
    #[serde(default = "default_graph_input_struct_name")]
    pub graph_input_struct_name: String,
    /// Preview or final generation
    #[serde(default)]
    pub generation_mode: GenerationMode,
    /// Directories scanned for sub-graph assets
    #[serde(default)]
    pub sub_graph_dirs: Vec<PathBuf>,
    /// Output file; stdout when unset
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_graph_input_struct_name() -> String {
    GraphContext::default().graph_input_struct_name
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            precision: Precision::default(),
            graph_input_struct_name: default_graph_input_struct_name(),
            generation_mode: GenerationMode::default(),
            sub_graph_dirs: Vec::new(),
            output: None,
        }
    }
}

impl CompilerSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings: CompilerSettings = ron::from_str(&content)?;

        // Version check
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        Ok(settings)
    }

    /// Load settings from `dir` if it holds a settings file, defaults otherwise
    pub fn load_or_default(dir: &Path) -> Result<Self, SettingsError> {
        let path = Self::settings_file_path(dir);
        if path.exists() {
            tracing::info!("Loading settings from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the settings file path for a directory
    pub fn settings_file_path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE_NAME)
    }

    /// Code generation context for these settings
    pub fn graph_context(&self) -> GraphContext {
        GraphContext {
            graph_input_struct_name: self.graph_input_struct_name.clone(),
            precision: self.precision,
        }
    }
}

/// Error loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON
    #[error("Invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest supported version
        supported: u32,
    },
}
