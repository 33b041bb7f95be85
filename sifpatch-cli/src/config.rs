use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const APKTOOL_ENV: &str = "SIFPATCH_APKTOOL";
pub const JARSIGNER_ENV: &str = "SIFPATCH_JARSIGNER";

/// Command templates for the external tools. Each is an argv prefix; the
/// per-invocation arguments are appended after it.
///
/// ```toml
/// apktool = ["java", "-jar", "/opt/apktool/apktool.jar"]
/// jarsigner = ["jarsigner", "-sigalg", "SHA1withRSA", "-digestalg", "SHA1"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub apktool: Vec<String>,
    pub jarsigner: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            apktool: vec!["apktool".to_string()],
            jarsigner: [
                "jarsigner",
                "-sigalg",
                "SHA1withRSA",
                "-digestalg",
                "SHA1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(unix)]
const USER_CONFIG: &str = ".config/sifpatch/config.toml";

impl ToolConfig {
    /// Load the tool configuration.
    ///
    /// An explicit path must exist. Without one, the per-user file is used if
    /// present, otherwise the defaults. Environment overrides apply last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::user_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// `~/.config/sifpatch/config.toml`
    #[cfg(unix)]
    pub fn user_config_path() -> Option<PathBuf> {
        pathos::xdg::home_dir()
            .ok()
            .map(|home| home.join(USER_CONFIG))
    }

    #[cfg(not(unix))]
    pub fn user_config_path() -> Option<PathBuf> {
        None
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("Loaded tool config from {}", path.display());

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace templates with whitespace-split values from `SIFPATCH_APKTOOL`
    /// and `SIFPATCH_JARSIGNER` when they are set and non-empty.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let split = |value: String| -> Option<Vec<String>> {
            let argv: Vec<String> = value.split_whitespace().map(str::to_string).collect();
            (!argv.is_empty()).then_some(argv)
        };

        if let Some(argv) = lookup(APKTOOL_ENV).and_then(split) {
            self.apktool = argv;
        }
        if let Some(argv) = lookup(JARSIGNER_ENV).and_then(split) {
            self.jarsigner = argv;
        }

        self
    }
}
