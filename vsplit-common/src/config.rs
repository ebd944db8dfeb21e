//! Bootstrap configuration and config file discovery
//!
//! Settings are resolved in this priority order:
//! 1. Command-line argument / environment variable (handled by the binary)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! A missing TOML file is not an error: the service logs a warning and
//! starts with compiled defaults. A TOML file that exists but cannot be
//! parsed is a configuration error.

use crate::duration::HumanDuration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Config file name looked up under the platform config directory
pub const CONFIG_FILE_NAME: &str = "vsplit.toml";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Default upload size cap (512 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional so that a partial file only overrides what it
/// names. Use the `*_or_default` accessors to read effective values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Arena root holding one directory per session
    pub root_folder: Option<PathBuf>,
    /// Bind host
    pub host: Option<String>,
    /// Bind port
    pub port: Option<u16>,
    /// Reject uploads larger than this many bytes
    pub max_upload_bytes: Option<u64>,
    pub logging: LoggingConfig,
    pub reclaim: ReclaimConfig,
    pub extractor: ExtractorConfig,
    pub separator: SeparatorConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Reclamation loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReclaimConfig {
    /// Time between passes
    pub interval: HumanDuration,
    /// Sessions untouched for longer than this are reclaimed
    pub threshold: HumanDuration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval: HumanDuration(Duration::from_secs(30 * 60)),
            threshold: HumanDuration(Duration::from_secs(30 * 60)),
        }
    }
}

/// Waveform extraction tool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Executable name or path
    pub program: PathBuf,
    /// Wall-clock limit for one extraction
    pub timeout: HumanDuration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: HumanDuration(Duration::from_secs(60)),
        }
    }
}

/// Known separator command-line tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeparatorBackend {
    /// `spleeter separate -p spleeter:2stems`
    #[default]
    Spleeter,
    /// `demucs --two-stems=vocals`
    Demucs,
    /// Program, args and file names all come from configuration
    Custom,
}

impl SeparatorBackend {
    /// Default executable for this backend
    pub fn default_program(&self) -> Option<&'static str> {
        match self {
            SeparatorBackend::Spleeter => Some("spleeter"),
            SeparatorBackend::Demucs => Some("demucs"),
            SeparatorBackend::Custom => None,
        }
    }

    /// Default argument template; `{input}` and `{output}` are substituted
    pub fn default_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            SeparatorBackend::Spleeter => {
                &["separate", "-p", "spleeter:2stems", "-o", "{output}", "{input}"]
            }
            SeparatorBackend::Demucs => &["--two-stems=vocals", "-o", "{output}", "{input}"],
            SeparatorBackend::Custom => &[],
        };
        args.iter().map(|s| s.to_string()).collect()
    }

    /// File name the backend gives the vocal stem
    pub fn default_vocal_filename(&self) -> &'static str {
        "vocals.wav"
    }

    /// File name the backend gives the background (non-vocal) stem
    pub fn default_background_filename(&self) -> &'static str {
        match self {
            SeparatorBackend::Demucs => "no_vocals.wav",
            SeparatorBackend::Spleeter | SeparatorBackend::Custom => "accompaniment.wav",
        }
    }
}

impl FromStr for SeparatorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spleeter" => Ok(SeparatorBackend::Spleeter),
            "demucs" => Ok(SeparatorBackend::Demucs),
            "custom" => Ok(SeparatorBackend::Custom),
            other => Err(Error::Config(format!(
                "unknown separator backend {:?} (expected spleeter, demucs or custom)",
                other
            ))),
        }
    }
}

/// Stem separation tool settings
///
/// Unset fields fall back to the backend's defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SeparatorConfig {
    pub backend: SeparatorBackend,
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub timeout: HumanDuration,
    pub vocal_filename: Option<String>,
    pub background_filename: Option<String>,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            backend: SeparatorBackend::default(),
            program: None,
            args: None,
            timeout: HumanDuration(Duration::from_secs(10 * 60)),
            vocal_filename: None,
            background_filename: None,
        }
    }
}

impl SeparatorConfig {
    /// Effective executable
    pub fn program_or_default(&self) -> Result<PathBuf> {
        if let Some(program) = &self.program {
            return Ok(program.clone());
        }
        self.backend
            .default_program()
            .map(PathBuf::from)
            .ok_or_else(|| Error::Config("separator.program is required for the custom backend".to_string()))
    }

    /// Effective argument template
    pub fn args_or_default(&self) -> Result<Vec<String>> {
        let args = self
            .args
            .clone()
            .unwrap_or_else(|| self.backend.default_args());
        if !args.iter().any(|a| a.contains("{input}")) {
            return Err(Error::Config(
                "separator.args must reference {input}".to_string(),
            ));
        }
        Ok(args)
    }

    pub fn vocal_filename_or_default(&self) -> String {
        self.vocal_filename
            .clone()
            .unwrap_or_else(|| self.backend.default_vocal_filename().to_string())
    }

    pub fn background_filename_or_default(&self) -> String {
        self.background_filename
            .clone()
            .unwrap_or_else(|| self.backend.default_background_filename().to_string())
    }
}

impl TomlConfig {
    pub fn root_folder_or_default(&self) -> PathBuf {
        self.root_folder
            .clone()
            .unwrap_or_else(get_default_root_folder)
    }

    pub fn host_or_default(&self) -> String {
        self.host.clone().unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn max_upload_bytes_or_default(&self) -> u64 {
        self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation
///
/// An explicit path must exist. Without one, the platform default location
/// is tried and compiled defaults are used when nothing is found there.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = load_toml_config(path)?;
        info!("Loaded config from {}", path.display());
        return Ok(config);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "No config file at {}, using compiled defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Platform config file location (`~/.config/vsplit/vsplit.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vsplit").join(CONFIG_FILE_NAME))
}

/// Default arena root under the system temp directory
pub fn get_default_root_folder() -> PathBuf {
    std::env::temp_dir().join("vsplit-sessions")
}
