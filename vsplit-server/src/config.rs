//! Configuration resolution for vsplit-server
//!
//! Priority: command line / `VSPLIT_*` environment → TOML file → defaults.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vsplit_common::config::{load_or_default, SeparatorBackend, TomlConfig};
use vsplit_common::duration::parse_duration;
use vsplit_common::{Error, Result};

use crate::tools::separator::StemFilenames;
use crate::tools::{CommandSeparator, FfmpegExtractor, StemSeparator, WaveformExtractor};

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "vsplit-server", version, about = "Vocal / background stem separation service")]
pub struct Cli {
    /// TOML config file
    #[arg(long, env = "VSPLIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Arena root holding session directories
    #[arg(long, env = "VSPLIT_ROOT_FOLDER")]
    pub root_folder: Option<PathBuf>,

    #[arg(long, env = "VSPLIT_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "VSPLIT_PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VSPLIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Time between reclamation passes, e.g. 30m
    #[arg(long, env = "VSPLIT_RECLAIM_INTERVAL", value_parser = parse_duration_arg)]
    pub reclaim_interval: Option<Duration>,

    /// Sessions untouched for longer than this are reclaimed, e.g. 30m
    #[arg(long, env = "VSPLIT_RECLAIM_THRESHOLD", value_parser = parse_duration_arg)]
    pub reclaim_threshold: Option<Duration>,

    /// spleeter, demucs or custom
    #[arg(long, env = "VSPLIT_SEPARATOR_BACKEND")]
    pub separator_backend: Option<String>,

    /// Separator executable
    #[arg(long, env = "VSPLIT_SEPARATOR_PROGRAM")]
    pub separator_program: Option<PathBuf>,

    /// Extractor executable
    #[arg(long, env = "VSPLIT_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,
}

fn parse_duration_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

/// Effective separator settings
#[derive(Debug, Clone)]
pub struct SeparatorSettings {
    pub backend: SeparatorBackend,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub names: StemFilenames,
}

/// Effective server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_upload_bytes: u64,
    pub reclaim_interval: Duration,
    pub reclaim_threshold: Duration,
    pub ffmpeg_program: PathBuf,
    pub extract_timeout: Duration,
    pub separator: SeparatorSettings,
}

impl ServerConfig {
    /// Load the TOML file named by the CLI (or the default location) and
    /// merge CLI overrides on top
    pub fn load(cli: &Cli) -> Result<Self> {
        let toml = load_or_default(cli.config.as_deref())?;
        Self::resolve(cli, &toml)
    }

    /// Merge already-loaded TOML values with CLI overrides
    pub fn resolve(cli: &Cli, toml: &TomlConfig) -> Result<Self> {
        let mut separator_config = toml.separator.clone();
        if let Some(backend) = &cli.separator_backend {
            let backend: SeparatorBackend = backend.parse()?;
            if backend != separator_config.backend {
                // Backend switched on the command line: the TOML args and
                // file names belonged to the other backend
                separator_config.args = None;
                separator_config.program = None;
                separator_config.vocal_filename = None;
                separator_config.background_filename = None;
            }
            separator_config.backend = backend;
        }
        if let Some(program) = &cli.separator_program {
            separator_config.program = Some(program.clone());
        }

        let separator = SeparatorSettings {
            backend: separator_config.backend,
            program: separator_config.program_or_default()?,
            args: separator_config.args_or_default()?,
            timeout: separator_config.timeout.0,
            names: StemFilenames {
                vocals: separator_config.vocal_filename_or_default(),
                background: separator_config.background_filename_or_default(),
            },
        };
        if separator.names.vocals == separator.names.background {
            return Err(Error::Config(
                "separator vocal and background file names must differ".to_string(),
            ));
        }

        let config = Self {
            root_folder: cli
                .root_folder
                .clone()
                .unwrap_or_else(|| toml.root_folder_or_default()),
            host: cli.host.clone().unwrap_or_else(|| toml.host_or_default()),
            port: cli.port.unwrap_or_else(|| toml.port_or_default()),
            log_level: cli
                .log_level
                .clone()
                .unwrap_or_else(|| toml.logging.level.clone()),
            max_upload_bytes: toml.max_upload_bytes_or_default(),
            reclaim_interval: cli.reclaim_interval.unwrap_or(toml.reclaim.interval.0),
            reclaim_threshold: cli.reclaim_threshold.unwrap_or(toml.reclaim.threshold.0),
            ffmpeg_program: cli
                .ffmpeg
                .clone()
                .unwrap_or_else(|| toml.extractor.program.clone()),
            extract_timeout: toml.extractor.timeout.0,
            separator,
        };

        if config.reclaim_interval.is_zero() {
            return Err(Error::Config("reclaim interval must be non-zero".to_string()));
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Extractor built from these settings
    pub fn build_extractor(&self) -> Arc<dyn WaveformExtractor> {
        Arc::new(FfmpegExtractor::new(
            self.ffmpeg_program.clone(),
            self.extract_timeout,
        ))
    }

    /// Separator built from these settings
    pub fn build_separator(&self) -> Arc<dyn StemSeparator> {
        Arc::new(CommandSeparator::new(
            self.separator.program.clone(),
            self.separator.args.clone(),
            self.separator.timeout,
            self.separator.names.clone(),
        ))
    }
}
