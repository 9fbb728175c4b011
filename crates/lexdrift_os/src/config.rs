#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lexdrift_engines::drift::DEFAULT_MIN_WINDOW_SIZE;
use log::LevelFilter;

pub const ENV_ENVIRONMENT: &str = "LEXDRIFT_ENV";
pub const ENV_LOG: &str = "LEXDRIFT_LOG";
pub const ENV_ARTIFACT_ROOT: &str = "LEXDRIFT_ARTIFACT_ROOT";
pub const ENV_FEATURE_LOG: &str = "LEXDRIFT_FEATURE_LOG";
pub const ENV_REPORT_LOG: &str = "LEXDRIFT_REPORT_LOG";
pub const ENV_VERSION_PREFIX: &str = "LEXDRIFT_VERSION_PREFIX";
pub const ENV_MIN_WINDOW: &str = "LEXDRIFT_MIN_WINDOW";
pub const ENV_DRIFT_TIMEOUT_MS: &str = "LEXDRIFT_DRIFT_TIMEOUT_MS";

const DEFAULT_ENVIRONMENT: &str = "dev";
const DEFAULT_VERSION_PREFIX: &str = "v";
const DEFAULT_DRIFT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug)]
pub enum ConfigError {
    EnvFile {
        path: PathBuf,
        line_no: usize,
        reason: &'static str,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvFile {
                path,
                line_no,
                reason,
            } => write!(f, "env file '{}' line {line_no}: {reason}", path.display()),
            Self::Io { path, source } => write!(f, "io error at '{}': {source}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process-level settings. Precedence: process environment, then the
/// `.env.<environment>` file, then defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub environment: String,
    pub log_level: LevelFilter,
    pub artifact_root: PathBuf,
    pub feature_log_path: PathBuf,
    pub report_log_path: PathBuf,
    pub version_prefix: String,
    pub min_window_size: usize,
    pub drift_timeout: Option<Duration>,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let process: BTreeMap<String, String> = env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter(|(k, _)| k.starts_with("LEXDRIFT_") || k == "HOME" || k == "XDG_DATA_HOME")
            .collect();
        let environment = non_empty(process.get(ENV_ENVIRONMENT))
            .unwrap_or(DEFAULT_ENVIRONMENT)
            .to_string();
        let file = load_env_file(Path::new(&format!(".env.{environment}")))?;
        Ok(Self::from_sources(&process, &file))
    }

    /// The environment name comes from the process only: it selects which
    /// file was loaded, so a value inside that file is ignored.
    pub fn from_sources(process: &BTreeMap<String, String>, file: &BTreeMap<String, String>) -> Self {
        let lookup = |key: &str| non_empty(process.get(key)).or_else(|| non_empty(file.get(key)));

        let environment = non_empty(process.get(ENV_ENVIRONMENT))
            .unwrap_or(DEFAULT_ENVIRONMENT)
            .to_string();
        if let Some(from_file) = non_empty(file.get(ENV_ENVIRONMENT)) {
            if from_file != environment {
                log::warn!(
                    "ignoring {ENV_ENVIRONMENT}={from_file:?} from the env file; environment is {environment:?}"
                );
            }
        }
        let log_level = match lookup(ENV_LOG) {
            Some(raw) => parse_level(raw).unwrap_or_else(|| {
                log::warn!("ignoring {ENV_LOG}={raw:?}: not a log level");
                LevelFilter::Info
            }),
            None => LevelFilter::Info,
        };
        let data_dir = default_data_dir(process).join(&environment);
        let artifact_root = lookup(ENV_ARTIFACT_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("artifacts"));
        let feature_log_path = lookup(ENV_FEATURE_LOG)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("features.jsonl"));
        let report_log_path = lookup(ENV_REPORT_LOG)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("drift_reports.jsonl"));
        let version_prefix = lookup(ENV_VERSION_PREFIX)
            .filter(|p| p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(DEFAULT_VERSION_PREFIX)
            .to_string();
        let min_window_size = lookup(ENV_MIN_WINDOW)
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| (1..=1_000_000).contains(v))
            .unwrap_or(DEFAULT_MIN_WINDOW_SIZE);
        // 0 disables the deadline.
        let drift_timeout = lookup(ENV_DRIFT_TIMEOUT_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v <= 3_600_000)
            .unwrap_or(DEFAULT_DRIFT_TIMEOUT_MS);
        let drift_timeout = (drift_timeout > 0).then(|| Duration::from_millis(drift_timeout));

        Self {
            environment,
            log_level,
            artifact_root,
            feature_log_path,
            report_log_path,
            version_prefix,
            min_window_size,
            drift_timeout,
        }
    }
}

pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    raw.trim().parse::<LevelFilter>().ok()
}

fn non_empty(v: Option<&String>) -> Option<&str> {
    v.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn default_data_dir(process: &BTreeMap<String, String>) -> PathBuf {
    if let Some(xdg) = non_empty(process.get("XDG_DATA_HOME")) {
        return PathBuf::from(xdg).join("lexdrift");
    }
    if let Some(home) = non_empty(process.get("HOME")) {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("lexdrift");
    }
    PathBuf::from(".lexdrift")
}

/// A missing file is an empty map.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(raw) => parse_env_file(path, &raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `KEY=VALUE` lines; `#` comments, blank lines, an optional `export ` prefix
/// and matching surrounding quotes are accepted.
pub fn parse_env_file(path: &Path, raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut out = BTreeMap::new();
    for (i, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let err = |reason| ConfigError::EnvFile {
            path: path.to_path_buf(),
            line_no: i + 1,
            reason,
        };
        let (key, value) = line.split_once('=').ok_or_else(|| err("expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(err("invalid key"));
        }
        let value = value.trim();
        let value = ['"', '\'']
            .iter()
            .find_map(|q| {
                value
                    .strip_prefix(*q)
                    .and_then(|v| v.strip_suffix(*q))
            })
            .unwrap_or(value);
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}
