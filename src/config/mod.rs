//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vellum";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CONTENT_ROOT: &str = "compiledCollections";
const DEFAULT_LAZY_DIR: &str = "config/collections";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_EXTENSIONS: [&str; 3] = ["js", "json", "toml"];
const DEFAULT_LOAD_CONCURRENCY: usize = 4;
const DEFAULT_CACHE_LOCAL_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_DISTRIBUTED_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 100;
const DEFAULT_CACHE_KEY_PREFIX: &str = "cms";
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Command-line arguments for the Vellum binary.
#[derive(Debug, Parser)]
#[command(
    name = "vellum",
    version,
    about = "Load, reconcile and inspect compiled content collections"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VELLUM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a full reconciliation pass and print a summary.
    Reload(ReloadArgs),
    /// Print the category tree.
    Tree,
    /// Print the collection resolved for a logical path.
    Collection(CollectionArgs),
    /// Lazily load one collection definition by name.
    Load(LoadArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct ReloadArgs {
    /// Re-evaluate every schema file even if unchanged.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub recompile: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CollectionArgs {
    /// Logical path such as `/posts/news`.
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Args, Clone)]
pub struct LoadArgs {
    /// Collection name, without extension.
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the directory holding compiled collection files.
    #[arg(long = "content-root", value_name = "PATH", value_hint = ValueHint::DirPath, global = true)]
    pub content_root: Option<PathBuf>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub content: ContentSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub root_dir: PathBuf,
    pub extensions: Vec<String>,
    pub default_language: String,
    pub lazy_dir: PathBuf,
    pub load_concurrency: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub local_ttl: Duration,
    pub max_entries: NonZeroUsize,
    pub distributed_enabled: bool,
    pub distributed_ttl: Duration,
    pub key_prefix: String,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: NonZeroU32,
    pub base_delay: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("VELLUM")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("content.extensions")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    content: RawContentSettings,
    cache: RawCacheSettings,
    retry: RawRetrySettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(root) = overrides.content_root.as_ref() {
            self.content.root_dir = Some(root.clone());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            content,
            cache,
            retry,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            content: build_content_settings(content)?,
            cache: build_cache_settings(cache)?,
            retry: build_retry_settings(retry)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let root_dir = content
        .root_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_ROOT));
    if root_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "content.root_dir",
            "path must not be empty",
        ));
    }

    let lazy_dir = content
        .lazy_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LAZY_DIR));
    if lazy_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "content.lazy_dir",
            "path must not be empty",
        ));
    }

    let extensions: Vec<String> = content
        .extensions
        .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect())
        .into_iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    if extensions.is_empty() {
        return Err(LoadError::invalid(
            "content.extensions",
            "at least one extension is required",
        ));
    }

    let default_language = content
        .default_language
        .map(|tag| tag.trim().to_string())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    if default_language.is_empty() {
        return Err(LoadError::invalid(
            "content.default_language",
            "language tag must not be empty",
        ));
    }

    let concurrency = content
        .load_concurrency
        .unwrap_or(DEFAULT_LOAD_CONCURRENCY);
    let load_concurrency = NonZeroUsize::new(concurrency).ok_or_else(|| {
        LoadError::invalid("content.load_concurrency", "must be greater than zero")
    })?;

    Ok(ContentSettings {
        root_dir,
        extensions,
        default_language,
        lazy_dir,
        load_concurrency,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let local_ttl_secs = cache.local_ttl_secs.unwrap_or(DEFAULT_CACHE_LOCAL_TTL_SECS);
    if local_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.local_ttl_secs",
            "must be greater than zero",
        ));
    }

    let distributed_ttl_secs = cache
        .distributed_ttl_secs
        .unwrap_or(DEFAULT_CACHE_DISTRIBUTED_TTL_SECS);
    if distributed_ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.distributed_ttl_secs",
            "must be greater than zero",
        ));
    }

    let max_entries = NonZeroUsize::new(cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES))
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    let key_prefix = cache
        .key_prefix
        .map(|prefix| prefix.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CACHE_KEY_PREFIX.to_string());
    if key_prefix.is_empty() || key_prefix.contains(char::is_whitespace) {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "prefix must be a non-empty token without whitespace",
        ));
    }

    Ok(CacheSettings {
        local_ttl: Duration::from_secs(local_ttl_secs),
        max_entries,
        distributed_enabled: cache.distributed_enabled.unwrap_or(false),
        distributed_ttl: Duration::from_secs(distributed_ttl_secs),
        key_prefix,
    })
}

fn build_retry_settings(retry: RawRetrySettings) -> Result<RetrySettings, LoadError> {
    let attempts = retry.max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);
    let max_attempts = non_zero_u32(attempts.into(), "retry.max_attempts")?;

    let base_delay_ms = retry.base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS);

    Ok(RetrySettings {
        max_attempts,
        base_delay: Duration::from_millis(base_delay_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    root_dir: Option<PathBuf>,
    extensions: Option<Vec<String>>,
    default_language: Option<String>,
    lazy_dir: Option<PathBuf>,
    load_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    local_ttl_secs: Option<u64>,
    max_entries: Option<usize>,
    distributed_enabled: Option<bool>,
    distributed_ttl_secs: Option<u64>,
    key_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetrySettings {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.content.root_dir, PathBuf::from(DEFAULT_CONTENT_ROOT));
        assert_eq!(settings.content.extensions, vec!["js", "json", "toml"]);
        assert_eq!(settings.content.default_language, "en");
        assert_eq!(settings.cache.local_ttl, Duration::from_secs(300));
        assert_eq!(settings.cache.max_entries.get(), 100);
        assert!(!settings.cache.distributed_enabled);
        assert_eq!(settings.retry.max_attempts.get(), 3);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(1000));
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.content.root_dir = Some(PathBuf::from("from-file"));
        raw.logging.level = Some("info".to_string());

        let overrides = GlobalOverrides {
            content_root: Some(PathBuf::from("from-cli")),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.content.root_dir, PathBuf::from("from-cli"));
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = GlobalOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn blank_database_url_is_treated_as_absent() {
        let mut raw = RawSettings::default();
        raw.database.url = Some("   ".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn extensions_are_normalised() {
        let mut raw = RawSettings::default();
        raw.content.extensions = Some(vec![".JS".into(), " toml ".into(), "".into()]);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.content.extensions, vec!["js", "toml"]);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut raw = RawSettings::default();
        raw.cache.max_entries = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero entries rejected");
        assert!(matches!(err, LoadError::Invalid { key: "cache.max_entries", .. }));

        let mut raw = RawSettings::default();
        raw.content.load_concurrency = Some(0);
        let err = Settings::from_raw(raw).expect_err("zero concurrency rejected");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "content.load_concurrency",
                ..
            }
        ));
    }

    #[test]
    fn invalid_log_level_is_reported() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("loud".to_string());
        let err = Settings::from_raw(raw).expect_err("level rejected");
        assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
    }

    #[test]
    fn parse_reload_arguments() {
        let args = CliArgs::parse_from([
            "vellum",
            "--content-root",
            "compiled",
            "reload",
            "--recompile",
        ]);

        assert_eq!(args.overrides.content_root, Some(PathBuf::from("compiled")));
        match args.command {
            Command::Reload(reload) => assert!(reload.recompile),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_overrides_follow_the_subcommand() {
        let args = CliArgs::parse_from([
            "vellum",
            "collection",
            "/posts/news",
            "--database-url",
            "postgres://example",
            "--log-json",
            "true",
        ]);

        assert_eq!(
            args.overrides.database_url.as_deref(),
            Some("postgres://example")
        );
        assert_eq!(args.overrides.log_json, Some(true));
        match args.command {
            Command::Collection(collection) => assert_eq!(collection.path, "/posts/news"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
