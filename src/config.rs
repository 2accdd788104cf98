//! Runtime configuration, read from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("delivery mode 'combined' needs the 'markup' render strategy")]
    CombinedNeedsMarkup,
}

/// How a finished batch reaches the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One HTML document with every slip, separated by page breaks.
    Combined,
    /// Per-record files kept on disk plus an HTML index linking to them.
    Indexed,
    /// Per-record files packed into a zip download.
    Archive,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "combined" => Ok(Self::Combined),
            "indexed" => Ok(Self::Indexed),
            "archive" => Ok(Self::Archive),
            other => Err(format!("expected combined, indexed or archive, got '{other}'")),
        }
    }
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Combined => "combined",
            Self::Indexed => "indexed",
            Self::Archive => "archive",
        }
    }
}

/// Which render backend the deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStrategy {
    Markup,
    Headless,
}

impl FromStr for RenderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markup" | "html" => Ok(Self::Markup),
            "headless" | "pdf" => Ok(Self::Headless),
            other => Err(format!("expected markup or headless, got '{other}'")),
        }
    }
}

impl RenderStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Headless => "headless",
        }
    }
}

/// Headless browser settings.
#[derive(Debug, Clone, Default)]
pub struct ChromeConfig {
    pub executable: Option<PathBuf>,
    pub no_sandbox: bool,
}

/// Batch pipeline settings, independent of the HTTP server.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub delivery: DeliveryMode,
    pub strategy: RenderStrategy,
    pub output_dir: PathBuf,
    pub id_field: String,
    pub name_field: String,
    pub archive_name: String,
    pub record_timeout: Duration,
    pub batch_timeout: Duration,
    pub max_concurrent_engines: usize,
    pub chrome: ChromeConfig,
}

impl PipelineConfig {
    /// Defaults for a given mode, writing under `output_dir`.
    pub fn new(delivery: DeliveryMode, strategy: RenderStrategy, output_dir: PathBuf) -> Self {
        Self {
            delivery,
            strategy,
            output_dir,
            id_field: "code".to_string(),
            name_field: "name".to_string(),
            archive_name: "salary-slips.zip".to_string(),
            record_timeout: Duration::from_secs(30),
            batch_timeout: Duration::from_secs(600),
            max_concurrent_engines: 2,
            chrome: ChromeConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery == DeliveryMode::Combined && self.strategy != RenderStrategy::Markup {
            return Err(ConfigError::CombinedNeedsMarkup);
        }
        Ok(())
    }
}

/// Complete server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub template_path: PathBuf,
    pub logo_path: PathBuf,
    pub public_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub shutdown_timeout_secs: u64,
    pub cors_origins: Vec<String>,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut pipeline = PipelineConfig::new(
            parse_var("DELIVERY_MODE", DeliveryMode::Combined)?,
            parse_var("RENDER_STRATEGY", RenderStrategy::Markup)?,
            path_var("OUTPUT_DIR", "slips"),
        );
        pipeline.id_field = string_var("ID_FIELD", "code");
        pipeline.name_field = string_var("NAME_FIELD", "name");
        pipeline.archive_name = string_var("ARCHIVE_NAME", "salary-slips.zip");
        pipeline.record_timeout = Duration::from_secs(parse_var("RECORD_TIMEOUT_SECS", 30u64)?);
        pipeline.batch_timeout = Duration::from_secs(parse_var("BATCH_TIMEOUT_SECS", 600u64)?);
        pipeline.max_concurrent_engines = parse_var("MAX_CONCURRENT_ENGINES", 2usize)?.max(1);
        pipeline.chrome = ChromeConfig {
            executable: env::var("CHROME_PATH").ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            no_sandbox: parse_var("CHROME_NO_SANDBOX", false)?,
        };
        pipeline.validate()?;

        let cors_origins = string_var("CORS_ORIGINS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_addr: string_var("BIND_ADDR", "0.0.0.0"),
            port: parse_var("PORT", 3000u16)?,
            template_path: path_var("TEMPLATE_PATH", "template.hbs"),
            logo_path: path_var("LOGO_PATH", "public/3d.jpg"),
            public_dir: path_var("PUBLIC_DIR", "public"),
            upload_dir: path_var("UPLOAD_DIR", "uploads"),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize)?,
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", 30u64)?,
            cors_origins,
            pipeline,
        })
    }
}

fn string_var(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn path_var(key: &str, default: &str) -> PathBuf {
    PathBuf::from(string_var(key, default))
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                value,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}
