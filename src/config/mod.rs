//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::store::MAX_PAGE_SIZE;
use crate::cache::Expiry;
use crate::domain::types::Locale;

mod cli;

pub use cli::{
    CliArgs, CmsOverrides, Command, DumpArgs, DumpCollection, ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CMS_API_BASE_URL: &str = "https://api.notion.com/v1/";
const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_CMS_TIMEOUT_SECS: u64 = 20;
const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CACHE_CONSUME_BATCH_LIMIT: u64 = 100;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cms: CmsSettings,
    pub cache: CacheSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// The revalidation webhook is disabled while unset.
    pub revalidate_secret: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// CMS access. Missing token or database ids are reported at first use.
#[derive(Debug, Clone)]
pub struct CmsSettings {
    pub access_token: Option<String>,
    pub api_base_url: Url,
    pub notion_version: String,
    pub timeout: Duration,
    pub page_size: NonZeroU32,
    pub pages_db_id: Option<String>,
    pub blog_posts_db_id: Option<String>,
    pub business_ideas_db_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub expiry: Expiry,
    pub sweep_interval: Duration,
    pub dedupe_inflight: bool,
    pub consume_batch_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub default_locale: Locale,
    pub warm_on_start: bool,
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

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_cms_overrides(&cli.cms);
    if let Some(secret) = cli.revalidate_secret.as_ref() {
        raw.server.revalidate_secret = Some(secret.clone());
    }
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Dump(args)) => raw.apply_dump_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cms: RawCmsSettings,
    cache: RawCacheSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_cms_overrides(&mut self, overrides: &CmsOverrides) {
        if let Some(token) = overrides.access_token.as_ref() {
            self.cms.access_token = Some(token.clone());
        }
        if let Some(id) = overrides.pages_db_id.as_ref() {
            self.cms.pages_db_id = Some(id.clone());
        }
        if let Some(id) = overrides.blog_posts_db_id.as_ref() {
            self.cms.blog_posts_db_id = Some(id.clone());
        }
        if let Some(id) = overrides.business_ideas_db_id.as_ref() {
            self.cms.business_ideas_db_id = Some(id.clone());
        }
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.cms.api_base_url = Some(url.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(expiry) = overrides.cache_expiry.as_ref() {
            self.cache.expiry = Some(expiry.clone());
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(dedupe) = overrides.cache_dedupe_inflight {
            self.cache.dedupe_inflight = Some(dedupe);
        }
        if let Some(warm) = overrides.warm_on_start {
            self.site.warm_on_start = Some(warm);
        }
    }

    fn apply_dump_overrides(&mut self, args: &DumpArgs) {
        if let Some(level) = args.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cms,
            cache,
            site,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cms: build_cms_settings(cms)?,
            cache: build_cache_settings(cache)?,
            site: build_site_settings(site)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        revalidate_secret: non_blank(server.revalidate_secret),
    })
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

fn build_cms_settings(cms: RawCmsSettings) -> Result<CmsSettings, LoadError> {
    let base = cms
        .api_base_url
        .unwrap_or_else(|| DEFAULT_CMS_API_BASE_URL.to_string());
    let api_base_url = Url::parse(base.trim())
        .map_err(|err| LoadError::invalid("cms.api_base_url", format!("invalid URL: {err}")))?;
    if !matches!(api_base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "cms.api_base_url",
            "scheme must be http or https",
        ));
    }

    let notion_version = non_blank(cms.notion_version)
        .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string());

    let timeout_secs = cms.timeout_seconds.unwrap_or(DEFAULT_CMS_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "cms.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let page_size = non_zero_u32(
        cms.page_size.unwrap_or(u64::from(MAX_PAGE_SIZE)),
        "cms.page_size",
    )?;
    if page_size.get() > MAX_PAGE_SIZE {
        return Err(LoadError::invalid(
            "cms.page_size",
            format!("must not exceed {MAX_PAGE_SIZE}"),
        ));
    }

    Ok(CmsSettings {
        access_token: non_blank(cms.access_token),
        api_base_url,
        notion_version,
        timeout: Duration::from_secs(timeout_secs),
        page_size,
        pages_db_id: non_blank(cms.pages_db_id),
        blog_posts_db_id: non_blank(cms.blog_posts_db_id),
        business_ideas_db_id: non_blank(cms.business_ideas_db_id),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    let expiry = match cache.expiry.as_deref().map(str::trim) {
        None | Some("time_bounded") => {
            if ttl_secs == 0 {
                return Err(LoadError::invalid(
                    "cache.ttl_seconds",
                    "must be greater than zero",
                ));
            }
            Expiry::TimeBounded {
                ttl: Duration::from_secs(ttl_secs),
            }
        }
        Some("tag_only") => Expiry::TagOnly,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.expiry",
                format!("unknown expiry model `{other}` (expected time_bounded or tag_only)"),
            ));
        }
    };

    let sweep_secs = cache
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_CACHE_SWEEP_INTERVAL_SECS);
    if sweep_secs == 0 {
        return Err(LoadError::invalid(
            "cache.sweep_interval_seconds",
            "must be greater than zero",
        ));
    }

    let batch = cache
        .consume_batch_limit
        .unwrap_or(DEFAULT_CACHE_CONSUME_BATCH_LIMIT);
    let consume_batch_limit = usize::try_from(batch)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("cache.consume_batch_limit", "must be greater than zero")
        })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        expiry,
        sweep_interval: Duration::from_secs(sweep_secs),
        dedupe_inflight: cache.dedupe_inflight.unwrap_or(true),
        consume_batch_limit,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let default_locale = match site.default_locale {
        Some(code) => code
            .parse::<Locale>()
            .map_err(|err| LoadError::invalid("site.default_locale", err.to_string()))?,
        None => Locale::default(),
    };

    Ok(SiteSettings {
        default_locale,
        warm_on_start: site.warm_on_start.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    revalidate_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCmsSettings {
    access_token: Option<String>,
    api_base_url: Option<String>,
    notion_version: Option<String>,
    timeout_seconds: Option<u64>,
    page_size: Option<u64>,
    pages_db_id: Option<String>,
    blog_posts_db_id: Option<String>,
    business_ideas_db_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    expiry: Option<String>,
    ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
    dedupe_inflight: Option<bool>,
    consume_batch_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    default_locale: Option<String>,
    warm_on_start: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
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

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
