use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Localized CMS content fetch-and-cache service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub cms: CmsOverrides,

    /// Shared secret expected by the revalidation webhook.
    #[arg(
        long = "revalidate-secret",
        env = "REVALIDATE_SECRET",
        hide_env_values = true,
        value_name = "SECRET",
        global = true
    )]
    pub revalidate_secret: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service: warm the cache and accept revalidation webhooks.
    Serve(Box<ServeArgs>),
    /// Fetch one collection and print it as JSON.
    Dump(DumpArgs),
}

/// CMS access; each flag falls back to the environment variable the sites use.
#[derive(Debug, Args, Default, Clone)]
pub struct CmsOverrides {
    /// Notion integration token.
    #[arg(
        long = "cms-access-token",
        env = "NOTION_ACCESS_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN",
        global = true
    )]
    pub access_token: Option<String>,

    /// Database holding the localized site pages.
    #[arg(
        long = "cms-pages-db-id",
        env = "NOTION_PAGES_DB_ID",
        value_name = "ID",
        global = true
    )]
    pub pages_db_id: Option<String>,

    /// Database holding the blog posts.
    #[arg(
        long = "cms-blog-posts-db-id",
        env = "NOTION_BLOG_POSTS_DB_ID",
        value_name = "ID",
        global = true
    )]
    pub blog_posts_db_id: Option<String>,

    /// Database holding the business ideas.
    #[arg(
        long = "cms-business-ideas-db-id",
        env = "NOTION_GUIDE_BUSINESS_IDEAS_DB_ID",
        value_name = "ID",
        global = true
    )]
    pub business_ideas_db_id: Option<String>,

    /// Override the CMS API base URL.
    #[arg(long = "cms-api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the cache expiry model (time_bounded|tag_only).
    #[arg(long = "cache-expiry", value_name = "MODEL")]
    pub cache_expiry: Option<String>,

    /// Override the time-bounded cache lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Toggle collapsing of concurrent cache misses.
    #[arg(
        long = "cache-dedupe-inflight",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_dedupe_inflight: Option<bool>,

    /// Toggle cache warmup before the listener starts.
    #[arg(
        long = "warm-on-start",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub warm_on_start: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct DumpArgs {
    /// Collection to print.
    #[arg(value_enum)]
    pub collection: DumpCollection,

    /// Include unpublished blog posts (posts only).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub drafts: bool,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DumpCollection {
    Pages,
    Posts,
    Ideas,
    Tags,
}
