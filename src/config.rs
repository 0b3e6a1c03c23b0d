use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL for the delivery server store
    #[arg(long, env = "DRIFTCHAT_DATABASE_URL", default_value = "sqlite://driftchat.db")]
    pub database_url: String,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "DRIFTCHAT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DRIFTCHAT_PORT", default_value_t = 3000)]
    pub port: u16,

    /// How long to wait for in-flight work during shutdown
    #[arg(long, env = "DRIFTCHAT_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret key for JWT verification (issuance lives in the auth service)
    #[arg(long, env = "DRIFTCHAT_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Default page size for history pagination
    #[arg(long, env = "DRIFTCHAT_HISTORY_PAGE_SIZE", default_value_t = 30)]
    pub history_page_size: i64,

    /// Upper bound a client may request as a history page size
    #[arg(long, env = "DRIFTCHAT_HISTORY_PAGE_LIMIT", default_value_t = 100)]
    pub history_page_limit: i64,
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the per-session outbound message buffer
    #[arg(long, env = "DRIFTCHAT_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 32)]
    pub outbound_buffer_size: usize,

    /// Capacity of each per-user room broadcast channel
    #[arg(long, env = "DRIFTCHAT_WS_ROOM_CAPACITY", default_value_t = 64)]
    pub room_capacity: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "DRIFTCHAT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn load() -> Self {
        Self::parse()
    }
}
