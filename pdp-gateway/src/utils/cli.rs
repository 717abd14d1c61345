use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Gateway listening host
    #[arg(long, env = "PDP_GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Gateway listening port
    #[arg(short, long, env = "PDP_GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Postgres connection string
    #[arg(
        long,
        env = "POSTGRES_DSN",
        default_value = "postgres://filcdn:filcdnpassword@db:5432/filcdn_db"
    )]
    pub database_url: String,

    /// Database pool size
    #[arg(long, env = "POSTGRES_MAX_CONNECTIONS", default_value_t = 12)]
    pub db_max_connections: u32,

    /// Path of the pdptool binary
    #[arg(
        long,
        env = "PDPTOOL_PATH",
        default_value = "/workspaces/kingen/curio/cmd/pdptool/pdptool"
    )]
    pub pdptool_path: String,

    /// Seconds between proof set creation status checks
    #[arg(long, env = "PDP_POLL_INTERVAL_SECS", default_value_t = 3)]
    pub poll_interval_secs: u64,

    /// Give up waiting for a proof set after this many seconds
    #[arg(long, env = "PDP_CONFIRMATION_TIMEOUT_SECS", default_value_t = 600)]
    pub confirmation_timeout_secs: u64,

    /// add-roots attempts while the proof set is not visible yet
    #[arg(long, env = "PDP_BIND_MAX_ATTEMPTS", default_value_t = 3)]
    pub bind_max_attempts: u32,

    /// Backoff step between add-roots attempts, in seconds
    #[arg(long, env = "PDP_BIND_BACKOFF_SECS", default_value_t = 2)]
    pub bind_backoff_secs: u64,

    /// Wait after uploading a pre-encrypted file, in seconds
    #[arg(long, env = "PDP_SETTLE_DELAY_SECS", default_value_t = 3)]
    pub settle_delay_secs: u64,

    /// Filename suffix marking pre-encrypted uploads
    #[arg(long, env = "PDP_ENCRYPTED_SUFFIX", default_value = ".enc")]
    pub encrypted_suffix: String,

    /// Largest accepted request body, in MiB
    #[arg(long, env = "PDP_MAX_UPLOAD_MB", default_value_t = 32)]
    pub max_upload_mb: usize,
}
