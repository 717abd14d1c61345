use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pdp::WorkflowSettings;
use crate::pdp::creation::PollSettings;
use crate::pdp::retry::RetryPolicy;
use crate::pdp::upload::SettlePolicy;
use crate::utils::cli::Args;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_url: String,
    pub db_max_connections: u32,
    pub pdptool_path: PathBuf,
    pub workflow: WorkflowSettings,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Config for running against in-process fakes.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            db_url: String::new(),
            db_max_connections: 1,
            pdptool_path: PathBuf::from("pdptool"),
            workflow: WorkflowSettings::default(),
            max_upload_bytes: 32 << 20,
        }
    }
}

/// Checks `args` and collects every problem instead of stopping at the first.
pub fn validate_config(args: &Args) -> Result<Config, Vec<String>> {
    let mut validation_errors = Vec::new();

    if !(args.database_url.starts_with("postgres://")
        || args.database_url.starts_with("postgresql://"))
    {
        validation_errors.push(format!(
            "POSTGRES_DSN `{}` is not a postgres connection string",
            args.database_url
        ));
    }
    if args.db_max_connections == 0 {
        validation_errors.push("POSTGRES_MAX_CONNECTIONS must be at least 1".to_string());
    }
    if args.poll_interval_secs == 0 {
        validation_errors.push("PDP_POLL_INTERVAL_SECS must be at least 1".to_string());
    }
    if args.confirmation_timeout_secs < args.poll_interval_secs {
        validation_errors.push(format!(
            "PDP_CONFIRMATION_TIMEOUT_SECS ({}) is shorter than the poll interval ({})",
            args.confirmation_timeout_secs, args.poll_interval_secs
        ));
    }
    if args.bind_max_attempts == 0 {
        validation_errors.push("PDP_BIND_MAX_ATTEMPTS must be at least 1".to_string());
    }
    if args.max_upload_mb == 0 {
        validation_errors.push("PDP_MAX_UPLOAD_MB must be at least 1".to_string());
    }

    let pdptool_path = PathBuf::from(&args.pdptool_path);
    if !Path::new(&pdptool_path).is_file() {
        tracing::warn!(
            "PDPTOOL_PATH `{}` does not exist yet, tool calls will fail until it does",
            pdptool_path.display()
        );
    }

    if !validation_errors.is_empty() {
        return Err(validation_errors);
    }

    Ok(Config {
        host: args.host.clone(),
        port: args.port,
        db_url: args.database_url.clone(),
        db_max_connections: args.db_max_connections,
        pdptool_path,
        workflow: WorkflowSettings {
            poll: PollSettings {
                interval: Duration::from_secs(args.poll_interval_secs),
                deadline: Duration::from_secs(args.confirmation_timeout_secs),
            },
            bind_policy: RetryPolicy::linear(
                args.bind_max_attempts,
                Duration::from_secs(args.bind_backoff_secs),
            ),
            settle: SettlePolicy {
                encrypted_suffix: args.encrypted_suffix.clone(),
                delay: Duration::from_secs(args.settle_delay_secs),
            },
        },
        max_upload_bytes: args.max_upload_mb << 20,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["pdp-gateway", "--database-url", "postgres://u:p@localhost/db"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_match_service_behaviour() {
        let config = validate_config(&parse(&[])).unwrap();
        assert_eq!(config.workflow, WorkflowSettings::default());
        assert_eq!(config.max_upload_bytes, 32 * 1024 * 1024);
        assert_eq!(config.db_max_connections, 12);
    }

    #[test]
    fn test_overrides_flow_into_workflow_settings() {
        let config = validate_config(&parse(&[
            "--poll-interval-secs",
            "5",
            "--bind-max-attempts",
            "6",
            "--encrypted-suffix",
            ".age",
        ]))
        .unwrap();
        assert_eq!(config.workflow.poll.interval, Duration::from_secs(5));
        assert_eq!(config.workflow.bind_policy.max_attempts, 6);
        assert!(config.workflow.settle.is_encrypted("backup.AGE"));
    }

    #[test]
    fn test_collects_all_errors() {
        let args = Args::parse_from([
            "pdp-gateway",
            "--database-url",
            "mysql://localhost/db",
            "--bind-max-attempts",
            "0",
            "--poll-interval-secs",
            "0",
        ]);
        let errors = validate_config(&args).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("POSTGRES_DSN"));
    }
}
