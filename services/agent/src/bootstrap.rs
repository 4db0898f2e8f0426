//! First-boot defaults and the pre-run check every task performs.

use std::path::Path;

use anyhow::{bail, Context};
use tracing::{debug, info};

use crate::config::{ConfigResult, ConfigStore};
use crate::crypto::generate_secret;
use crate::store::Store;

/// Config file name inside the persistent directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Debug log file name used when the option is generated.
const LOGS_FILE: &str = "netmon.log";

/// Accounting log file name used when the option is generated.
const ACCOUNTING_FILE: &str = "accounting.log";

fn set_if_missing(config: &ConfigStore, section: &str, option: &str, value: &str) -> ConfigResult<()> {
    let current = config.get(section, option);
    if current.as_deref().is_none_or(str::is_empty) {
        config.set(section, option, value)?;
        info!(section, option, "Config option has been generated");
    }
    Ok(())
}

/// Generate every option a fresh persistent directory needs, including
/// the three authorization/authentication secrets.
pub fn init_config_defaults(config: &ConfigStore, persistent: &Path) -> ConfigResult<()> {
    config.set("public", "version", env!("CARGO_PKG_VERSION"))?;
    set_if_missing(config, "public", "uuid", &uuid::Uuid::new_v4().to_string())?;
    set_if_missing(config, "public", "connectivity_ipv4_bool", "true")?;
    set_if_missing(config, "public", "connectivity_ipv6_bool", "false")?;

    let logs_file = persistent.join(LOGS_FILE);
    set_if_missing(config, "logging", "logs_file", &logs_file.to_string_lossy())?;
    set_if_missing(config, "logging", "logs_file_level", "debug")?;
    set_if_missing(config, "logging", "console_level", "info")?;
    set_if_missing(config, "logging", "api_max_logs_size_int", "1000000")?;

    let accounting_file = persistent.join(ACCOUNTING_FILE);
    set_if_missing(
        config,
        "accounting",
        "logs_file",
        &accounting_file.to_string_lossy(),
    )?;

    set_if_missing(config, "authentication", "password", &generate_secret())?;
    set_if_missing(config, "authentication", "token_key", &generate_secret())?;
    set_if_missing(config, "authentication", "token_validity_int", "3600")?;

    set_if_missing(config, "authorization", "root_password", &generate_secret())?;
    set_if_missing(config, "authorization", "new_tests_password", &generate_secret())?;
    set_if_missing(config, "authorization", "request_validity_int", "60")?;
    set_if_missing(config, "authorization", "dev_bypass_bool", "false")?;

    set_if_missing(config, "api", "server_ip", "0.0.0.0")?;
    set_if_missing(config, "api", "server_port", "20001")?;

    set_if_missing(config, "tests", "process_deadline_terminating_int", "60")?;
    set_if_missing(config, "tests", "process_deadline_killing_int", "10")?;

    set_if_missing(config, "cleaner", "interval_int", "600")?;
    set_if_missing(config, "cleaner", "events_int", "86400")?;
    set_if_missing(config, "cleaner", "multi_results_int", "1209600")?;
    set_if_missing(config, "cleaner", "nonces_int", "600")?;
    set_if_missing(config, "cleaner", "old_params_int", "86400")?;
    set_if_missing(config, "cleaner", "orchestrators_int", "1209600")?;
    set_if_missing(config, "cleaner", "requests_int", "86400")?;
    set_if_missing(config, "cleaner", "results_int", "86400")?;
    set_if_missing(config, "cleaner", "runs_int", "86400")?;
    set_if_missing(config, "cleaner", "stats_int", "2592000")?;
    set_if_missing(config, "cleaner", "tests_int", "1209600")?;

    Ok(())
}

/// Checks every task performs before entering its loop. Failures here are
/// global errors: the process must not start.
pub async fn pre_run_check(config: &ConfigStore, store: &Store) -> anyhow::Result<()> {
    // A forgotten nonce inside its validity window would allow a replay.
    let nonce_ttl = config
        .int("cleaner", "nonces_int")
        .context("cleaner.nonces_int is required")?;
    let request_validity = config
        .int("authorization", "request_validity_int")
        .context("authorization.request_validity_int is required")?;
    if nonce_ttl <= request_validity {
        bail!(
            "cleaner.nonces_int ({nonce_ttl}) must be greater than \
             authorization.request_validity_int ({request_validity})"
        );
    }

    store
        .verify_schema()
        .await
        .context("store schema verification failed (run --task init_database first)")?;

    debug!("Pre-run check passed");
    Ok(())
}
