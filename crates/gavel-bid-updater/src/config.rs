//! Configuration read from the environment.

use figment::{
    providers::Env,
    Figment,
};
use serde::{
    Deserialize,
    Serialize,
};

/// The single config for creating a bid updater service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log level for the service.
    pub log: String,
    /// The amount of time in milliseconds shutdown waits for in-flight
    /// completion rounds before abandoning them.
    pub shutdown_grace_period_ms: u64,
}

impl Config {
    const PREFIX: &'static str = "GAVEL_BID_UPDATER_";

    /// Reads the config from `GAVEL_BID_UPDATER_*` environment variables,
    /// with `RUST_LOG` as the fallback for the log level.
    ///
    /// # Errors
    /// Returns an error if a required variable is unset or fails to parse.
    pub fn from_environment() -> Result<Self, figment::Error> {
        Self::with_prefixes(Self::PREFIX, "RUST_")
    }

    fn with_prefixes(prefix: &str, rust_log_prefix: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Env::prefixed(rust_log_prefix).split("_").only(&["log"]))
            .merge(Env::prefixed(prefix))
            .extract()
    }
}
