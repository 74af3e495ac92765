//! Default configuration values - single source of truth

/// Default command timeout, in seconds
pub const COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default number of rows per bulk-copy batch
pub const BATCH_SIZE: usize = 5000;

/// Base name of the optional configuration file (`dbconnect.toml`)
pub const CONFIG_FILE: &str = "dbconnect";

/// Prefix of configuration environment variables (`DBCONNECT_*`)
pub const ENV_PREFIX: &str = "DBCONNECT";
