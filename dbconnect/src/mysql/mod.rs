//! MySQL implementation for dbconnect

mod connection;
mod cursor;
mod sql;
mod types;

pub use connection::{MySqlConnection, MySqlConnector, MySqlConnectorBuilder};
pub use types::{column_value, from_mysql_value, to_mysql_value};

use crate::config::Settings;
use crate::connection::DbConnect;
use crate::error::Result;

impl DbConnect<MySqlConnector> {
    /// Connect to MySQL with a connection URL and default settings.
    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(MySqlConnector::new(url)?))
    }

    /// Connect with a configured connection string, named or default, and
    /// apply the configured timeout and batch size.
    pub fn from_settings(settings: &Settings, name: Option<&str>) -> Result<Self> {
        let url = settings.connection_string(name)?;
        Ok(Self::new(MySqlConnector::new(url)?).with_settings(settings))
    }
}
