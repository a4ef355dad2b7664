//! Constants for the Pi-hole integration

use std::time::Duration;

pub const DOMAIN: &str = "pi_hole_v6";

pub const CONF_API_KEY: &str = "api_key";
pub const CONF_HOST: &str = "host";
pub const CONF_LOCATION: &str = "location";
pub const CONF_NAME: &str = "name";
pub const CONF_PORT: &str = "port";
pub const CONF_SSL: &str = "ssl";
pub const CONF_VERIFY_SSL: &str = "verify_ssl";

/// Obsolete option still found in entries created by older versions
pub const CONF_STATISTICS_ONLY: &str = "statistics_only";

pub const DEFAULT_LOCATION: &str = "admin";
pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_NAME: &str = "Pi-Hole";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_SSL: bool = false;
pub const DEFAULT_VERIFY_SSL: bool = true;
pub const DEFAULT_STATISTICS_ONLY: bool = true;
pub const DEFAULT_API_KEY: &str = "";

pub const SERVICE_DISABLE: &str = "disable";
pub const SERVICE_DISABLE_ATTR_DURATION: &str = "duration";

pub const MIN_TIME_BETWEEN_UPDATES: Duration = Duration::from_secs(5 * 60);

pub const PERCENTAGE: &str = "%";
