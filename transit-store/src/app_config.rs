use serde::Deserialize;
use std::env;

use transit_core::{BookingRules, RolloverPolicy, SequenceScope};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting is skipped when no Redis is configured.
    pub redis: Option<RedisConfig>,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BusinessRules {
    pub rollover_policy: RolloverPolicy,
    pub trip_code_scope: SequenceScope,
    pub ticket_prefix: String,
    pub points_distance_divisor: f64,
    pub license_check_interval_hours: u64,
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        let booking = BookingRules::default();
        Self {
            rollover_policy: booking.rollover_policy,
            trip_code_scope: booking.trip_code_scope,
            ticket_prefix: booking.ticket_prefix,
            points_distance_divisor: booking.points_distance_divisor,
            license_check_interval_hours: 24,
            rate_limit_per_minute: 120,
        }
    }
}

impl BusinessRules {
    pub fn booking_rules(&self) -> BookingRules {
        BookingRules {
            rollover_policy: self.rollover_policy,
            trip_code_scope: self.trip_code_scope,
            ticket_prefix: self.ticket_prefix.clone(),
            points_distance_divisor: self.points_distance_divisor,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from_address: String,
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    pub sender_id: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `TRANSIT__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("TRANSIT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rules_map_onto_booking_rules() {
        let rules = BusinessRules {
            rollover_policy: RolloverPolicy::Strict,
            trip_code_scope: SequenceScope::Daily,
            ticket_prefix: "2MX".to_string(),
            points_distance_divisor: 10.0,
            ..BusinessRules::default()
        };
        let booking = rules.booking_rules();
        assert_eq!(booking.rollover_policy, RolloverPolicy::Strict);
        assert_eq!(booking.trip_code_scope, SequenceScope::Daily);
        assert_eq!(booking.ticket_prefix, "2MX");
        assert_eq!(booking.points_distance_divisor, 10.0);
    }

    #[test]
    fn defaults_match_documented_values() {
        let rules = BusinessRules::default();
        assert_eq!(rules.rollover_policy, RolloverPolicy::Signal);
        assert_eq!(rules.license_check_interval_hours, 24);
        assert_eq!(rules.ticket_prefix, "TKT");
    }
}
