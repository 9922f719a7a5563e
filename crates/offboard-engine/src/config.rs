use crate::error::ConfigError;

/// Engine tuning, independent of the identity-provider connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on concurrent upstream calls within one operation
    /// (grant deletion, display-name lookups, per-user fan-out).
    pub max_concurrency: usize,

    /// Whether discovery reads the sign-in audit log. Needs a premium
    /// licence on the tenant; off by default.
    pub include_sign_ins: bool,

    /// How far back sign-ins are read, in days.
    pub sign_in_lookback_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            include_sign_ins: false,
            sign_in_lookback_days: 30,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let defaults = Self::default();

        let max_concurrency = match reader("OFFBOARD_MAX_CONCURRENCY") {
            Ok(v) => v.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue("OFFBOARD_MAX_CONCURRENCY".into(), e.to_string())
            })?,
            Err(_) => defaults.max_concurrency,
        };
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "OFFBOARD_MAX_CONCURRENCY".into(),
                "must be at least 1".into(),
            ));
        }

        let include_sign_ins = reader("OFFBOARD_INCLUDE_SIGN_INS")
            .unwrap_or_else(|_| "false".to_string())
            .trim()
            .parse::<bool>()
            .unwrap_or(false);

        let sign_in_lookback_days = match reader("OFFBOARD_SIGN_IN_LOOKBACK_DAYS") {
            Ok(v) => v.trim().parse::<i64>().map_err(|e| {
                ConfigError::InvalidValue("OFFBOARD_SIGN_IN_LOOKBACK_DAYS".into(), e.to_string())
            })?,
            Err(_) => defaults.sign_in_lookback_days,
        };
        if sign_in_lookback_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "OFFBOARD_SIGN_IN_LOOKBACK_DAYS".into(),
                "must be positive".into(),
            ));
        }

        Ok(Self {
            max_concurrency,
            include_sign_ins,
            sign_in_lookback_days,
        })
    }
}
