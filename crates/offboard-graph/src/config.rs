//! Connection settings for the Graph client, read from environment variables.

use std::env::VarError;
use std::time::Duration;

use secrecy::SecretString;

use crate::{GraphError, GraphResult};

/// National cloud the tenant lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloudEnvironment {
    /// Global Azure.
    #[default]
    Commercial,
    /// Azure US Government (GCC High / DoD).
    UsGovernment,
    /// Azure China (21Vianet).
    China,
}

impl CloudEnvironment {
    /// Parse from string value (case-insensitive).
    pub fn from_str_value(s: &str) -> GraphResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "commercial" | "global" | "public" => Ok(Self::Commercial),
            "usgov" | "us_government" | "gcc" => Ok(Self::UsGovernment),
            "china" | "cn" => Ok(Self::China),
            other => Err(GraphError::Config(format!(
                "Unknown cloud environment '{other}'. Valid options: commercial, usgov, china"
            ))),
        }
    }

    /// Graph API host for this cloud.
    #[must_use]
    pub fn graph_endpoint(&self) -> &'static str {
        match self {
            Self::Commercial => "https://graph.microsoft.com",
            Self::UsGovernment => "https://graph.microsoft.us",
            Self::China => "https://microsoftgraph.chinacloudapi.cn",
        }
    }

    /// Login (token) host for this cloud.
    #[must_use]
    pub fn login_endpoint(&self) -> &'static str {
        match self {
            Self::Commercial => "https://login.microsoftonline.com",
            Self::UsGovernment => "https://login.microsoftonline.us",
            Self::China => "https://login.chinacloudapi.cn",
        }
    }
}

/// App-registration credentials for the client-credentials flow.
#[derive(Debug, Clone)]
pub struct GraphCredentials {
    /// Tenant (directory) ID.
    pub tenant_id: String,
    /// Application (client) ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: SecretString,
}

/// Everything needed to build a [`crate::GraphClient`].
///
/// `credentials` is `None` when the integration is intentionally disabled;
/// callers treat that as "unconfigured", not as an error.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub credentials: Option<GraphCredentials>,
    pub cloud: CloudEnvironment,
    /// Overrides the cloud's Graph host (tests, proxies).
    pub graph_endpoint: Option<String>,
    /// Overrides the cloud's login host.
    pub login_endpoint: Option<String>,
    pub api_version: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub service_principal_cache_ttl: Duration,
    pub service_principal_cache_capacity: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            credentials: None,
            cloud: CloudEnvironment::Commercial,
            graph_endpoint: None,
            login_endpoint: None,
            api_version: "v1.0".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 5,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(300),
            service_principal_cache_ttl: Duration::from_secs(600),
            service_principal_cache_capacity: 512,
        }
    }
}

impl GraphSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> GraphResult<Self> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load settings from a custom variable reader, so tests never touch
    /// process-global environment state.
    pub fn from_reader<F>(reader: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let defaults = Self::default();

        let credentials = match (
            reader("OFFBOARD_TENANT_ID"),
            reader("OFFBOARD_CLIENT_ID"),
            reader("OFFBOARD_CLIENT_SECRET"),
        ) {
            (Ok(tenant_id), Ok(client_id), Ok(secret))
                if !tenant_id.is_empty() && !client_id.is_empty() && !secret.is_empty() =>
            {
                Some(GraphCredentials {
                    tenant_id,
                    client_id,
                    client_secret: SecretString::from(secret),
                })
            }
            _ => None,
        };

        let cloud = match reader("OFFBOARD_CLOUD") {
            Ok(value) => CloudEnvironment::from_str_value(&value)?,
            Err(_) => CloudEnvironment::Commercial,
        };

        let settings = Self {
            credentials,
            cloud,
            graph_endpoint: reader("OFFBOARD_GRAPH_ENDPOINT").ok(),
            login_endpoint: reader("OFFBOARD_LOGIN_ENDPOINT").ok(),
            api_version: reader("OFFBOARD_API_VERSION").unwrap_or(defaults.api_version),
            request_timeout: Duration::from_secs(parse_or(
                &reader,
                "OFFBOARD_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            max_retries: parse_or(&reader, "OFFBOARD_MAX_RETRIES", defaults.max_retries)?,
            base_retry_delay: defaults.base_retry_delay,
            max_retry_delay: defaults.max_retry_delay,
            service_principal_cache_ttl: Duration::from_secs(parse_or(
                &reader,
                "OFFBOARD_SP_CACHE_TTL_SECS",
                defaults.service_principal_cache_ttl.as_secs(),
            )?),
            service_principal_cache_capacity: parse_or(
                &reader,
                "OFFBOARD_SP_CACHE_CAPACITY",
                defaults.service_principal_cache_capacity,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Settings pointed at a single host for both Graph and login, with
    /// short retry delays. Used by integration tests against a mock server.
    #[must_use]
    pub fn for_endpoint(endpoint: &str, credentials: Option<GraphCredentials>) -> Self {
        Self {
            credentials,
            graph_endpoint: Some(endpoint.to_string()),
            login_endpoint: Some(endpoint.to_string()),
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(10),
            max_retry_delay: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Returns true when credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Effective Graph host.
    #[must_use]
    pub fn graph_host(&self) -> &str {
        self.graph_endpoint
            .as_deref()
            .unwrap_or_else(|| self.cloud.graph_endpoint())
            .trim_end_matches('/')
    }

    /// Effective login host.
    #[must_use]
    pub fn login_host(&self) -> &str {
        self.login_endpoint
            .as_deref()
            .unwrap_or_else(|| self.cloud.login_endpoint())
            .trim_end_matches('/')
    }

    /// Base URL for Graph requests, e.g. `https://graph.microsoft.com/v1.0`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.graph_host(), self.api_version)
    }

    /// Validates the settings.
    pub fn validate(&self) -> GraphResult<()> {
        if self.api_version.trim().is_empty() {
            return Err(GraphError::Config("api_version must not be empty".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(GraphError::Config("request_timeout must be > 0".into()));
        }
        if self.max_retry_delay < self.base_retry_delay {
            return Err(GraphError::Config(
                "max_retry_delay must be >= base_retry_delay".into(),
            ));
        }
        if self.service_principal_cache_capacity == 0 {
            return Err(GraphError::Config(
                "service_principal_cache_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(reader: &F, key: &str, default: T) -> GraphResult<T>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| GraphError::Config(format!("invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults_without_credentials() {
        let settings = GraphSettings::from_reader(make_reader(HashMap::new())).unwrap();
        assert!(!settings.is_configured());
        assert_eq!(settings.cloud, CloudEnvironment::Commercial);
        assert_eq!(settings.base_url(), "https://graph.microsoft.com/v1.0");
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_full_credentials_are_configured() {
        let settings = GraphSettings::from_reader(make_reader(HashMap::from([
            ("OFFBOARD_TENANT_ID", "tenant"),
            ("OFFBOARD_CLIENT_ID", "client"),
            ("OFFBOARD_CLIENT_SECRET", "secret"),
            ("OFFBOARD_CLOUD", "usgov"),
        ])))
        .unwrap();
        assert!(settings.is_configured());
        assert_eq!(settings.graph_host(), "https://graph.microsoft.us");
        assert_eq!(settings.login_host(), "https://login.microsoftonline.us");
    }

    #[test]
    fn test_partial_credentials_are_unconfigured() {
        let settings = GraphSettings::from_reader(make_reader(HashMap::from([
            ("OFFBOARD_TENANT_ID", "tenant"),
            ("OFFBOARD_CLIENT_ID", "client"),
        ])))
        .unwrap();
        assert!(!settings.is_configured());
    }

    #[test]
    fn test_endpoint_override_trims_slash() {
        let settings = GraphSettings::from_reader(make_reader(HashMap::from([(
            "OFFBOARD_GRAPH_ENDPOINT",
            "http://localhost:9000/",
        )])))
        .unwrap();
        assert_eq!(settings.base_url(), "http://localhost:9000/v1.0");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(GraphSettings::from_reader(make_reader(HashMap::from([(
            "OFFBOARD_CLOUD",
            "mars"
        )])))
        .is_err());
        assert!(GraphSettings::from_reader(make_reader(HashMap::from([(
            "OFFBOARD_MAX_RETRIES",
            "many"
        )])))
        .is_err());
        assert!(GraphSettings::from_reader(make_reader(HashMap::from([(
            "OFFBOARD_REQUEST_TIMEOUT_SECS",
            "0"
        )])))
        .is_err());
    }

    #[test]
    fn test_cloud_endpoints() {
        assert_eq!(
            CloudEnvironment::China.graph_endpoint(),
            "https://microsoftgraph.chinacloudapi.cn"
        );
        assert_eq!(
            CloudEnvironment::Commercial.login_endpoint(),
            "https://login.microsoftonline.com"
        );
    }
}
