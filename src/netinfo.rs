//! Public address and provider lookup
//!
//! Two small JSON requests: one echoes the caller's public IP, the second
//! describes the network that owns it. Any failure yields placeholder values
//! instead of an error since this information is decorative.

use crate::{
    client::Transport,
    defaults::{DEFAULT_IP_DETAILS_URL, DEFAULT_IP_ECHO_URL, DEFAULT_NETINFO_TIMEOUT},
    error::{AppError, Result},
    logging::Logger,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

const UNKNOWN: &str = "Unknown";
const UNRESOLVED: &str = "Could not determine";

/// Who the measuring host appears as on the internet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip_address: String,
    pub provider: String,
    pub network_name: String,
    /// False when the values are placeholders
    pub resolved: bool,
}

impl NetworkInfo {
    pub fn unresolved() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
            provider: UNRESOLVED.to_string(),
            network_name: UNRESOLVED.to_string(),
            resolved: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpEcho {
    ip: String,
}

#[derive(Debug, Default, Deserialize)]
struct IpDetails {
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    isp: Option<String>,
}

/// Looks up [`NetworkInfo`] through a [`Transport`]
pub struct NetworkInfoLookup {
    transport: Arc<dyn Transport>,
    ip_echo_url: String,
    details_url_template: String,
    timeout: Duration,
    logger: Option<Logger>,
}

impl NetworkInfoLookup {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            ip_echo_url: DEFAULT_IP_ECHO_URL.to_string(),
            details_url_template: DEFAULT_IP_DETAILS_URL.to_string(),
            timeout: DEFAULT_NETINFO_TIMEOUT,
            logger: None,
        }
    }

    /// Use other services. `details_url_template` must contain `{ip}`.
    pub fn with_urls(mut self, ip_echo_url: impl Into<String>, details_url_template: impl Into<String>) -> Self {
        self.ip_echo_url = ip_echo_url.into();
        self.details_url_template = details_url_template.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolve the public address and provider; placeholders on any failure
    pub async fn lookup(&self) -> NetworkInfo {
        let error = match tokio::time::timeout(self.timeout, self.try_lookup()).await {
            Ok(Ok(info)) => return info,
            Ok(Err(e)) => e,
            Err(_) => AppError::timeout(format!("Network info lookup exceeded {:?}", self.timeout)),
        };

        if let Some(logger) = &self.logger {
            logger
                .warn("Could not determine network information")
                .error_info(&error)
                .log()
                .await;
        }
        NetworkInfo::unresolved()
    }

    /// Resolve the public address and provider, surfacing the first failure
    pub async fn try_lookup(&self) -> Result<NetworkInfo> {
        if !self.details_url_template.contains("{ip}") {
            return Err(AppError::config("Details URL template must contain {ip}"));
        }

        let echo = self.transport.fetch_text(&self.ip_echo_url).await?;
        let ip = parse_ip_echo(&echo)?;

        let details_url = self.details_url_template.replace("{ip}", &ip);
        let details = self.transport.fetch_text(&details_url).await?;
        parse_ip_details(&ip, &details)
    }
}

/// Extract the address from an `{"ip": "..."}` document
pub fn parse_ip_echo(body: &str) -> Result<String> {
    let echo: IpEcho = serde_json::from_str(body)?;
    let ip: IpAddr = echo
        .ip
        .trim()
        .parse()
        .map_err(|e| AppError::parse(format!("Invalid IP address '{}': {}", echo.ip, e)))?;

    Ok(ip.to_string())
}

/// Build [`NetworkInfo`] from an address details document.
///
/// The provider is the organisation, else the ISP; the network name is the
/// organisation. Missing fields become "Unknown".
pub fn parse_ip_details(ip: &str, body: &str) -> Result<NetworkInfo> {
    let details: IpDetails = serde_json::from_str(body)?;
    let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let org = non_empty(details.org);
    let isp = non_empty(details.isp);

    Ok(NetworkInfo {
        ip_address: ip.to_string(),
        provider: org.clone().or(isp).unwrap_or_else(|| UNKNOWN.to_string()),
        network_name: org.unwrap_or_else(|| UNKNOWN.to_string()),
        resolved: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::StubTransport;

    const ECHO: &str = "https://echo.test/";
    const DETAILS: &str = "https://details.test/{ip}/json";

    #[test]
    fn test_parse_ip_echo() {
        assert_eq!(parse_ip_echo(r#"{"ip":"203.0.113.7"}"#).unwrap(), "203.0.113.7");
        assert_eq!(parse_ip_echo(r#"{"ip":" 2001:db8::1 "}"#).unwrap(), "2001:db8::1");
        assert!(parse_ip_echo(r#"{"ip":"not-an-ip"}"#).is_err());
        assert!(parse_ip_echo("<html>").is_err());
    }

    #[test]
    fn test_parse_ip_details_prefers_org() {
        let info = parse_ip_details("203.0.113.7", r#"{"org":"Example Net","isp":"Example ISP"}"#).unwrap();
        assert_eq!(info.provider, "Example Net");
        assert_eq!(info.network_name, "Example Net");
        assert!(info.resolved);
    }

    #[test]
    fn test_parse_ip_details_falls_back_to_isp() {
        let info = parse_ip_details("203.0.113.7", r#"{"org":"","isp":"Example ISP"}"#).unwrap();
        assert_eq!(info.provider, "Example ISP");
        assert_eq!(info.network_name, "Unknown");

        let info = parse_ip_details("203.0.113.7", "{}").unwrap();
        assert_eq!(info.provider, "Unknown");
    }

    #[tokio::test]
    async fn test_lookup_resolves() {
        let transport = Arc::new(
            StubTransport::new()
                .text(ECHO, r#"{"ip":"203.0.113.7"}"#)
                .text("https://details.test/203.0.113.7/json", r#"{"org":"Example Net"}"#),
        );

        let info = NetworkInfoLookup::new(transport).with_urls(ECHO, DETAILS).lookup().await;
        assert_eq!(info.ip_address, "203.0.113.7");
        assert_eq!(info.provider, "Example Net");
        assert!(info.resolved);
    }

    #[tokio::test]
    async fn test_lookup_failure_gives_placeholders() {
        let transport = Arc::new(StubTransport::new().text(ECHO, r#"{"ip":"203.0.113.7"}"#));

        let info = NetworkInfoLookup::new(transport).with_urls(ECHO, DETAILS).lookup().await;
        assert_eq!(info, NetworkInfo::unresolved());
        assert_eq!(info.ip_address, "127.0.0.1");
        assert_eq!(info.provider, "Could not determine");
    }

    #[tokio::test]
    async fn test_template_without_placeholder_is_rejected() {
        let transport = Arc::new(StubTransport::new());
        let lookup = NetworkInfoLookup::new(transport).with_urls(ECHO, "https://details.test/json");
        assert!(matches!(lookup.try_lookup().await, Err(AppError::Config(_))));
    }
}
