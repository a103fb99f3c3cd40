//! HTTP transports for the fingerprint prober.

use std::future::Future;

use reqwest::header::SERVER;
use reqwest::Response;
use serde_json::Value;

use netscan_core::Host;

use crate::config::FingerprintConfig;
use crate::error::Result;
use crate::fingerprint::classify::StatusResponse;

/// Login for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// The host's stored login, falling back per field to the configured default.
    pub fn for_host(host: &Host, config: &FingerprintConfig) -> Self {
        let pick = |stored: &str, default: &str| {
            if stored.is_empty() {
                default.to_string()
            } else {
                stored.to_string()
            }
        };
        Self {
            username: pick(&host.username, &config.default_username),
            password: pick(&host.password, &config.default_password),
        }
    }
}

/// Fetches a device's status from one address.
pub trait StatusTransport: Send + Sync {
    fn fetch(
        &self,
        address: &str,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<StatusResponse>> + Send;
}

/// Structured status endpoint: one authenticated GET returning JSON.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    status_path: String,
}

impl RestTransport {
    pub fn new(config: &FingerprintConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            status_path: config.status_path.clone(),
        })
    }

    pub fn url(&self, address: &str) -> String {
        format!("http://{address}{}", self.status_path)
    }
}

impl StatusTransport for RestTransport {
    async fn fetch(&self, address: &str, credentials: &Credentials) -> Result<StatusResponse> {
        let response = self
            .client
            .get(self.url(address))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await?;

        let mut status = StatusResponse {
            status: response.status().as_u16(),
            server: server_header(&response),
            body: None,
        };
        let bytes = response.bytes().await?;
        if status.status == 200 {
            status.body = match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            };
        }
        Ok(status)
    }
}

pub(crate) fn server_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_fall_back_per_field() {
        let config = FingerprintConfig::default();

        let bare = Host::new("10.3.4.5");
        assert_eq!(
            Credentials::for_host(&bare, &config),
            Credentials {
                username: "Admin".to_string(),
                password: "Admin".to_string()
            }
        );

        let stored = Host {
            username: "ops".to_string(),
            ..Host::new("10.3.4.6")
        };
        let creds = Credentials::for_host(&stored, &config);
        assert_eq!(creds.username, "ops");
        assert_eq!(creds.password, "Admin");
    }

    #[test]
    fn test_status_url() {
        let transport = RestTransport::new(&FingerprintConfig::default()).unwrap();
        assert_eq!(transport.url("10.3.4.5"), "http://10.3.4.5/api/v1/status");
    }
}
