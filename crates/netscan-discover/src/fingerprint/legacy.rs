//! Page-scraping transport for the older hardware generation.
//!
//! These devices have no status endpoint. A session is opened by posting the
//! login form (with the token embedded in the login page) and the status page
//! is a table of label/value cells. Scraped labels are mapped onto the same
//! keys the structured endpoint returns so classification is shared.

use regex::Regex;
use serde_json::{Map, Value};

use crate::config::{FingerprintConfig, LegacyConfig};
use crate::error::{DiscoverError, Result};
use crate::fingerprint::classify::StatusResponse;
use crate::fingerprint::transport::{server_header, Credentials, StatusTransport};

/// Status page labels and the status document key each one maps to.
const LABELS: [(&str, &str); 7] = [
    ("product type", "productType"),
    ("up time", "systemUpTime"),
    ("firmware version", "versionID"),
    ("version", "versionID"),
    ("high availability", "highAvailability"),
    ("mac address", "macAddress"),
    ("serial number", "serialNumber"),
];

pub struct LegacyTransport {
    client: reqwest::Client,
    config: LegacyConfig,
    token: Regex,
    cell_pair: Regex,
}

impl LegacyTransport {
    pub fn new(config: &FingerprintConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            config: config.legacy.clone(),
            token: regex(r#"<input[^>]*name="([^"]*token[^"]*)"[^>]*value="([^"]*)""#)?,
            cell_pair: regex(
                r"(?s)<td[^>]*>\s*([^<:]+?)\s*:?\s*</td>\s*<td[^>]*>\s*([^<]*?)\s*</td>",
            )?,
        })
    }

    /// Hidden form token on the login page, as `(field, value)`.
    pub fn login_token(&self, page: &str) -> Option<(String, String)> {
        let caps = self.token.captures(page)?;
        Some((caps[1].to_string(), caps[2].to_string()))
    }

    /// Status page table cells as a status document.
    pub fn status_document(&self, page: &str) -> Map<String, Value> {
        let mut doc = Map::new();
        for caps in self.cell_pair.captures_iter(page) {
            let label = caps[1].trim().to_lowercase();
            let Some((_, key)) = LABELS.iter().find(|(l, _)| *l == label) else {
                continue;
            };
            doc.entry(key.to_string())
                .or_insert_with(|| Value::String(caps[2].trim().to_string()));
        }
        doc
    }
}

impl StatusTransport for LegacyTransport {
    async fn fetch(&self, address: &str, credentials: &Credentials) -> Result<StatusResponse> {
        let base = format!("http://{address}");

        let login = self
            .client
            .get(format!("{base}{}", self.config.login_page))
            .send()
            .await?;
        if !login.status().is_success() {
            return Ok(StatusResponse {
                status: login.status().as_u16(),
                server: server_header(&login),
                body: None,
            });
        }
        let page = login.text().await?;

        let mut form = vec![
            ("username".to_string(), credentials.username.clone()),
            ("password".to_string(), credentials.password.clone()),
        ];
        if let Some(token) = self.login_token(&page) {
            form.push(token);
        }
        self.client
            .post(format!("{base}{}", self.config.login_action))
            .form(&form)
            .send()
            .await?;

        let status_page = self
            .client
            .get(format!("{base}{}", self.config.status_page))
            .send()
            .await?;
        let mut response = StatusResponse {
            status: status_page.status().as_u16(),
            server: server_header(&status_page),
            body: None,
        };
        if response.status == 200 {
            let doc = self.status_document(&status_page.text().await?);
            if !doc.is_empty() {
                response.body = Some(doc);
            }
        }
        Ok(response)
    }
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| DiscoverError::Config(format!("bad pattern {pattern}: {e}")))
}
