//! Turn a status-endpoint response into host field changes.

use serde_json::{Map, Value};

use netscan_core::{DeviceType, HostPatch};

use crate::config::FingerprintConfig;

/// Server header value recorded when the response carries none.
pub const UNKNOWN_SERVER: &str = "UNKNOWN";

/// What a transport brings back from one host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusResponse {
    pub status: u16,
    pub server: Option<String>,
    /// Device status document, when the body was a key/value object.
    pub body: Option<Map<String, Value>>,
}

impl StatusResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_server(mut self, server: &str) -> Self {
        self.server = Some(server.to_string());
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status document keys and the host attribute each one fills.
pub const FIELD_MAP: [(&str, Attribute); 6] = [
    ("productType", Attribute::ProductType),
    ("systemUpTime", Attribute::Uptime),
    ("versionID", Attribute::Version),
    ("highAvailability", Attribute::Ha),
    ("macAddress", Attribute::Mac),
    ("serialNumber", Attribute::SerialNumber),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    ProductType,
    Uptime,
    Version,
    Ha,
    Mac,
    SerialNumber,
}

/// Field changes for one response. Empty when the response says nothing.
///
/// The patch carries no timestamp; the caller stamps `updated` when it
/// writes a non-empty patch.
pub fn classify(address: &str, response: &StatusResponse, config: &FingerprintConfig) -> HostPatch {
    let mut patch = HostPatch::new(address);
    let server = response.server.as_deref().unwrap_or(UNKNOWN_SERVER);

    if matches!(response.status, 200 | 401 | 404) {
        patch.web_server = Some(server.to_string());
    }

    match response.status {
        200 => {
            if let Some(body) = &response.body {
                apply_status_document(&mut patch, body);
                patch.device_type = Some(DeviceType::Confirmed);
            }
        }
        404 => patch.device_type = Some(not_found_type(server, config)),
        _ => {}
    }
    patch
}

/// A missing status endpoint still identifies older firmware by its server header.
fn not_found_type(server: &str, config: &FingerprintConfig) -> DeviceType {
    let legacy = config
        .legacy_server_prefixes
        .iter()
        .any(|p| server.starts_with(p.as_str()))
        || config
            .legacy_server_markers
            .iter()
            .any(|m| server.contains(m.as_str()));
    if legacy {
        return DeviceType::Confirmed;
    }

    if config
        .peripheral_server_prefixes
        .iter()
        .any(|p| server.starts_with(p.as_str()))
    {
        return DeviceType::Peripheral;
    }
    DeviceType::NotApplicable
}

fn apply_status_document(patch: &mut HostPatch, body: &Map<String, Value>) {
    for (key, attribute) in FIELD_MAP {
        let Some(value) = body.get(key) else {
            continue;
        };
        match attribute {
            Attribute::Uptime => patch.uptime = as_int(value),
            Attribute::ProductType => patch.product_type = as_text(value),
            Attribute::Version => patch.version = as_text(value),
            Attribute::Ha => patch.ha = as_text(value),
            Attribute::Mac => patch.mac = as_text(value),
            Attribute::SerialNumber => patch.serial_number = as_text(value),
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn classify_default(response: &StatusResponse) -> HostPatch {
        classify("10.3.4.5", response, &FingerprintConfig::default())
    }

    #[test]
    fn test_status_document_confirms_device() {
        let body = object(json!({
            "productType": "X",
            "versionID": "v1",
            "systemUpTime": 86400,
            "highAvailability": false,
            "macAddress": "00:90:8f:11:22:33",
            "serialNumber": "SN-4411",
            "localTime": "ignored",
        }));
        let response = StatusResponse::new(200).with_server("nginx").with_body(body);
        let patch = classify_default(&response);

        assert_eq!(patch.device_type, Some(DeviceType::Confirmed));
        assert_eq!(patch.product_type.as_deref(), Some("X"));
        assert_eq!(patch.version.as_deref(), Some("v1"));
        assert_eq!(patch.uptime, Some(86400));
        assert_eq!(patch.ha.as_deref(), Some("false"));
        assert_eq!(patch.mac.as_deref(), Some("00:90:8f:11:22:33"));
        assert_eq!(patch.serial_number.as_deref(), Some("SN-4411"));
        assert_eq!(patch.web_server.as_deref(), Some("nginx"));
        assert!(patch.updated.is_none());
    }

    #[test]
    fn test_uptime_accepts_numeric_string() {
        let body = object(json!({"systemUpTime": "1200"}));
        let patch = classify_default(&StatusResponse::new(200).with_body(body));
        assert_eq!(patch.uptime, Some(1200));
        assert_eq!(patch.web_server.as_deref(), Some(UNKNOWN_SERVER));
    }

    #[test]
    fn test_unparseable_ok_only_records_server() {
        let patch = classify_default(&StatusResponse::new(200).with_server("Apache"));
        assert_eq!(patch.device_type, None);
        assert_eq!(patch.web_server.as_deref(), Some("Apache"));
    }

    #[test]
    fn test_not_found_signatures() {
        let cases = [
            ("Allegro-Software-RomPager/3.10", DeviceType::Confirmed),
            ("Allegro-Software-RomPager/3.10a", DeviceType::Confirmed),
            ("Allegro-Software-RomPager/4.01", DeviceType::NotApplicable),
            ("Embedded AudioCodes httpd", DeviceType::Confirmed),
            ("lighttpd/1.4.35", DeviceType::Peripheral),
            ("lighttpd/1.5.0", DeviceType::NotApplicable),
            ("nginx/1.24.0", DeviceType::NotApplicable),
        ];
        for (server, expected) in cases {
            let patch = classify_default(&StatusResponse::new(404).with_server(server));
            assert_eq!(patch.device_type, Some(expected), "server {server}");
            assert_eq!(patch.web_server.as_deref(), Some(server));
            assert!(patch.product_type.is_none());
        }
    }

    #[test]
    fn test_not_found_without_server_header() {
        let patch = classify_default(&StatusResponse::new(404));
        assert_eq!(patch.device_type, Some(DeviceType::NotApplicable));
        assert_eq!(patch.web_server.as_deref(), Some(UNKNOWN_SERVER));
    }

    #[test]
    fn test_unauthorized_records_server_only() {
        let patch = classify_default(&StatusResponse::new(401).with_server("lighttpd/1.4.35"));
        assert_eq!(patch.device_type, None);
        assert_eq!(patch.web_server.as_deref(), Some("lighttpd/1.4.35"));
    }

    #[test]
    fn test_other_status_changes_nothing() {
        let patch = classify_default(&StatusResponse::new(500).with_server("nginx"));
        assert!(patch.is_empty());
    }
}
