//! Field-level write sets for hosts and ranges.
//!
//! A patch names its record key and carries `Some` only for the fields the
//! writer wants to change. Stores apply it atomically as "update the row,
//! or insert it with defaults for every unset field".

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;

use crate::types::{DeviceType, Host, HostStatus, RangeStatus, Reachability, Service};

/// A scalar value as stored in one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

/// Changes to one host record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPatch {
    pub address: String,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub os: Option<String>,
    pub status: Option<HostStatus>,
    pub updated: Option<DateTime<Utc>>,
    pub down_at: Option<DateTime<Utc>>,
    pub services: BTreeMap<Service, Reachability>,
    pub owner: Option<String>,
    pub sub_owner: Option<String>,
    pub keep: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub device_type: Option<DeviceType>,
    pub product_type: Option<String>,
    pub version: Option<String>,
    pub uptime: Option<i64>,
    pub ha: Option<String>,
    pub mac: Option<String>,
    pub mac_vendor: Option<String>,
    pub serial_number: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub web_server: Option<String>,
    pub scanned: Option<bool>,
}

impl HostPatch {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// A patch that sets every field to the host's current value.
    pub fn full(host: &Host) -> Self {
        Self {
            address: host.address.clone(),
            name: Some(host.name.clone()),
            domain: Some(host.domain.clone()),
            os: Some(host.os.clone()),
            status: Some(host.status),
            updated: host.updated,
            down_at: host.down_at,
            services: Service::ALL
                .iter()
                .map(|s| (*s, host.services.get(*s)))
                .collect(),
            owner: Some(host.owner.clone()),
            sub_owner: Some(host.sub_owner.clone()),
            keep: Some(host.keep.clone()),
            description: Some(host.description.clone()),
            location: Some(host.location.clone()),
            device_type: Some(host.device_type.clone()),
            product_type: Some(host.product_type.clone()),
            version: Some(host.version.clone()),
            uptime: host.uptime,
            ha: Some(host.ha.clone()),
            mac: Some(host.mac.clone()),
            mac_vendor: Some(host.mac_vendor.clone()),
            serial_number: Some(host.serial_number.clone()),
            username: Some(host.username.clone()),
            password: Some(host.password.clone()),
            web_server: Some(host.web_server.clone()),
            scanned: Some(host.scanned),
        }
    }

    pub fn with_service(mut self, service: Service, reach: Reachability) -> Self {
        self.services.insert(service, reach);
        self
    }

    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// The set fields as `(store field name, value)` pairs, key excluded.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let mut out = Vec::new();
        let mut text = |name: &'static str, v: &Option<String>| {
            if let Some(v) = v {
                out.push((name, FieldValue::Text(v.clone())));
            }
        };
        text("name", &self.name);
        text("domain", &self.domain);
        text("os", &self.os);
        text("owner", &self.owner);
        text("sub_owner", &self.sub_owner);
        text("keep", &self.keep);
        text("description", &self.description);
        text("location", &self.location);
        text("product_type", &self.product_type);
        text("version", &self.version);
        text("ha", &self.ha);
        text("mac", &self.mac);
        text("mac_vendor", &self.mac_vendor);
        text("serial_number", &self.serial_number);
        text("username", &self.username);
        text("password", &self.password);
        text("web_server", &self.web_server);

        if let Some(status) = self.status {
            out.push(("status", FieldValue::Text(status.as_str().to_string())));
        }
        if let Some(t) = &self.device_type {
            out.push(("device_type", FieldValue::Text(t.as_str().to_string())));
        }
        for (service, reach) in &self.services {
            out.push((service.field(), FieldValue::Text(reach.as_str().to_string())));
        }
        if let Some(ts) = self.updated {
            out.push(("updated", FieldValue::Time(ts)));
        }
        if let Some(ts) = self.down_at {
            out.push(("down_at", FieldValue::Time(ts)));
        }
        if let Some(uptime) = self.uptime {
            out.push(("uptime", FieldValue::Int(uptime)));
        }
        if let Some(scanned) = self.scanned {
            out.push(("scanned", FieldValue::Bool(scanned)));
        }
        out
    }
}

/// Changes to one address-range record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePatch {
    pub network: Ipv4Net,
    pub hosts: Option<u32>,
    pub updated: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    pub status: Option<RangeStatus>,
}

impl RangePatch {
    pub fn new(network: Ipv4Net) -> Self {
        Self {
            network: network.trunc(),
            hosts: None,
            updated: None,
            owner: None,
            status: None,
        }
    }

    pub fn status(network: Ipv4Net, status: RangeStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::new(network)
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let mut out = Vec::new();
        if let Some(hosts) = self.hosts {
            out.push(("hosts", FieldValue::Int(i64::from(hosts))));
        }
        if let Some(ts) = self.updated {
            out.push(("updated", FieldValue::Time(ts)));
        }
        if let Some(owner) = &self.owner {
            out.push(("owner", FieldValue::Text(owner.clone())));
        }
        if let Some(status) = self.status {
            out.push(("status", FieldValue::Text(status.as_str().to_string())));
        }
        out
    }
}
