//! Inventory records shared by the scheduler, refresher, and fingerprint prober.
//!
//! Every record is owned by the inventory store. Workers only hold copies for
//! the duration of one pass and re-read before every decision.

use std::fmt;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::patch::{HostPatch, RangePatch};

// ── Host ──────────────────────────────────────────────────────────

/// A discovered host, keyed by its IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub address: String,
    pub name: String,
    pub domain: String,
    pub os: String,
    pub status: HostStatus,
    /// Last time any worker wrote a probe result for this host.
    pub updated: Option<DateTime<Utc>>,
    /// When the host was first seen down after being up.
    pub down_at: Option<DateTime<Utc>>,
    pub services: ServiceFlags,

    // Operator annotations.
    pub owner: String,
    pub sub_owner: String,
    pub keep: String,
    pub description: String,
    pub location: String,

    // Device classification.
    pub device_type: DeviceType,
    pub product_type: String,
    pub version: String,
    pub uptime: Option<i64>,
    pub ha: String,
    pub mac: String,
    pub mac_vendor: String,
    pub serial_number: String,
    pub username: String,
    pub password: String,
    pub web_server: String,

    pub scanned: bool,
}

impl Host {
    /// A host with every field at its first-insert default.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: String::new(),
            domain: String::new(),
            os: String::new(),
            status: HostStatus::Down,
            updated: None,
            down_at: None,
            services: ServiceFlags::default(),
            owner: String::new(),
            sub_owner: String::new(),
            keep: String::new(),
            description: String::new(),
            location: String::new(),
            device_type: DeviceType::Unclassified,
            product_type: String::new(),
            version: String::new(),
            uptime: None,
            ha: String::new(),
            mac: String::new(),
            mac_vendor: String::new(),
            serial_number: String::new(),
            username: String::new(),
            password: String::new(),
            web_server: String::new(),
            scanned: false,
        }
    }

    /// Build a host the way the store does on first insert: defaults, then the patch.
    pub fn from_patch(patch: &HostPatch) -> Self {
        let mut host = Self::new(patch.address.clone());
        host.apply(patch);
        host
    }

    /// Overwrite every field the patch sets; leave the rest untouched.
    pub fn apply(&mut self, patch: &HostPatch) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut self.name, &patch.name);
        set(&mut self.domain, &patch.domain);
        set(&mut self.os, &patch.os);
        set(&mut self.status, &patch.status);
        if patch.updated.is_some() {
            self.updated = patch.updated;
        }
        if patch.down_at.is_some() {
            self.down_at = patch.down_at;
        }
        for (service, reach) in &patch.services {
            self.services.set(*service, *reach);
        }
        set(&mut self.owner, &patch.owner);
        set(&mut self.sub_owner, &patch.sub_owner);
        set(&mut self.keep, &patch.keep);
        set(&mut self.description, &patch.description);
        set(&mut self.location, &patch.location);
        set(&mut self.device_type, &patch.device_type);
        set(&mut self.product_type, &patch.product_type);
        set(&mut self.version, &patch.version);
        if patch.uptime.is_some() {
            self.uptime = patch.uptime;
        }
        set(&mut self.ha, &patch.ha);
        set(&mut self.mac, &patch.mac);
        set(&mut self.mac_vendor, &patch.mac_vendor);
        set(&mut self.serial_number, &patch.serial_number);
        set(&mut self.username, &patch.username);
        set(&mut self.password, &patch.password);
        set(&mut self.web_server, &patch.web_server);
        set(&mut self.scanned, &patch.scanned);
    }

    /// True when no operator or classifier has claimed this host.
    ///
    /// Such a host is deleted as soon as it is seen down.
    pub fn is_unidentified(&self) -> bool {
        self.owner.is_empty()
            && self.sub_owner.is_empty()
            && self.keep.is_empty()
            && self.device_type.is_unclassified()
    }

    /// The /24 this host belongs to.
    pub fn subnet(&self) -> Option<Ipv4Net> {
        let addr = self.address.parse().ok()?;
        Ipv4Net::new(addr, 24).ok().map(|n| n.trunc())
    }
}

/// Liveness as of the last refresh pass. Always exactly one of two values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Up,
    #[default]
    Down,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Services ──────────────────────────────────────────────────────

/// The fixed set of services whose ports are checked on discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Ssh,
    Http,
    Https,
    Rdp,
}

impl Service {
    pub const ALL: [Service; 4] = [Self::Ssh, Self::Http, Self::Https, Self::Rdp];

    /// Field name used for this service's flag in the store.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Http => "http",
            Self::Https => "https",
            Self::Rdp => "rdp",
        }
    }
}

/// Reachability flag of one checked service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reachability {
    #[serde(rename = "ok")]
    Reachable,
    #[default]
    #[serde(rename = "x")]
    NotChecked,
}

impl Reachability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reachable => "ok",
            Self::NotChecked => "x",
        }
    }

    /// Anything other than the reachable marker reads as not checked.
    pub fn parse(s: &str) -> Self {
        if s == "ok" {
            Self::Reachable
        } else {
            Self::NotChecked
        }
    }
}

/// Per-service reachability of a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFlags {
    pub ssh: Reachability,
    pub http: Reachability,
    pub https: Reachability,
    pub rdp: Reachability,
}

impl ServiceFlags {
    pub fn get(&self, service: Service) -> Reachability {
        match service {
            Service::Ssh => self.ssh,
            Service::Http => self.http,
            Service::Https => self.https,
            Service::Rdp => self.rdp,
        }
    }

    pub fn set(&mut self, service: Service, reach: Reachability) {
        let slot = match service {
            Service::Ssh => &mut self.ssh,
            Service::Http => &mut self.http,
            Service::Https => &mut self.https,
            Service::Rdp => &mut self.rdp,
        };
        *slot = reach;
    }
}

// ── Device classification ─────────────────────────────────────────

/// Classification assigned by the fingerprint prober or an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceType {
    #[default]
    Unclassified,
    /// The tracked managed-device kind.
    Confirmed,
    /// Companion peripheral of the tracked kind.
    Peripheral,
    /// Web service answered but is not the tracked kind.
    NotApplicable,
    /// Free-text type entered by an operator.
    Other(String),
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unclassified => "",
            Self::Confirmed => "confirmed",
            Self::Peripheral => "peripheral",
            Self::NotApplicable => "not_applicable",
            Self::Other(s) => s,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Self::Unclassified)
    }
}

impl From<&str> for DeviceType {
    fn from(s: &str) -> Self {
        match s {
            "" => Self::Unclassified,
            "confirmed" => Self::Confirmed,
            "peripheral" => Self::Peripheral,
            "not_applicable" => Self::NotApplicable,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for DeviceType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<DeviceType> for String {
    fn from(t: DeviceType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Address ranges ────────────────────────────────────────────────

/// A coarse address block scheduled as one scan unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub network: Ipv4Net,
    /// Hosts found by the last complete pass.
    pub hosts: u32,
    /// Completion time of the last full pass; `None` marks a new range.
    pub updated: Option<DateTime<Utc>>,
    pub owner: String,
    pub status: RangeStatus,
}

impl AddressRange {
    pub fn new(network: Ipv4Net) -> Self {
        Self {
            network: network.trunc(),
            hosts: 0,
            updated: None,
            owner: String::new(),
            status: RangeStatus::Idle,
        }
    }

    pub fn from_patch(patch: &RangePatch) -> Self {
        let mut range = Self::new(patch.network);
        range.apply(patch);
        range
    }

    pub fn apply(&mut self, patch: &RangePatch) {
        if let Some(hosts) = patch.hosts {
            self.hosts = hosts;
        }
        if patch.updated.is_some() {
            self.updated = patch.updated;
        }
        if let Some(owner) = &patch.owner {
            self.owner = owner.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    pub fn is_new(&self) -> bool {
        self.updated.is_none()
    }
}

/// Scan state of an address range. `Invalid` is absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeStatus {
    #[default]
    Idle,
    Scanning,
    /// Found to be outside private address space; never scheduled again.
    Invalid,
}

impl RangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "scanning" => Some(Self::Scanning),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for RangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Aggregates and bookkeeping ────────────────────────────────────

/// Per-/24 counters: hosts found by discovery and fingerprinted devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetAggregate {
    pub network: Ipv4Net,
    pub hosts: u32,
    pub devices: u32,
}

impl SubnetAggregate {
    pub fn new(network: Ipv4Net) -> Self {
        Self {
            network: network.trunc(),
            hosts: 0,
            devices: 0,
        }
    }
}

/// The last recorded process identity of a logical worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub name: String,
    pub pid: u32,
    pub updated: DateTime<Utc>,
}
