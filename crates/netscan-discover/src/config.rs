//! Configuration for the netscan discovery workers.
//!
//! Loaded once at startup and cloned into each worker; never mutated after.

use std::time::Duration;

use ipnet::Ipv4Net;
use serde::Deserialize;

use netscan_core::Service;
use netscan_inventory::GraphConfig;

/// Top-level discover configuration.
///
/// Loaded from `netscan.toml` `[discover]` section or
/// `NETSCAN__DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Networks never probed; also passed to nmap as `--exclude`.
    #[serde(default = "default_exclude_networks")]
    pub exclude_networks: Vec<Ipv4Net>,

    /// Ports checked during discovery and the host service flag each one sets.
    #[serde(default = "default_check_ports")]
    pub check_ports: Vec<PortCheck>,

    /// Ranges inserted at startup if they are not in the inventory yet.
    #[serde(default)]
    pub seed_ranges: Vec<Ipv4Net>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub refresher: RefresherConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,
}

/// One checked port and the service flag it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortCheck {
    #[serde(default)]
    pub protocol: PortProtocol,
    pub port: u16,
    pub service: Service,
}

impl PortCheck {
    /// nmap port spec, e.g. `T:22`.
    pub fn nmap_spec(&self) -> String {
        format!("{}:{}", self.protocol.nmap_prefix(), self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
}

impl PortProtocol {
    pub fn nmap_prefix(&self) -> &'static str {
        match self {
            Self::Tcp => "T",
            Self::Udp => "U",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause after every sub-range probe, bounding the probe rate.
    pub sub_range_delay_secs: u64,
    /// Hard timeout of one sub-range nmap run.
    pub probe_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sub_range_delay_secs: 10,
            probe_timeout_secs: 240,
        }
    }
}

impl SchedulerConfig {
    pub fn sub_range_delay(&self) -> Duration {
        Duration::from_secs(self.sub_range_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefresherConfig {
    /// Hosts per liveness probe.
    pub burst_size: usize,
    pub burst_delay_secs: u64,
    /// Pause between full refresh passes.
    pub pass_delay_secs: u64,
    /// Pause between per-host status writes.
    pub write_delay_ms: u64,
    pub probe_timeout_secs: u64,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            burst_size: 5,
            burst_delay_secs: 4,
            pass_delay_secs: 60,
            write_delay_ms: 100,
            probe_timeout_secs: 200,
        }
    }
}

impl RefresherConfig {
    pub fn burst_delay(&self) -> Duration {
        Duration::from_secs(self.burst_delay_secs)
    }

    pub fn pass_delay(&self) -> Duration {
        Duration::from_secs(self.pass_delay_secs)
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Concurrent probes per batch.
    pub batch_size: usize,
    pub cycle_delay_secs: u64,
    pub request_timeout_secs: u64,
    /// Path of the structured status endpoint.
    pub status_path: String,
    pub default_username: String,
    pub default_password: String,
    /// OS families never fingerprinted (appliances known not to be targets).
    pub excluded_os: Vec<String>,
    /// `Server` header prefixes of legacy-firmware devices.
    pub legacy_server_prefixes: Vec<String>,
    /// `Server` header substrings of legacy-firmware devices.
    pub legacy_server_markers: Vec<String>,
    /// `Server` header prefixes of companion peripherals.
    pub peripheral_server_prefixes: Vec<String>,
    pub legacy: LegacyConfig,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            cycle_delay_secs: 1200,
            request_timeout_secs: 10,
            status_path: "/api/v1/status".to_string(),
            default_username: "Admin".to_string(),
            default_password: "Admin".to_string(),
            excluded_os: [
                "Windows",
                "JUNOS",
                "iLO",
                "ESXi",
                "FreeBSD",
                "OpenBSD",
                "Data ONTAP",
                "IOS",
                "AOS",
                "FreeNAS",
                "Android",
                "DESQview/X",
                "Solaris",
                "CyanogenMod",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            legacy_server_prefixes: vec!["Allegro-Software-RomPager/3.10".to_string()],
            legacy_server_markers: vec!["AudioCodes".to_string()],
            peripheral_server_prefixes: vec!["lighttpd/1.4.".to_string()],
            legacy: LegacyConfig::default(),
        }
    }
}

impl FingerprintConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.cycle_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Page-scraping path for the older hardware generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub enabled: bool,
    /// Page carrying the login form and its session token.
    pub login_page: String,
    /// Form action the credentials are posted to.
    pub login_action: String,
    /// Page listing device attributes as label/value table cells.
    pub status_page: String,
    /// Pause after every host; the legacy path is fully sequential.
    pub host_delay_secs: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login_page: "/".to_string(),
            login_action: "/login".to_string(),
            status_page: "/status.html".to_string(),
            host_delay_secs: 5,
        }
    }
}

impl LegacyConfig {
    pub fn host_delay(&self) -> Duration {
        Duration::from_secs(self.host_delay_secs)
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_exclude_networks() -> Vec<Ipv4Net> {
    [
        "10.44.0.0/16",
        "10.128.0.0/16",
        "10.255.0.0/16",
        "10.250.0.0/16",
        "10.91.0.0/16",
        "10.191.0.0/16",
        "10.66.0.0/16",
        "10.59.0.0/16",
        "10.22.0.0/16",
    ]
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect()
}

fn default_check_ports() -> Vec<PortCheck> {
    [
        (22, Service::Ssh),
        (80, Service::Http),
        (443, Service::Https),
        (3389, Service::Rdp),
    ]
    .into_iter()
    .map(|(port, service)| PortCheck {
        protocol: PortProtocol::Tcp,
        port,
        service,
    })
    .collect()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            exclude_networks: default_exclude_networks(),
            check_ports: default_check_ports(),
            seed_ranges: Vec::new(),
            scheduler: SchedulerConfig::default(),
            refresher: RefresherConfig::default(),
            fingerprint: FingerprintConfig::default(),
        }
    }
}

impl DiscoverConfig {
    /// True when the network lies entirely inside a configured exclusion.
    pub fn is_excluded(&self, network: &Ipv4Net) -> bool {
        self.exclude_networks.iter().any(|ex| ex.contains(network))
    }

    /// Service flag set by an open port, if that port is checked.
    pub fn service_for(&self, protocol: PortProtocol, port: u16) -> Option<Service> {
        self.check_ports
            .iter()
            .find(|c| c.protocol == protocol && c.port == port)
            .map(|c| c.service)
    }
}

/// Everything the binary reads from the config file.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub discover: DiscoverConfig,
    pub neo4j: GraphConfig,
}

/// Load settings from `<file_prefix>.toml` (optional) and `NETSCAN__*` env vars.
///
/// Missing sections fall back to defaults; malformed ones are errors.
pub fn load_settings(file_prefix: &str) -> Result<Settings, config::ConfigError> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NETSCAN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(Settings {
        discover: section(&cfg, "discover")?,
        neo4j: section(&cfg, "neo4j")?,
    })
}

fn section<T>(cfg: &config::Config, key: &str) -> Result<T, config::ConfigError>
where
    T: Default + serde::de::DeserializeOwned,
{
    match cfg.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}
