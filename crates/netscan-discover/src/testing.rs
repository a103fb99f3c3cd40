//! Scripted probe engine shared by the worker tests.

use std::collections::HashSet;
use std::sync::Mutex;

use ipnet::Ipv4Net;

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{Address, HostState, Hostname, Hostnames, NmapHost, NmapRun};
use crate::scanner::{ProbeEngine, ProbeMode, ProbeRequest};

type Hook = Box<dyn Fn(&ProbeRequest) + Send + Sync>;

/// Reports a fixed set of hosts as up, whatever the target.
#[derive(Default)]
pub(crate) struct FakeEngine {
    hosts: Vec<(String, Option<String>)>,
    failing: HashSet<String>,
    calls: Mutex<Vec<ProbeRequest>>,
    hook: Option<Hook>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, address: &str) -> Self {
        self.hosts.push((address.to_string(), None));
        self
    }

    pub fn with_named_host(mut self, address: &str, hostname: &str) -> Self {
        self.hosts
            .push((address.to_string(), Some(hostname.to_string())));
        self
    }

    /// Any request containing this target times out.
    pub fn failing(mut self, target: &str) -> Self {
        self.failing.insert(target.to_string());
        self
    }

    /// Runs before every probe; lets a test change the store mid-pass.
    pub fn on_probe(mut self, hook: impl Fn(&ProbeRequest) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<ProbeRequest> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn targets(&self, mode: ProbeMode) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.mode == mode)
            .flat_map(|c| c.targets)
            .collect()
    }

    fn answers(&self, target: &str, address: &str) -> bool {
        match target.parse::<Ipv4Net>() {
            Ok(net) => address
                .parse::<std::net::Ipv4Addr>()
                .is_ok_and(|a| net.contains(&a)),
            Err(_) => target == address,
        }
    }
}

impl ProbeEngine for FakeEngine {
    async fn probe(&self, request: &ProbeRequest) -> Result<NmapRun> {
        if let Some(hook) = &self.hook {
            hook(request);
        }
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.clone());

        if let Some(target) = request.targets.iter().find(|t| self.failing.contains(*t)) {
            return Err(DiscoverError::ProbeTimeout {
                target: target.clone(),
                secs: request.timeout.as_secs(),
            });
        }

        let hosts = self
            .hosts
            .iter()
            .filter(|(address, _)| request.targets.iter().any(|t| self.answers(t, address)))
            .map(|(address, hostname)| up_host(address, hostname.as_deref()))
            .collect();

        Ok(NmapRun {
            args: None,
            hosts,
            runstats: None,
        })
    }
}

fn up_host(address: &str, hostname: Option<&str>) -> NmapHost {
    NmapHost {
        status: Some(HostState {
            state: "up".to_string(),
        }),
        addresses: vec![Address {
            addr: address.to_string(),
            addr_type: "ipv4".to_string(),
            vendor: None,
        }],
        hostnames: hostname.map(|name| Hostnames {
            hostnames: vec![Hostname {
                name: name.to_string(),
            }],
        }),
        ports: None,
        os: None,
    }
}

/// Defaults with every delay zeroed.
pub(crate) fn fast_config() -> DiscoverConfig {
    let mut config = DiscoverConfig::default();
    config.scheduler.sub_range_delay_secs = 0;
    config.refresher.burst_delay_secs = 0;
    config.refresher.pass_delay_secs = 0;
    config.refresher.write_delay_ms = 0;
    config.fingerprint.cycle_delay_secs = 0;
    config.fingerprint.legacy.host_delay_secs = 0;
    config
}
