//! Liveness refresher.
//!
//! Re-pings every known host in small bursts. A host is dead when it was a
//! target of some burst in the pass and no burst saw it answer. Dead hosts
//! nobody has claimed are retired on the spot.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use ipnet::Ipv4Net;

use netscan_core::{DeviceType, Host, HostPatch, HostPredicate, HostStatus, InventoryStore};

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::scanner::{ProbeEngine, ProbeMode, ProbeRequest};
use crate::scheduler::probe_sub_range;

/// Counts from one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub targets: usize,
    pub alive: usize,
    pub dead: usize,
    pub deleted: usize,
}

pub struct Refresher<S, P> {
    config: DiscoverConfig,
    store: S,
    engine: Arc<P>,
}

impl<S, P> Refresher<S, P>
where
    S: InventoryStore,
    P: ProbeEngine,
{
    pub fn new(config: DiscoverConfig, store: S, engine: Arc<P>) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }

    /// Refresh forever. A failed pass is logged and retried after the pass delay.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.run_pass().await {
                Ok(summary) => tracing::info!(
                    targets = summary.targets,
                    alive = summary.alive,
                    dead = summary.dead,
                    deleted = summary.deleted,
                    "Refresh pass complete"
                ),
                Err(e) => tracing::error!(error = %e, "Refresh pass failed"),
            }
            tokio::time::sleep(self.config.refresher.pass_delay()).await;
        }
    }

    pub async fn run_pass(&self) -> Result<RefreshSummary> {
        let hosts = self
            .store
            .hosts_matching(&HostPredicate::StatusIn(vec![HostStatus::Up, HostStatus::Down]))
            .await?;
        tracing::info!(hosts = hosts.len(), "Start refresh pass");

        let was_up: HashSet<&str> = hosts
            .iter()
            .filter(|h| h.status == HostStatus::Up)
            .map(|h| h.address.as_str())
            .collect();

        let mut targets = BTreeSet::new();
        let mut alive = HashSet::new();
        for burst in hosts.chunks(self.config.refresher.burst_size.max(1)) {
            self.probe_never_scanned().await?;

            let addresses: Vec<String> = burst.iter().map(|h| h.address.clone()).collect();
            targets.extend(addresses.iter().cloned());
            alive.extend(self.probe_burst(addresses).await);

            tokio::time::sleep(self.config.refresher.burst_delay()).await;
        }

        let now = Utc::now();
        let mut summary = RefreshSummary {
            targets: targets.len(),
            ..Default::default()
        };
        for address in &targets {
            let up = alive.contains(address);
            let mut patch = HostPatch {
                status: Some(if up { HostStatus::Up } else { HostStatus::Down }),
                updated: Some(now),
                ..HostPatch::new(address.clone())
            };
            if up {
                summary.alive += 1;
            } else {
                summary.dead += 1;
                if was_up.contains(address.as_str()) {
                    patch.down_at = Some(now);
                }
            }

            match self.store.update_host(&patch).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(address = %address, "Host removed during pass");
                    continue;
                }
                Err(e) => {
                    tracing::error!(address = %address, error = %e, "Failed to write host status");
                    continue;
                }
            }
            tokio::time::sleep(self.config.refresher.write_delay()).await;

            if !up && self.retire(address).await? {
                summary.deleted += 1;
            }
        }

        tracing::info!(dead = summary.dead, targets = summary.targets, "Found dead hosts");
        Ok(summary)
    }

    /// Give hosts added without a discovery probe their first full probe.
    async fn probe_never_scanned(&self) -> Result<()> {
        let pending = self.store.hosts_matching(&HostPredicate::NeverScanned).await?;
        for host in pending {
            let Some(target) = host_network(&host) else {
                tracing::warn!(address = %host.address, "Host address is not IPv4");
                continue;
            };
            probe_sub_range(&self.store, &*self.engine, &self.config, target).await;

            let scanned = HostPatch {
                scanned: Some(true),
                ..HostPatch::new(host.address.clone())
            };
            if let Err(e) = self.store.update_host(&scanned).await {
                tracing::error!(address = %host.address, error = %e, "Failed to mark host scanned");
            }
        }
        Ok(())
    }

    /// Addresses that answered. A failed or timed-out probe answers nothing.
    async fn probe_burst(&self, addresses: Vec<String>) -> Vec<String> {
        let request = ProbeRequest::new(
            ProbeMode::Liveness,
            addresses,
            self.config.refresher.probe_timeout(),
        );
        match self.engine.probe(&request).await {
            Ok(run) => run
                .hosts
                .iter()
                .filter(|h| h.is_up())
                .filter_map(|h| h.ipv4().map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::error!(hosts = request.targets.len(), error = %e, "Failed to get hosts status");
                Vec::new()
            }
        }
    }

    /// Apply the retirement policy to a down host. Returns whether it was deleted.
    async fn retire(&self, address: &str) -> Result<bool> {
        let Some(host) = self.store.get_host(address).await? else {
            return Ok(false);
        };

        if host.is_unidentified() {
            tracing::info!(address, "Deleting dead host with no owner or classification");
            return Ok(self.store.delete_host(address).await?);
        }

        if host.name.is_empty() {
            return Ok(false);
        }

        let namesakes = self
            .store
            .hosts_matching(&HostPredicate::SharedIdentity {
                name: host.name.clone(),
                domain: host.domain.clone(),
                exclude_type: DeviceType::Confirmed,
            })
            .await?;
        if namesakes.len() > 1 {
            tracing::info!(
                address,
                name = %host.name,
                domain = %host.domain,
                namesakes = namesakes.len(),
                "Deleting dead host whose name moved to another address"
            );
            return Ok(self.store.delete_host(address).await?);
        }
        Ok(false)
    }
}

fn host_network(host: &Host) -> Option<Ipv4Net> {
    let addr = host.address.parse().ok()?;
    Ipv4Net::new(addr, 32).ok()
}
