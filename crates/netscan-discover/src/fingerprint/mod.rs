//! Fingerprint prober.
//!
//! Queries candidate hosts' HTTP status endpoint in concurrent batches,
//! classifies each response and writes the result back to the host. Counts
//! of confirmed devices per /24 are written after every batch.

pub mod classify;
pub mod legacy;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use ipnet::Ipv4Net;
use tokio::task::JoinSet;

use netscan_core::{DeviceType, Host, HostPatch, HostPredicate, InventoryStore, Service};

use crate::config::DiscoverConfig;
use crate::error::Result;
use classify::{classify, StatusResponse};
use transport::{Credentials, StatusTransport};

/// Counts from one fingerprint cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FingerprintSummary {
    pub candidates: usize,
    pub classified: usize,
    pub confirmed: usize,
    pub failed: usize,
}

pub struct FingerprintProber<S, T, L> {
    config: DiscoverConfig,
    store: S,
    rest: Arc<T>,
    legacy: Arc<L>,
}

impl<S, T, L> FingerprintProber<S, T, L>
where
    S: InventoryStore,
    T: StatusTransport + 'static,
    L: StatusTransport,
{
    pub fn new(config: DiscoverConfig, store: S, rest: Arc<T>, legacy: Arc<L>) -> Self {
        Self {
            config,
            store,
            rest,
            legacy,
        }
    }

    /// Fingerprint forever with a long pause between cycles.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.run_cycle().await {
                Ok(summary) => tracing::info!(
                    candidates = summary.candidates,
                    classified = summary.classified,
                    confirmed = summary.confirmed,
                    failed = summary.failed,
                    "Fingerprint cycle complete"
                ),
                Err(e) => tracing::error!(error = %e, "Fingerprint cycle failed"),
            }
            if self.config.fingerprint.legacy.enabled {
                if let Err(e) = self.run_legacy_pass().await {
                    tracing::error!(error = %e, "Legacy fingerprint pass failed");
                }
            }
            tokio::time::sleep(self.config.fingerprint.cycle_delay()).await;
        }
    }

    pub async fn run_cycle(&self) -> Result<FingerprintSummary> {
        let fp = &self.config.fingerprint;
        let candidates = self
            .store
            .hosts_matching(&HostPredicate::FingerprintCandidates {
                web_service: Service::Http,
                excluded_os: fp.excluded_os.clone(),
                target: DeviceType::Confirmed,
            })
            .await?;
        tracing::info!(candidates = candidates.len(), "Start fingerprint cycle");

        let mut summary = FingerprintSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut devices: BTreeMap<Ipv4Net, u32> = BTreeMap::new();

        for (index, batch) in candidates.chunks(fp.batch_size.max(1)).enumerate() {
            tracing::debug!(batch = index, hosts = batch.len(), "Probing batch");
            for (address, outcome) in self.probe_batch(batch).await {
                let Some(response) = outcome else {
                    summary.failed += 1;
                    continue;
                };
                let patch = classify(&address, &response, fp);
                if self.write(patch, &mut summary).await {
                    if let Some(subnet) = subnet_of(&address) {
                        *devices.entry(subnet).or_default() += 1;
                    }
                }
            }

            for (subnet, count) in &devices {
                if let Err(e) = self.store.record_subnet_devices(subnet, *count).await {
                    tracing::error!(subnet = %subnet, error = %e, "Failed to record device count");
                }
            }
        }
        Ok(summary)
    }

    /// Probe one batch concurrently. `None` marks a failed probe.
    async fn probe_batch(&self, batch: &[Host]) -> Vec<(String, Option<StatusResponse>)> {
        let timeout = self.config.fingerprint.request_timeout();
        let mut set = JoinSet::new();
        for host in batch {
            let transport = Arc::clone(&self.rest);
            let address = host.address.clone();
            let credentials = Credentials::for_host(host, &self.config.fingerprint);
            set.spawn(async move {
                let fetched = tokio::time::timeout(timeout, transport.fetch(&address, &credentials));
                let outcome = match fetched.await {
                    Ok(Ok(response)) => Some(response),
                    Ok(Err(e)) => {
                        tracing::debug!(address = %address, error = %e, "Status probe failed");
                        None
                    }
                    Err(_) => {
                        tracing::debug!(address = %address, "Status probe timed out");
                        None
                    }
                };
                (address, outcome)
            });
        }

        let mut results = Vec::with_capacity(batch.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "Status probe task panicked"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Write a classification. Returns whether it confirmed a device.
    async fn write(&self, mut patch: HostPatch, summary: &mut FingerprintSummary) -> bool {
        if patch.is_empty() {
            tracing::info!(address = %patch.address, "Response did not classify the host");
            return false;
        }
        let confirmed = patch.device_type == Some(DeviceType::Confirmed);
        patch.updated = Some(Utc::now());

        match self.store.update_host(&patch).await {
            Ok(true) => {
                summary.classified += 1;
                if confirmed {
                    summary.confirmed += 1;
                    tracing::info!(
                        address = %patch.address,
                        found = summary.confirmed,
                        "Confirmed device"
                    );
                }
                confirmed
            }
            Ok(false) => {
                tracing::error!(address = %patch.address, "Failed to update host: no such host");
                false
            }
            Err(e) => {
                tracing::error!(address = %patch.address, error = %e, "Failed to update host");
                false
            }
        }
    }

    /// Sequential scrape of legacy-firmware devices, one host at a time.
    ///
    /// These hosts were already counted when their 404 classified them, so
    /// the pass refreshes attributes without touching the device counts.
    pub async fn run_legacy_pass(&self) -> Result<FingerprintSummary> {
        let fp = &self.config.fingerprint;
        let hosts = self
            .store
            .hosts_matching(&HostPredicate::LegacyCandidates {
                target: DeviceType::Confirmed,
                signatures: fp.legacy_server_prefixes.clone(),
            })
            .await?;
        tracing::info!(candidates = hosts.len(), "Start legacy fingerprint pass");

        let mut summary = FingerprintSummary {
            candidates: hosts.len(),
            ..Default::default()
        };
        for host in &hosts {
            let credentials = Credentials::for_host(host, fp);
            let fetch = self.legacy.fetch(&host.address, &credentials);
            match tokio::time::timeout(fp.request_timeout(), fetch).await {
                Ok(Ok(response)) => {
                    let patch = classify(&host.address, &response, fp);
                    self.write(patch, &mut summary).await;
                }
                Ok(Err(e)) => {
                    summary.failed += 1;
                    tracing::debug!(address = %host.address, error = %e, "Legacy probe failed");
                }
                Err(_) => {
                    summary.failed += 1;
                    tracing::debug!(address = %host.address, "Legacy probe timed out");
                }
            }
            tokio::time::sleep(fp.legacy.host_delay()).await;
        }
        Ok(summary)
    }
}

fn subnet_of(address: &str) -> Option<Ipv4Net> {
    Host::new(address).subnet()
}
