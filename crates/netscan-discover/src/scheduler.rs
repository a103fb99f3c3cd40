//! Range scan scheduler.
//!
//! Walks the inventory's address ranges one /24 at a time. Ranges that were
//! never scanned come first, and a range added mid-pass preempts the range
//! in progress at the next sub-range boundary.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;
use ipnet::Ipv4Net;

use netscan_core::{AddressRange, InventoryStore, RangePatch, RangeStatus};

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::report;
use crate::scanner::{ProbeEngine, ProbeMode, ProbeRequest};

/// Smallest unit submitted to the probe engine.
const SUB_RANGE_PREFIX: u8 = 24;

/// RFC 1918 blocks; anything outside them is never probed.
const PRIVATE_BLOCKS: [(Ipv4Addr, u8); 3] = [
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// True when the whole network lies in private address space.
pub fn is_private(network: &Ipv4Net) -> bool {
    PRIVATE_BLOCKS.iter().any(|(addr, len)| {
        Ipv4Net::new(*addr, *len).is_ok_and(|block| block.contains(network))
    })
}

/// The sub-ranges a range is probed as: /24s, or the range itself if smaller.
pub fn sub_ranges(network: &Ipv4Net) -> Vec<Ipv4Net> {
    let prefix = network.prefix_len().max(SUB_RANGE_PREFIX);
    match network.subnets(prefix) {
        Ok(subnets) => subnets.collect(),
        Err(_) => vec![*network],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every range in the work list was scanned; total hosts found.
    Completed { hosts: u32 },
    /// A new range appeared and the pass was abandoned.
    Preempted,
}

enum RangeOutcome {
    Scanned(u32),
    Skipped,
    Preempted,
}

pub struct RangeScheduler<S, P> {
    config: DiscoverConfig,
    store: S,
    engine: Arc<P>,
}

impl<S, P> RangeScheduler<S, P>
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

    /// Recover from a previous crash, seed configured ranges, then scan forever.
    ///
    /// Returns only on a fatal condition.
    pub async fn run(&self) -> Result<()> {
        self.prepare().await?;

        loop {
            match self.run_pass().await? {
                PassOutcome::Completed { hosts } => {
                    tracing::info!(hosts, "Scan pass complete");
                }
                PassOutcome::Preempted => {
                    tracing::info!("Scan pass preempted by new ranges");
                }
            }
        }
    }

    /// Reset ranges left `scanning` and insert missing seed ranges.
    pub async fn prepare(&self) -> Result<()> {
        let reset = self.store.reset_scanning_ranges().await?;
        if reset > 0 {
            tracing::info!(ranges = reset, "Reset ranges left scanning to idle");
        }

        for network in &self.config.seed_ranges {
            if self.store.get_range(network).await?.is_none() {
                tracing::info!(range = %network, "Seeding address range");
                self.store.upsert_range(&RangePatch::new(*network)).await?;
            }
        }
        Ok(())
    }

    /// One pass over the work list.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let new = self.store.new_ranges().await?;
        let work = if new.is_empty() {
            self.store.schedulable_ranges().await?
        } else {
            tracing::info!(ranges = new.len(), "Prioritizing new ranges");
            new
        };

        if work.is_empty() {
            tracing::error!("There are no ranges to scan");
            return Err(DiscoverError::NothingToScan);
        }

        let mut total = 0;
        for range in &work {
            match self.scan_range(range).await? {
                RangeOutcome::Scanned(hosts) => total += hosts,
                RangeOutcome::Skipped => {}
                RangeOutcome::Preempted => return Ok(PassOutcome::Preempted),
            }
        }
        Ok(PassOutcome::Completed { hosts: total })
    }

    async fn scan_range(&self, range: &AddressRange) -> Result<RangeOutcome> {
        let network = range.network;

        if !is_private(&network) {
            tracing::warn!(range = %network, "Range is not private; marking invalid");
            self.store
                .update_active_range(&RangePatch::status(network, RangeStatus::Invalid))
                .await?;
            return Ok(RangeOutcome::Skipped);
        }

        let scanning = RangePatch::status(network, RangeStatus::Scanning);
        if !self.store.update_active_range(&scanning).await? {
            tracing::warn!(range = %network, "Range invalidated or deleted since read; skipping");
            return Ok(RangeOutcome::Skipped);
        }
        tracing::info!(range = %network, "Start scanning range");

        let mut found = 0;
        for sub_range in sub_ranges(&network) {
            if !self.still_active(&network).await? {
                tracing::warn!(
                    range = %network,
                    hosts = found,
                    "Range invalidated or deleted mid-scan; abandoning"
                );
                return Ok(RangeOutcome::Skipped);
            }
            if self.preempted_by_new(&network).await? {
                tracing::info!(range = %network, "New ranges found; abandoning range");
                let idle = RangePatch::status(network, RangeStatus::Idle);
                if !self.store.update_active_range(&idle).await? {
                    tracing::warn!(range = %network, "Range no longer active; status left as is");
                }
                return Ok(RangeOutcome::Preempted);
            }

            found += probe_sub_range(&self.store, &*self.engine, &self.config, sub_range).await;

            tracing::debug!(
                delay_secs = self.config.scheduler.sub_range_delay_secs,
                "Sleeping after sub-range probe"
            );
            tokio::time::sleep(self.config.scheduler.sub_range_delay()).await;
        }

        let done = RangePatch {
            hosts: Some(found),
            updated: Some(Utc::now()),
            status: Some(RangeStatus::Idle),
            ..RangePatch::new(network)
        };
        if !self.store.update_active_range(&done).await? {
            tracing::warn!(
                range = %network,
                hosts = found,
                "Range invalidated or deleted mid-scan; result not recorded"
            );
            return Ok(RangeOutcome::Skipped);
        }
        tracing::info!(range = %network, hosts = found, "Range scan complete");
        Ok(RangeOutcome::Scanned(found))
    }

    async fn still_active(&self, network: &Ipv4Net) -> Result<bool> {
        let range = self.store.get_range(network).await?;
        Ok(range.is_some_and(|r| r.status != RangeStatus::Invalid))
    }

    async fn preempted_by_new(&self, current: &Ipv4Net) -> Result<bool> {
        let new = self.store.new_ranges().await?;
        Ok(!new.is_empty() && !new.iter().any(|r| r.network == *current))
    }
}

/// Discovery-probe one sub-range (or single host) and upsert every host found.
///
/// Returns the number of hosts found. Probe failures, excluded targets and
/// store write failures are logged and count as zero; nothing here is fatal.
pub async fn probe_sub_range<S, P>(
    store: &S,
    engine: &P,
    config: &DiscoverConfig,
    target: Ipv4Net,
) -> u32
where
    S: InventoryStore,
    P: ProbeEngine,
{
    if !is_private(&target) {
        tracing::info!(target = %target, "Target is public; not probing");
        return 0;
    }
    if config.is_excluded(&target) {
        tracing::info!(target = %target, "Target is in an excluded network; not probing");
        return 0;
    }

    let request = ProbeRequest::new(
        ProbeMode::Discovery,
        vec![target.to_string()],
        config.scheduler.probe_timeout(),
    );
    let run = match engine.probe(&request).await {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(target = %target, error = %e, "Failed to enumerate sub-range");
            return 0;
        }
    };

    let patches = report::host_patches(&run, config, Utc::now());
    let mut found = 0;
    for patch in &patches {
        match store.upsert_host(patch).await {
            Ok(()) => found += 1,
            Err(e) => {
                tracing::error!(address = %patch.address, error = %e, "Failed to write host");
            }
        }
    }

    tracing::info!(target = %target, hosts = found, "Sub-range probe complete");

    if found > 0 && target.prefix_len() == SUB_RANGE_PREFIX {
        if let Err(e) = store.record_subnet_hosts(&target, found).await {
            tracing::error!(subnet = %target, error = %e, "Failed to record subnet host count");
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, FakeEngine};
    use netscan_core::{HostStatus, MemoryStore};

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn scheduler(store: &MemoryStore, engine: FakeEngine) -> RangeScheduler<MemoryStore, FakeEngine> {
        RangeScheduler::new(fast_config(), store.clone(), Arc::new(engine))
    }

    #[test]
    fn test_private_blocks() {
        assert!(is_private(&net("10.3.0.0/16")));
        assert!(is_private(&net("172.20.0.0/16")));
        assert!(is_private(&net("192.168.7.0/24")));
        assert!(!is_private(&net("8.8.0.0/16")));
        assert!(!is_private(&net("172.32.0.0/16")));
        // Straddles the 10/8 boundary.
        assert!(!is_private(&net("10.0.0.0/7")));
    }

    #[test]
    fn test_sub_ranges() {
        let subs = sub_ranges(&net("10.3.0.0/16"));
        assert_eq!(subs.len(), 256);
        assert_eq!(subs[0], net("10.3.0.0/24"));
        assert_eq!(subs[255], net("10.3.255.0/24"));

        assert_eq!(sub_ranges(&net("10.3.4.0/24")), vec![net("10.3.4.0/24")]);
        assert_eq!(sub_ranges(&net("10.3.4.0/26")), vec![net("10.3.4.0/26")]);
    }

    #[tokio::test]
    async fn test_new_range_scanned_first() {
        let store = MemoryStore::new();
        let mut aged = AddressRange::new(net("10.1.0.0/22"));
        aged.updated = Some(Utc::now());
        store.put_range(aged);
        store.put_range(AddressRange::new(net("10.3.0.0/22")));

        let engine = FakeEngine::new()
            .with_named_host("10.3.1.5", "rig-1.mine.local")
            .with_host("10.3.2.9");
        let scheduler = scheduler(&store, engine);

        let outcome = scheduler.run_pass().await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed { hosts: 2 });

        let probed = scheduler.engine.targets(ProbeMode::Discovery);
        assert_eq!(
            probed,
            vec!["10.3.0.0/24", "10.3.1.0/24", "10.3.2.0/24", "10.3.3.0/24"]
        );

        let range = store.get_range(&net("10.3.0.0/22")).await.unwrap().unwrap();
        assert_eq!(range.hosts, 2);
        assert_eq!(range.status, RangeStatus::Idle);
        assert!(range.updated.is_some());

        let host = store.get_host("10.3.1.5").await.unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Up);
        assert_eq!(host.name, "rig-1");
        assert_eq!(host.domain, "mine.local");
        assert!(host.scanned);
        assert!(host.updated.is_some());

        let subnet = store.get_subnet(&net("10.3.1.0/24")).await.unwrap().unwrap();
        assert_eq!(subnet.hosts, 1);
        assert!(store.get_subnet(&net("10.3.0.0/24")).await.unwrap().is_none());

        // The aged range was not touched while a new one existed.
        let aged = store.get_range(&net("10.1.0.0/22")).await.unwrap().unwrap();
        assert_eq!(aged.hosts, 0);
    }

    #[tokio::test]
    async fn test_aged_ranges_scanned_when_no_new() {
        let store = MemoryStore::new();
        for s in ["10.1.0.0/24", "10.2.0.0/24"] {
            let mut range = AddressRange::new(net(s));
            range.updated = Some(Utc::now());
            store.put_range(range);
        }
        let scheduler = scheduler(&store, FakeEngine::new());

        let outcome = scheduler.run_pass().await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed { hosts: 0 });
        assert_eq!(
            scheduler.engine.targets(ProbeMode::Discovery),
            vec!["10.1.0.0/24", "10.2.0.0/24"]
        );
    }

    #[tokio::test]
    async fn test_public_range_marked_invalid_and_never_scanned() {
        let store = MemoryStore::new();
        store.put_range(AddressRange::new(net("8.8.0.0/16")));
        store.put_range(AddressRange::new(net("10.9.0.0/24")));
        let scheduler = scheduler(&store, FakeEngine::new());

        scheduler.run_pass().await.unwrap();
        let public = store.get_range(&net("8.8.0.0/16")).await.unwrap().unwrap();
        assert_eq!(public.status, RangeStatus::Invalid);

        scheduler.run_pass().await.unwrap();
        let public = store.get_range(&net("8.8.0.0/16")).await.unwrap().unwrap();
        assert_eq!(public.status, RangeStatus::Invalid);
        assert!(public.updated.is_none());

        let probed = scheduler.engine.targets(ProbeMode::Discovery);
        assert!(probed.iter().all(|t| t.starts_with("10.9.")));
        assert_eq!(probed.len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_scan_is_fatal() {
        let store = MemoryStore::new();
        store.put_range(AddressRange {
            status: RangeStatus::Invalid,
            ..AddressRange::new(net("8.8.0.0/16"))
        });
        let scheduler = scheduler(&store, FakeEngine::new());

        let err = scheduler.run_pass().await.unwrap_err();
        assert!(matches!(err, DiscoverError::NothingToScan));
    }

    #[tokio::test]
    async fn test_new_range_preempts_range_in_progress() {
        let store = MemoryStore::new();
        let mut aged = AddressRange::new(net("10.1.0.0/22"));
        aged.updated = Some(Utc::now());
        store.put_range(aged);

        let injected = store.clone();
        let engine = FakeEngine::new().on_probe(move |request| {
            if request.targets == ["10.1.1.0/24"] {
                injected.put_range(AddressRange::new("10.7.0.0/24".parse().unwrap()));
            }
        });
        let scheduler = scheduler(&store, engine);

        assert_eq!(scheduler.run_pass().await.unwrap(), PassOutcome::Preempted);
        let aged = store.get_range(&net("10.1.0.0/22")).await.unwrap().unwrap();
        assert_eq!(aged.status, RangeStatus::Idle);
        assert_eq!(aged.hosts, 0);

        // Next pass scans the new range before the old one resumes.
        scheduler.run_pass().await.unwrap();
        let probed = scheduler.engine.targets(ProbeMode::Discovery);
        assert_eq!(probed, vec!["10.1.0.0/24", "10.1.1.0/24", "10.7.0.0/24"]);
        let new = store.get_range(&net("10.7.0.0/24")).await.unwrap().unwrap();
        assert!(!new.is_new());
    }

    #[tokio::test]
    async fn test_range_invalidated_mid_scan_stays_invalid() {
        let store = MemoryStore::new();
        store.put_range(AddressRange::new(net("10.3.0.0/23")));

        let operator = store.clone();
        let engine = FakeEngine::new()
            .with_host("10.3.0.7")
            .on_probe(move |request| {
                if request.targets == ["10.3.0.0/24"] {
                    operator.put_range(AddressRange {
                        status: RangeStatus::Invalid,
                        ..AddressRange::new("10.3.0.0/23".parse().unwrap())
                    });
                }
            });
        let scheduler = scheduler(&store, engine);

        let outcome = scheduler.run_pass().await;
        assert!(matches!(outcome, Ok(PassOutcome::Completed { hosts: 0 })));
        let range = store.get_range(&net("10.3.0.0/23")).await.unwrap().unwrap();
        assert_eq!(range.status, RangeStatus::Invalid);
        assert!(range.updated.is_none());
        assert_eq!(scheduler.engine.targets(ProbeMode::Discovery), vec!["10.3.0.0/24"]);

        // Hosts already found stay in the inventory.
        assert!(store.get_host("10.3.0.7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_range_deleted_mid_scan_is_not_recreated() {
        let store = MemoryStore::new();
        store.put_range(AddressRange::new(net("10.3.0.0/24")));

        let operator = store.clone();
        let engine = FakeEngine::new().on_probe(move |_| {
            operator.remove_range(&"10.3.0.0/24".parse().unwrap());
        });
        let scheduler = scheduler(&store, engine);

        scheduler.run_pass().await.unwrap();
        assert!(store.get_range(&net("10.3.0.0/24")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_failure_does_not_abort_range() {
        let store = MemoryStore::new();
        store.put_range(AddressRange::new(net("10.3.0.0/23")));
        let engine = FakeEngine::new()
            .failing("10.3.0.0/24")
            .with_host("10.3.1.1");
        let scheduler = scheduler(&store, engine);

        let outcome = scheduler.run_pass().await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed { hosts: 1 });
        let range = store.get_range(&net("10.3.0.0/23")).await.unwrap().unwrap();
        assert_eq!(range.hosts, 1);
        assert_eq!(range.status, RangeStatus::Idle);
    }

    #[tokio::test]
    async fn test_excluded_sub_ranges_skipped() {
        let store = MemoryStore::new();
        store.put_range(AddressRange::new(net("10.44.0.0/23")));
        let scheduler = scheduler(&store, FakeEngine::new().with_host("10.44.0.1"));

        let outcome = scheduler.run_pass().await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed { hosts: 0 });
        assert!(scheduler.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_resets_and_seeds() {
        let store = MemoryStore::new();
        store.put_range(AddressRange {
            status: RangeStatus::Scanning,
            ..AddressRange::new(net("10.1.0.0/16"))
        });
        let mut config = fast_config();
        config.seed_ranges = vec![net("10.1.0.0/16"), net("10.2.0.0/16")];
        let scheduler = RangeScheduler::new(config, store.clone(), Arc::new(FakeEngine::new()));

        scheduler.prepare().await.unwrap();
        let ranges = store.ranges();
        assert_eq!(ranges.len(), 2);
        assert!(ranges.iter().all(|r| r.status == RangeStatus::Idle));
    }
}
