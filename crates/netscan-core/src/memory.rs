//! In-process `InventoryStore` used by tests and dry runs.
//!
//! Clones share state, so a test can hand one clone to a worker and inspect
//! or mutate the inventory through another.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use ipnet::Ipv4Net;

use crate::error::Result;
use crate::patch::{HostPatch, RangePatch};
use crate::predicate::HostPredicate;
use crate::store::InventoryStore;
use crate::types::{AddressRange, ApplicationRecord, Host, RangeStatus, SubnetAggregate};

#[derive(Debug, Default)]
struct State {
    hosts: BTreeMap<String, Host>,
    ranges: BTreeMap<Ipv4Net, AddressRange>,
    subnets: BTreeMap<Ipv4Net, SubnetAggregate>,
    applications: HashMap<String, ApplicationRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a complete host record.
    pub fn put_host(&self, host: Host) {
        self.lock().hosts.insert(host.address.clone(), host);
    }

    /// Insert or replace a complete range record.
    pub fn put_range(&self, range: AddressRange) {
        self.lock().ranges.insert(range.network, range);
    }

    pub fn remove_range(&self, network: &Ipv4Net) {
        self.lock().ranges.remove(&network.trunc());
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.lock().hosts.values().cloned().collect()
    }

    pub fn ranges(&self) -> Vec<AddressRange> {
        self.lock().ranges.values().cloned().collect()
    }
}

impl InventoryStore for MemoryStore {
    async fn hosts_matching(&self, predicate: &HostPredicate) -> Result<Vec<Host>> {
        Ok(self
            .lock()
            .hosts
            .values()
            .filter(|h| predicate.matches(h))
            .cloned()
            .collect())
    }

    async fn get_host(&self, address: &str) -> Result<Option<Host>> {
        Ok(self.lock().hosts.get(address).cloned())
    }

    async fn upsert_host(&self, patch: &HostPatch) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.hosts.get_mut(&patch.address) {
            Some(host) => host.apply(patch),
            None => {
                state
                    .hosts
                    .insert(patch.address.clone(), Host::from_patch(patch));
            }
        }
        Ok(())
    }

    async fn update_host(&self, patch: &HostPatch) -> Result<bool> {
        Ok(match self.lock().hosts.get_mut(&patch.address) {
            Some(host) => {
                host.apply(patch);
                true
            }
            None => false,
        })
    }

    async fn delete_host(&self, address: &str) -> Result<bool> {
        Ok(self.lock().hosts.remove(address).is_some())
    }

    async fn new_ranges(&self) -> Result<Vec<AddressRange>> {
        Ok(self
            .lock()
            .ranges
            .values()
            .filter(|r| r.is_new() && r.status != RangeStatus::Invalid)
            .cloned()
            .collect())
    }

    async fn schedulable_ranges(&self) -> Result<Vec<AddressRange>> {
        Ok(self
            .lock()
            .ranges
            .values()
            .filter(|r| r.status != RangeStatus::Invalid)
            .cloned()
            .collect())
    }

    async fn get_range(&self, network: &Ipv4Net) -> Result<Option<AddressRange>> {
        Ok(self.lock().ranges.get(&network.trunc()).cloned())
    }

    async fn upsert_range(&self, patch: &RangePatch) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.ranges.get_mut(&patch.network) {
            Some(range) => range.apply(patch),
            None => {
                state
                    .ranges
                    .insert(patch.network, AddressRange::from_patch(patch));
            }
        }
        Ok(())
    }

    async fn update_active_range(&self, patch: &RangePatch) -> Result<bool> {
        match self.lock().ranges.get_mut(&patch.network) {
            Some(range) if range.status != RangeStatus::Invalid => {
                range.apply(patch);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_scanning_ranges(&self) -> Result<u64> {
        let mut reset = 0;
        for range in self.lock().ranges.values_mut() {
            if range.status == RangeStatus::Scanning {
                range.status = RangeStatus::Idle;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn record_subnet_hosts(&self, network: &Ipv4Net, hosts: u32) -> Result<()> {
        let net = network.trunc();
        self.lock()
            .subnets
            .entry(net)
            .or_insert_with(|| SubnetAggregate::new(net))
            .hosts = hosts;
        Ok(())
    }

    async fn record_subnet_devices(&self, network: &Ipv4Net, devices: u32) -> Result<()> {
        let net = network.trunc();
        self.lock()
            .subnets
            .entry(net)
            .or_insert_with(|| SubnetAggregate::new(net))
            .devices = devices;
        Ok(())
    }

    async fn get_subnet(&self, network: &Ipv4Net) -> Result<Option<SubnetAggregate>> {
        Ok(self.lock().subnets.get(&network.trunc()).cloned())
    }

    async fn get_application(&self, name: &str) -> Result<Option<ApplicationRecord>> {
        Ok(self.lock().applications.get(name).cloned())
    }

    async fn record_application(&self, name: &str, pid: u32) -> Result<()> {
        self.lock().applications.insert(
            name.to_string(),
            ApplicationRecord {
                name: name.to_string(),
                pid,
                updated: Utc::now(),
            },
        );
        Ok(())
    }
}
