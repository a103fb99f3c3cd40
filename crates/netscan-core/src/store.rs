//! The inventory store contract.
//!
//! The store is the only state shared between workers. Every method is one
//! independently committed operation; there are no multi-record transactions.
//! List results are ordered by record key.

use std::future::Future;

use ipnet::Ipv4Net;

use crate::error::Result;
use crate::patch::{HostPatch, RangePatch};
use crate::predicate::HostPredicate;
use crate::types::{AddressRange, ApplicationRecord, Host, SubnetAggregate};

pub trait InventoryStore: Send + Sync {
    // ── Hosts ────────────────────────────────────────────────────

    fn hosts_matching(
        &self,
        predicate: &HostPredicate,
    ) -> impl Future<Output = Result<Vec<Host>>> + Send;

    fn get_host(&self, address: &str) -> impl Future<Output = Result<Option<Host>>> + Send;

    /// Update the host if it exists, otherwise insert it with defaults for
    /// every field the patch leaves unset. Atomic per host.
    fn upsert_host(&self, patch: &HostPatch) -> impl Future<Output = Result<()>> + Send;

    /// Update an existing host only. Returns `false` when no host matched.
    fn update_host(&self, patch: &HostPatch) -> impl Future<Output = Result<bool>> + Send;

    /// Returns `false` when no host matched.
    fn delete_host(&self, address: &str) -> impl Future<Output = Result<bool>> + Send;

    // ── Address ranges ───────────────────────────────────────────

    /// Ranges never fully scanned, excluding invalid ones.
    fn new_ranges(&self) -> impl Future<Output = Result<Vec<AddressRange>>> + Send;

    /// Every range whose status is not invalid.
    fn schedulable_ranges(&self) -> impl Future<Output = Result<Vec<AddressRange>>> + Send;

    fn get_range(
        &self,
        network: &Ipv4Net,
    ) -> impl Future<Output = Result<Option<AddressRange>>> + Send;

    fn upsert_range(&self, patch: &RangePatch) -> impl Future<Output = Result<()>> + Send;

    /// Update an existing range unless it is invalid. Returns `false` when no
    /// such range matched (deleted, or marked invalid since it was read).
    fn update_active_range(
        &self,
        patch: &RangePatch,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Return ranges left `scanning` by a killed process to `idle`.
    fn reset_scanning_ranges(&self) -> impl Future<Output = Result<u64>> + Send;

    // ── Subnet aggregates ────────────────────────────────────────

    fn record_subnet_hosts(
        &self,
        network: &Ipv4Net,
        hosts: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn record_subnet_devices(
        &self,
        network: &Ipv4Net,
        devices: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_subnet(
        &self,
        network: &Ipv4Net,
    ) -> impl Future<Output = Result<Option<SubnetAggregate>>> + Send;

    // ── Process identities ───────────────────────────────────────

    fn get_application(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ApplicationRecord>>> + Send;

    fn record_application(&self, name: &str, pid: u32) -> impl Future<Output = Result<()>> + Send;
}
