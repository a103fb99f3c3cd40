//! `InventoryStore` implementation over the graph client.

use ipnet::Ipv4Net;

use netscan_core::error::Result;
use netscan_core::{
    AddressRange, ApplicationRecord, Host, HostPatch, HostPredicate, InventoryStore, RangePatch,
    SubnetAggregate,
};

use crate::client::GraphClient;

impl InventoryStore for GraphClient {
    async fn hosts_matching(&self, predicate: &HostPredicate) -> Result<Vec<Host>> {
        Ok(self.find_hosts(predicate).await?)
    }

    async fn get_host(&self, address: &str) -> Result<Option<Host>> {
        Ok(self.find_host(address).await?)
    }

    async fn upsert_host(&self, patch: &HostPatch) -> Result<()> {
        Ok(self.merge_host(patch).await?)
    }

    async fn update_host(&self, patch: &HostPatch) -> Result<bool> {
        Ok(self.set_host(patch).await?)
    }

    async fn delete_host(&self, address: &str) -> Result<bool> {
        Ok(self.remove_host(address).await?)
    }

    async fn new_ranges(&self) -> Result<Vec<AddressRange>> {
        Ok(self.find_new_ranges().await?)
    }

    async fn schedulable_ranges(&self) -> Result<Vec<AddressRange>> {
        Ok(self.find_schedulable_ranges().await?)
    }

    async fn get_range(&self, network: &Ipv4Net) -> Result<Option<AddressRange>> {
        Ok(self.find_range(network).await?)
    }

    async fn upsert_range(&self, patch: &RangePatch) -> Result<()> {
        Ok(self.merge_range(patch).await?)
    }

    async fn update_active_range(&self, patch: &RangePatch) -> Result<bool> {
        Ok(self.set_active_range(patch).await?)
    }

    async fn reset_scanning_ranges(&self) -> Result<u64> {
        Ok(self.idle_scanning_ranges().await?)
    }

    async fn record_subnet_hosts(&self, network: &Ipv4Net, hosts: u32) -> Result<()> {
        Ok(self.merge_subnet_hosts(network, hosts).await?)
    }

    async fn record_subnet_devices(&self, network: &Ipv4Net, devices: u32) -> Result<()> {
        Ok(self.merge_subnet_devices(network, devices).await?)
    }

    async fn get_subnet(&self, network: &Ipv4Net) -> Result<Option<SubnetAggregate>> {
        Ok(self.find_subnet(network).await?)
    }

    async fn get_application(&self, name: &str) -> Result<Option<ApplicationRecord>> {
        Ok(self.find_application(name).await?)
    }

    async fn record_application(&self, name: &str, pid: u32) -> Result<()> {
        Ok(self.merge_application(name, pid).await?)
    }
}
