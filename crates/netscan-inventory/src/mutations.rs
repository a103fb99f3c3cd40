//! Write operations for the inventory graph.
//!
//! Upserts use `MERGE` on the record key with `ON CREATE SET` for insert
//! defaults, followed by a plain `SET n += $patch`. Record content only ever
//! travels as query parameters.

use chrono::Utc;
use ipnet::Ipv4Net;
use neo4rs::{query, BoltMap, BoltString, BoltType};

use netscan_core::patch::FieldValue;
use netscan_core::{Host, HostPatch, RangePatch, RangeStatus};

use crate::client::{GraphClient, GraphError};

impl GraphClient {
    // ── Hosts ────────────────────────────────────────────────────

    /// Update the host or create it with first-insert defaults.
    pub async fn merge_host(&self, patch: &HostPatch) -> Result<(), GraphError> {
        let defaults = HostPatch::full(&Host::new(patch.address.clone()));

        let q = query(
            "MERGE (n:Host {address: $address})
             ON CREATE SET n += $defaults
             SET n += $patch",
        )
        .param("address", patch.address.clone())
        .param("defaults", props(defaults.fields()))
        .param("patch", props(patch.fields()));

        self.run(q).await
    }

    /// Update an existing host. Returns whether a node matched.
    pub async fn set_host(&self, patch: &HostPatch) -> Result<bool, GraphError> {
        let q = query(
            "MATCH (n:Host {address: $address})
             SET n += $patch
             RETURN count(n) AS updated",
        )
        .param("address", patch.address.clone())
        .param("patch", props(patch.fields()));

        Ok(self.query_count(q, "updated").await? > 0)
    }

    pub async fn remove_host(&self, address: &str) -> Result<bool, GraphError> {
        let q = query(
            "MATCH (n:Host {address: $address})
             WITH n
             DETACH DELETE n
             RETURN count(*) AS deleted",
        )
        .param("address", address.to_string());

        Ok(self.query_count(q, "deleted").await? > 0)
    }

    // ── Address ranges ───────────────────────────────────────────

    pub async fn merge_range(&self, patch: &RangePatch) -> Result<(), GraphError> {
        let defaults = RangePatch {
            hosts: Some(0),
            owner: Some(String::new()),
            status: Some(RangeStatus::Idle),
            ..RangePatch::new(patch.network)
        };

        let q = query(
            "MERGE (n:AddressRange {network: $network})
             ON CREATE SET n += $defaults
             SET n += $patch",
        )
        .param("network", patch.network.to_string())
        .param("defaults", props(defaults.fields()))
        .param("patch", props(patch.fields()));

        self.run(q).await
    }

    /// Update a range that exists and is not invalid. Returns whether one matched.
    pub async fn set_active_range(&self, patch: &RangePatch) -> Result<bool, GraphError> {
        let q = query(
            "MATCH (n:AddressRange {network: $network})
             WHERE n.status <> $invalid
             SET n += $patch
             RETURN count(n) AS updated",
        )
        .param("network", patch.network.to_string())
        .param("invalid", RangeStatus::Invalid.as_str())
        .param("patch", props(patch.fields()));

        Ok(self.query_count(q, "updated").await? > 0)
    }

    /// Move every `scanning` range back to `idle`.
    pub async fn idle_scanning_ranges(&self) -> Result<u64, GraphError> {
        let q = query(
            "MATCH (n:AddressRange {status: $scanning})
             SET n.status = $idle
             RETURN count(n) AS reset",
        )
        .param("scanning", RangeStatus::Scanning.as_str())
        .param("idle", RangeStatus::Idle.as_str());

        Ok(self.query_count(q, "reset").await?.max(0) as u64)
    }

    // ── Subnet aggregates ────────────────────────────────────────

    pub async fn merge_subnet_hosts(&self, network: &Ipv4Net, hosts: u32) -> Result<(), GraphError> {
        self.merge_subnet_counter(network, "hosts", hosts).await
    }

    pub async fn merge_subnet_devices(
        &self,
        network: &Ipv4Net,
        devices: u32,
    ) -> Result<(), GraphError> {
        self.merge_subnet_counter(network, "devices", devices).await
    }

    async fn merge_subnet_counter(
        &self,
        network: &Ipv4Net,
        counter: &'static str,
        value: u32,
    ) -> Result<(), GraphError> {
        let cypher = format!(
            "MERGE (n:Subnet {{network: $network}})
             ON CREATE SET n.hosts = 0, n.devices = 0
             SET n.{counter} = $value"
        );

        let q = query(&cypher)
            .param("network", network.trunc().to_string())
            .param("value", i64::from(value));

        self.run(q).await
    }

    // ── Process identities ───────────────────────────────────────

    pub async fn merge_application(&self, name: &str, pid: u32) -> Result<(), GraphError> {
        let q = query(
            "MERGE (n:Application {name: $name})
             SET n.pid = $pid, n.updated = $now",
        )
        .param("name", name.to_string())
        .param("pid", i64::from(pid))
        .param("now", Utc::now().to_rfc3339());

        self.run(q).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Convert patch fields into a Cypher map parameter.
fn props(fields: Vec<(&'static str, FieldValue)>) -> BoltType {
    let mut map = BoltMap::with_capacity(fields.len());
    for (name, value) in fields {
        map.put(BoltString::from(name), bolt(value));
    }
    BoltType::Map(map)
}

fn bolt(value: FieldValue) -> BoltType {
    match value {
        FieldValue::Text(s) => s.into(),
        FieldValue::Int(i) => i.into(),
        FieldValue::Bool(b) => b.into(),
        FieldValue::Time(ts) => ts.to_rfc3339().into(),
    }
}
