//! Read operations and predicate-to-Cypher translation.

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use neo4rs::{query, BoltType};

use netscan_core::{
    AddressRange, ApplicationRecord, DeviceType, Host, HostPredicate, HostStatus, RangeStatus,
    Reachability, Service, ServiceFlags, SubnetAggregate,
};

use crate::client::{GraphClient, GraphError};

impl GraphClient {
    // ── Hosts ────────────────────────────────────────────────────

    /// All hosts matching the predicate, ordered by address.
    pub async fn find_hosts(&self, predicate: &HostPredicate) -> Result<Vec<Host>, GraphError> {
        let (filter, params) = host_filter(predicate);
        let cypher = format!(
            "MATCH (n:Host)
             WHERE {filter}
             RETURN n
             ORDER BY n.address"
        );

        let mut q = query(&cypher);
        for (key, value) in params {
            q = q.param(key, value);
        }

        let rows = self.query_rows(q).await?;
        let mut hosts = Vec::with_capacity(rows.len());
        for row in rows {
            hosts.push(node_to_host(&row_node(&row)?));
        }
        Ok(hosts)
    }

    pub async fn find_host(&self, address: &str) -> Result<Option<Host>, GraphError> {
        let q = query("MATCH (n:Host {address: $address}) RETURN n")
            .param("address", address.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(node_to_host(&row_node(&row)?))),
            None => Ok(None),
        }
    }

    // ── Address ranges ───────────────────────────────────────────

    pub async fn find_new_ranges(&self) -> Result<Vec<AddressRange>, GraphError> {
        self.find_ranges("n.updated IS NULL AND n.status <> $invalid")
            .await
    }

    pub async fn find_schedulable_ranges(&self) -> Result<Vec<AddressRange>, GraphError> {
        self.find_ranges("n.status <> $invalid").await
    }

    async fn find_ranges(&self, filter: &str) -> Result<Vec<AddressRange>, GraphError> {
        let cypher = format!(
            "MATCH (n:AddressRange)
             WHERE {filter}
             RETURN n"
        );
        let q = query(&cypher).param("invalid", RangeStatus::Invalid.as_str());

        let rows = self.query_rows(q).await?;
        let mut ranges = Vec::with_capacity(rows.len());
        for row in rows {
            let node = row_node(&row)?;
            match node_to_range(&node) {
                Some(range) => ranges.push(range),
                None => {
                    let raw: String = node.get("network").unwrap_or_default();
                    tracing::warn!(network = %raw, "Skipping range with malformed network");
                }
            }
        }
        // Cypher sorts CIDR strings lexically; order numerically instead.
        ranges.sort_by_key(|r| r.network);
        Ok(ranges)
    }

    pub async fn find_range(&self, network: &Ipv4Net) -> Result<Option<AddressRange>, GraphError> {
        let q = query("MATCH (n:AddressRange {network: $network}) RETURN n")
            .param("network", network.trunc().to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(node_to_range(&row_node(&row)?)),
            None => Ok(None),
        }
    }

    // ── Subnet aggregates ────────────────────────────────────────

    pub async fn find_subnet(
        &self,
        network: &Ipv4Net,
    ) -> Result<Option<SubnetAggregate>, GraphError> {
        let net = network.trunc();
        let q = query("MATCH (n:Subnet {network: $network}) RETURN n")
            .param("network", net.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node = row_node(&row)?;
                Ok(Some(SubnetAggregate {
                    network: net,
                    hosts: count_prop(&node, "hosts"),
                    devices: count_prop(&node, "devices"),
                }))
            }
            None => Ok(None),
        }
    }

    // ── Process identities ───────────────────────────────────────

    pub async fn find_application(
        &self,
        name: &str,
    ) -> Result<Option<ApplicationRecord>, GraphError> {
        let q = query("MATCH (n:Application {name: $name}) RETURN n").param("name", name.to_string());

        let Some(row) = self.query_one(q).await? else {
            return Ok(None);
        };
        let node = row_node(&row)?;
        let pid = node.get::<i64>("pid").unwrap_or_default();
        Ok(Some(ApplicationRecord {
            name: name.to_string(),
            pid: u32::try_from(pid).unwrap_or_default(),
            updated: time_prop(&node, "updated").unwrap_or_else(Utc::now),
        }))
    }
}

// ── Predicate translation ────────────────────────────────────────

/// Translate a predicate into a `WHERE` clause over `n` plus its parameters.
///
/// Only enum-derived field names are interpolated; values are parameters.
pub(crate) fn host_filter(predicate: &HostPredicate) -> (String, Vec<(&'static str, BoltType)>) {
    match predicate {
        HostPredicate::StatusIn(statuses) => {
            let values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            ("n.status IN $statuses".to_string(), vec![("statuses", values.into())])
        }
        HostPredicate::NeverScanned => ("coalesce(n.scanned, false) = false".to_string(), vec![]),
        HostPredicate::SharedIdentity {
            name,
            domain,
            exclude_type,
        } => (
            "n.name = $name AND n.domain = $domain AND n.device_type <> $exclude_type".to_string(),
            vec![
                ("name", name.clone().into()),
                ("domain", domain.clone().into()),
                ("exclude_type", exclude_type.as_str().to_string().into()),
            ],
        ),
        HostPredicate::FingerprintCandidates {
            web_service,
            excluded_os,
            target,
        } => (
            format!(
                "(n.status = $up AND n.{web} = $reachable AND NOT n.os IN $excluded_os
                  AND coalesce(n.device_type, '') = $unclassified)
                 OR n.device_type = $target",
                web = web_service.field()
            ),
            vec![
                ("up", HostStatus::Up.as_str().into()),
                ("reachable", Reachability::Reachable.as_str().into()),
                ("excluded_os", excluded_os.clone().into()),
                ("unclassified", DeviceType::Unclassified.as_str().to_string().into()),
                ("target", target.as_str().to_string().into()),
            ],
        ),
        HostPredicate::LegacyCandidates { target, signatures } => (
            "n.device_type = $target
             AND any(sig IN $signatures WHERE n.web_server STARTS WITH sig)"
                .to_string(),
            vec![
                ("target", target.as_str().to_string().into()),
                ("signatures", signatures.clone().into()),
            ],
        ),
    }
}

// ── Node conversion ──────────────────────────────────────────────

fn row_node(row: &neo4rs::Row) -> Result<neo4rs::Node, GraphError> {
    row.get("n")
        .map_err(|e| GraphError::Serialization(format!("Failed to deserialize node: {e}")))
}

fn text_prop(node: &neo4rs::Node, key: &str) -> String {
    node.get::<String>(key).unwrap_or_default()
}

fn time_prop(node: &neo4rs::Node, key: &str) -> Option<DateTime<Utc>> {
    let raw = node.get::<String>(key).ok()?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn count_prop(node: &neo4rs::Node, key: &str) -> u32 {
    node.get::<i64>(key)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or_default()
}

fn node_to_host(node: &neo4rs::Node) -> Host {
    let mut services = ServiceFlags::default();
    for service in Service::ALL {
        services.set(service, Reachability::parse(&text_prop(node, service.field())));
    }

    Host {
        address: text_prop(node, "address"),
        name: text_prop(node, "name"),
        domain: text_prop(node, "domain"),
        os: text_prop(node, "os"),
        status: HostStatus::parse(&text_prop(node, "status")).unwrap_or_default(),
        updated: time_prop(node, "updated"),
        down_at: time_prop(node, "down_at"),
        services,
        owner: text_prop(node, "owner"),
        sub_owner: text_prop(node, "sub_owner"),
        keep: text_prop(node, "keep"),
        description: text_prop(node, "description"),
        location: text_prop(node, "location"),
        device_type: DeviceType::from(text_prop(node, "device_type")),
        product_type: text_prop(node, "product_type"),
        version: text_prop(node, "version"),
        uptime: node.get::<i64>("uptime").ok(),
        ha: text_prop(node, "ha"),
        mac: text_prop(node, "mac"),
        mac_vendor: text_prop(node, "mac_vendor"),
        serial_number: text_prop(node, "serial_number"),
        username: text_prop(node, "username"),
        password: text_prop(node, "password"),
        web_server: text_prop(node, "web_server"),
        scanned: node.get::<bool>("scanned").unwrap_or(false),
    }
}

fn node_to_range(node: &neo4rs::Node) -> Option<AddressRange> {
    let network: Ipv4Net = text_prop(node, "network").parse().ok()?;
    Some(AddressRange {
        network: network.trunc(),
        hosts: count_prop(node, "hosts"),
        updated: time_prop(node, "updated"),
        owner: text_prop(node, "owner"),
        status: RangeStatus::parse(&text_prop(node, "status")).unwrap_or_default(),
    })
}
