//! Host selection predicates.
//!
//! Workers describe which hosts they need with a predicate value rather than
//! a query string. Every predicate can be evaluated in memory; backends
//! translate it into their own parameterized query.

use crate::types::{DeviceType, Host, HostStatus, Reachability, Service};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPredicate {
    /// Hosts whose status is any of the listed values.
    StatusIn(Vec<HostStatus>),

    /// Hosts that never received a full discovery probe.
    NeverScanned,

    /// Hosts sharing a display name and domain, minus one device type.
    SharedIdentity {
        name: String,
        domain: String,
        exclude_type: DeviceType,
    },

    /// Unclassified up hosts serving the web service on a non-excluded OS,
    /// plus every host already classified as the target type.
    FingerprintCandidates {
        web_service: Service,
        excluded_os: Vec<String>,
        target: DeviceType,
    },

    /// Target-type hosts whose web server header starts with a legacy signature.
    LegacyCandidates {
        target: DeviceType,
        signatures: Vec<String>,
    },
}

impl HostPredicate {
    pub fn matches(&self, host: &Host) -> bool {
        match self {
            Self::StatusIn(statuses) => statuses.contains(&host.status),
            Self::NeverScanned => !host.scanned,
            Self::SharedIdentity {
                name,
                domain,
                exclude_type,
            } => host.name == *name && host.domain == *domain && host.device_type != *exclude_type,
            Self::FingerprintCandidates {
                web_service,
                excluded_os,
                target,
            } => {
                let fresh = host.status == HostStatus::Up
                    && host.services.get(*web_service) == Reachability::Reachable
                    && !excluded_os.iter().any(|os| *os == host.os)
                    && host.device_type.is_unclassified();
                fresh || host.device_type == *target
            }
            Self::LegacyCandidates { target, signatures } => {
                host.device_type == *target
                    && signatures.iter().any(|s| host.web_server.starts_with(s.as_str()))
            }
        }
    }
}
