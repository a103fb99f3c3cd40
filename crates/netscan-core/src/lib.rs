//! netscan-core: Shared inventory model for the netscan discovery workers.
//!
//! This crate provides the types every worker reads and writes:
//! - Host, address-range, subnet-aggregate, and application records
//! - Field-level patches and query predicates
//! - The `InventoryStore` contract and an in-memory implementation
//! - Common error types

pub mod error;
pub mod memory;
pub mod patch;
pub mod predicate;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use patch::{HostPatch, RangePatch};
pub use predicate::HostPredicate;
pub use store::InventoryStore;
pub use types::{
    AddressRange, ApplicationRecord, DeviceType, Host, HostStatus, RangeStatus, Reachability,
    Service, ServiceFlags, SubnetAggregate,
};
