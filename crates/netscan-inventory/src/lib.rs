//! netscan-inventory: Neo4j client implementing the netscan `InventoryStore`.
//!
//! Every write is a single `MERGE` or `MATCH ... SET` statement so that two
//! workers racing on the same key converge on one node (last writer wins).
//! Uniqueness constraints on each key back the `MERGE` atomicity.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
