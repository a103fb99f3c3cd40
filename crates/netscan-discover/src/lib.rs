//! netscan-discover: discovery workers for the netscan inventory.
//!
//! Probes private address ranges with nmap, keeps host liveness current,
//! fingerprints managed devices over HTTP, and coordinates the three workers
//! through the inventory store.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod nmap_xml;
pub mod refresher;
pub mod report;
pub mod scanner;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DiscoverError, Result};
