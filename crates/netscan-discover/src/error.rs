//! Error types for the netscan-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Nmap probe of {target} timed out after {secs}s")]
    ProbeTimeout { target: String, secs: u64 },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("No address ranges to scan")]
    NothingToScan,

    #[error("Process {name} already running with pid {pid}")]
    AlreadyRunning { name: String, pid: u32 },

    #[error("Worker {0} stopped")]
    WorkerStopped(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] netscan_core::StoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
