//! Worker launch and duplicate-instance guard.
//!
//! Each worker runs as its own tokio task sharing nothing but the store
//! handle. Before a worker starts, the pid recorded under its name is checked
//! against the OS; a live holder means another instance owns that worker.

use std::ffi::OsString;
use std::future::Future;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::task::JoinSet;

use netscan_core::InventoryStore;

use crate::error::{DiscoverError, Result};

pub const SCHEDULER: &str = "netscan-scheduler";
pub const REFRESHER: &str = "netscan-refresher";
pub const FINGERPRINT: &str = "netscan-fingerprint";

/// OS view of process identities.
pub trait ProcessProbe: Send + Sync {
    fn current_pid(&self) -> u32;

    /// True when `pid` is a running instance of this program.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Process table lookup via `sysinfo`.
pub struct SystemProcesses {
    name: Option<OsString>,
}

impl SystemProcesses {
    pub fn new() -> Self {
        let name = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| process_name(&mut System::new(), pid));
        Self { name }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProcesses {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Some(name) = process_name(&mut System::new(), Pid::from_u32(pid)) else {
            return false;
        };
        // A recycled pid running something else is not a live instance.
        self.name.as_ref().map_or(true, |ours| *ours == name)
    }
}

fn process_name(system: &mut System, pid: Pid) -> Option<OsString> {
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.name().to_os_string())
}

/// Proof that this process holds a worker name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGuard {
    pub name: String,
    pub pid: u32,
}

impl ProcessGuard {
    /// Claim `name` for this process, or fail if a live process holds it.
    pub async fn acquire<S, P>(store: &S, probe: &P, name: &str) -> Result<Self>
    where
        S: InventoryStore,
        P: ProcessProbe,
    {
        let ours = probe.current_pid();
        if let Some(record) = store.get_application(name).await? {
            if record.pid != ours && probe.is_alive(record.pid) {
                tracing::error!(worker = name, pid = record.pid, "Worker already running");
                return Err(DiscoverError::AlreadyRunning {
                    name: name.to_string(),
                    pid: record.pid,
                });
            }
            tracing::info!(worker = name, pid = record.pid, "Recorded worker is not running");
        }

        store.record_application(name, ours).await?;
        tracing::info!(worker = name, pid = ours, "Worker claimed");
        Ok(Self {
            name: name.to_string(),
            pid: ours,
        })
    }
}

/// Runs workers side by side and reports the first one to stop.
pub struct Coordinator<S, P> {
    store: S,
    probe: P,
    workers: JoinSet<(&'static str, Result<()>)>,
    guards: Vec<ProcessGuard>,
}

impl<S, P> Coordinator<S, P>
where
    S: InventoryStore,
    P: ProcessProbe,
{
    pub fn new(store: S, probe: P) -> Self {
        Self {
            store,
            probe,
            workers: JoinSet::new(),
            guards: Vec::new(),
        }
    }

    /// Claim the worker name and start the worker.
    pub async fn spawn<F>(&mut self, name: &'static str, worker: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let guard = ProcessGuard::acquire(&self.store, &self.probe, name).await?;
        self.guards.push(guard);
        self.workers.spawn(async move { (name, worker.await) });
        tracing::info!(worker = name, "Worker started");
        Ok(())
    }

    pub fn guards(&self) -> &[ProcessGuard] {
        &self.guards
    }

    /// Wait for the first worker to end. Workers run forever, so any return
    /// is an error; the remaining workers are aborted on drop.
    pub async fn wait(mut self) -> Result<()> {
        match self.workers.join_next().await {
            None => Ok(()),
            Some(Ok((name, Ok(())))) => {
                tracing::error!(worker = name, "Worker stopped");
                Err(DiscoverError::WorkerStopped(name))
            }
            Some(Ok((name, Err(e)))) => {
                tracing::error!(worker = name, error = %e, "Worker failed");
                Err(e)
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Worker panicked");
                Err(DiscoverError::WorkerStopped("panicked"))
            }
        }
    }
}
