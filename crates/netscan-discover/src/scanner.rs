//! Nmap process wrapper.
//!
//! Runs nmap as a child process via `tokio::process::Command` with the XML
//! report on stdout, under a hard timeout. A timed-out child is killed when
//! its handle drops.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::process::Command;
use uuid::Uuid;

use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapRun};

/// What a probe is for. Each mode maps to a fixed nmap flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Port and OS detection over a sub-range.
    Discovery,
    /// Ping-only reachability check of a host list.
    Liveness,
}

impl ProbeMode {
    /// nmap flags for this mode. `ports` is the comma-joined port spec.
    pub fn nmap_flags(&self, ports: &str) -> Vec<String> {
        let flags: &[&str] = match self {
            Self::Discovery => &[
                "-sT",
                "-O",
                "-PE",
                "--max-rtt-timeout",
                "100ms",
                "--disable-arp-ping",
                "--host-timeout",
                "30s",
            ],
            Self::Liveness => &[
                "-sn",
                "-n",
                "-PE",
                "--max-rtt-timeout",
                "200ms",
                "--disable-arp-ping",
                "--host-timeout",
                "30s",
            ],
        };
        let mut args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        if *self == Self::Discovery && !ports.is_empty() {
            args.push("-p".to_string());
            args.push(ports.to_string());
        }
        args
    }
}

/// One probe invocation.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub mode: ProbeMode,
    /// CIDRs or addresses, passed to nmap as separate targets.
    pub targets: Vec<String>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn new(mode: ProbeMode, targets: Vec<String>, timeout: Duration) -> Self {
        Self {
            mode,
            targets,
            timeout,
        }
    }
}

/// Anything that can turn a probe request into a parsed report.
pub trait ProbeEngine: Send + Sync {
    fn probe(&self, request: &ProbeRequest) -> impl Future<Output = Result<NmapRun>> + Send;
}

/// Wrapper around the nmap binary.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    nmap_path: String,
    /// Comma-joined port spec, e.g. `T:22,T:80`.
    ports: String,
    /// Comma-joined networks for `--exclude`.
    exclude: String,
}

impl NmapScanner {
    pub fn new(nmap_path: &str, ports: &[String], exclude: &[ipnet::Ipv4Net]) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
            ports: ports.join(","),
            exclude: exclude
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        String::from_utf8(output.stdout).map_err(|e| DiscoverError::XmlParse(e.to_string()))
    }

    /// Full argument list for a request, targets last.
    ///
    /// Exclusions bound discovery only; liveness targets are known inventory
    /// hosts and must always get an answer.
    pub fn args(&self, request: &ProbeRequest) -> Vec<String> {
        let mut args = request.mode.nmap_flags(&self.ports);
        if request.mode == ProbeMode::Discovery && !self.exclude.is_empty() {
            args.push("--exclude".to_string());
            args.push(self.exclude.clone());
        }
        args.extend(["-oX", "-", "--noninteractive"].map(String::from));
        args.extend(request.targets.iter().cloned());
        args
    }
}

impl ProbeEngine for NmapScanner {
    async fn probe(&self, request: &ProbeRequest) -> Result<NmapRun> {
        let probe_id = Uuid::new_v4();
        let start = Instant::now();
        let target = request.targets.join(" ");

        tracing::debug!(
            probe_id = %probe_id,
            target = %target,
            mode = ?request.mode,
            "Starting nmap probe"
        );

        let child = Command::new(&self.nmap_path)
            .args(self.args(request))
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(request.timeout, child).await {
            Ok(result) => result.map_err(|e| DiscoverError::NmapNotFound {
                path: format!("{}: {e}", self.nmap_path),
            })?,
            Err(_) => {
                return Err(DiscoverError::ProbeTimeout {
                    target,
                    secs: request.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let run = nmap_xml::parse_nmap_xml(&output.stdout)?;

        tracing::debug!(
            probe_id = %probe_id,
            target = %target,
            hosts_up = run.hosts.iter().filter(|h| h.is_up()).count(),
            duration_ms = start.elapsed().as_millis(),
            "Nmap probe complete"
        );

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> NmapScanner {
        NmapScanner::new(
            "nmap",
            &["T:22".to_string(), "T:80".to_string()],
            &["10.44.0.0/16".parse().unwrap(), "10.128.0.0/16".parse().unwrap()],
        )
    }

    #[test]
    fn test_discovery_args() {
        let request = ProbeRequest::new(
            ProbeMode::Discovery,
            vec!["10.3.4.0/24".to_string()],
            Duration::from_secs(240),
        );
        let args = scanner().args(&request);
        assert_eq!(args[0], "-sT");
        assert!(args.contains(&"-O".to_string()));
        let p = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[p + 1], "T:22,T:80");
        let ex = args.iter().position(|a| a == "--exclude").unwrap();
        assert_eq!(args[ex + 1], "10.44.0.0/16,10.128.0.0/16");
        assert_eq!(args.last().map(String::as_str), Some("10.3.4.0/24"));
    }

    #[test]
    fn test_liveness_args_skip_port_scan() {
        let request = ProbeRequest::new(
            ProbeMode::Liveness,
            vec!["10.3.4.5".to_string(), "10.3.4.6".to_string()],
            Duration::from_secs(200),
        );
        let args = scanner().args(&request);
        assert_eq!(args[0], "-sn");
        assert!(!args.contains(&"-p".to_string()));
        assert!(!args.contains(&"-Pn".to_string()));
        assert!(!args.contains(&"--exclude".to_string()));
        assert_eq!(&args[args.len() - 2..], ["10.3.4.5", "10.3.4.6"]);
    }

    #[test]
    fn test_no_exclude_flag_when_empty() {
        let scanner = NmapScanner::new("nmap", &[], &[]);
        let request = ProbeRequest::new(
            ProbeMode::Discovery,
            vec!["10.0.0.0/24".to_string()],
            Duration::from_secs(1),
        );
        let args = scanner.args(&request);
        assert!(!args.contains(&"--exclude".to_string()));
        assert!(!args.contains(&"-p".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let scanner = NmapScanner::new("/nonexistent/nmap", &[], &[]);
        let request = ProbeRequest::new(
            ProbeMode::Liveness,
            vec!["127.0.0.1".to_string()],
            Duration::from_secs(5),
        );
        let err = scanner.probe(&request).await.unwrap_err();
        assert!(matches!(err, DiscoverError::NmapNotFound { .. }));
    }
}
