//! Normalize a parsed nmap report into host patches.

use chrono::{DateTime, Utc};

use netscan_core::{HostPatch, HostStatus, Reachability};

use crate::config::{DiscoverConfig, PortProtocol};
use crate::nmap_xml::{NmapHost, NmapRun};

/// One patch per host reported up with an IPv4 address.
///
/// Patches mark the host up and scanned and stamp `now` as last seen.
/// Only open checked ports touch service flags.
pub fn host_patches(run: &NmapRun, config: &DiscoverConfig, now: DateTime<Utc>) -> Vec<HostPatch> {
    run.hosts
        .iter()
        .filter(|h| h.is_up())
        .filter_map(|h| host_patch(h, config, now))
        .collect()
}

fn host_patch(host: &NmapHost, config: &DiscoverConfig, now: DateTime<Utc>) -> Option<HostPatch> {
    let address = host.ipv4()?;
    let mut patch = HostPatch {
        status: Some(HostStatus::Up),
        updated: Some(now),
        scanned: Some(true),
        mac: host.mac().map(str::to_string),
        mac_vendor: host.mac_vendor().map(str::to_string),
        os: host.os_family().map(str::to_string),
        ..HostPatch::new(address)
    };

    if let Some(hostname) = host.hostname() {
        let (name, domain) = split_hostname(hostname);
        patch.name = Some(name.to_string());
        patch.domain = domain.map(str::to_string);
    }

    for (protocol, port) in host.open_ports() {
        let Some(protocol) = PortProtocol::parse(protocol) else {
            tracing::warn!(address, protocol, "Unlisted protocol in nmap report");
            continue;
        };
        if let Some(service) = config.service_for(protocol, port) {
            patch.services.insert(service, Reachability::Reachable);
        }
    }

    Some(patch)
}

/// Split `rig-17.mine.example.com` into `("rig-17", Some("mine.example.com"))`.
pub fn split_hostname(hostname: &str) -> (&str, Option<&str>) {
    match hostname.split_once('.') {
        Some((name, domain)) if !name.is_empty() && !domain.is_empty() => (name, Some(domain)),
        _ => (hostname, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmap_xml::parse_nmap_xml;
    use netscan_core::Service;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap">
  <host>
    <status state="up" reason="syn-ack"/>
    <address addr="10.3.4.5" addrtype="ipv4"/>
    <address addr="00:1B:21:3A:4F:10" addrtype="mac" vendor="Intel Corporate"/>
    <hostnames><hostname name="rig-17.mine.example.com" type="PTR"/></hostnames>
    <ports>
      <port protocol="tcp" portid="22"><state state="open"/></port>
      <port protocol="tcp" portid="80"><state state="open"/></port>
      <port protocol="tcp" portid="8080"><state state="open"/></port>
      <port protocol="tcp" portid="443"><state state="closed"/></port>
    </ports>
    <os>
      <osmatch name="Linux 5.4" accuracy="98">
        <osclass vendor="Linux" osfamily="Linux" accuracy="98"/>
      </osmatch>
    </os>
  </host>
  <host>
    <status state="up" reason="echo-reply"/>
    <address addr="10.3.4.6" addrtype="ipv4"/>
    <hostnames><hostname name="printer" type="PTR"/></hostnames>
  </host>
  <host>
    <status state="down" reason="no-response"/>
    <address addr="10.3.4.7" addrtype="ipv4"/>
  </host>
</nmaprun>"#;

    #[test]
    fn test_host_patches() {
        let run = parse_nmap_xml(REPORT.as_bytes()).unwrap();
        let now = Utc::now();
        let patches = host_patches(&run, &DiscoverConfig::default(), now);
        assert_eq!(patches.len(), 2);

        let rig = &patches[0];
        assert_eq!(rig.address, "10.3.4.5");
        assert_eq!(rig.status, Some(HostStatus::Up));
        assert_eq!(rig.scanned, Some(true));
        assert_eq!(rig.updated, Some(now));
        assert_eq!(rig.name.as_deref(), Some("rig-17"));
        assert_eq!(rig.domain.as_deref(), Some("mine.example.com"));
        assert_eq!(rig.os.as_deref(), Some("Linux"));
        assert_eq!(rig.mac.as_deref(), Some("00:1B:21:3A:4F:10"));
        assert_eq!(rig.mac_vendor.as_deref(), Some("Intel Corporate"));
        assert_eq!(rig.services.get(&Service::Ssh), Some(&Reachability::Reachable));
        assert_eq!(rig.services.get(&Service::Http), Some(&Reachability::Reachable));
        assert!(!rig.services.contains_key(&Service::Https));
        assert_eq!(rig.services.len(), 2);

        let printer = &patches[1];
        assert_eq!(printer.name.as_deref(), Some("printer"));
        assert_eq!(printer.domain, None);
        assert_eq!(printer.os, None);
        assert!(printer.services.is_empty());
    }

    #[test]
    fn test_split_hostname() {
        assert_eq!(split_hostname("a.b.c"), ("a", Some("b.c")));
        assert_eq!(split_hostname("solo"), ("solo", None));
        assert_eq!(split_hostname(".hidden"), (".hidden", None));
        assert_eq!(split_hostname("trailing."), ("trailing.", None));
    }
}
