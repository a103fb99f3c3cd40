//! Nmap XML report deserialization.
//!
//! Probes run nmap with `-oX -`; the report on stdout is deserialized with
//! `quick-xml` + serde into the structs below. Only the elements the
//! inventory uses are modeled; everything else is ignored.

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "@args")]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
    pub runstats: Option<RunStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostState>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<OsReport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
}

impl NmapPort {
    pub fn is_open(&self) -> bool {
        self.state.state == "open"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
}

/// `<os>`: nmap's OS detection guesses, best first.
#[derive(Debug, Clone, Deserialize)]
pub struct OsReport {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "osclass", default)]
    pub classes: Vec<OsClass>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsClass {
    #[serde(rename = "@osfamily")]
    pub family: Option<String>,
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStats {
    pub hosts: Option<RunStatsHosts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStatsHosts {
    #[serde(rename = "@up")]
    pub up: Option<u32>,
    #[serde(rename = "@total")]
    pub total: Option<u32>,
}

impl NmapHost {
    pub fn ipv4(&self) -> Option<&str> {
        self.address_of("ipv4").map(|a| a.addr.as_str())
    }

    pub fn mac(&self) -> Option<&str> {
        self.address_of("mac").map(|a| a.addr.as_str())
    }

    /// Vendor nmap attaches to the MAC address (OUI lookup).
    pub fn mac_vendor(&self) -> Option<&str> {
        self.address_of("mac").and_then(|a| a.vendor.as_deref())
    }

    fn address_of(&self, addr_type: &str) -> Option<&Address> {
        self.addresses.iter().find(|a| a.addr_type == addr_type)
    }

    /// First reverse-DNS name, if any.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()
            .and_then(|hn| hn.hostnames.first())
            .map(|h| h.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// OS family of the best match's first class, e.g. `Linux`.
    pub fn os_family(&self) -> Option<&str> {
        self.os
            .as_ref()
            .and_then(|os| os.matches.first())
            .and_then(|m| m.classes.first())
            .and_then(|c| c.family.as_deref())
    }

    /// Open ports as `(protocol, port)` pairs.
    pub fn open_ports(&self) -> impl Iterator<Item = (&str, u16)> {
        self.ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.is_open())
            .map(|p| (p.protocol.as_str(), p.port_id))
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCOVERY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -O -F -sS -sU -p T:22,T:80,T:443,T:3389 10.3.4.0/24" startstr="Sat Oct 17 10:00:00 2026">
  <host>
    <status state="up" reason="arp-response"/>
    <address addr="10.3.4.5" addrtype="ipv4"/>
    <address addr="00:1B:21:3A:4F:10" addrtype="mac" vendor="Intel Corporate"/>
    <hostnames>
      <hostname name="rig-17.mine.example.com" type="PTR"/>
    </hostnames>
    <ports>
      <extraports state="closed" count="1"/>
      <port protocol="tcp" portid="22">
        <state state="open" reason="syn-ack"/>
        <service name="ssh"/>
      </port>
      <port protocol="tcp" portid="80">
        <state state="open" reason="syn-ack"/>
        <service name="http"/>
      </port>
      <port protocol="tcp" portid="3389">
        <state state="filtered" reason="no-response"/>
      </port>
    </ports>
    <os>
      <portused state="open" proto="tcp" portid="22"/>
      <osmatch name="Linux 4.15 - 5.8" accuracy="96" line="67000">
        <osclass type="general purpose" vendor="Linux" osfamily="Linux" osgen="5.X" accuracy="96"/>
        <osclass type="general purpose" vendor="Linux" osfamily="Linux" osgen="4.X" accuracy="96"/>
      </osmatch>
      <osmatch name="Microsoft Windows 10" accuracy="85" line="70000">
        <osclass type="general purpose" vendor="Microsoft" osfamily="Windows" accuracy="85"/>
      </osmatch>
    </os>
  </host>
  <host>
    <status state="up" reason="echo-reply"/>
    <address addr="10.3.4.9" addrtype="ipv4"/>
  </host>
  <runstats>
    <finished time="1792231200" elapsed="42.10"/>
    <hosts up="2" down="254" total="256"/>
  </runstats>
</nmaprun>"#;

    #[test]
    fn test_parse_discovery_report() {
        let run = parse_nmap_xml(DISCOVERY_XML.as_bytes()).unwrap();
        assert_eq!(run.hosts.len(), 2);

        let rig = &run.hosts[0];
        assert!(rig.is_up());
        assert_eq!(rig.ipv4(), Some("10.3.4.5"));
        assert_eq!(rig.mac(), Some("00:1B:21:3A:4F:10"));
        assert_eq!(rig.mac_vendor(), Some("Intel Corporate"));
        assert_eq!(rig.hostname(), Some("rig-17.mine.example.com"));
        assert_eq!(rig.os_family(), Some("Linux"));

        let open: Vec<_> = rig.open_ports().collect();
        assert_eq!(open, vec![("tcp", 22), ("tcp", 80)]);

        let bare = &run.hosts[1];
        assert_eq!(bare.hostname(), None);
        assert_eq!(bare.os_family(), None);
        assert_eq!(bare.mac_vendor(), None);
        assert_eq!(bare.open_ports().count(), 0);

        let stats = run.runstats.unwrap().hosts.unwrap();
        assert_eq!(stats.up, Some(2));
        assert_eq!(stats.total, Some(256));
    }

    #[test]
    fn test_parse_liveness_report() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sn 10.3.4.5 10.3.4.6">
  <host><status state="up" reason="echo-reply"/><address addr="10.3.4.5" addrtype="ipv4"/></host>
  <host><status state="down" reason="no-response"/><address addr="10.3.4.6" addrtype="ipv4"/></host>
</nmaprun>"#;
        let run = parse_nmap_xml(xml.as_bytes()).unwrap();
        let up: Vec<_> = run.hosts.iter().filter(|h| h.is_up()).collect();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].ipv4(), Some("10.3.4.5"));
    }

    #[test]
    fn test_parse_empty_report() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sn 192.168.99.0/24">
  <runstats><hosts up="0" down="256" total="256"/></runstats>
</nmaprun>"#;
        let run = parse_nmap_xml(xml.as_bytes()).unwrap();
        assert!(run.hosts.is_empty());
    }

    #[test]
    fn test_truncated_output_is_a_parse_error() {
        let err = parse_nmap_xml(b"").unwrap_err();
        assert!(matches!(err, DiscoverError::XmlParse(_)));
    }
}
