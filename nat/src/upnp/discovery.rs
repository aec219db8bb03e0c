//! SSDP discovery of a `WANIPConnection:1` Internet Gateway Device. The
//! search request and response parsing are pure functions so they can be
//! exercised without a real multicast socket; `rtrecv`'s event loop owns
//! the socket and feeds datagrams in.

use std::net::IpAddr;

pub const WAN_IP_CONNECTION_SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";
const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// A resolved IGD's control surface: where to POST SOAP actions, and the
/// service type to put in the SOAPAction header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub base_url: String,
    pub control_url: String,
    pub service_type: String,
}

pub fn ssdp_search_request() -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 2\r\n\
         ST: {WAN_IP_CONNECTION_SERVICE_TYPE}\r\n\r\n"
    )
}

/// Extracts the `LOCATION` header from an SSDP search response. Returns
/// `None` if the response is not well-formed or carries no location.
pub fn parse_location(response: &str) -> Option<&str> {
    response
        .lines()
        .find_map(|line| line.strip_prefix("LOCATION:").or_else(|| line.strip_prefix("Location:")))
        .map(|v| v.trim())
}

/// `true` if the IGD's advertised address shares a default route with the
/// receiver's own interface address. The original queries the system
/// routing table directly; this stack approximates that by comparing
/// address families and, for IPv4, the first three octets (the common case
/// for a home gateway and LAN host sharing a /24).
pub fn matches_default_route(igd_addr: IpAddr, local_addr: IpAddr) -> bool {
    match (igd_addr, local_addr) {
        (IpAddr::V4(a), IpAddr::V4(b)) => a.octets()[..3] == b.octets()[..3],
        (IpAddr::V6(_), IpAddr::V6(_)) => true,
        _ => false,
    }
}

/// Finds the first occurrence of `<tag>...</tag>` and returns its inner
/// text. Deliberately narrow: the original resolves these same three
/// fields through libupnp's targeted element lookups rather than a general
/// DOM, so a full XML parser would be reaching for more generality than
/// this stack ever uses.
fn locate_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim())
}

/// Parses a device description XML document, locating the control URL of
/// the first service whose `serviceType` matches `WANIPConnection:1`.
pub fn parse_device_description(xml: &str, base_url: &str) -> Option<DeviceDescription> {
    let service_block_start = xml.find(WAN_IP_CONNECTION_SERVICE_TYPE)?;
    let tail = &xml[service_block_start..];
    let control_url = locate_tag(tail, "controlURL")?;
    Some(DeviceDescription {
        base_url: base_url.to_string(),
        control_url: control_url.to_string(),
        service_type: WAN_IP_CONNECTION_SERVICE_TYPE.to_string(),
    })
}

#[cfg(test)]
mod discovery_test {
    use super::*;

    #[test]
    fn search_request_names_the_wan_ip_connection_service() {
        let req = ssdp_search_request();
        assert!(req.contains(WAN_IP_CONNECTION_SERVICE_TYPE));
        assert!(req.starts_with("M-SEARCH"));
    }

    #[test]
    fn parse_location_reads_header_case_insensitively() {
        let resp = "HTTP/1.1 200 OK\r\nLOCATION: http://192.168.1.1:5000/desc.xml\r\n\r\n";
        assert_eq!(parse_location(resp), Some("http://192.168.1.1:5000/desc.xml"));
    }

    #[test]
    fn parse_location_returns_none_without_header() {
        assert_eq!(parse_location("HTTP/1.1 200 OK\r\n\r\n"), None);
    }

    #[test]
    fn parse_device_description_finds_control_url_after_service_type() {
        let xml = "<root><device><serviceList>\
                   <service><serviceType>urn:schemas-upnp-org:service:WANIPConnection:1</serviceType>\
                   <controlURL>/upnp/control/WANIPConn1</controlURL></service>\
                   </serviceList></device></root>";
        let desc = parse_device_description(xml, "http://192.168.1.1:5000").unwrap();
        assert_eq!(desc.control_url, "/upnp/control/WANIPConn1");
    }

    #[test]
    fn default_route_matches_same_v4_subnet() {
        let igd: IpAddr = "192.168.1.1".parse().unwrap();
        let local: IpAddr = "192.168.1.42".parse().unwrap();
        assert!(matches_default_route(igd, local));
        let other: IpAddr = "10.0.0.5".parse().unwrap();
        assert!(!matches_default_route(igd, other));
    }
}
