//! SOAP envelopes for the three `WANIPConnection:1` actions this stack
//! drives, and the minimal response parsing each needs.

use crate::upnp::discovery::DeviceDescription;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub control_url: String,
    pub soap_action: String,
    pub body: String,
}

fn envelope(service_type: &str, action: &str, args: &[(&str, String)]) -> String {
    let mut inner = String::new();
    for (name, value) in args {
        inner.push_str(&format!("<{name}>{value}</{name}>"));
    }
    format!(
        "<?xml version=\"1.0\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:{action} xmlns:u=\"{service_type}\">{inner}</u:{action}></s:Body></s:Envelope>"
    )
}

pub fn add_port_mapping(
    igd: &DeviceDescription,
    external_port: u16,
    internal_port: u16,
    internal_client: &str,
    description: &str,
) -> SoapRequest {
    let body = envelope(
        &igd.service_type,
        "AddPortMapping",
        &[
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", external_port.to_string()),
            ("NewProtocol", "UDP".to_string()),
            ("NewInternalPort", internal_port.to_string()),
            ("NewInternalClient", internal_client.to_string()),
            ("NewEnabled", "1".to_string()),
            ("NewPortMappingDescription", description.to_string()),
            ("NewLeaseDuration", "0".to_string()),
        ],
    );
    SoapRequest {
        control_url: igd.control_url.clone(),
        soap_action: format!("{}#AddPortMapping", igd.service_type),
        body,
    }
}

pub fn delete_port_mapping(igd: &DeviceDescription, external_port: u16) -> SoapRequest {
    let body = envelope(
        &igd.service_type,
        "DeletePortMapping",
        &[
            ("NewRemoteHost", String::new()),
            ("NewExternalPort", external_port.to_string()),
            ("NewProtocol", "UDP".to_string()),
        ],
    );
    SoapRequest {
        control_url: igd.control_url.clone(),
        soap_action: format!("{}#DeletePortMapping", igd.service_type),
        body,
    }
}

pub fn get_external_ip_address(igd: &DeviceDescription) -> SoapRequest {
    let body = envelope(&igd.service_type, "GetExternalIPAddress", &[]);
    SoapRequest {
        control_url: igd.control_url.clone(),
        soap_action: format!("{}#GetExternalIPAddress", igd.service_type),
        body,
    }
}

/// Extracts `<NewExternalIPAddress>` from a `GetExternalIPAddress` response,
/// or `None` if the body is a SOAP fault.
pub fn parse_external_ip_address(response_body: &str) -> Option<std::net::Ipv4Addr> {
    if response_body.contains("<s:Fault>") {
        return None;
    }
    let start = response_body.find("<NewExternalIPAddress>")? + "<NewExternalIPAddress>".len();
    let end = response_body[start..].find("</NewExternalIPAddress>")? + start;
    response_body[start..end].trim().parse().ok()
}

pub fn is_soap_fault(response_body: &str) -> bool {
    response_body.contains("<s:Fault>") || response_body.contains("<SOAP-ENV:Fault>")
}

#[cfg(test)]
mod soap_test {
    use super::*;

    fn igd() -> DeviceDescription {
        DeviceDescription {
            base_url: "http://192.168.1.1:5000".into(),
            control_url: "/upnp/control/WANIPConn1".into(),
            service_type: "urn:schemas-upnp-org:service:WANIPConnection:1".into(),
        }
    }

    #[test]
    fn add_port_mapping_sets_udp_enabled_and_indefinite_lease() {
        let req = add_port_mapping(&igd(), 40000, 5004, "192.168.1.10", "rtrecv");
        assert!(req.body.contains("<NewProtocol>UDP</NewProtocol>"));
        assert!(req.body.contains("<NewEnabled>1</NewEnabled>"));
        assert!(req.body.contains("<NewLeaseDuration>0</NewLeaseDuration>"));
        assert!(req.body.contains("<NewRemoteHost></NewRemoteHost>"));
        assert_eq!(req.soap_action, format!("{}#AddPortMapping", igd().service_type));
    }

    #[test]
    fn parse_external_ip_address_extracts_value() {
        let body = "<s:Envelope><s:Body><u:GetExternalIPAddressResponse>\
                     <NewExternalIPAddress>203.0.113.5</NewExternalIPAddress>\
                     </u:GetExternalIPAddressResponse></s:Body></s:Envelope>";
        assert_eq!(parse_external_ip_address(body), Some("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn parse_external_ip_address_returns_none_on_fault() {
        let body = "<s:Envelope><s:Body><s:Fault><faultcode>s:Client</faultcode></s:Fault></s:Body></s:Envelope>";
        assert_eq!(parse_external_ip_address(body), None);
        assert!(is_soap_fault(body));
    }
}
