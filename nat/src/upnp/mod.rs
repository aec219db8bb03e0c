//! UPnP-IGD port mapping protocol: SSDP discovery, SOAP `AddPortMapping` /
//! `DeletePortMapping` / `GetExternalIPAddress`, and the refresh-wait /
//! silence counter pair that declares an IGD lost.
//!
//! Unlike the STUN protocol this one is driven by an asynchronous HTTP
//! library rather than raw datagrams: requests are built here as pure data
//! (`soap::SoapRequest`) for the caller to dispatch, and responses come
//! back through `on_*_response` rather than `eject_rx`.

pub mod cookie;
pub mod discovery;
pub mod soap;

use std::collections::HashMap;
use std::net::Ipv4Addr;

use rand::Rng;

use stun::{BindingData, BindingDescriptor, BindingState, NatClient};

use self::cookie::CookiePool;
use self::discovery::DeviceDescription;
use crate::error::{Error, Result};

pub const REFRESH_WAIT_CNT_MAX: u32 = 2;
pub const SILENCE_CNT_MAX: u32 = 4;
const EXTERNAL_PORT_RANGE: std::ops::RangeInclusive<u16> = 16383..=65535;

fn random_external_port() -> u16 {
    rand::thread_rng().gen_range(EXTERNAL_PORT_RANGE)
}

struct UpnpBinding {
    desc: BindingDescriptor,
    ext_port: u16,
    is_map_valid: bool,
    pending_cookie: Option<u64>,
    refresh_wait_cnt: u32,
}

impl UpnpBinding {
    fn data(&self, id: u32, igd: &Option<IgdState>) -> BindingData {
        let ext_addr = igd
            .as_ref()
            .and_then(|i| i.external_ip)
            .map(std::net::IpAddr::V4)
            .unwrap_or(self.desc.internal_addr);
        BindingData {
            id,
            desc: self.desc.clone(),
            state: if self.is_map_valid { BindingState::BehindNat } else { BindingState::Unknown },
            is_map_valid: self.is_map_valid,
            ext_addr,
            ext_port: self.ext_port,
        }
    }
}

struct IgdState {
    description: DeviceDescription,
    external_ip: Option<Ipv4Addr>,
    silence_cnt: u32,
}

pub struct UpnpProtocol {
    bindings: HashMap<u32, UpnpBinding>,
    next_id: u32,
    capacity: usize,
    igd: Option<IgdState>,
    cookies: CookiePool,
    pending_get_ext_ip_cookie: Option<u64>,
}

impl UpnpProtocol {
    pub fn create(max_bindings: usize) -> Self {
        UpnpProtocol {
            bindings: HashMap::new(),
            next_id: 1,
            capacity: max_bindings,
            igd: None,
            cookies: CookiePool::new(max_bindings),
            pending_get_ext_ip_cookie: None,
        }
    }

    /// Called once SSDP discovery and device-description download resolve
    /// the WANIPConnection control URL (the "semaphore" the original signals
    /// so `create` can proceed).
    pub fn set_igd(&mut self, description: DeviceDescription) {
        self.igd = Some(IgdState {
            description,
            external_ip: None,
            silence_cnt: 0,
        });
    }

    pub fn is_igd_ready(&self) -> bool {
        self.igd.is_some()
    }

    pub fn open(&mut self, desc: BindingDescriptor, client: &mut dyn NatClient) -> Result<u32> {
        if self.bindings.len() >= self.capacity {
            return Err(Error::BindingPoolFull(self.capacity));
        }
        let id = self.next_id;
        self.next_id += 1;

        let mut binding = UpnpBinding {
            desc,
            ext_port: random_external_port(),
            is_map_valid: false,
            pending_cookie: None,
            refresh_wait_cnt: 0,
        };

        if let Some(request) = self.build_add_port_mapping(id, &binding, client)? {
            binding.pending_cookie = Some(request);
        }
        self.bindings.insert(id, binding);
        Ok(id)
    }

    pub fn close(&mut self, id: u32, _client: &mut dyn NatClient) {
        if let Some(binding) = self.bindings.remove(&id) {
            if let Some(cookie) = binding.pending_cookie {
                self.cookies.orphan(cookie);
            }
        }
    }

    pub fn query(&self, id: u32) -> Option<BindingData> {
        self.bindings.get(&id).map(|b| b.data(id, &self.igd))
    }

    /// Builds and dispatches an `AddPortMapping` request for one binding,
    /// returning the cookie identifying it. `None` if the IGD isn't ready
    /// yet or the cookie pool is exhausted; the next refresh cycle retries.
    fn build_add_port_mapping(&mut self, id: u32, binding: &UpnpBinding, client: &mut dyn NatClient) -> Result<Option<u64>> {
        let Some(igd) = &self.igd else {
            return Ok(None);
        };
        let Some(cookie) = self.cookies.alloc(id) else {
            return Ok(None);
        };
        let request = soap::add_port_mapping(
            &igd.description,
            binding.ext_port,
            binding.desc.internal_port,
            &binding.desc.internal_addr.to_string(),
            &binding.desc.name,
        );
        client.inject(id, request.body.as_bytes());
        Ok(Some(cookie))
    }

    /// Every configured interval: enqueue one `GetExternalIPAddress`, and
    /// for each binding either send a fresh `AddPortMapping` (no request
    /// pending) or bump its refresh-wait counter, timing the pending
    /// request out once the counter exceeds `REFRESH_WAIT_CNT_MAX`.
    pub fn on_refresh_timer(&mut self, client: &mut dyn NatClient) {
        let Some(igd) = &self.igd else {
            return;
        };
        if self.pending_get_ext_ip_cookie.is_none() {
            if let Some(cookie) = self.cookies.alloc(0) {
                let request = soap::get_external_ip_address(&igd.description);
                client.inject(0, request.body.as_bytes());
                self.pending_get_ext_ip_cookie = Some(cookie);
            }
        }

        let ids: Vec<u32> = self.bindings.keys().copied().collect();
        for id in ids {
            let timed_out = {
                let binding = self.bindings.get_mut(&id).unwrap();
                if binding.pending_cookie.is_none() {
                    false
                } else {
                    binding.refresh_wait_cnt += 1;
                    binding.refresh_wait_cnt > REFRESH_WAIT_CNT_MAX
                }
            };
            if timed_out {
                let stale_cookie = self.bindings.get_mut(&id).and_then(|b| b.pending_cookie.take());
                if let Some(cookie) = stale_cookie {
                    self.cookies.orphan(cookie);
                    self.cookies.release(cookie);
                }
                if let Some(binding) = self.bindings.get_mut(&id) {
                    binding.refresh_wait_cnt = 0;
                }
            }
            let needs_request = self.bindings.get(&id).map(|b| b.pending_cookie.is_none()).unwrap_or(false);
            if needs_request {
                if let Some(binding) = self.bindings.get(&id) {
                    let snapshot = UpnpBinding {
                        desc: binding.desc.clone(),
                        ext_port: binding.ext_port,
                        is_map_valid: binding.is_map_valid,
                        pending_cookie: None,
                        refresh_wait_cnt: binding.refresh_wait_cnt,
                    };
                    if let Ok(Some(cookie)) = self.build_add_port_mapping(id, &snapshot, client) {
                        if let Some(binding) = self.bindings.get_mut(&id) {
                            binding.pending_cookie = Some(cookie);
                        }
                    }
                }
            }
        }
    }

    pub fn on_get_external_ip_response(&mut self, response_body: Option<&str>) {
        let Some(cookie) = self.pending_get_ext_ip_cookie.take() else {
            return;
        };
        self.cookies.release(cookie);
        let Some(igd) = &mut self.igd else {
            return;
        };
        match response_body.and_then(soap::parse_external_ip_address) {
            Some(ip) => {
                igd.external_ip = Some(ip);
                igd.silence_cnt = 0;
            }
            None => {
                igd.silence_cnt += 1;
                if igd.silence_cnt > SILENCE_CNT_MAX {
                    log::warn!("UPnP IGD silent for {} refresh cycles, invalidating", igd.silence_cnt);
                    self.invalidate_igd();
                }
            }
        }
    }

    pub fn on_add_port_mapping_response(&mut self, cookie: u64, success: bool, client: &mut dyn NatClient) {
        let Some(id) = self.cookies.release(cookie) else {
            return;
        };
        let Some(binding) = self.bindings.get_mut(&id) else {
            return;
        };
        binding.pending_cookie = None;
        binding.refresh_wait_cnt = 0;
        if success {
            binding.is_map_valid = true;
            let data = binding.data(id, &self.igd);
            client.binding_updated(id, &data);
        }
    }

    /// The IGD has been declared lost (silence beyond cap). Every binding
    /// reverts to invalid and will pick a fresh random external port and
    /// re-request a mapping once a new IGD is discovered.
    fn invalidate_igd(&mut self) {
        self.igd = None;
        for binding in self.bindings.values_mut() {
            if let Some(cookie) = binding.pending_cookie.take() {
                self.cookies.orphan(cookie);
            }
            binding.is_map_valid = false;
            binding.refresh_wait_cnt = 0;
            binding.ext_port = random_external_port();
        }
    }
}

#[cfg(test)]
mod upnp_test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[derive(Default)]
    struct FakeClient {
        updates: Vec<(u32, BindingData)>,
    }

    impl NatClient for FakeClient {
        fn inject(&mut self, _id: u32, _packet: &[u8]) {}
        fn binding_updated(&mut self, id: u32, data: &BindingData) {
            self.updates.push((id, data.clone()));
        }
        fn start_timer(&mut self, _id: u32, _kind: stun::TimerKind, _delay_ms: u64) {}
        fn stop_timer(&mut self, _id: u32, _kind: stun::TimerKind) {}
    }

    fn igd() -> DeviceDescription {
        DeviceDescription {
            base_url: "http://192.168.1.1:5000".into(),
            control_url: "/upnp/control/WANIPConn1".into(),
            service_type: discovery::WAN_IP_CONNECTION_SERVICE_TYPE.into(),
        }
    }

    fn desc() -> BindingDescriptor {
        BindingDescriptor {
            name: "rtp".into(),
            caller_id: 1,
            allow_update: false,
            internal_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            internal_port: 5004,
            remote_addr: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)),
            remote_port: 5004,
        }
    }

    #[test]
    fn open_without_igd_leaves_mapping_pending() {
        let mut proto = UpnpProtocol::create(4);
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();
        assert!(!proto.query(id).unwrap().is_map_valid);
    }

    #[test]
    fn successful_add_port_mapping_marks_binding_valid() {
        let mut proto = UpnpProtocol::create(4);
        proto.set_igd(igd());
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();
        let cookie = proto.bindings.get(&id).unwrap().pending_cookie.unwrap();
        proto.on_add_port_mapping_response(cookie, true, &mut client);
        assert!(proto.query(id).unwrap().is_map_valid);
        assert_eq!(client.updates.len(), 1);
    }

    #[test]
    fn silence_beyond_cap_invalidates_igd() {
        let mut proto = UpnpProtocol::create(4);
        proto.set_igd(igd());
        let mut client = FakeClient::default();
        let _id = proto.open(desc(), &mut client).unwrap();
        for _ in 0..=SILENCE_CNT_MAX {
            proto.on_refresh_timer(&mut client);
            proto.on_get_external_ip_response(None);
        }
        assert!(!proto.is_igd_ready());
    }

    #[test]
    fn refresh_wait_counter_times_out_stale_request() {
        let mut proto = UpnpProtocol::create(4);
        proto.set_igd(igd());
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();
        let original_cookie = proto.bindings.get(&id).unwrap().pending_cookie.unwrap();

        for _ in 0..=REFRESH_WAIT_CNT_MAX {
            proto.on_refresh_timer(&mut client);
        }

        let new_cookie = proto.bindings.get(&id).unwrap().pending_cookie;
        assert_ne!(new_cookie, Some(original_cookie));
    }
}
