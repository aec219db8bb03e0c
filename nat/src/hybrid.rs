//! Hybrid STUN/UPnP arbiter. Owns one pair of sub-bindings per (internal
//! addr/port, remote addr/port) 4-tuple and decides, on each sub-protocol
//! update, which protocol's external mapping is authoritative.

use std::collections::HashMap;
use std::net::IpAddr;

use stun::{BindingData, BindingDescriptor, NatClient, StunProtocol};

use crate::error::Result;
use crate::upnp::UpnpProtocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authoritative {
    Stun,
    Upnp,
}

/// Which sub-protocol just produced an update, passed by the caller when
/// forwarding a `binding_updated` callback from either sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubProtocol {
    Stun,
    Upnp,
}

struct HybridBinding {
    desc: BindingDescriptor,
    stun_id: u32,
    upnp_id: u32,
    stun_ext: Option<IpAddr>,
    upnp_ext: Option<IpAddr>,
    authoritative: Authoritative,
}

/// Per (internal addr/port, remote addr/port) lookup key, since that 4-tuple
/// is the uniqueness invariant the spec calls out for NAT bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FourTuple {
    internal_addr: IpAddr,
    internal_port: u16,
    remote_addr: IpAddr,
    remote_port: u16,
}

impl From<&BindingDescriptor> for FourTuple {
    fn from(d: &BindingDescriptor) -> Self {
        FourTuple {
            internal_addr: d.internal_addr,
            internal_port: d.internal_port,
            remote_addr: d.remote_addr,
            remote_port: d.remote_port,
        }
    }
}

pub struct HybridNatManager {
    stun: StunProtocol,
    upnp: UpnpProtocol,
    bindings: HashMap<u32, HybridBinding>,
    by_tuple: HashMap<FourTuple, u32>,
    next_id: u32,
    stun_bindings: u32,
    upnp_bindings: u32,
}

impl HybridNatManager {
    pub fn create(max_bindings: usize, stun_refresh_interval_ms: u64) -> Self {
        HybridNatManager {
            stun: StunProtocol::create(max_bindings, stun_refresh_interval_ms),
            upnp: UpnpProtocol::create(max_bindings),
            bindings: HashMap::new(),
            by_tuple: HashMap::new(),
            next_id: 1,
            stun_bindings: 0,
            upnp_bindings: 0,
        }
    }

    pub fn stun_bindings(&self) -> u32 {
        self.stun_bindings
    }

    pub fn upnp_bindings(&self) -> u32 {
        self.upnp_bindings
    }

    pub fn stun_mut(&mut self) -> &mut StunProtocol {
        &mut self.stun
    }

    pub fn upnp_mut(&mut self) -> &mut UpnpProtocol {
        &mut self.upnp
    }

    /// Opens a combined binding: one STUN sub-binding and one UPnP
    /// sub-binding for the same 4-tuple, defaulting to STUN authoritative
    /// until both sub-protocols report an external address.
    pub fn open(&mut self, desc: BindingDescriptor, client: &mut dyn NatClient) -> Result<u32> {
        let tuple = FourTuple::from(&desc);
        if let Some(existing) = self.by_tuple.get(&tuple) {
            return Ok(*existing);
        }

        let stun_id = self.stun.open(desc.clone(), client)?;
        let upnp_id = self.upnp.open(desc.clone(), client)?;

        let id = self.next_id;
        self.next_id += 1;
        self.bindings.insert(
            id,
            HybridBinding {
                desc,
                stun_id,
                upnp_id,
                stun_ext: None,
                upnp_ext: None,
                authoritative: Authoritative::Stun,
            },
        );
        self.by_tuple.insert(tuple, id);
        self.stun_bindings += 1;
        Ok(id)
    }

    pub fn close(&mut self, id: u32, client: &mut dyn NatClient) {
        if let Some(binding) = self.bindings.remove(&id) {
            self.stun.close(binding.stun_id, client);
            self.upnp.close(binding.upnp_id, client);
            self.by_tuple.remove(&FourTuple::from(&binding.desc));
            match binding.authoritative {
                Authoritative::Stun => self.stun_bindings = self.stun_bindings.saturating_sub(1),
                Authoritative::Upnp => self.upnp_bindings = self.upnp_bindings.saturating_sub(1),
            }
        }
    }

    pub fn query(&self, id: u32) -> Option<BindingData> {
        let binding = self.bindings.get(&id)?;
        match binding.authoritative {
            Authoritative::Stun => self.stun.query(binding.stun_id),
            Authoritative::Upnp => self.upnp.query(binding.upnp_id),
        }
    }

    /// Called by the caller after forwarding a raw `eject_rx`/SOAP-response
    /// to the named sub-protocol and observing its binding change. Applies
    /// the arbitration rules and, if the authoritative protocol or its
    /// mapping changed, forwards exactly one update to the client.
    pub fn on_sub_binding_update(&mut self, source: SubProtocol, sub_id: u32, client: &mut dyn NatClient) {
        let Some(hybrid_id) = self.find_by_sub_id(source, sub_id) else {
            return;
        };

        let stun_data = {
            let binding = self.bindings.get(&hybrid_id).unwrap();
            self.stun.query(binding.stun_id)
        };
        let upnp_data = {
            let binding = self.bindings.get(&hybrid_id).unwrap();
            self.upnp.query(binding.upnp_id)
        };

        let stun_ext = stun_data.as_ref().filter(|d| d.is_map_valid).map(|d| d.ext_addr);
        let upnp_ext = upnp_data.as_ref().filter(|d| d.is_map_valid).map(|d| d.ext_addr);

        let new_authoritative = match (stun_ext, upnp_ext) {
            (None, None) => Authoritative::Stun,
            (None, Some(_)) => Authoritative::Upnp,
            (Some(_), None) => Authoritative::Stun,
            (Some(s), Some(u)) if s == u => Authoritative::Upnp,
            (Some(_), Some(_)) => Authoritative::Stun,
        };

        let binding = self.bindings.get_mut(&hybrid_id).unwrap();
        let changed = binding.authoritative != new_authoritative || binding.stun_ext != stun_ext || binding.upnp_ext != upnp_ext;
        let previous = binding.authoritative;
        binding.stun_ext = stun_ext;
        binding.upnp_ext = upnp_ext;
        binding.authoritative = new_authoritative;
        let stun_id = binding.stun_id;
        let upnp_id = binding.upnp_id;

        if previous != new_authoritative {
            match previous {
                Authoritative::Stun => self.stun_bindings = self.stun_bindings.saturating_sub(1),
                Authoritative::Upnp => self.upnp_bindings = self.upnp_bindings.saturating_sub(1),
            }
            match new_authoritative {
                Authoritative::Stun => self.stun_bindings += 1,
                Authoritative::Upnp => self.upnp_bindings += 1,
            }
        }

        // Once both externals are known the losing sub-binding is closed.
        if stun_ext.is_some() && upnp_ext.is_some() {
            match new_authoritative {
                Authoritative::Upnp => self.stun.close(stun_id, client),
                Authoritative::Stun => self.upnp.close(upnp_id, client),
            }
        }

        if !changed {
            return;
        }
        let authoritative_data = match new_authoritative {
            Authoritative::Stun => self.stun.query(stun_id),
            Authoritative::Upnp => self.upnp.query(upnp_id),
        };
        if source == authoritative_source(new_authoritative) {
            if let Some(data) = authoritative_data {
                client.binding_updated(hybrid_id, &data);
            }
        }
    }

    fn find_by_sub_id(&self, source: SubProtocol, sub_id: u32) -> Option<u32> {
        self.bindings.iter().find_map(|(id, b)| {
            let matches = match source {
                SubProtocol::Stun => b.stun_id == sub_id,
                SubProtocol::Upnp => b.upnp_id == sub_id,
            };
            matches.then_some(*id)
        })
    }
}

fn authoritative_source(a: Authoritative) -> SubProtocol {
    match a {
        Authoritative::Stun => SubProtocol::Stun,
        Authoritative::Upnp => SubProtocol::Upnp,
    }
}
