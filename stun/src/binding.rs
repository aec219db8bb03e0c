//! Shared NAT binding vocabulary and the single-threaded binding protocol
//! state machine driven by a caller-owned timer wheel and socket dispatcher.
//! Conceptually this interface belongs to the NAT core as a whole (the UPnP
//! protocol and the hybrid arbiter speak the same shape); it lives in this
//! crate rather than `rtrecv-nat` purely to keep the dependency graph
//! acyclic, since `rtrecv-nat` already depends on `rtrecv-stun` to hold a
//! STUN sub-binding inside the hybrid arbiter.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Error, Result};
use crate::message::{Message, TransactionId};

/// Per-try timeouts (ms) for the STUN retry sequence, indexed by trial
/// number. `TRIALS_MAX` is the last valid index.
pub const RETRY_TIMEOUTS_MS: [u64; 10] = [0, 100, 200, 400, 800, 1600, 1600, 1600, 1600, 1600];
pub const TRIALS_MAX: u32 = 9;

/// Identifies a mapping uniquely: the 4-tuple of (internal addr/port,
/// remote addr/port) is the key callers use for existence checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingDescriptor {
    pub name: String,
    pub caller_id: u32,
    pub allow_update: bool,
    pub internal_addr: IpAddr,
    pub internal_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unknown,
    NotBehindNat,
    BehindNat,
    Error,
}

/// Query output for one binding. When `is_map_valid` is false the external
/// pair echoes the internal pair, by implementation convention rather than
/// any standards behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingData {
    pub id: u32,
    pub desc: BindingDescriptor,
    pub state: BindingState,
    pub is_map_valid: bool,
    pub ext_addr: IpAddr,
    pub ext_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Retry,
    Refresh,
}

/// What the STUN protocol needs from its caller: a way to send a built
/// request, a way to learn a binding changed, and timer primitives. The
/// caller owns the single-threaded cooperative event loop; the protocol
/// never blocks or schedules anything itself.
pub trait NatClient {
    fn inject(&mut self, id: u32, packet: &[u8]);
    fn binding_updated(&mut self, id: u32, data: &BindingData);
    fn start_timer(&mut self, id: u32, kind: TimerKind, delay_ms: u64);
    fn stop_timer(&mut self, id: u32, kind: TimerKind);
}

struct Binding {
    desc: BindingDescriptor,
    state: BindingState,
    is_map_valid: bool,
    ext_addr: IpAddr,
    ext_port: u16,
    trial: u32,
    pending_tid: Option<TransactionId>,
}

impl Binding {
    fn data(&self, id: u32) -> BindingData {
        BindingData {
            id,
            desc: self.desc.clone(),
            state: self.state,
            is_map_valid: self.is_map_valid,
            ext_addr: self.ext_addr,
            ext_port: self.ext_port,
        }
    }
}

/// RFC 3489bis binding request/response protocol with the exact backoff
/// table and "not behind NAT" propagation.
pub struct StunProtocol {
    bindings: HashMap<u32, Binding>,
    next_id: u32,
    capacity: usize,
    refresh_interval_ms: u64,
    is_not_behind_nat: bool,
}

impl StunProtocol {
    pub fn create(capacity: usize, refresh_interval_ms: u64) -> Self {
        StunProtocol {
            bindings: HashMap::new(),
            next_id: 1,
            capacity,
            refresh_interval_ms,
            is_not_behind_nat: false,
        }
    }

    pub fn destroy(&mut self, client: &mut dyn NatClient) {
        let ids: Vec<u32> = self.bindings.keys().copied().collect();
        for id in ids {
            self.close(id, client);
        }
    }

    pub fn is_behind_nat(&self) -> bool {
        !self.is_not_behind_nat
    }

    pub fn open(&mut self, desc: BindingDescriptor, client: &mut dyn NatClient) -> Result<u32> {
        if self.bindings.len() >= self.capacity {
            return Err(Error::BindingPoolFull(self.capacity));
        }
        let id = self.next_id;
        self.next_id += 1;

        let request_updates = desc.allow_update;
        let mut binding = Binding {
            desc,
            state: BindingState::Unknown,
            is_map_valid: false,
            ext_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ext_port: 0,
            trial: 0,
            pending_tid: None,
        };

        if self.is_not_behind_nat && !request_updates {
            binding.state = BindingState::NotBehindNat;
            binding.is_map_valid = true;
            binding.ext_addr = binding.desc.internal_addr;
            binding.ext_port = binding.desc.internal_port;
            let data = binding.data(id);
            self.bindings.insert(id, binding);
            client.binding_updated(id, &data);
            return Ok(id);
        }

        let mut pending_tid = None;
        self.send_trial(id, &mut pending_tid, 0, client);
        binding.pending_tid = pending_tid;
        self.bindings.insert(id, binding);
        Ok(id)
    }

    pub fn close(&mut self, id: u32, client: &mut dyn NatClient) {
        if self.bindings.remove(&id).is_some() {
            client.stop_timer(id, TimerKind::Retry);
            client.stop_timer(id, TimerKind::Refresh);
        }
    }

    pub fn query(&self, id: u32) -> Option<BindingData> {
        self.bindings.get(&id).map(|b| b.data(id))
    }

    fn send_trial(&self, id: u32, pending_tid: &mut Option<TransactionId>, trial: u32, client: &mut dyn NatClient) {
        let tid = pending_tid.unwrap_or_else(TransactionId::random);
        *pending_tid = Some(tid);
        let request = Message::binding_request(tid);
        client.inject(id, &request.marshal());
        client.start_timer(id, TimerKind::Retry, RETRY_TIMEOUTS_MS[trial as usize]);
    }

    /// Called by the caller's timer wheel when a binding's retry timer
    /// expires with no response yet received.
    pub fn on_retry_timer(&mut self, id: u32, client: &mut dyn NatClient) {
        let trial = match self.bindings.get(&id) {
            Some(b) => b.trial,
            None => return,
        };
        // Exhausted every backoff step with no response: reset the
        // transaction and start over, without telling the client the
        // binding is invalid (it may still resolve on a later attempt).
        let next_trial = if trial >= TRIALS_MAX { 0 } else { trial + 1 };
        let mut pending_tid = None;
        self.send_trial(id, &mut pending_tid, next_trial, client);
        if let Some(binding) = self.bindings.get_mut(&id) {
            binding.trial = next_trial;
            binding.pending_tid = pending_tid;
        }
    }

    /// Walks every binding with no active trial and kicks a refresh. Driven
    /// by the caller's periodic refresh timer, distinct from the per-trial
    /// retry timer above.
    pub fn on_refresh_timer(&mut self, client: &mut dyn NatClient) {
        if self.is_not_behind_nat {
            return;
        }
        let ids: Vec<u32> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.pending_tid.is_none())
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            let mut pending_tid = None;
            self.send_trial(id, &mut pending_tid, 0, client);
            if let Some(binding) = self.bindings.get_mut(&id) {
                binding.trial = 0;
                binding.pending_tid = pending_tid;
            }
            client.start_timer(id, TimerKind::Refresh, self.refresh_interval_ms);
        }
    }

    /// Parses an inbound datagram addressed to this binding. Binding
    /// responses update the external mapping (and may latch "not behind
    /// NAT" for the whole protocol); binding requests are ICE-style
    /// connectivity checks and get an immediate synthesized response.
    pub fn eject_rx(&mut self, id: u32, buf: &[u8], src: std::net::SocketAddr, client: &mut dyn NatClient) -> Result<()> {
        let msg = Message::unmarshal(buf)?;

        let binding = self.bindings.get_mut(&id).ok_or(Error::UnknownBinding(id))?;

        use crate::message::Class;
        match msg.typ.map(|t| t.class) {
            Some(Class::SuccessResponse) => {
                if binding.pending_tid != Some(msg.transaction_id) {
                    return Err(Error::UnexpectedTransactionId);
                }
                client.stop_timer(id, TimerKind::Retry);
                binding.pending_tid = None;
                binding.trial = 0;

                let Some(mapped) = msg.mapped_address else {
                    return Ok(());
                };
                let changed = binding.ext_addr != mapped.addr.ip() || binding.ext_port != mapped.addr.port();
                binding.ext_addr = mapped.addr.ip();
                binding.ext_port = mapped.addr.port();
                binding.is_map_valid = true;

                let not_behind_nat = mapped.addr.ip() == binding.desc.internal_addr && mapped.addr.port() == binding.desc.internal_port;
                if not_behind_nat {
                    binding.state = BindingState::NotBehindNat;
                } else {
                    binding.state = BindingState::BehindNat;
                }

                if changed || not_behind_nat {
                    let data = binding.data(id);
                    client.binding_updated(id, &data);
                }
                client.start_timer(id, TimerKind::Refresh, self.refresh_interval_ms);

                if not_behind_nat {
                    self.latch_not_behind_nat(client);
                }
            }
            Some(Class::Request) => {
                let response = Message::binding_success(msg.transaction_id, src);
                client.inject(id, &response.marshal());
            }
            _ => {}
        }
        Ok(())
    }

    /// RFC 3489bis "not behind NAT" propagation: once any binding resolves
    /// with external == internal, stop every refresh timer, latch the
    /// protocol-wide flag, and mark every binding that isn't opted into
    /// continued updates as valid with external := internal.
    fn latch_not_behind_nat(&mut self, client: &mut dyn NatClient) {
        self.is_not_behind_nat = true;
        let ids: Vec<u32> = self.bindings.keys().copied().collect();
        for id in ids {
            client.stop_timer(id, TimerKind::Refresh);
            client.stop_timer(id, TimerKind::Retry);
            let Some(binding) = self.bindings.get_mut(&id) else {
                continue;
            };
            if binding.is_map_valid && binding.desc.allow_update {
                continue;
            }
            binding.state = BindingState::NotBehindNat;
            binding.is_map_valid = true;
            binding.ext_addr = binding.desc.internal_addr;
            binding.ext_port = binding.desc.internal_port;
            let data = binding.data(id);
            client.binding_updated(id, &data);
        }
    }
}

#[cfg(test)]
mod binding_test {
    use super::*;
    use crate::message::Message;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    #[derive(Default)]
    struct FakeClient {
        injected: Vec<(u32, Vec<u8>)>,
        updates: Vec<(u32, BindingData)>,
        timers_started: Vec<(u32, TimerKind, u64)>,
        timers_stopped: Vec<(u32, TimerKind)>,
    }

    impl NatClient for FakeClient {
        fn inject(&mut self, id: u32, packet: &[u8]) {
            self.injected.push((id, packet.to_vec()));
        }
        fn binding_updated(&mut self, id: u32, data: &BindingData) {
            self.updates.push((id, data.clone()));
        }
        fn start_timer(&mut self, id: u32, kind: TimerKind, delay_ms: u64) {
            self.timers_started.push((id, kind, delay_ms));
        }
        fn stop_timer(&mut self, id: u32, kind: TimerKind) {
            self.timers_stopped.push((id, kind));
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
    fn open_sends_first_trial_with_zero_delay() {
        let mut proto = StunProtocol::create(8, 30_000);
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();
        assert_eq!(client.injected.len(), 1);
        assert_eq!(client.timers_started[0], (id, TimerKind::Retry, 0));
    }

    #[test]
    fn binding_response_with_external_equal_internal_latches_not_behind_nat() {
        let mut proto = StunProtocol::create(8, 30_000);
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();

        let (sent_id, raw) = client.injected[0].clone();
        assert_eq!(sent_id, id);
        let req = Message::unmarshal(&raw).unwrap();

        let response = Message::binding_success(
            req.transaction_id,
            SocketAddr::new(desc().internal_addr, desc().internal_port),
        );
        proto
            .eject_rx(id, &response.marshal(), "203.0.113.1:5004".parse().unwrap(), &mut client)
            .unwrap();

        assert!(!proto.is_behind_nat());
        let data = proto.query(id).unwrap();
        assert_eq!(data.state, BindingState::NotBehindNat);
        assert!(data.is_map_valid);
    }

    #[test]
    fn exhausting_trials_resets_without_error() {
        let mut proto = StunProtocol::create(8, 30_000);
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();
        for _ in 0..=TRIALS_MAX {
            proto.on_retry_timer(id, &mut client);
        }
        // Still open, still behind-nat-unresolved; no panics, no binding_updated calls.
        assert!(proto.query(id).is_some());
        assert!(client.updates.is_empty());
    }

    #[test]
    fn mismatched_transaction_id_is_rejected() {
        let mut proto = StunProtocol::create(8, 30_000);
        let mut client = FakeClient::default();
        let id = proto.open(desc(), &mut client).unwrap();
        let bogus = Message::binding_success(TransactionId::random(), "203.0.113.1:5004".parse().unwrap());
        let result = proto.eject_rx(id, &bogus.marshal(), "203.0.113.1:5004".parse().unwrap(), &mut client);
        assert!(matches!(result, Err(Error::UnexpectedTransactionId)));
    }
}
