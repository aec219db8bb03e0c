//! Single-threaded cooperative timer wheel: the dispatcher the session
//! engine, NLL, STUN protocol, and hybrid arbiter all sit behind. Timers
//! are created once and reused; `start`/`stop` toggle them without
//! reallocating, and `poll` is the only place time actually advances.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Periodicity {
    OneShot,
    Periodic(Duration),
}

struct Timer {
    active: bool,
    deadline: Instant,
    periodicity: Periodicity,
}

/// A cooperative timer wheel driven entirely by `poll`; nothing here spawns
/// a thread or blocks. The caller's event loop calls `next_deadline` to
/// know how long it may safely wait on its socket/select call, then
/// `poll` once that deadline (or a socket event) wakes it.
#[derive(Default)]
pub struct TimerWheel {
    timers: Vec<Option<Timer>>,
    next_id: u64,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel {
            timers: Vec::new(),
            next_id: 0,
        }
    }

    /// Allocates an inactive timer slot and returns its id. Mirrors the
    /// create/start/stop/destroy split other event-driven C APIs use: a
    /// timer can exist, unarmed, before it is ever started.
    pub fn create(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Some(Timer {
            active: false,
            deadline: Instant::now(),
            periodicity: Periodicity::OneShot,
        }));
        id
    }

    pub fn start(&mut self, id: TimerId, delay: Duration, periodicity: Periodicity) {
        if let Some(Some(timer)) = self.timers.get_mut(id.0 as usize) {
            timer.active = true;
            timer.deadline = Instant::now() + delay;
            timer.periodicity = periodicity;
        }
    }

    /// Safe to call on a stopped or already-stopped timer.
    pub fn stop(&mut self, id: TimerId) {
        if let Some(Some(timer)) = self.timers.get_mut(id.0 as usize) {
            timer.active = false;
        }
    }

    /// Safe to call on a stopped or unstarted timer; frees the slot.
    pub fn destroy(&mut self, id: TimerId) {
        if let Some(slot) = self.timers.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        matches!(self.timers.get(id.0 as usize), Some(Some(t)) if t.active)
    }

    /// The earliest deadline among active timers, for the caller to bound
    /// its next socket wait by.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .iter()
            .flatten()
            .filter(|t| t.active)
            .map(|t| t.deadline)
            .min()
    }

    /// Returns every timer id whose deadline has passed as of `now`,
    /// rearming periodic timers and deactivating one-shot ones.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired = Vec::new();
        for (idx, slot) in self.timers.iter_mut().enumerate() {
            let Some(timer) = slot else { continue };
            if !timer.active || timer.deadline > now {
                continue;
            }
            fired.push(TimerId(idx as u64));
            match timer.periodicity {
                Periodicity::OneShot => timer.active = false,
                Periodicity::Periodic(period) => timer.deadline += period,
            }
        }
        fired
    }
}
