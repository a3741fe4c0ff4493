//! Poisonable rendezvous barrier
//!
//! A cyclic barrier of fixed arity. Unlike `std::sync::Barrier`, a participant
//! that cannot reach the barrier can [`poison`](RendezvousBarrier::poison) it,
//! which releases every current and future waiter with a `Cancelled` error.
//! An optional timeout bounds each wait; expiry poisons the barrier so the
//! remaining participants fail fast as well.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tessera_types::{Result, TesseraError};
use tracing::{debug, warn};

#[derive(Debug)]
struct BarrierState {
    arity: usize,
    arrived: usize,
    generation: u64,
    poisoned: Option<String>,
}

/// Rendezvous point for a fixed number of participants
#[derive(Debug)]
pub struct RendezvousBarrier {
    state: Mutex<BarrierState>,
    cvar: Condvar,
    timeout: Option<Duration>,
}

impl RendezvousBarrier {
    /// Create a barrier for `arity` participants with no timeout
    pub fn new(arity: usize) -> Self {
        Self::with_timeout(arity, None)
    }

    /// Create a barrier whose waits give up after `timeout`
    pub fn with_timeout(arity: usize, timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                arity,
                arrived: 0,
                generation: 0,
                poisoned: None,
            }),
            cvar: Condvar::new(),
            timeout,
        }
    }

    /// Reconfigure for `arity` participants and clear any poison.
    ///
    /// Fails if participants are currently waiting.
    pub fn reset(&self, arity: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.arrived > 0 && state.poisoned.is_none() {
            return Err(TesseraError::invalid_state(format!(
                "cannot reset rendezvous barrier with {} waiting participants",
                state.arrived
            )));
        }
        state.arity = arity;
        state.arrived = 0;
        state.generation = state.generation.wrapping_add(1);
        state.poisoned = None;
        Ok(())
    }

    pub fn arity(&self) -> usize {
        self.state.lock().arity
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned.is_some()
    }

    /// Reason recorded by the first `poison` call, if any
    pub fn poison_reason(&self) -> Option<String> {
        self.state.lock().poisoned.clone()
    }

    /// Block until all participants have arrived.
    ///
    /// Returns `Cancelled` if the barrier is or becomes poisoned, and
    /// `Timeout` if the configured timeout expires first.
    pub fn wait(&self) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        if let Some(reason) = &state.poisoned {
            return Err(cancelled(reason));
        }
        if state.arity == 0 {
            return Err(TesseraError::invalid_state(
                "rendezvous barrier has zero participants",
            ));
        }

        state.arrived += 1;
        if state.arrived == state.arity {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            debug!(arity = state.arity, "rendezvous complete");
            self.cvar.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        loop {
            let timed_out = match deadline {
                Some(deadline) => self.cvar.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.cvar.wait(&mut state);
                    false
                }
            };

            if state.generation != generation {
                return Ok(());
            }
            if let Some(reason) = &state.poisoned {
                return Err(cancelled(reason));
            }
            if timed_out {
                let waited = self.timeout.unwrap_or_default();
                let reason = format!(
                    "rendezvous timed out after {}ms with {}/{} participants",
                    waited.as_millis(),
                    state.arrived,
                    state.arity
                );
                warn!("{}", reason);
                state.poisoned = Some(reason.clone());
                self.cvar.notify_all();
                return Err(TesseraError::timeout(reason));
            }
        }
    }

    /// Poison the barrier and release every waiter.
    ///
    /// The first reason wins; later calls are ignored.
    pub fn poison(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.poisoned.is_none() {
            let reason = reason.into();
            warn!(reason = %reason, "rendezvous barrier poisoned");
            state.poisoned = Some(reason);
        }
        self.cvar.notify_all();
    }
}

fn cancelled(reason: &str) -> TesseraError {
    TesseraError::cancelled(format!("rendezvous cancelled: {}", reason))
}
