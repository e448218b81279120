// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Launch admission: decides each tick whether another worker may start.

use crate::clock::ClockValue;
use crate::error::{Error, ErrorKind};
use crate::table::ProcessTable;

/// Upper bound on the total number of workers in one run.
pub const MAX_WORKERS: u32 = 80;
/// Upper bound on simultaneously running workers.
pub const MAX_SIMUL: u32 = 15;

/// Validated launch parameters for one coordinator run.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub total: u32,
    pub max_concurrent: u32,
    pub lifetime: ClockValue,
    pub interval: ClockValue,
}

impl Config {
    pub fn new(
        total: u32,
        max_concurrent: u32,
        lifetime: ClockValue,
        interval: ClockValue,
    ) -> Result<Self, Error> {
        if total == 0 || total > MAX_WORKERS {
            return Err(ErrorKind::Config(format!(
                "worker count must be in 1..={}, got {}",
                MAX_WORKERS, total
            ))
            .into());
        }
        if max_concurrent == 0 || max_concurrent > MAX_SIMUL {
            return Err(ErrorKind::Config(format!(
                "concurrency limit must be in 1..={}, got {}",
                MAX_SIMUL, max_concurrent
            ))
            .into());
        }
        if lifetime.is_zero() {
            return Err(ErrorKind::Config("worker lifetime must be non-zero".to_string()).into());
        }

        Ok(Config {
            total,
            // a limit above the total can never be reached
            max_concurrent: max_concurrent.min(total),
            lifetime,
            interval,
        })
    }
}

/// Coordinator-owned scheduling counters.
///
/// `running` is derived from `launched - finished`, so an exit can never be
/// double-counted by these counters alone; the table's release check guards
/// the rest.
#[derive(Debug, Default)]
pub struct ScheduleState {
    launched: u32,
    finished: u32,
    last_launch: Option<ClockValue>,
    runtime_nanos: u64,
}

impl ScheduleState {
    pub fn launched(&self) -> u32 {
        self.launched
    }

    pub fn finished(&self) -> u32 {
        self.finished
    }

    pub fn running(&self) -> u32 {
        self.launched - self.finished
    }

    pub fn last_launch(&self) -> Option<ClockValue> {
        self.last_launch
    }

    /// Combined simulated runtime of all finished workers.
    pub fn runtime(&self) -> ClockValue {
        ClockValue::from_parts(0, self.runtime_nanos)
    }

    pub fn note_launch(&mut self, now: ClockValue) {
        self.launched += 1;
        self.last_launch = Some(now);
    }

    pub fn note_exit(&mut self, elapsed_nanos: u64) {
        self.finished += 1;
        self.runtime_nanos += elapsed_nanos;
    }
}

/// A granted launch: the table slot to occupy and the worker's deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    pub slot: usize,
    pub deadline: ClockValue,
}

/// The admission rule. All three constraints must hold:
///
/// 1. more workers remain to start,
/// 2. a concurrency slot is available,
/// 3. the minimum inter-launch interval has elapsed (the first launch is
///    unconstrained).
///
/// Counters permitting a launch while the table has no free slot means the
/// table was sized below the concurrency limit; that is an invariant
/// violation and fatal, not a launch to skip quietly.
pub fn admit(
    cfg: &Config,
    state: &ScheduleState,
    table: &ProcessTable,
    now: ClockValue,
) -> Result<Option<Admission>, Error> {
    if state.launched() >= cfg.total {
        return Ok(None);
    }
    if state.running() >= cfg.max_concurrent {
        return Ok(None);
    }
    if let Some(last) = state.last_launch() {
        if now < last + cfg.interval {
            return Ok(None);
        }
    }

    match table.allocate_slot() {
        Some(slot) => Ok(Some(Admission {
            slot,
            deadline: now + cfg.lifetime,
        })),
        None => Err(ErrorKind::Capacity {
            running: state.running(),
            capacity: table.capacity(),
        }
        .into()),
    }
}
