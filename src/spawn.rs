// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Worker process lifecycle: spawning, non-blocking exit detection, and
//! forced termination.
//!
//! Workers are launched by re-executing this same binary with the `worker`
//! subcommand, handing the shared clock name and the lifetime over on the
//! command line.

use std::process::{Child, Command};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::clock::ClockValue;
use crate::error::{Error, ErrorKind};
use crate::procs::{self, Process, Worker};

/// Identity of a launched worker. For real processes this is the OS pid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u32);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The coordinator's view of its worker population.
///
/// The scheduling loop only needs these three capabilities, so they sit
/// behind a trait; tests drive the loop with a simulated workforce instead of
/// real processes. `now` is the current simulated clock value, which the real
/// implementation does not need (workers read the shared clock themselves).
pub trait Workforce {
    /// Starts one worker with the given simulated lifetime.
    fn spawn(&mut self, now: ClockValue, lifetime: ClockValue) -> Result<WorkerId, Error>;

    /// Reports one exited worker without blocking, or `None` if all are
    /// still running. Callers drain by looping until `None`.
    fn poll_exit(&mut self, now: ClockValue) -> Result<Option<WorkerId>, Error>;

    /// Sends a termination request to every live worker and reaps them all.
    fn terminate_all(&mut self) -> Result<(), Error>;
}

/// Production workforce: one OS child process per worker.
pub struct ChildWorkforce {
    clock_name: String,
    children: Vec<(WorkerId, Child)>,
}

impl ChildWorkforce {
    pub fn new(clock_name: String) -> Self {
        ChildWorkforce {
            clock_name,
            children: Vec::new(),
        }
    }
}

impl Workforce for ChildWorkforce {
    fn spawn(&mut self, _now: ClockValue, lifetime: ClockValue) -> Result<WorkerId, Error> {
        let child = Command::new(std::env::args_os().next().expect("arg0 is not present?"))
            .arg(Worker::NAME)
            .arg(format!("--{}={}", procs::CLOCK, self.clock_name))
            .arg(format!("--{}={}", procs::SECONDS, lifetime.seconds()))
            .arg(format!("--{}={}", procs::NANOS, lifetime.nanos()))
            .spawn()
            .map_err(|e| Error::from(ErrorKind::Spawn(e)))?;

        let id = WorkerId(child.id());
        debug!(worker = %id, %lifetime, "spawned worker");
        self.children.push((id, child));
        Ok(id)
    }

    fn poll_exit(&mut self, _now: ClockValue) -> Result<Option<WorkerId>, Error> {
        for i in 0..self.children.len() {
            let (id, child) = &mut self.children[i];
            if let Some(status) = child.try_wait().map_err(ErrorKind::Io)? {
                let id = *id;
                debug!(worker = %id, %status, "worker exited");
                self.children.remove(i);
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn terminate_all(&mut self) -> Result<(), Error> {
        for (id, child) in &mut self.children {
            // the worker may have exited on its own already; reap it either way
            if let Err(e) = kill(Pid::from_raw(id.0 as i32), Signal::SIGTERM) {
                warn!(worker = %id, error = %e, "failed to signal worker");
            }
            match child.wait() {
                Ok(status) => debug!(worker = %id, %status, "worker reaped"),
                Err(e) => warn!(worker = %id, error = %e, "failed to reap worker"),
            }
        }
        self.children.clear();
        Ok(())
    }
}
