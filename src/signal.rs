// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Interruption handling.
//!
//! The handler itself only flips an atomic flag (the only thing that is
//! async-signal-safe here); the coordinator polls the flag once per tick and
//! runs the actual shutdown — terminate workers, reap them, release the
//! shared clock — from its own control flow.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::Error;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: i32) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Installs the interruption handler for SIGINT and SIGTERM.
pub fn install() -> Result<(), Error> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

/// Whether an interruption signal has arrived since the last `reset`.
pub fn triggered() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
