// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The shared clock region: a named POSIX shared-memory object holding the
//! simulated clock as two atomic integers.
//!
//! Single-writer discipline: only the coordinator (`ClockHost`) ever stores
//! to the region; workers (`ClockView`) only load. Readers may observe the
//! seconds and nanos fields from two adjacent ticks, which is benign at the
//! clock's resolution.

use std::ffi::c_void;
use std::mem;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use tracing::warn;

use crate::clock::{ClockBoard, ClockValue};
use crate::error::Error;

#[repr(C)]
struct RawClock {
    seconds: AtomicU64,
    nanos: AtomicU64,
}

const REGION_LEN: usize = mem::size_of::<RawClock>();

fn region_len() -> NonZeroUsize {
    NonZeroUsize::new(REGION_LEN).expect("clock region is not zero sized")
}

/// Writer end of the shared clock. Creating it claims the name exclusively;
/// dropping it unmaps and unlinks the region.
pub struct ClockHost {
    name: String,
    clock: NonNull<RawClock>,
}

impl ClockHost {
    /// Creates the named region. `O_EXCL` makes a name collision with a
    /// concurrent run a hard failure rather than a silently shared clock.
    /// The fresh object is zero-filled, so the clock starts at zero.
    pub fn create(name: &str) -> Result<Self, Error> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )?;

        let mapped = ftruncate(&fd, REGION_LEN as i64).and_then(|_| unsafe {
            mmap(
                None,
                region_len(),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
        });

        match mapped {
            Ok(ptr) => Ok(ClockHost {
                name: name.to_string(),
                clock: ptr.cast(),
            }),
            Err(e) => {
                // don't leave a half-initialized name behind
                let _ = shm_unlink(name);
                Err(e.into())
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn raw(&self) -> &RawClock {
        unsafe { self.clock.as_ref() }
    }
}

impl ClockBoard for ClockHost {
    fn publish(&self, now: ClockValue) {
        let raw = self.raw();
        raw.nanos.store(u64::from(now.nanos()), Ordering::Relaxed);
        raw.seconds.store(now.seconds(), Ordering::Release);
    }
}

impl Drop for ClockHost {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.clock.cast::<c_void>(), REGION_LEN) } {
            warn!(name = %self.name, error = %e, "failed to unmap clock region");
        }
        if let Err(e) = shm_unlink(self.name.as_str()) {
            warn!(name = %self.name, error = %e, "failed to unlink clock region");
        }
    }
}

/// Reader end of the shared clock, attached by workers. Dropping it only
/// unmaps; the name belongs to the coordinator.
pub struct ClockView {
    clock: NonNull<RawClock>,
}

impl ClockView {
    pub fn attach(name: &str) -> Result<Self, Error> {
        let fd = shm_open(name, OFlag::O_RDONLY, Mode::empty())?;
        let ptr = unsafe {
            mmap(
                None,
                region_len(),
                ProtFlags::PROT_READ,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )?
        };
        Ok(ClockView { clock: ptr.cast() })
    }

    pub fn now(&self) -> ClockValue {
        let raw = unsafe { self.clock.as_ref() };
        let seconds = raw.seconds.load(Ordering::Acquire);
        let nanos = raw.nanos.load(Ordering::Relaxed);
        ClockValue::from_parts(seconds, nanos)
    }
}

impl Drop for ClockView {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.clock.cast::<c_void>(), REGION_LEN) } {
            warn!(error = %e, "failed to unmap clock view");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_name(tag: &str) -> String {
        format!("/simsched-{}-{}", tag, std::process::id())
    }

    #[test]
    fn view_observes_published_values() {
        let name = test_name("observe");
        let host = ClockHost::create(&name).unwrap();
        let view = ClockView::attach(&name).unwrap();

        assert_eq!(view.now(), ClockValue::ZERO);

        let t = ClockValue::from_parts(1, 500_000_000);
        host.publish(t);
        assert_eq!(view.now(), t);
    }

    #[test]
    fn name_collision_is_rejected() {
        let name = test_name("collide");
        let _host = ClockHost::create(&name).unwrap();
        assert!(ClockHost::create(&name).is_err());
    }

    #[test]
    fn dropping_the_host_releases_the_name() {
        let name = test_name("release");
        {
            let host = ClockHost::create(&name).unwrap();
            host.publish(ClockValue::from_parts(9, 0));
        }
        // a second run can re-acquire the name and sees a fresh clock
        let host = ClockHost::create(&name).unwrap();
        let view = ClockView::attach(&name).unwrap();
        assert_eq!(view.now(), ClockValue::ZERO);
        drop(host);
    }
}
