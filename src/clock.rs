// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The simulated time value: a (seconds, nanoseconds) pair advanced by the
//! coordinator, never by wall-clock time.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point on the simulated clock.
///
/// Invariant: `nanos` is always in `[0, NANOS_PER_SEC)`. All constructors
/// normalize, so `ClockValue`s compare correctly with the derived ordering
/// (seconds first, then nanos).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockValue {
    seconds: u64,
    nanos: u32,
}

impl ClockValue {
    pub const ZERO: ClockValue = ClockValue {
        seconds: 0,
        nanos: 0,
    };

    /// Builds a value from raw parts, carrying nanosecond overflow into the
    /// seconds field.
    pub fn from_parts(seconds: u64, nanos: u64) -> Self {
        ClockValue {
            seconds: seconds + nanos / NANOS_PER_SEC,
            nanos: (nanos % NANOS_PER_SEC) as u32,
        }
    }

    pub const fn from_millis(millis: u64) -> Self {
        ClockValue {
            seconds: millis / 1_000,
            nanos: (millis % 1_000) as u32 * 1_000_000,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Total nanoseconds since the zeroed clock.
    pub fn as_nanos(&self) -> u64 {
        self.seconds * NANOS_PER_SEC + u64::from(self.nanos)
    }

    /// Nanoseconds elapsed from `earlier` to `self`, saturating at zero if
    /// `earlier` is actually later.
    pub fn elapsed_since(&self, earlier: ClockValue) -> u64 {
        self.as_nanos().saturating_sub(earlier.as_nanos())
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanos == 0
    }
}

impl Add for ClockValue {
    type Output = ClockValue;

    fn add(self, rhs: ClockValue) -> ClockValue {
        ClockValue::from_parts(
            self.seconds + rhs.seconds,
            u64::from(self.nanos) + u64::from(rhs.nanos),
        )
    }
}

impl fmt::Display for ClockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // through pad() so table columns can right-align clock values
        f.pad(&format!("{}.{:09}", self.seconds, self.nanos))
    }
}

/// Parses a decimal-seconds string such as `"1"`, `"1.5"` or `"0.25"` without
/// going through floating point. At most nine fractional digits are accepted.
impl FromStr for ClockValue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let bad = || Error::from(ErrorKind::Config(format!("invalid seconds value: {:?}", s)));

        let (whole, frac) = match s.find('.') {
            Some(dot) => (&s[..dot], &s[dot + 1..]),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(bad());
        }

        let seconds = if whole.is_empty() {
            0
        } else {
            whole.parse::<u64>().map_err(|_| bad())?
        };

        let nanos = if frac.is_empty() {
            0
        } else {
            if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
            // right-pad to nanosecond precision: "5" -> 500_000_000
            frac.parse::<u64>().map_err(|_| bad())? * 10u64.pow(9 - frac.len() as u32)
        };

        Ok(ClockValue::from_parts(seconds, nanos))
    }
}

/// Publication side of the shared clock: the coordinator pushes each new
/// value here so workers observe it. Kept as a trait so the scheduling loop
/// can run without a real shared-memory region.
pub trait ClockBoard {
    fn publish(&self, now: ClockValue);
}
