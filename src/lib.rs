// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Common library functions for simsched

pub mod clock;
mod error;
pub mod procs;
pub mod region;
pub mod sched;
pub mod signal;
pub mod spawn;
pub mod table;

pub use error::{Error, ErrorKind};
