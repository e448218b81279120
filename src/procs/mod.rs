// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod coordinator;
mod worker;

pub use coordinator::Coordinator;
pub use worker::Worker;

use clap::{App, ArgMatches};

use crate::error::Error;

// argument names shared between the coordinator's spawn call and the worker
pub const CLOCK: &str = "clock";
pub const SECONDS: &str = "seconds";
pub const NANOS: &str = "nanos";
pub const SPIN: &str = "spin";

/// A trait to define common construction of a process role
///
/// Both roles run from the same binary: the coordinator is invoked by the
/// user, the worker by the coordinator re-executing itself.
pub trait Process: Sized {
    const NAME: &'static str;

    fn sub_command() -> App<'static, 'static>;

    fn run(args: &ArgMatches<'_>) -> Result<(), Error>;
}

pub(crate) fn validate_number(v: String) -> Result<(), String> {
    v.parse::<u64>()
        .map(|_| ())
        .map_err(|_| String::from("number was expected"))
}

pub(crate) fn arg_str<'a>(args: &'a ArgMatches<'_>, name: &str) -> Result<&'a str, Error> {
    use crate::error::ErrorKind;

    args.value_of(name)
        .ok_or_else(|| ErrorKind::Config(format!("--{} is required", name)).into())
}

pub(crate) fn arg_u64(args: &ArgMatches<'_>, name: &str) -> Result<u64, Error> {
    use crate::error::ErrorKind;

    arg_str(args, name)?
        .parse::<u64>()
        .map_err(|_| ErrorKind::Config(format!("--{} expects a number", name)).into())
}
