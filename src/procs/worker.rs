// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::Duration;

use clap::{App, Arg, ArgMatches, SubCommand};
use nix::unistd::{getpid, getppid};
use tracing::debug;

use crate::clock::ClockValue;
use crate::error::Error;
use crate::procs::{arg_str, arg_u64, validate_number, Process, CLOCK, NANOS, SECONDS, SPIN};
use crate::region::ClockView;

const POLL_SLEEP: Duration = Duration::from_micros(100);

/// How the worker waits between clock checks. Both strategies use the same
/// `clock >= deadline` comparison; only the idle behavior differs.
#[derive(Clone, Copy, Debug)]
enum PollStrategy {
    Sleep,
    Spin,
}

/// The worker role: attach the shared clock read-only, compute an absolute
/// deadline from the clock value at start, report liveness once per
/// simulated second, and exit at or after the deadline.
///
/// Rules:
/// - never writes the clock
/// - never sees the process table
/// - tolerates the clock jumping several seconds between two polls
#[derive(Debug)]
pub struct Worker;

impl Process for Worker {
    const NAME: &'static str = "worker";

    fn sub_command() -> App<'static, 'static> {
        SubCommand::with_name(Self::NAME)
            .about("Simulated-lifetime worker, launched by the coordinator")
            .arg(
                Arg::with_name(CLOCK)
                    .long(CLOCK)
                    .value_name("NAME")
                    .help("name of the shared clock region to attach")
                    .takes_value(true)
                    .required(true),
            )
            .arg(
                Arg::with_name(SECONDS)
                    .long(SECONDS)
                    .value_name("NUMBER")
                    .help("whole seconds of simulated lifetime")
                    .takes_value(true)
                    .required(true)
                    .validator(validate_number),
            )
            .arg(
                Arg::with_name(NANOS)
                    .long(NANOS)
                    .value_name("NUMBER")
                    .help("sub-second remainder of the lifetime, in nanoseconds")
                    .takes_value(true)
                    .required(true)
                    .validator(validate_number),
            )
            .arg(
                Arg::with_name(SPIN)
                    .long(SPIN)
                    .help("busy-poll the clock instead of sleeping between checks"),
            )
    }

    fn run(args: &ArgMatches<'_>) -> Result<(), Error> {
        let name = arg_str(args, CLOCK)?;
        let lifetime = ClockValue::from_parts(arg_u64(args, SECONDS)?, arg_u64(args, NANOS)?);
        let strategy = if args.is_present(SPIN) {
            PollStrategy::Spin
        } else {
            PollStrategy::Sleep
        };

        let view = ClockView::attach(name)?;
        let me = getpid();

        let start = view.now();
        let deadline = start + lifetime;
        debug!(pid = %me, %start, %deadline, ?strategy, "worker attached clock");

        println!(
            "WORKER PID:{} PPID:{} lifetime {}",
            me,
            getppid(),
            lifetime
        );
        println!(
            "WORKER PID:{} clock {} deadline {} -- just starting",
            me, start, deadline
        );

        let mut last_second = start.seconds();
        let mut passed = 0u64;

        loop {
            let now = view.now();

            if now.seconds() != last_second {
                passed += now.seconds().saturating_sub(last_second);
                last_second = now.seconds();
                println!(
                    "WORKER PID:{} clock {} deadline {} -- {} seconds have passed since starting",
                    me, now, deadline, passed
                );
            }

            if now >= deadline {
                println!(
                    "WORKER PID:{} clock {} deadline {} -- terminating",
                    me, now, deadline
                );
                return Ok(());
            }

            match strategy {
                PollStrategy::Sleep => std::thread::sleep(POLL_SLEEP),
                PollStrategy::Spin => std::hint::spin_loop(),
            }
        }
    }
}

