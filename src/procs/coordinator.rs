// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The coordinator: owns the simulated clock and the process table, and
//! drives the tick loop from `RUNNING` through `DRAINING` to termination.

use std::time::{Duration, Instant};

use clap::{App, Arg, ArgMatches, SubCommand};
use nix::unistd::getpid;
use tracing::{debug, error, info, warn};

use crate::clock::{ClockBoard, ClockValue};
use crate::error::{Error, ErrorKind};
use crate::procs::{arg_str, arg_u64, validate_number, Process};
use crate::region::ClockHost;
use crate::sched::{self, Admission, Config, ScheduleState};
use crate::signal;
use crate::spawn::{ChildWorkforce, Workforce};
use crate::table::{LaunchRecord, ProcessTable, TABLE_CAPACITY};

const WORKERS: &str = "workers";
const SIMUL: &str = "simul";
const LIFETIME: &str = "lifetime";
const INTERVAL: &str = "interval";

/// Simulated time added per loop iteration.
const QUANTUM: ClockValue = ClockValue::from_millis(10);
/// Simulated time between table snapshots on the console.
const REPORT_EVERY_NANOS: u64 = 500_000_000;
/// Real time yielded per tick so workers get scheduled between advances.
const TICK_PACE: Duration = Duration::from_micros(250);
/// Wall-clock bound on the whole run; a worker that never reports its exit
/// cannot hang the coordinator forever.
const WATCHDOG: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
}

/// Final counters reported when the run terminates.
#[derive(Clone, Copy, Debug)]
pub struct Summary {
    pub launched: u32,
    pub finished: u32,
    pub runtime: ClockValue,
}

/// Coordinate a run of workers against the shared clock
///
/// Rules:
/// - sole writer of the clock, sole owner of the table
/// - never blocks while workers are running (draining keeps ticking so
///   workers can reach their deadlines)
/// - every observed exit releases exactly one slot
#[derive(Debug)]
pub struct Coordinator;

impl Process for Coordinator {
    const NAME: &'static str = "run";

    fn sub_command() -> App<'static, 'static> {
        SubCommand::with_name(Self::NAME)
            .about("Coordinate a run of simulated-lifetime workers")
            .arg(
                Arg::with_name(WORKERS)
                    .short("n")
                    .long(WORKERS)
                    .value_name("COUNT")
                    .help("total number of workers to launch (1..=80)")
                    .takes_value(true)
                    .default_value("1")
                    .validator(validate_number),
            )
            .arg(
                Arg::with_name(SIMUL)
                    .short("s")
                    .long(SIMUL)
                    .value_name("COUNT")
                    .help("maximum workers running simultaneously (1..=15)")
                    .takes_value(true)
                    .default_value("1")
                    .validator(validate_number),
            )
            .arg(
                Arg::with_name(LIFETIME)
                    .short("t")
                    .long(LIFETIME)
                    .value_name("SECONDS")
                    .help("simulated lifetime per worker, in decimal seconds")
                    .takes_value(true)
                    .default_value("1")
                    .validator(validate_clock),
            )
            .arg(
                Arg::with_name(INTERVAL)
                    .short("i")
                    .long(INTERVAL)
                    .value_name("SECONDS")
                    .help("minimum simulated time between launches, in decimal seconds")
                    .takes_value(true)
                    .default_value("0")
                    .validator(validate_clock),
            )
    }

    fn run(args: &ArgMatches<'_>) -> Result<(), Error> {
        let cfg = config_from(args)?;

        signal::install()?;

        let name = format!("/simsched-clock-{}", getpid());
        let board = ClockHost::create(&name)?;
        let mut workforce = ChildWorkforce::new(board.name().to_string());

        info!(
            clock = %name,
            total = cfg.total,
            simul = cfg.max_concurrent,
            lifetime = %cfg.lifetime,
            interval = %cfg.interval,
            "coordinator starting"
        );

        let summary = drive(&cfg, &board, &mut workforce)?;
        println!(
            "COORDINATOR PID:{} summary: launched {} finished {} total worker runtime {}",
            getpid(),
            summary.launched,
            summary.finished,
            summary.runtime
        );
        Ok(())
    }
}

fn validate_clock(v: String) -> Result<(), String> {
    v.parse::<ClockValue>().map(|_| ()).map_err(|e| e.to_string())
}

fn config_from(args: &ArgMatches<'_>) -> Result<Config, Error> {
    // saturate instead of wrapping; Config::new rejects anything out of range
    let total = arg_u64(args, WORKERS)?.min(u64::from(u32::MAX)) as u32;
    let simul = arg_u64(args, SIMUL)?.min(u64::from(u32::MAX)) as u32;
    let lifetime: ClockValue = arg_str(args, LIFETIME)?.parse()?;
    let interval: ClockValue = arg_str(args, INTERVAL)?.parse()?;
    Config::new(total, simul, lifetime, interval)
}

/// Runs the scheduling loop to completion and returns the final counters.
pub fn drive<B, W>(cfg: &Config, board: &B, workforce: &mut W) -> Result<Summary, Error>
where
    B: ClockBoard,
    W: Workforce,
{
    drive_bounded(cfg, board, workforce, WATCHDOG)
}

fn drive_bounded<B, W>(
    cfg: &Config,
    board: &B,
    workforce: &mut W,
    watchdog: Duration,
) -> Result<Summary, Error>
where
    B: ClockBoard,
    W: Workforce,
{
    let started = Instant::now();
    let mut table = ProcessTable::new(TABLE_CAPACITY);
    let mut state = ScheduleState::default();
    let mut now = ClockValue::ZERO;
    let mut last_report = ClockValue::ZERO;
    let mut phase = Phase::Running;

    board.publish(now);

    loop {
        if signal::triggered() {
            warn!(running = state.running(), "interrupted, terminating workers");
            workforce.terminate_all()?;
            return Err(ErrorKind::Interrupted.into());
        }
        if started.elapsed() >= watchdog {
            error!(running = state.running(), "watchdog expired, terminating workers");
            workforce.terminate_all()?;
            return Err(ErrorKind::Watchdog(watchdog).into());
        }

        now = now + QUANTUM;
        board.publish(now);

        // observe every exit that is ready; none may be left unreaped
        while let Some(worker) = workforce.poll_exit(now)? {
            let slot = table.find(worker).ok_or_else(|| {
                Error::from(format!("exit observed from untracked worker {}", worker))
            })?;
            let record = table.release(slot)?;
            state.note_exit(now.elapsed_since(record.start()));
            println!(
                "COORDINATOR PID:{} clock {} worker {} finished (slot {})",
                getpid(),
                now,
                worker,
                slot
            );
        }

        if phase == Phase::Running {
            if let Some(Admission { slot, deadline }) = sched::admit(cfg, &state, &table, now)? {
                let worker = match workforce.spawn(now, cfg.lifetime) {
                    Ok(worker) => worker,
                    Err(e) => {
                        // the run cannot make progress without its scheduled
                        // child; tear everything down
                        error!(error = %e, "spawn failed, aborting run");
                        if let Err(cleanup) = workforce.terminate_all() {
                            warn!(error = %cleanup, "cleanup after failed spawn incomplete");
                        }
                        return Err(e);
                    }
                };

                table.occupy(slot, LaunchRecord::new(worker, now, deadline))?;
                state.note_launch(now);
                debug!(%worker, slot, %deadline, "launch admitted");
                println!(
                    "COORDINATOR PID:{} clock {} launched worker {} (slot {}, deadline {})",
                    getpid(),
                    now,
                    worker,
                    slot,
                    deadline
                );

                if state.launched() == cfg.total {
                    phase = Phase::Draining;
                    debug!("all workers launched, draining");
                }
            }
        }

        if now.elapsed_since(last_report) >= REPORT_EVERY_NANOS {
            print_snapshot(now, &table);
            last_report = now;
        }

        if state.launched() == cfg.total && state.running() == 0 {
            break;
        }

        std::thread::sleep(TICK_PACE);
    }

    Ok(Summary {
        launched: state.launched(),
        finished: state.finished(),
        runtime: state.runtime(),
    })
}

fn print_snapshot(now: ClockValue, table: &ProcessTable) {
    println!(
        "COORDINATOR PID:{} clock {} process table:",
        getpid(),
        now
    );
    println!(
        "{:>5} {:>8} {:>8} {:>15} {:>15}",
        "entry", "occupied", "pid", "start", "deadline"
    );
    for (index, slot) in table.snapshot() {
        match slot {
            Some(record) => println!(
                "{:>5} {:>8} {:>8} {:>15} {:>15}",
                index,
                1,
                record.worker(),
                record.start(),
                record.deadline()
            ),
            None => println!(
                "{:>5} {:>8} {:>8} {:>15} {:>15}",
                index, 0, "-", "-", "-"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NANOS_PER_SEC;
    use crate::spawn::WorkerId;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io;

    /// No-op clock publication; the loop keeps its own authoritative value.
    struct Unpublished;

    impl ClockBoard for Unpublished {
        fn publish(&self, _now: ClockValue) {}
    }

    /// In-memory workforce: workers "exit" once the simulated clock reaches
    /// the deadline recorded at spawn time.
    struct SimWorkforce {
        next_id: u32,
        live: Vec<(WorkerId, ClockValue)>,
        launches: Vec<ClockValue>,
        peak: usize,
        terminated: Vec<WorkerId>,
        fail_spawn_at: Option<usize>,
        interrupt_at: Option<usize>,
        silent: bool,
    }

    impl SimWorkforce {
        fn new() -> Self {
            SimWorkforce {
                next_id: 100,
                live: Vec::new(),
                launches: Vec::new(),
                peak: 0,
                terminated: Vec::new(),
                fail_spawn_at: None,
                interrupt_at: None,
                silent: false,
            }
        }
    }

    impl Workforce for SimWorkforce {
        fn spawn(&mut self, now: ClockValue, lifetime: ClockValue) -> Result<WorkerId, Error> {
            if self.fail_spawn_at == Some(self.launches.len()) {
                return Err(ErrorKind::Spawn(io::Error::new(
                    io::ErrorKind::Other,
                    "simulated fork failure",
                ))
                .into());
            }

            self.next_id += 1;
            let id = WorkerId(self.next_id);
            self.live.push((id, now + lifetime));
            self.launches.push(now);
            self.peak = self.peak.max(self.live.len());

            if self.interrupt_at == Some(self.launches.len()) {
                nix::sys::signal::raise(nix::sys::signal::Signal::SIGINT).unwrap();
            }
            Ok(id)
        }

        fn poll_exit(&mut self, now: ClockValue) -> Result<Option<WorkerId>, Error> {
            if self.silent {
                return Ok(None);
            }
            match self.live.iter().position(|(_, deadline)| now >= *deadline) {
                Some(i) => Ok(Some(self.live.remove(i).0)),
                None => Ok(None),
            }
        }

        fn terminate_all(&mut self) -> Result<(), Error> {
            self.terminated.extend(self.live.iter().map(|(id, _)| *id));
            self.live.clear();
            Ok(())
        }
    }

    fn secs(s: u64) -> ClockValue {
        ClockValue::from_parts(s, 0)
    }

    fn config(total: u32, simul: u32, lifetime: ClockValue, interval: ClockValue) -> Config {
        Config::new(total, simul, lifetime, interval).unwrap()
    }

    #[test]
    #[serial]
    fn five_workers_three_at_a_time() {
        signal::reset();
        let cfg = config(5, 3, secs(1), ClockValue::ZERO);
        let mut wf = SimWorkforce::new();

        let summary = drive(&cfg, &Unpublished, &mut wf).unwrap();

        assert_eq!(summary.launched, 5);
        assert_eq!(summary.finished, 5);
        assert_eq!(wf.peak, 3);
        assert!(wf.live.is_empty());

        // the first three go straight in; the fourth waits for an exit,
        // which cannot come before the first worker's full lifetime
        assert!(wf.launches[3].elapsed_since(wf.launches[0]) >= NANOS_PER_SEC);

        // each worker ran exactly its requested lifetime
        assert_eq!(summary.runtime, secs(5));
    }

    #[test]
    #[serial]
    fn concurrency_clamps_to_the_total() {
        signal::reset();
        let cfg = config(2, 10, secs(1), ClockValue::ZERO);
        let mut wf = SimWorkforce::new();

        let summary = drive(&cfg, &Unpublished, &mut wf).unwrap();

        assert_eq!(summary.finished, 2);
        assert!(wf.peak <= 2);
    }

    #[test]
    #[serial]
    fn launches_respect_the_minimum_interval() {
        signal::reset();
        let interval = ClockValue::from_parts(0, 250_000_000);
        let cfg = config(5, 5, ClockValue::from_parts(0, 500_000_000), interval);
        let mut wf = SimWorkforce::new();

        drive(&cfg, &Unpublished, &mut wf).unwrap();

        assert_eq!(wf.launches.len(), 5);
        for pair in wf.launches.windows(2) {
            assert!(pair[1].elapsed_since(pair[0]) >= 250_000_000);
        }
    }

    #[test]
    #[serial]
    fn spawn_failure_aborts_and_terminates_survivors() {
        signal::reset();
        let cfg = config(5, 3, secs(30), ClockValue::ZERO);
        let mut wf = SimWorkforce::new();
        wf.fail_spawn_at = Some(2);

        let err = drive(&cfg, &Unpublished, &mut wf).unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Spawn(_)));
        // the two already-running workers were torn down
        assert_eq!(wf.terminated.len(), 2);
        assert!(wf.live.is_empty());
    }

    #[test]
    #[serial]
    fn interruption_terminates_all_occupied_slots() {
        signal::install().unwrap();
        signal::reset();

        let cfg = config(5, 3, secs(30), ClockValue::ZERO);
        let mut wf = SimWorkforce::new();
        wf.interrupt_at = Some(3);

        let err = drive(&cfg, &Unpublished, &mut wf).unwrap_err();
        signal::reset();

        assert!(err.is_interrupted());
        assert_eq!(wf.terminated.len(), 3);
        assert!(wf.live.is_empty());
    }

    #[test]
    #[serial]
    fn watchdog_bounds_a_run_with_an_unreported_exit() {
        signal::reset();
        let cfg = config(1, 1, secs(1), ClockValue::ZERO);
        let mut wf = SimWorkforce::new();
        wf.silent = true;

        let err =
            drive_bounded(&cfg, &Unpublished, &mut wf, Duration::from_millis(20)).unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Watchdog(_)));
        assert_eq!(wf.terminated.len(), 1);
    }
}
