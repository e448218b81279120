// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use clap::App;

use simsched::procs::{Coordinator, Process, Worker};
use simsched::{Error, ErrorKind};

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
    }
}

fn exit_code(err: &Error) -> i32 {
    match err.kind() {
        // interruption is a supported shutdown path, reported like SIGINT
        ErrorKind::Interrupted => 130,
        _ => 1,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand(Coordinator::sub_command().setup_clap_app())
        .subcommand(Worker::sub_command().setup_clap_app())
        .get_matches();

    let result = match args.subcommand() {
        (Coordinator::NAME, Some(args)) => Coordinator::run(args),
        (Worker::NAME, Some(args)) => Worker::run(args),
        ("", None) => {
            println!("command required");
            println!("{}", args.usage());
            std::process::exit(1);
        }
        (arg, _) => {
            println!("unexpected argument: {}", arg);
            println!("{}", args.usage());
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("{}: {}", env!("CARGO_PKG_NAME"), err);
        std::process::exit(exit_code(&err));
    }
}
