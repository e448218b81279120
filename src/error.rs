// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::table::TableFault;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("process table fault: {0}")]
    Table(#[from] TableFault),
    #[error("admission granted but no free table slot ({running} running, capacity {capacity})")]
    Capacity { running: u32, capacity: usize },
    #[error("failed to spawn worker: {0}")]
    Spawn(io::Error),
    #[error("interrupted, terminating workers")]
    Interrupted,
    #[error("watchdog expired after {0:?} of wall-clock time")]
    Watchdog(Duration),
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.0, ErrorKind::Interrupted)
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
