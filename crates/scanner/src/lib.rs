#![forbid(unsafe_code)]

//! Driving the external fingerprint scanner binary.
//!
//! [`path`] decides which binaries may be launched at all, [`process`] runs
//! short, bounded invocations to completion, and [`command`] supervises
//! long running ones with a watchdog and out-of-band cancellation.

pub mod command;
mod error;
pub mod path;
pub mod process;
mod scanner_command;

pub use command::{
    BackgroundCommand, Callback, CommandOutput, CommandState, Invocation, KILLED_RETURN_CODE,
};
pub use error::{Error, InvalidPathReason};
pub use path::{ExecutablePath, validate};
pub use process::{NO_SCANNERS_SENTINEL, ProcessOutput, detect_scanners, parse_detection, run};
pub use scanner_command::{DATA_FILE_NAME, ScannerCommand};
