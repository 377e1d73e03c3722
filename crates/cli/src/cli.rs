#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// waeup-identifier: identify students by their fingerprints
///
/// Drives an external `fpscan` binary to capture and compare fingerprints
/// and exchanges the results with a Kofa student record server.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, `$HOME/.waeupident.toml` is used when it exists.
    /// Otherwise the built-in defaults apply.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List the fingerprint readers attached to this machine.
    Detect,

    /// Capture a fingerprint into the scanner's working directory.
    Scan {
        /// Seconds to wait for a finger before giving up.
        #[arg(short, long, value_parser = parse_seconds)]
        timeout: Option<Duration>,
    },

    /// Compare a fresh scan with a stored fingerprint.
    Compare {
        /// Fingerprint file to compare against.
        #[arg(short, long, value_parser = validate_file)]
        stored: PathBuf,

        /// Seconds to wait for a finger before giving up.
        #[arg(short, long, value_parser = parse_seconds)]
        timeout: Option<Duration>,
    },

    /// Upload a scanned fingerprint to the record server.
    Store {
        /// Student id, e.g. `AB123456`.
        #[arg(short, long)]
        student: String,

        /// Finger number, 1 to 10.
        #[arg(short, long, value_parser = validate_finger)]
        finger: u8,

        /// Fingerprint file. Defaults to the last scan.
        #[arg(long, value_parser = validate_file)]
        file: Option<PathBuf>,
    },

    /// Show a student record and its stored fingerprints.
    Fetch {
        /// Student id, e.g. `AB123456`.
        #[arg(short, long)]
        student: String,
    },

    /// Check that the record server is reachable with the configured account.
    Ping,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

/// Validate a finger number.
#[inline(always)]
fn validate_finger(finger: &str) -> Result<u8, String> {
    let finger: u8 = finger
        .parse()
        .map_err(|_| format!("`{finger}` is not a valid finger number"))?;
    if (1..=10).contains(&finger) {
        Ok(finger)
    } else {
        Err("Finger number must be between 1 and 10".to_string())
    }
}

fn parse_seconds(seconds: &str) -> Result<Duration, String> {
    seconds
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .filter(|d| !d.is_zero())
        .ok_or_else(|| format!("`{seconds}` is not a positive number of seconds"))
}
