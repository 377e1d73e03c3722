#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

/// Name of the scanner binary looked up in `$PATH`.
pub const SCANNER_BINARY_NAME: &str = "fpscan";

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerSettings {
    /// Path to the `fpscan` binary driving the fingerprint reader.
    ///
    /// When unset, the directories listed in `$PATH` are searched for a file
    /// called `fpscan`. The path is validated again every time it is used.
    pub binary: Option<PathBuf>,

    /// Seconds a single scan may take before the scanner process is killed.
    /// Fractions are allowed, e.g. `12.5`.
    #[serde_as(as = "serde_with::DurationSecondsWithFrac<f64>")]
    pub scan_timeout: Duration,

    /// Directory the scanner runs in. A successful scan leaves its data file
    /// here. Defaults to the current directory.
    pub workdir: Option<PathBuf>,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            binary: None,
            scan_timeout: Duration::from_secs(30),
            workdir: None,
        }
    }
}

/// Locate the scanner binary.
///
/// `explicit` wins if it exists. Otherwise each entry of `$PATH` is checked
/// for a file named [`SCANNER_BINARY_NAME`]. Only existence is checked here,
/// executability is left to the scanner crate's path validation.
pub fn find_scanner_binary(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit
        && path.exists()
    {
        return Some(path.to_owned());
    }
    let paths = std::env::var_os("PATH")?;
    let found = std::env::split_paths(&paths)
        .map(|dir| dir.join(SCANNER_BINARY_NAME))
        .find(|candidate| candidate.exists());
    trace!(?found, "scanner binary lookup");
    found
}
