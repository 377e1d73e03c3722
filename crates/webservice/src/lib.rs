#![forbid(unsafe_code)]

//! Talking to the student record server over XML-RPC.
//!
//! Local mistakes such as an unparsable server location are raised as
//! [`Error`]. Everything that goes wrong on the wire is returned as a
//! [`RemoteError`] inside an [`Outcome`], ready to be shown to a user.

mod address;
mod client;
mod error;
mod proxy;
mod record;
pub mod xmlrpc;

pub use address::{DEFAULT_SCHEME, build_url, url_from_config};
pub use client::{
    DEFAULT_REQUEST_TIMEOUT, Outcome, RemoteError, RemoteErrorKind, fetch_fingerprints,
    fetch_fingerprints_with, ping, ping_with, store_fingerprint, store_fingerprint_with,
};
pub use error::Error;
pub use proxy::{CallError, ServerProxy};
pub use record::{Fingerprints, RecordService, StudentRecord};
