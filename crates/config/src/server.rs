#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    /// Location of the record server, e.g. `localhost:8080` or
    /// `https://kofa.example.org/app`. A missing scheme means `https`.
    /// Credentials must not be part of it; they are injected from
    /// `username` and `password`.
    pub url: String,

    /// Account used to authenticate against the record server.
    pub username: String,

    /// Password for `username`. Only written back to disk when
    /// `save_password` is set.
    pub password: String,

    /// Whether [`crate::Config::save`] keeps the password.
    pub save_password: bool,

    /// Seconds before a remote call is abandoned.
    #[serde_as(as = "serde_with::DurationSecondsWithFrac<f64>")]
    pub request_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "localhost:8080".into(),
            username: "grok".into(),
            password: "grok".into(),
            save_password: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}
