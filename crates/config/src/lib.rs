#![forbid(unsafe_code)]

mod error;
mod scanner;
mod server;

pub use error::Error;
pub use scanner::{SCANNER_BINARY_NAME, ScannerSettings, find_scanner_binary};
pub use server::ServerSettings;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the per-user configuration inside `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".waeupident.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub scanner: ScannerSettings,
    pub server: ServerSettings,
}

impl Config {
    /// Load configuration from a TOML file. Missing fields are filled with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Config = toml_edit::de::from_str(&text)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Save configuration to a TOML file.
    ///
    /// The server password is left out unless `server.save_password` is set.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let toml = toml_edit::ser::to_string_pretty(self)?;
        let mut doc: toml_edit::DocumentMut = toml.parse()?;
        if !self.server.save_password
            && let Some(server) = doc.get_mut("server").and_then(|s| s.as_table_mut())
        {
            server.remove("password");
        }
        std::fs::write(path, doc.to_string())?;
        Ok(())
    }

    /// Load configuration from multiple TOML files. Later files override earlier ones.
    pub fn load_multiple<T, U>(paths: U) -> Result<Self, Error>
    where
        T: AsRef<Path>,
        U: IntoIterator<Item = T>,
    {
        let mut merged = toml_edit::DocumentMut::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                debug!(?path, "skipping missing config file");
                continue;
            }
            let text = std::fs::read_to_string(path)?;
            let doc: toml_edit::DocumentMut = text.parse()?;
            merge_document(&mut merged, doc);
        }
        let mut config: Config = toml_edit::de::from_str(&merged.to_string())?;
        config.apply_defaults();
        Ok(config)
    }

    /// Per-user configuration file, `$HOME/.waeupident.toml`.
    pub fn default_location() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
    }

    /// Fill in values that can only be determined at runtime.
    pub fn apply_defaults(&mut self) {
        if self.scanner.binary.is_none() {
            self.scanner.binary = find_scanner_binary(None);
        }
    }
}

fn merge_document(target: &mut toml_edit::DocumentMut, source: toml_edit::DocumentMut) {
    for (key, item) in source.iter() {
        merge_item(
            target.entry(key).or_insert(toml_edit::Item::None),
            item.clone(),
        );
    }
}

fn merge_item(target: &mut toml_edit::Item, source: toml_edit::Item) {
    use toml_edit::Item;
    match (target, source) {
        (Item::Table(target_table), Item::Table(source_table)) => {
            for (key, item) in source_table.iter() {
                merge_item(target_table.entry(key).or_insert(Item::None), item.clone());
            }
        }
        (target_item, source_item) => {
            *target_item = source_item;
        }
    }
}
