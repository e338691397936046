use anyhow::{anyhow, Context, Result};
use log::debug;
use plist::Value;
use serde::Serialize;
use snapmaker_core::BUNDLE_METADATA_FILE;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ConfigRow {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct BundleConfig {
    pub source: PathBuf,
    pub rows: Vec<ConfigRow>,
}

impl BundleConfig {
    /// Keeps only rows whose key contains `needle`, ignoring case. An empty
    /// needle keeps every row.
    pub fn filter_keys(mut self, needle: &str) -> Self {
        let needle = needle.to_lowercase();
        self.rows.retain(|row| row.key.to_lowercase().contains(&needle));
        self
    }
}

/// Reads a bundle's `config.plist` (XML or binary) into rows sorted by key.
/// Nested containers are summarised rather than expanded.
pub fn read_bundle_config(path: impl AsRef<Path>) -> Result<BundleConfig> {
    let path = path.as_ref();
    let value = Value::from_file(path).with_context(|| format!("read {}", path.display()))?;
    let dict = value
        .into_dictionary()
        .ok_or_else(|| anyhow!("{} is not a dictionary plist", path.display()))?;

    let mut rows: Vec<ConfigRow> = dict
        .iter()
        .map(|(key, value)| ConfigRow {
            key: key.clone(),
            value: display_value(value),
        })
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    debug!("{}: {} keys", path.display(), rows.len());

    Ok(BundleConfig {
        source: path.to_path_buf(),
        rows,
    })
}

/// Copies `config.plist` to `dest`. An existing directory as `dest` receives a
/// file named `config.plist`.
pub fn export_bundle_config(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<PathBuf> {
    let source = source.as_ref();
    let dest = dest.as_ref();
    let target = if dest.is_dir() {
        dest.join(BUNDLE_METADATA_FILE)
    } else {
        dest.to_path_buf()
    };
    fs::copy(source, &target)
        .with_context(|| format!("copy {} to {}", source.display(), target.display()))?;
    Ok(target)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Boolean(flag) => flag.to_string(),
        Value::Integer(number) => number
            .as_signed()
            .map(|n| n.to_string())
            .or_else(|| number.as_unsigned().map(|n| n.to_string()))
            .unwrap_or_default(),
        Value::Real(number) => number.to_string(),
        Value::Date(date) => {
            let at = SystemTime::from(date.clone());
            OffsetDateTime::from(at)
                .format(&Rfc3339)
                .unwrap_or_else(|_| "invalid date".to_string())
        }
        Value::Data(bytes) => format!("<{} bytes>", bytes.len()),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Dictionary(dict) => format!("{{{} keys}}", dict.len()),
        Value::Uid(uid) => format!("uid {}", uid.get()),
        _ => "unsupported".to_string(),
    }
}
