use serde::Serialize;
use std::path::{Path, PathBuf};

pub const RAW_IMAGE_EXTENSION: &str = "qcow2";
pub const BUNDLE_EXTENSION: &str = "utm";
pub const BUNDLE_METADATA_FILE: &str = "config.plist";
pub const UNKNOWN_SIZE: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read scan root {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no .qcow2 image found inside {bundle}")]
    NoImageFound { bundle: PathBuf },

    #[error("qemu-img exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("qemu-img not found (neither the preferred nor the bundled binary exists)")]
    UtilityUnavailable,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path not found: {path}")]
    NotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan worker exited without a result")]
    ScanAborted,

    #[error("not a .qcow2 image or .utm bundle: {path}")]
    UnsupportedTarget { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiskKind {
    RawImage,
    Bundle,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub kind: DiskKind,
    pub size_label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DiskDescriptor>, // bundles only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
}

impl DiskDescriptor {
    pub fn raw_image(path: impl Into<PathBuf>, size_label: String) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path),
            path,
            kind: DiskKind::RawImage,
            size_label,
            children: Vec::new(),
            metadata_path: None,
        }
    }

    pub fn bundle(
        path: impl Into<PathBuf>,
        size_label: String,
        children: Vec<DiskDescriptor>,
        metadata_path: Option<PathBuf>,
    ) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path),
            path,
            kind: DiskKind::Bundle,
            size_label,
            children,
            metadata_path,
        }
    }

    pub fn is_bundle(&self) -> bool {
        self.kind == DiskKind::Bundle
    }

    /// Name shown to users: bundles lose their `.utm` suffix.
    pub fn display_name(&self) -> &str {
        match self.kind {
            DiskKind::Bundle => self
                .name
                .strip_suffix(".utm")
                .unwrap_or(&self.name),
            DiskKind::RawImage => &self.name,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: String,
    pub tag: String,
    pub created_at: String,
    pub disk_size_label: String,
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(extension)
}

pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL)
}

pub fn size_label(path: &Path) -> String {
    std::fs::metadata(path)
        .map(|meta| format_size(meta.len()))
        .unwrap_or_else(|_| UNKNOWN_SIZE.to_string())
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
