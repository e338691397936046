use log::debug;
use snapmaker_core::{
    has_extension, size_label, DiskDescriptor, Error, Result, BUNDLE_EXTENSION,
    BUNDLE_METADATA_FILE, RAW_IMAGE_EXTENSION,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::panic;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

/// Walks `root` and returns every standalone `.qcow2` image and `.utm` bundle
/// below it. Only a root that cannot be listed is an error; unreadable
/// subdirectories are skipped.
pub fn scan(root: impl AsRef<Path>) -> Result<Vec<DiskDescriptor>> {
    let root = absolute(root.as_ref());
    let root = root.as_path();
    let entries = sorted_entries(root).map_err(|source| Error::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;
    let mut found = Vec::new();
    for (path, file_type) in entries {
        visit(path, file_type, &mut found);
    }
    debug!("scan of {} found {} entries", root.display(), found.len());
    Ok(found)
}

fn scan_dir(dir: &Path, found: &mut Vec<DiskDescriptor>) {
    let entries = match sorted_entries(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("skip {}: {}", dir.display(), err);
            return;
        }
    };
    for (path, file_type) in entries {
        visit(path, file_type, found);
    }
}

fn visit(path: PathBuf, file_type: fs::FileType, found: &mut Vec<DiskDescriptor>) {
    if file_type.is_dir() {
        if has_extension(&path, BUNDLE_EXTENSION) {
            found.push(describe_bundle(&path));
        } else {
            scan_dir(&path, found);
        }
    } else if file_type.is_file() && has_extension(&path, RAW_IMAGE_EXTENSION) {
        let label = size_label(&path);
        found.push(DiskDescriptor::raw_image(path, label));
    }
}

fn describe_bundle(bundle: &Path) -> DiskDescriptor {
    let children = collect_images(bundle)
        .into_iter()
        .map(|path| {
            let label = size_label(&path);
            DiskDescriptor::raw_image(path, label)
        })
        .collect();
    let config = bundle.join(BUNDLE_METADATA_FILE);
    let metadata_path = config.is_file().then_some(config);
    DiskDescriptor::bundle(bundle, size_label(bundle), children, metadata_path)
}

/// Every `.qcow2` file anywhere below `dir`, in walk order.
pub fn collect_images(dir: &Path) -> Vec<PathBuf> {
    let mut images = Vec::new();
    collect_images_inner(dir, &mut images, false);
    images
}

/// First `.qcow2` file in walk order, or `None` when the tree holds none.
pub fn find_first_image(dir: &Path) -> Option<PathBuf> {
    let mut images = Vec::new();
    collect_images_inner(dir, &mut images, true);
    images.into_iter().next()
}

fn collect_images_inner(dir: &Path, images: &mut Vec<PathBuf>, first_only: bool) {
    let entries = match sorted_entries(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("skip {}: {}", dir.display(), err);
            return;
        }
    };
    for (path, file_type) in entries {
        if first_only && !images.is_empty() {
            return;
        }
        if file_type.is_dir() {
            collect_images_inner(&path, images, first_only);
        } else if file_type.is_file() && has_extension(&path, RAW_IMAGE_EXTENSION) {
            images.push(path);
        }
    }
}

/// Classifies a single path named directly by the user.
pub fn describe_path(path: impl AsRef<Path>) -> Result<DiskDescriptor> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => Error::NotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if meta.is_dir() && has_extension(&path, BUNDLE_EXTENSION) {
        return Ok(describe_bundle(&path));
    }
    if meta.is_file() && has_extension(&path, RAW_IMAGE_EXTENSION) {
        let label = size_label(&path);
        return Ok(DiskDescriptor::raw_image(path, label));
    }
    Err(Error::UnsupportedTarget { path })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

// Symlinks are reported by their own type and never followed.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<(PathBuf, fs::FileType)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("skip entry in {}: {}", dir.display(), err);
                continue;
            }
        };
        match entry.file_type() {
            Ok(file_type) => entries.push((entry.path(), file_type)),
            Err(err) => debug!("skip {}: {}", entry.path().display(), err),
        }
    }
    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(entries)
}

/// A scan running on a worker thread.
pub struct ScanJob {
    rx: Receiver<Result<Vec<DiskDescriptor>>>,
    handle: Option<JoinHandle<()>>,
}

pub fn scan_in_background(root: impl Into<PathBuf>) -> ScanJob {
    let root = root.into();
    spawn_job(move || scan(&root))
}

fn spawn_job<F>(work: F) -> ScanJob
where
    F: FnOnce() -> Result<Vec<DiskDescriptor>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        // The receiver may already be gone; nothing to report to then.
        let _ = tx.send(work());
    });
    ScanJob {
        rx,
        handle: Some(handle),
    }
}

impl ScanJob {
    /// Blocks until the scan finishes. A panic on the worker is resumed on
    /// the calling thread.
    pub fn wait(mut self) -> Result<Vec<DiskDescriptor>> {
        let result = self.rx.recv();
        let joined = self.join_worker();
        match result {
            Ok(result) => result,
            Err(_) => Err(joined),
        }
    }

    /// Returns the result if the scan has finished, without blocking.
    pub fn try_result(&mut self) -> Option<Result<Vec<DiskDescriptor>>> {
        match self.rx.try_recv() {
            Ok(result) => {
                self.join_worker();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(self.join_worker())),
        }
    }

    // Called once the channel has a result or is closed. The error stands for
    // a worker that ended without sending.
    fn join_worker(&mut self) -> Error {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
        }
        Error::ScanAborted
    }
}
