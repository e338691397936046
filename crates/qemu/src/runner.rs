use crate::exec::{CommandExecutor, CommandOutput, SystemExecutor};
use crate::locate::Availability;
use crate::parse::parse_snapshot_list;
use log::{debug, info, warn};
use snapmaker_core::{DiskDescriptor, DiskKind, Error, Result, SnapshotRecord};
use snapmaker_scanner::find_first_image;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The image file a descriptor stands for. Bundles are searched again on
/// every call so removed or replaced disks are noticed.
pub fn resolve_disk_path(disk: &DiskDescriptor) -> Result<PathBuf> {
    match disk.kind {
        DiskKind::RawImage => Ok(disk.path.clone()),
        DiskKind::Bundle => find_first_image(&disk.path).ok_or_else(|| Error::NoImageFound {
            bundle: disk.path.clone(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
enum SnapshotOp<'a> {
    Create(&'a str),
    Delete(&'a str),
    Apply(&'a str),
    List,
}

fn snapshot_args(op: SnapshotOp<'_>, image: &Path) -> Vec<OsString> {
    let mut args = vec![OsString::from("snapshot")];
    match op {
        SnapshotOp::Create(tag) => args.extend([OsString::from("-c"), OsString::from(tag)]),
        SnapshotOp::Delete(tag) => args.extend([OsString::from("-d"), OsString::from(tag)]),
        SnapshotOp::Apply(tag) => args.extend([OsString::from("-a"), OsString::from(tag)]),
        SnapshotOp::List => args.push(OsString::from("-l")),
    }
    args.push(image.as_os_str().to_os_string());
    args
}

/// Drives `qemu-img snapshot` against the disk behind a descriptor.
///
/// Calls block until `qemu-img` exits; there is no timeout. Nothing stops two
/// runners from operating on the same image at once, so callers must
/// serialize operations per image themselves.
#[derive(Debug, Clone)]
pub struct SnapshotRunner<E = SystemExecutor> {
    utility: PathBuf,
    executor: E,
}

impl SnapshotRunner<SystemExecutor> {
    pub fn new(availability: &Availability) -> Result<Self> {
        Self::with_executor(availability, SystemExecutor)
    }
}

impl<E: CommandExecutor> SnapshotRunner<E> {
    pub fn with_executor(availability: &Availability, executor: E) -> Result<Self> {
        let utility = availability
            .utility()
            .ok_or(Error::UtilityUnavailable)?
            .to_path_buf();
        Ok(Self { utility, executor })
    }

    pub fn utility(&self) -> &Path {
        &self.utility
    }

    pub fn create_snapshot(&self, disk: &DiskDescriptor, tag: &str) -> Result<()> {
        let image = resolve_disk_path(disk)?;
        self.run_checked(SnapshotOp::Create(tag), &image)?;
        info!("created snapshot {} on {}", tag, image.display());
        Ok(())
    }

    pub fn delete_snapshot(&self, disk: &DiskDescriptor, tag: &str) -> Result<()> {
        let image = resolve_disk_path(disk)?;
        self.run_checked(SnapshotOp::Delete(tag), &image)?;
        info!("deleted snapshot {} from {}", tag, image.display());
        Ok(())
    }

    /// Reverts the disk to the snapshot named `tag`.
    ///
    /// This overwrites the current disk contents and cannot be undone. Get an
    /// explicit confirmation from the user before calling it.
    pub fn restore_snapshot(&self, disk: &DiskDescriptor, tag: &str) -> Result<()> {
        let image = resolve_disk_path(disk)?;
        self.run_checked(SnapshotOp::Apply(tag), &image)?;
        info!("restored {} to snapshot {}", image.display(), tag);
        Ok(())
    }

    /// Best effort: any failure is logged and reported as "no snapshots".
    pub fn list_snapshots(&self, disk: &DiskDescriptor) -> Vec<SnapshotRecord> {
        let image = match resolve_disk_path(disk) {
            Ok(image) => image,
            Err(err) => {
                warn!("cannot list snapshots of {}: {}", disk.path.display(), err);
                return Vec::new();
            }
        };
        match self.run_checked(SnapshotOp::List, &image) {
            Ok(output) => parse_snapshot_list(&output.stdout),
            Err(err) => {
                warn!("cannot list snapshots of {}: {}", image.display(), err);
                Vec::new()
            }
        }
    }

    fn run_checked(&self, op: SnapshotOp<'_>, image: &Path) -> Result<CommandOutput> {
        let args = snapshot_args(op, image);
        debug!("running {} {:?}", self.utility.display(), args);
        let output = self
            .executor
            .execute(&self.utility, &args)
            .map_err(|source| Error::Spawn {
                program: self.utility.clone(),
                source,
            })?;
        if !output.success() {
            return Err(Error::CommandFailed {
                code: output.code,
                stderr: output.stderr.trim_end().to_string(),
            });
        }
        Ok(output)
    }
}
