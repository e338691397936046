pub mod settings;

use anyhow::{anyhow, Result};
use log::info;
use snapmaker_core::{DiskDescriptor, Error, SnapshotRecord};
use snapmaker_qemu::{locate_utility, CommandExecutor, SnapshotRunner, SystemExecutor};
use snapmaker_safety::{can_delete, can_restore, ConfirmContext, SafetyDecision};
use snapmaker_scanner::{describe_path, scan, scan_in_background, ScanJob};
use std::path::Path;

pub use settings::Settings;
pub use snapmaker_qemu::Availability;

/// Resolved settings plus the `qemu-img` probe result, built once at startup
/// and passed to whatever needs it. Scanning and every snapshot operation
/// refuse to run when no `qemu-img` was found.
pub struct Session<E = SystemExecutor> {
    settings: Settings,
    availability: Availability,
    runner: Option<SnapshotRunner<E>>,
}

impl Session<SystemExecutor> {
    pub fn start(settings: Settings) -> Self {
        Self::with_executor(settings, SystemExecutor)
    }
}

impl<E: CommandExecutor> Session<E> {
    pub fn with_executor(settings: Settings, executor: E) -> Self {
        let availability = locate_utility(&settings.tools);
        let runner = SnapshotRunner::with_executor(&availability, executor).ok();
        if availability.using_fallback() {
            info!("preferred qemu-img missing, using bundled binary");
        }
        Self {
            settings,
            availability,
            runner,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    fn runner(&self) -> Result<&SnapshotRunner<E>> {
        self.runner
            .as_ref()
            .ok_or_else(|| Error::UtilityUnavailable.into())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.availability.available() {
            Ok(())
        } else {
            Err(Error::UtilityUnavailable.into())
        }
    }

    /// Scans the configured scan path.
    pub fn scan(&self) -> Result<Vec<DiskDescriptor>> {
        self.scan_path(&self.settings.scan_path)
    }

    pub fn scan_path(&self, root: &Path) -> Result<Vec<DiskDescriptor>> {
        self.ensure_available()?;
        Ok(scan(root)?)
    }

    pub fn scan_in_background(&self, root: &Path) -> Result<ScanJob> {
        self.ensure_available()?;
        Ok(scan_in_background(root))
    }

    pub fn describe(&self, path: &Path) -> Result<DiskDescriptor> {
        Ok(describe_path(path)?)
    }

    /// Empty when listing fails; only a missing `qemu-img` is an error.
    pub fn list_snapshots(&self, disk: &DiskDescriptor) -> Result<Vec<SnapshotRecord>> {
        Ok(self.runner()?.list_snapshots(disk))
    }

    pub fn create_snapshot(&self, disk: &DiskDescriptor, tag: &str) -> Result<()> {
        Ok(self.runner()?.create_snapshot(disk, tag)?)
    }

    /// Removes snapshot `tag` once `ctx` confirms it.
    pub fn delete_snapshot(
        &self,
        disk: &DiskDescriptor,
        tag: &str,
        ctx: &ConfirmContext,
    ) -> Result<()> {
        let runner = self.runner()?;
        check(can_delete(ctx, tag))?;
        Ok(runner.delete_snapshot(disk, tag)?)
    }

    /// Overwrites the disk with snapshot `tag` once `ctx` confirms it.
    pub fn restore_snapshot(
        &self,
        disk: &DiskDescriptor,
        tag: &str,
        ctx: &ConfirmContext,
    ) -> Result<()> {
        let runner = self.runner()?;
        check(can_restore(ctx, tag))?;
        Ok(runner.restore_snapshot(disk, tag)?)
    }
}

fn check(decision: SafetyDecision) -> Result<()> {
    match decision {
        SafetyDecision::Allow => Ok(()),
        SafetyDecision::Deny(reason) => Err(anyhow!(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapmaker_qemu::{CommandOutput, ToolPaths};
    use std::cell::RefCell;
    use std::ffi::OsString;
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Vec<OsString>>>,
    }

    impl CommandExecutor for &Recorder {
        fn execute(&self, _program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
            self.calls.borrow_mut().push(args.to_vec());
            Ok(CommandOutput {
                code: 0,
                stdout: "1 base 1G 2024-01-15 10:30:00\n".to_string(),
                stderr: String::new(),
            })
        }
    }

    fn settings_with(utility: PathBuf, scan_path: PathBuf) -> Settings {
        Settings {
            scan_path,
            tools: ToolPaths {
                preferred: utility,
                fallback: None,
            },
        }
    }

    #[test]
    fn missing_utility_gates_everything() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.qcow2");
        fs::write(&image, b"").unwrap();
        let recorder = Recorder::default();
        let session = Session::with_executor(
            settings_with(dir.path().join("no-qemu-img"), dir.path().to_path_buf()),
            &recorder,
        );
        assert!(!session.availability().available());

        let unavailable = |err: anyhow::Error| {
            matches!(err.downcast_ref::<Error>(), Some(Error::UtilityUnavailable))
        };
        assert!(unavailable(session.scan().unwrap_err()));
        assert!(unavailable(session.scan_in_background(dir.path()).err().unwrap()));
        let disk = session.describe(&image).unwrap();
        assert!(unavailable(session.list_snapshots(&disk).unwrap_err()));
        assert!(unavailable(session.create_snapshot(&disk, "t").unwrap_err()));
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn scan_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let utility = dir.path().join("qemu-img");
        fs::write(&utility, b"").unwrap();
        let vms = dir.path().join("vms");
        fs::create_dir_all(vms.join("Box.utm")).unwrap();
        fs::write(vms.join("Box.utm").join("disk.qcow2"), b"").unwrap();

        let recorder = Recorder::default();
        let session = Session::with_executor(settings_with(utility, vms.clone()), &recorder);
        let found = session.scan().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name(), "Box");

        let job = session.scan_in_background(&vms).unwrap();
        assert_eq!(job.wait().unwrap(), found);
    }

    #[test]
    fn restore_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let utility = dir.path().join("qemu-img");
        fs::write(&utility, b"").unwrap();
        let image = dir.path().join("a.qcow2");
        fs::write(&image, b"").unwrap();

        let recorder = Recorder::default();
        let session =
            Session::with_executor(settings_with(utility, dir.path().to_path_buf()), &recorder);
        let disk = session.describe(&image).unwrap();

        assert!(session
            .restore_snapshot(&disk, "base", &ConfirmContext::default())
            .is_err());
        assert!(recorder.calls.borrow().is_empty());

        let ctx = ConfirmContext {
            assume_yes: false,
            confirmation: Some("base".to_string()),
        };
        session.restore_snapshot(&disk, "base", &ctx).unwrap();
        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1], OsString::from("-a"));
    }

    #[test]
    fn delete_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let utility = dir.path().join("qemu-img");
        fs::write(&utility, b"").unwrap();
        let image = dir.path().join("a.qcow2");
        fs::write(&image, b"").unwrap();

        let recorder = Recorder::default();
        let session =
            Session::with_executor(settings_with(utility, dir.path().to_path_buf()), &recorder);
        let disk = session.describe(&image).unwrap();

        let err = session
            .delete_snapshot(&disk, "base", &ConfirmContext::default())
            .unwrap_err();
        assert!(err.to_string().contains("delete requires confirmation"));
        assert!(recorder.calls.borrow().is_empty());

        let ctx = ConfirmContext {
            assume_yes: true,
            confirmation: None,
        };
        session.delete_snapshot(&disk, "base", &ctx).unwrap();
        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1], OsString::from("-d"));
    }

    #[test]
    fn list_goes_through_runner() {
        let dir = tempfile::tempdir().unwrap();
        let utility = dir.path().join("qemu-img");
        fs::write(&utility, b"").unwrap();
        let image = dir.path().join("a.qcow2");
        fs::write(&image, b"").unwrap();

        let recorder = Recorder::default();
        let session =
            Session::with_executor(settings_with(utility, dir.path().to_path_buf()), &recorder);
        let disk = session.describe(&image).unwrap();
        let records = session.list_snapshots(&disk).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag, "base");
    }
}
