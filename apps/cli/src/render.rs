use snapmaker_core::{DiskDescriptor, SnapshotRecord};
use snapmaker_session::settings::QEMU_IMG_ENV;
use snapmaker_vm_config::ConfigRow;
use std::fmt::Write;

pub fn availability(availability: &snapmaker_session::Availability) -> String {
    match availability.utility() {
        Some(path) if availability.using_fallback() => format!(
            "qemu-img: {} (bundled fallback; install qemu or set {} to use your own)",
            path.display(),
            QEMU_IMG_ENV
        ),
        Some(path) => format!("qemu-img: {}", path.display()),
        None => format!(
            "qemu-img: not found (install it with `brew install qemu` or set {})",
            QEMU_IMG_ENV
        ),
    }
}

pub fn disk_tree(disks: &[DiskDescriptor]) -> String {
    let mut out = String::new();
    for disk in disks {
        if disk.is_bundle() {
            let _ = writeln!(
                out,
                "{}  [utm, {}]  {}",
                disk.display_name(),
                disk.size_label,
                disk.path.display()
            );
            for child in &disk.children {
                let _ = writeln!(
                    out,
                    "  {}  [{}]  {}",
                    child.name,
                    child.size_label,
                    child.path.display()
                );
            }
            if disk.children.is_empty() {
                let _ = writeln!(out, "  (no qcow2 images)");
            }
            if let Some(config) = &disk.metadata_path {
                let _ = writeln!(out, "  config: {}", config.display());
            }
        } else {
            let _ = writeln!(
                out,
                "{}  [qcow2, {}]  {}",
                disk.display_name(),
                disk.size_label,
                disk.path.display()
            );
        }
    }
    out
}

pub fn snapshot_table(snapshots: &[SnapshotRecord]) -> String {
    let tag_width = snapshots
        .iter()
        .map(|s| s.tag.len())
        .max()
        .unwrap_or(0)
        .max("TAG".len());
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<4} {:<tag_width$} {:<19} {}",
        "ID", "TAG", "CREATED", "VM SIZE"
    );
    for snapshot in snapshots {
        let _ = writeln!(
            out,
            "{:<4} {:<tag_width$} {:<19} {}",
            snapshot.id, snapshot.tag, snapshot.created_at, snapshot.disk_size_label
        );
    }
    out
}

pub fn config_rows(rows: &[ConfigRow]) -> String {
    let width = rows.iter().map(|r| r.key.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(out, "{:<width$}  {}", row.key, row.value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn tree_lists_bundle_children() {
        let child = DiskDescriptor::raw_image("/vms/Linux.utm/Data/root.qcow2", "2.15 GB".to_string());
        let bundle = DiskDescriptor::bundle(
            "/vms/Linux.utm",
            "4.10 kB".to_string(),
            vec![child],
            Some(PathBuf::from("/vms/Linux.utm/config.plist")),
        );
        let empty = DiskDescriptor::bundle("/vms/Empty.utm", "96 B".to_string(), Vec::new(), None);
        let loose = DiskDescriptor::raw_image("/vms/loose.qcow2", "1.00 GB".to_string());

        let text = disk_tree(&[bundle, empty, loose]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Linux  [utm, 4.10 kB]  /vms/Linux.utm");
        assert_eq!(lines[1], "  root.qcow2  [2.15 GB]  /vms/Linux.utm/Data/root.qcow2");
        assert_eq!(lines[2], "  config: /vms/Linux.utm/config.plist");
        assert_eq!(lines[3], "Empty  [utm, 96 B]  /vms/Empty.utm");
        assert_eq!(lines[4], "  (no qcow2 images)");
        assert_eq!(lines[5], "loose.qcow2  [qcow2, 1.00 GB]  /vms/loose.qcow2");
    }

    #[test]
    fn table_aligns_tags() {
        let rows = vec![
            SnapshotRecord {
                id: "1".to_string(),
                tag: "clean-install".to_string(),
                created_at: "2024-01-15 10:30:00".to_string(),
                disk_size_label: "10G".to_string(),
            },
            SnapshotRecord {
                id: "2".to_string(),
                tag: "x".to_string(),
                created_at: "2024-01-16 09:00:00".to_string(),
                disk_size_label: "10G".to_string(),
            },
        ];
        let text = snapshot_table(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID   TAG           "));
        assert_eq!(lines[1], "1    clean-install 2024-01-15 10:30:00 10G");
        assert_eq!(lines[2], "2    x             2024-01-16 09:00:00 10G");
    }

    #[test]
    fn missing_utility_message() {
        let text = availability(&snapmaker_session::Availability::unavailable());
        assert!(text.contains("not found"));
        assert!(text.contains(QEMU_IMG_ENV));
    }
}
