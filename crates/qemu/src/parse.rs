use snapmaker_core::SnapshotRecord;

/// Parses the table printed by `qemu-img snapshot -l`:
///
/// ```text
/// Snapshot list:
/// ID        TAG               VM SIZE                DATE     VM CLOCK     ICOUNT
/// 1         clean-install         0 B 2024-01-15 10:30:00 00:00:00.000          0
/// ```
///
/// A row counts only if it has at least five fields and the first is an
/// integer, which drops the banner, the header and blank lines.
///
/// Fields are taken by position, matching older `qemu-img` versions that
/// print the VM size as one token ("10G"). Newer versions print two tokens
/// ("0 B"), which shifts the columns: for the row above the size label is
/// `"0"` and `created_at` is `"B 2024-01-15"`, with the time dropped.
pub fn parse_snapshot_list(output: &str) -> Vec<SnapshotRecord> {
    output.lines().filter_map(parse_row).collect()
}

fn parse_row(line: &str) -> Option<SnapshotRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 || fields[0].parse::<i64>().is_err() {
        return None;
    }
    Some(SnapshotRecord {
        id: fields[0].to_string(),
        tag: fields[1].to_string(),
        disk_size_label: fields[2].to_string(),
        created_at: format!("{} {}", fields[3], fields[4]),
    })
}
