pub mod exec;
pub mod locate;
pub mod parse;
pub mod runner;

pub use exec::{CommandExecutor, CommandOutput, SystemExecutor};
pub use locate::{locate_utility, Availability, ToolPaths, DEFAULT_UTILITY_PATH, UTILITY_NAME};
pub use parse::parse_snapshot_list;
pub use runner::{resolve_disk_path, SnapshotRunner};
