mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::error;
use snapmaker_core::Error;
use snapmaker_safety::{ConfirmContext, Destructive};
use snapmaker_session::{Session, Settings};
use snapmaker_vm_config::{export_bundle_config, read_bundle_config};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "snapmaker",
    version,
    about = "Browse VM disk images and manage their qcow2 snapshots",
    after_help = "\
Settings file lookup order:
  1. --config <path>
  2. $SNAPMAKER_CONFIG
  3. <user config dir>/snapmaker/config.json

Environment variables:
  SNAPMAKER_SCAN_PATH   Directory scanned when no PATH is given
  SNAPMAKER_QEMU_IMG    Preferred qemu-img binary
  RUST_LOG              Log filter (overrides -v)"
)]
struct Cli {
    /// Path to a JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which qemu-img binary is in use
    Check,

    /// Find .qcow2 images and .utm bundles under a directory
    Scan {
        /// Directory to scan (defaults to the configured scan path)
        path: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// List the snapshots of an image or bundle
    List {
        /// A .qcow2 file or .utm bundle
        target: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Create a snapshot
    Create { target: PathBuf, tag: String },

    /// Delete a snapshot
    Delete {
        target: PathBuf,
        tag: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Revert the disk to a snapshot, discarding its current state
    Restore {
        target: PathBuf,
        tag: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or export a bundle's config.plist
    Config {
        /// A .utm bundle
        bundle: PathBuf,

        /// Copy config.plist to this file or directory
        #[arg(long)]
        export: Option<PathBuf>,

        /// Only show keys containing this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    if let Err(err) = run(cli) {
        report(&err);
        std::process::exit(1);
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(Error::CommandFailed { code, stderr }) => {
            error!("qemu-img exited with status {}", code);
            eprintln!("{}", stderr);
        }
        _ => eprintln!("error: {:#}", err),
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let session = Session::start(settings);

    match cli.command {
        Commands::Check => {
            let availability = session.availability();
            println!("{}", render::availability(availability));
            if !availability.available() {
                return Err(Error::UtilityUnavailable.into());
            }
            Ok(())
        }
        Commands::Scan { path, json } => {
            let root = path.unwrap_or_else(|| session.settings().scan_path.clone());
            let found = session
                .scan_in_background(&root)?
                .wait()
                .with_context(|| format!("scan {}", root.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else if found.is_empty() {
                println!("no disk images found under {}", root.display());
            } else {
                print!("{}", render::disk_tree(&found));
            }
            Ok(())
        }
        Commands::List { target, json } => {
            let disk = session.describe(&target)?;
            let snapshots = session.list_snapshots(&disk)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if snapshots.is_empty() {
                println!("no snapshots on {}", disk.display_name());
            } else {
                print!("{}", render::snapshot_table(&snapshots));
            }
            Ok(())
        }
        Commands::Create { target, tag } => {
            let disk = session.describe(&target)?;
            session.create_snapshot(&disk, &tag)?;
            println!("created snapshot '{}' on {}", tag, disk.display_name());
            Ok(())
        }
        Commands::Delete { target, tag, yes } => {
            let disk = session.describe(&target)?;
            let ctx = confirm(Destructive::Delete, disk.display_name(), &tag, yes)?;
            session.delete_snapshot(&disk, &tag, &ctx)?;
            println!("deleted snapshot '{}' from {}", tag, disk.display_name());
            Ok(())
        }
        Commands::Restore { target, tag, yes } => {
            let disk = session.describe(&target)?;
            let ctx = confirm(Destructive::Restore, disk.display_name(), &tag, yes)?;
            session.restore_snapshot(&disk, &tag, &ctx)?;
            println!("restored {} to snapshot '{}'", disk.display_name(), tag);
            Ok(())
        }
        Commands::Config {
            bundle,
            export,
            filter,
            json,
        } => {
            let disk = session.describe(&bundle)?;
            let source = disk
                .metadata_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("{} has no config.plist", disk.path.display()))?;
            if let Some(dest) = export {
                let written = export_bundle_config(&source, &dest)?;
                println!("exported {}", written.display());
                return Ok(());
            }
            let mut config = read_bundle_config(&source)?;
            if let Some(needle) = &filter {
                config = config.filter_keys(needle);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", render::config_rows(&config.rows));
            }
            Ok(())
        }
    }
}

fn confirm(op: Destructive, name: &str, tag: &str, yes: bool) -> Result<ConfirmContext> {
    let confirmation = if yes {
        None
    } else {
        prompt_confirmation(&warning(op, name, tag))?
    };
    Ok(ConfirmContext {
        assume_yes: yes,
        confirmation,
    })
}

fn warning(op: Destructive, name: &str, tag: &str) -> String {
    match op {
        Destructive::Delete => format!(
            "Deleting snapshot '{}' from '{}' cannot be undone.",
            tag, name
        ),
        Destructive::Restore => format!(
            "Restoring '{}' to snapshot '{}' discards its current state.",
            name, tag
        ),
    }
}

/// Asks for the tag to be typed back. Nothing is read when stdin is not a
/// terminal, which leaves the operation unconfirmed.
fn prompt_confirmation(warning: &str) -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }
    eprint!("{}\nType the tag to confirm: ", warning);
    std::io::stderr().flush()?;
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(Some(line))
}
