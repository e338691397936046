use log::debug;
use std::path::{Path, PathBuf};

/// Homebrew's install location on Apple Silicon.
pub const DEFAULT_UTILITY_PATH: &str = "/opt/homebrew/bin/qemu-img";
pub const UTILITY_NAME: &str = "qemu-img";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub preferred: PathBuf,
    pub fallback: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            preferred: PathBuf::from(DEFAULT_UTILITY_PATH),
            fallback: bundled_fallback_path(),
        }
    }
}

/// A `qemu-img` shipped next to the running executable.
pub fn bundled_fallback_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(UTILITY_NAME))
}

/// Which `qemu-img` binary this process uses, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    utility: Option<PathBuf>,
    using_fallback: bool,
}

impl Availability {
    pub fn unavailable() -> Self {
        Self {
            utility: None,
            using_fallback: false,
        }
    }

    pub fn available(&self) -> bool {
        self.utility.is_some()
    }

    pub fn using_fallback(&self) -> bool {
        self.using_fallback
    }

    pub fn utility(&self) -> Option<&Path> {
        self.utility.as_deref()
    }
}

pub fn locate_utility(paths: &ToolPaths) -> Availability {
    if paths.preferred.is_file() {
        debug!("using qemu-img at {}", paths.preferred.display());
        return Availability {
            utility: Some(paths.preferred.clone()),
            using_fallback: false,
        };
    }
    if let Some(fallback) = paths.fallback.as_ref().filter(|path| path.is_file()) {
        debug!("using bundled qemu-img at {}", fallback.display());
        return Availability {
            utility: Some(fallback.clone()),
            using_fallback: true,
        };
    }
    debug!(
        "qemu-img missing at {} and no usable fallback",
        paths.preferred.display()
    );
    Availability::unavailable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn prefers_primary_install() {
        let dir = tempfile::tempdir().unwrap();
        let preferred = dir.path().join("primary");
        let fallback = dir.path().join("bundled");
        fs::write(&preferred, b"").unwrap();
        fs::write(&fallback, b"").unwrap();

        let found = locate_utility(&ToolPaths {
            preferred: preferred.clone(),
            fallback: Some(fallback),
        });
        assert!(found.available());
        assert!(!found.using_fallback());
        assert_eq!(found.utility(), Some(preferred.as_path()));
    }

    #[test]
    fn falls_back_to_bundled_binary() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("bundled");
        fs::write(&fallback, b"").unwrap();

        let found = locate_utility(&ToolPaths {
            preferred: dir.path().join("missing"),
            fallback: Some(fallback.clone()),
        });
        assert!(found.available());
        assert!(found.using_fallback());
        assert_eq!(found.utility(), Some(fallback.as_path()));
    }

    #[test]
    fn nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let found = locate_utility(&ToolPaths {
            preferred: dir.path().join("missing"),
            fallback: Some(dir.path().join("also-missing")),
        });
        assert_eq!(found, Availability::unavailable());
        assert!(!found.available());
        assert!(!found.using_fallback());
    }

    #[test]
    fn directory_is_not_a_binary() {
        let dir = tempfile::tempdir().unwrap();
        let found = locate_utility(&ToolPaths {
            preferred: dir.path().to_path_buf(),
            fallback: None,
        });
        assert!(!found.available());
    }
}
