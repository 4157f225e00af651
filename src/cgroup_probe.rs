//! Cgroup hierarchy probing: host-wide setup classification, own v2 group
//! lookup, v1 hierarchy creation, and the v2 "is a sibling tracking this
//! snap" subtree scan. See `SPEC_FULL.md` §4.3.

use std::fmt::Display;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::sys::statfs::{statfs, CGROUP2_SUPER_MAGIC, TMPFS_MAGIC};
use nix::unistd::{Gid, Pid, Uid};

use crate::error::{WrapIoResult, WrappedIoError};
use crate::fsutil::{self, CGROUP_PROCS, DEFAULT_CGROUP_ROOT};

const MAX_SUBTREE_DEPTH: u32 = 32;

#[derive(thiserror::Error, Debug)]
pub enum CgroupProbeError {
    #[error("io error: {0}")]
    Io(#[from] WrappedIoError),
    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
    #[error("failed to stat cgroup root {path}: {err}")]
    Statfs { path: PathBuf, err: nix::Error },
    #[error("malformed 0:: line in {path}: empty path")]
    EmptyV2Path { path: PathBuf },
    #[error("subtree scan under {root} exceeded max depth {max_depth}")]
    MaxDepthExceeded { root: PathBuf, max_depth: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupSetup {
    Unified,
    Legacy,
    Hybrid,
}

impl Display for CgroupSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CgroupSetup::Unified => "unified",
            CgroupSetup::Legacy => "legacy",
            CgroupSetup::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

/// Classifies the host's cgroup arrangement by statfs-ing `cgroup_root`
/// (normally `/sys/fs/cgroup`).
pub fn get_cgroup_setup(cgroup_root: &Path) -> Result<CgroupSetup, CgroupProbeError> {
    let stat = statfs(cgroup_root).map_err(|err| CgroupProbeError::Statfs {
        path: cgroup_root.to_path_buf(),
        err,
    })?;

    if stat.filesystem_type() == CGROUP2_SUPER_MAGIC {
        return Ok(CgroupSetup::Unified);
    }

    if stat.filesystem_type() == TMPFS_MAGIC {
        let unified = cgroup_root.join("unified");
        if unified.exists() {
            let stat = statfs(&unified).map_err(|err| CgroupProbeError::Statfs {
                path: unified.clone(),
                err,
            })?;
            if stat.filesystem_type() == CGROUP2_SUPER_MAGIC {
                return Ok(CgroupSetup::Hybrid);
            }
        }
        return Ok(CgroupSetup::Legacy);
    }

    // Any other filesystem type at this path isn't a cgroup mount we
    // recognise; treat it the same as the legacy tmpfs arrangement, which is
    // the conservative choice (callers fall back to the v1 arm).
    Ok(CgroupSetup::Legacy)
}

/// Is the host unified (pure cgroup v2)? Emits a one-shot `tracing::warn!` on
/// first detection, matching the ambient logging this crate's sibling
/// controllers use for state that is unusual but not an error.
pub fn is_unified(cgroup_root: &Path) -> Result<bool, CgroupProbeError> {
    static WARNED: std::sync::Once = std::sync::Once::new();
    let setup = get_cgroup_setup(cgroup_root)?;
    let unified = setup == CgroupSetup::Unified;
    if unified {
        WARNED.call_once(|| tracing::warn!("host is running a unified cgroup v2 hierarchy"));
    }
    Ok(unified)
}

/// Parses `/proc/self/cgroup`-shaped content and returns the path of the
/// `0::` (v2) line, if present.
pub fn parse_own_v2_group_path(content: &str) -> Result<Option<String>, CgroupProbeError> {
    for line in content.lines() {
        let mut parts = line.splitn(3, ':');
        let hid = parts.next().unwrap_or_default();
        let _controllers = parts.next();
        let path = parts.next();
        if hid == "0" {
            return match path {
                Some(p) if !p.is_empty() => Ok(Some(p.trim_end_matches('\n').to_owned())),
                _ => Err(CgroupProbeError::EmptyV2Path {
                    path: PathBuf::from("/proc/self/cgroup"),
                }),
            };
        }
    }
    Ok(None)
}

/// Reads and parses the real `/proc/self/cgroup` of the calling process.
pub fn own_v2_group_path() -> Result<Option<String>, CgroupProbeError> {
    let content = fs::read_to_string("/proc/self/cgroup").wrap_read("/proc/self/cgroup")?;
    parse_own_v2_group_path(&content)
}

/// Creates (tolerating `EEXIST`) and joins a named v1 hierarchy under
/// `parent` (e.g. `/sys/fs/cgroup/freezer`), writing `pid` to its
/// `cgroup.procs`. Returns the path of the joined group.
pub fn create_and_join_v1(
    parent: &Path,
    name: &str,
    pid: Pid,
) -> Result<PathBuf, CgroupProbeError> {
    let group_path = parent.join(name);

    match fs::create_dir(&group_path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(err) => return Err(WrappedIoError::Open { err, path: group_path }.into()),
    }

    nix::unistd::chown(&group_path, Some(Uid::from_raw(0)), Some(Gid::from_raw(0)))?;
    fs::set_permissions(&group_path, fs::Permissions::from_mode(0o755))
        .wrap_write(&group_path)?;

    fsutil::write_cgroup_file(group_path.join(CGROUP_PROCS), format!("{pid}\n"))?;

    Ok(group_path)
}

/// True iff some directory under `cgroup_root` other than the caller's own
/// v2 group looks like `snap.<name>.*` and ends in `.service`/`.scope`.
pub fn is_snap_tracking(
    snap_name: &str,
    cgroup_root: &Path,
    own_group_path: Option<&str>,
) -> Result<bool, CgroupProbeError> {
    if !cgroup_root.exists() {
        return Ok(false);
    }

    let prefix = format!("snap.{snap_name}.");
    let own = own_group_path.map(|p| p.trim_start_matches('/'));

    let mut stack = vec![(cgroup_root.to_path_buf(), 0u32)];
    while let Some((dir, depth)) = stack.pop() {
        if depth > MAX_SUBTREE_DEPTH {
            return Err(CgroupProbeError::MaxDepthExceeded {
                root: cgroup_root.to_path_buf(),
                max_depth: MAX_SUBTREE_DEPTH,
            });
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(WrappedIoError::Read { err, path: dir }.into()),
        };

        for entry in entries {
            let entry = entry.wrap_read(&dir)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let basename = entry.file_name();
            let basename = basename.to_string_lossy();
            if basename.starts_with(&prefix)
                && (basename.ends_with(".service") || basename.ends_with(".scope"))
            {
                let relative = path.strip_prefix(cgroup_root).unwrap_or(&path);
                let is_own = own
                    .map(|own| relative == Path::new(own))
                    .unwrap_or(false);
                if !is_own {
                    return Ok(true);
                }
            }

            stack.push((path, depth + 1));
        }
    }

    Ok(false)
}

pub fn default_cgroup_root() -> &'static Path {
    Path::new(DEFAULT_CGROUP_ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_temp_dir;

    #[test]
    fn parses_v2_only_line() {
        let content = "0::/user.slice/user-1000.slice\n";
        assert_eq!(
            parse_own_v2_group_path(content).unwrap().as_deref(),
            Some("/user.slice/user-1000.slice")
        );
    }

    #[test]
    fn parses_mixed_hybrid_output() {
        let content = "12:freezer:/snap.foo\n0::/user.slice\n1:name=systemd:/\n";
        assert_eq!(
            parse_own_v2_group_path(content).unwrap().as_deref(),
            Some("/user.slice")
        );
    }

    #[test]
    fn absent_v2_line_returns_none() {
        let content = "4:freezer:/snap.foo\n";
        assert_eq!(parse_own_v2_group_path(content).unwrap(), None);
    }

    #[test]
    fn empty_v2_path_is_malformed() {
        let content = "0::\n";
        assert!(parse_own_v2_group_path(content).is_err());
    }

    #[test]
    fn create_and_join_v1_writes_pid() {
        let tmp = create_temp_dir("cgroup_probe_join").unwrap();
        let group = create_and_join_v1(tmp.path(), "snap.foo", Pid::from_raw(1234)).unwrap();
        let content = fsutil::read_cgroup_file(group.join(CGROUP_PROCS)).unwrap();
        assert_eq!(content, "1234\n");
    }

    #[test]
    fn create_and_join_v1_tolerates_existing_directory() {
        let tmp = create_temp_dir("cgroup_probe_join_twice").unwrap();
        create_and_join_v1(tmp.path(), "snap.foo", Pid::from_raw(1)).unwrap();
        let result = create_and_join_v1(tmp.path(), "snap.foo", Pid::from_raw(2));
        assert!(result.is_ok());
    }

    // scenario S4 — only the caller's own group matches, not tracked.
    #[test]
    fn scenario_s4_self_only_is_not_tracking() {
        let tmp = create_temp_dir("cgroup_probe_s4").unwrap();
        fs::create_dir_all(tmp.path().join("snap.foo.app.1234-1234.scope")).unwrap();
        let own = Some("snap.foo.app.1234-1234.scope");
        assert!(!is_snap_tracking("foo", tmp.path(), own).unwrap());
    }

    // scenario S5 — a sibling cgroup makes the scan report tracking.
    #[test]
    fn scenario_s5_sibling_is_tracking() {
        let tmp = create_temp_dir("cgroup_probe_s5").unwrap();
        fs::create_dir_all(tmp.path().join("snap.foo.app.1234-1234.scope")).unwrap();
        fs::create_dir_all(tmp.path().join("snap.foo.app.1111-1111.scope")).unwrap();
        let own = Some("snap.foo.app.1234-1234.scope");
        assert!(is_snap_tracking("foo", tmp.path(), own).unwrap());
    }

    #[test]
    fn unrelated_directories_are_ignored() {
        let tmp = create_temp_dir("cgroup_probe_unrelated").unwrap();
        fs::create_dir_all(tmp.path().join("snap.bar.app.1-1.scope")).unwrap();
        assert!(!is_snap_tracking("foo", tmp.path(), None).unwrap());
    }

    #[test]
    fn missing_root_is_not_tracking() {
        let tmp = create_temp_dir("cgroup_probe_missing").unwrap();
        let missing = tmp.path().join("does-not-exist");
        assert!(!is_snap_tracking("foo", &missing, None).unwrap());
    }
}
