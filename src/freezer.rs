//! Freezer / tracking cgroup: `join` creates and joins a per-application
//! hierarchy under the v1 freezer; `is_occupied` probes whether any of its
//! recorded PIDs still exist. See `SPEC_FULL.md` §4.6. Grounded on the
//! teacher crate's `v1/freezer.rs`/`v1/controller.rs`.

use std::path::Path;

use nix::sys::stat::fstatat;
use nix::unistd::Pid;

use crate::cgroup_probe::{self, CgroupProbeError};
use crate::error::{WrapIoResult, WrappedIoError};
use crate::fsutil::{self, CGROUP_PROCS};

const DEFAULT_FREEZER_ROOT: &str = "/sys/fs/cgroup/freezer";

#[derive(thiserror::Error, Debug)]
pub enum FreezerError {
    #[error("io error: {0}")]
    Io(#[from] WrappedIoError),
    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
    #[error("cgroup probe error: {0}")]
    CgroupProbe(#[from] CgroupProbeError),
    #[error("cgroup.procs line not terminated by a newline: {0:?}")]
    UnterminatedLine(String),
}

/// Creates and joins `/sys/fs/cgroup/freezer/snap.<snap_name>/` for `pid`.
pub fn join(snap_name: &str, pid: Pid) -> Result<(), FreezerError> {
    join_at(Path::new(DEFAULT_FREEZER_ROOT), snap_name, pid)
}

pub fn join_at(freezer_root: &Path, snap_name: &str, pid: Pid) -> Result<(), FreezerError> {
    let name = format!("snap.{snap_name}");
    tracing::debug!(snap_name, %pid, "joining tracking cgroup");
    cgroup_probe::create_and_join_v1(freezer_root, &name, pid)?;
    Ok(())
}

/// True iff at least one PID recorded in the tracking cgroup's
/// `cgroup.procs` still has a live entry under `/proc`.
pub fn is_occupied(snap_name: &str) -> Result<bool, FreezerError> {
    is_occupied_at(Path::new(DEFAULT_FREEZER_ROOT), Path::new("/proc"), snap_name)
}

pub fn is_occupied_at(
    freezer_root: &Path,
    proc_root: &Path,
    snap_name: &str,
) -> Result<bool, FreezerError> {
    let group = freezer_root.join(format!("snap.{snap_name}"));
    let procs_path = group.join(CGROUP_PROCS);

    let content = match fsutil::read_cgroup_file(&procs_path) {
        Ok(content) => content,
        Err(WrappedIoError::Open { err, .. }) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(false)
        }
        Err(err) => return Err(err.into()),
    };

    if content.is_empty() {
        return Ok(false);
    }

    let proc_dir = std::fs::File::open(proc_root).wrap_open(proc_root)?;
    let proc_fd = std::os::unix::io::AsRawFd::as_raw_fd(&proc_dir);

    for line in content.split_inclusive('\n') {
        if line.is_empty() {
            continue;
        }
        let pid_str = line
            .strip_suffix('\n')
            .ok_or_else(|| FreezerError::UnterminatedLine(line.to_string()))?;
        if pid_str.is_empty() {
            continue;
        }

        match fstatat(Some(proc_fd), pid_str, nix::fcntl::AtFlags::empty()) {
            Ok(_) => return Ok(true),
            Err(nix::Error::ENOENT) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(false)
}
