//! `RLIMIT_MEMLOCK` bump/restore. The teacher crate only ever bumps this
//! limit once for the process lifetime; this crate also restores the saved
//! value once a filter program no longer needs the extra headroom (see
//! `SPEC_FULL.md` §4.4).

#[cfg(not(test))]
use libc::{getrlimit, setrlimit};
#[cfg(test)]
use crate::bpf::mocks::mock_libc::{getrlimit, setrlimit};

use super::BpfError;

const MEMLOCK_FLOOR_BYTES: u64 = 512 * 1024;

#[cfg(target_env = "musl")]
const RLIMIT_MEMLOCK: libc::__rlimit_resource_t = libc::RLIMIT_MEMLOCK as libc::c_int;
#[cfg(not(target_env = "musl"))]
const RLIMIT_MEMLOCK: libc::__rlimit_resource_t = libc::RLIMIT_MEMLOCK;

/// Saved `RLIMIT_MEMLOCK` value, for later restoration by [`restore`].
#[derive(Debug, Clone, Copy)]
pub struct SavedRlimit(libc::rlimit);

impl SavedRlimit {
    /// Builds a value directly from a raw limit, for tests elsewhere in the
    /// crate that need a `V2Handle` without going through [`bump`].
    #[cfg(test)]
    pub(crate) fn from_raw(rlim: libc::rlimit) -> Self {
        Self(rlim)
    }
}

/// Reads the current limit, then raises both soft and hard limits to at
/// least `MEMLOCK_FLOOR_BYTES` so `bpf_prog_load`/`bpf_map_create` don't fail
/// with `EPERM` on hosts with a tight default. Returns the limit as it stood
/// before the bump.
pub fn bump() -> Result<SavedRlimit, BpfError> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    #[allow(unused_unsafe)]
    let ret = unsafe { getrlimit(RLIMIT_MEMLOCK, &mut rlim as *mut libc::rlimit) };
    if ret != 0 {
        return Err(BpfError::FailedToIncreaseRLimit);
    }
    let saved = SavedRlimit(rlim);

    let bumped = libc::rlimit {
        rlim_cur: rlim.rlim_cur.max(MEMLOCK_FLOOR_BYTES),
        rlim_max: rlim.rlim_max.max(MEMLOCK_FLOOR_BYTES),
    };
    #[allow(unused_unsafe)]
    let ret = unsafe { setrlimit(RLIMIT_MEMLOCK, &bumped as *const libc::rlimit) };
    if ret != 0 {
        return Err(BpfError::FailedToIncreaseRLimit);
    }

    Ok(saved)
}

/// Restores a limit saved by [`bump`].
pub fn restore(saved: SavedRlimit) -> Result<(), BpfError> {
    #[allow(unused_unsafe)]
    let ret = unsafe { setrlimit(RLIMIT_MEMLOCK, &saved.0 as *const libc::rlimit) };
    if ret != 0 {
        return Err(BpfError::FailedToRestoreRLimit);
    }
    Ok(())
}
