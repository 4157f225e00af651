//! The polymorphic device-access cgroup facade: opens/prepares a per-tag
//! device cgroup on whichever of v1/v2 the host runs, accepts allow/deny
//! requests, and attaches the current process. See `SPEC_FULL.md` §4.5.
//!
//! Grounded on the teacher crate's split between `v1/devices.rs` and
//! `v2/devices/controller.rs`, unified here behind one enum the way the
//! teacher's own `AnyCgroupManager`-style dispatch works, because this
//! crate's contract is a single handle type rather than a trait object per
//! controller family.

mod v1;
#[cfg(feature = "cgroupsv2_devices")]
mod v2;

use nix::unistd::Pid;

use crate::device_key::{DeviceKey, DeviceKind};
use crate::error::WrappedIoError;
use crate::security_tag::SecurityTag;

/// Flags controlling [`DeviceCgroupHandle::new`]. A single bit today; kept
/// as a struct rather than a bare `bool` because the source's flag is named
/// at call sites (`FROM_EXISTING`), not positional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NewFlags {
    from_existing: bool,
}

impl NewFlags {
    /// Attach to a controller that is already configured, without resetting
    /// its state.
    pub const FROM_EXISTING: NewFlags = NewFlags { from_existing: true };

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_existing(self) -> bool {
        self.from_existing
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeviceCgroupError {
    #[error("io error: {0}")]
    Io(#[from] WrappedIoError),
    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
    #[error("cgroup probe error: {0}")]
    CgroupProbe(#[from] crate::cgroup_probe::CgroupProbeError),
    #[cfg(feature = "cgroupsv2_devices")]
    #[error("mount error: {0}")]
    Mount(#[from] crate::mount::MountError),
    #[cfg(feature = "cgroupsv2_devices")]
    #[error("bpf error: {0}")]
    Bpf(#[from] crate::bpf::BpfError),
    #[error("from-existing requested but the pinned map at {path} does not exist")]
    NoExistingMap { path: String },
    #[error("attach target pid {pid} is not the caller's own process")]
    AttachToForeignPid { pid: i32 },
    #[error("own v2 cgroup {path} does not look like a snap-managed unit")]
    NotASnapCgroup { path: String },
    #[error("host is unified cgroup v2 but this build lacks the cgroupsv2_devices feature")]
    FeatureDisabled,
}

/// Either `DeviceKind::Char` or `DeviceKind::Block`, plus the minor, carried
/// at the facade boundary for readability at call sites.
pub use crate::device_key::DeviceKind as DeviceAccessKind;

/// Owns either a v1 triple of open control files or a v2 map/program pair.
/// Exactly one arm is active for the handle's lifetime; see
/// `SPEC_FULL.md` §3 "DeviceCgroupHandle".
pub enum DeviceCgroupHandle {
    V1(v1::V1Handle),
    #[cfg(feature = "cgroupsv2_devices")]
    V2(v2::V2Handle),
}

impl DeviceCgroupHandle {
    /// Opens (and, unless `FROM_EXISTING`, resets) the device cgroup for
    /// `tag`, picking the v1 or v2 arm based on `setup`.
    pub fn new(
        tag: &SecurityTag,
        setup: crate::cgroup_probe::CgroupSetup,
        flags: NewFlags,
    ) -> Result<Self, DeviceCgroupError> {
        match setup {
            crate::cgroup_probe::CgroupSetup::Unified => {
                #[cfg(feature = "cgroupsv2_devices")]
                {
                    Ok(DeviceCgroupHandle::V2(v2::V2Handle::new(tag, flags)?))
                }
                #[cfg(not(feature = "cgroupsv2_devices"))]
                {
                    let _ = (tag, flags);
                    Err(DeviceCgroupError::FeatureDisabled)
                }
            }
            crate::cgroup_probe::CgroupSetup::Legacy | crate::cgroup_probe::CgroupSetup::Hybrid => {
                Ok(DeviceCgroupHandle::V1(v1::V1Handle::new(tag, flags)?))
            }
        }
    }

    pub fn allow(&mut self, kind: DeviceKind, major: u32, minor: u32) -> Result<(), DeviceCgroupError> {
        match self {
            DeviceCgroupHandle::V1(h) => h.allow(kind, major, minor),
            #[cfg(feature = "cgroupsv2_devices")]
            DeviceCgroupHandle::V2(h) => h.allow(DeviceKey::new(kind, major, minor)),
        }
    }

    pub fn deny(&mut self, kind: DeviceKind, major: u32, minor: u32) -> Result<(), DeviceCgroupError> {
        match self {
            DeviceCgroupHandle::V1(h) => h.deny(kind, major, minor),
            #[cfg(feature = "cgroupsv2_devices")]
            DeviceCgroupHandle::V2(h) => h.deny(DeviceKey::new(kind, major, minor)),
        }
    }

    pub fn attach(&mut self, pid: Pid) -> Result<(), DeviceCgroupError> {
        match self {
            DeviceCgroupHandle::V1(h) => h.attach(pid),
            #[cfg(feature = "cgroupsv2_devices")]
            DeviceCgroupHandle::V2(h) => h.attach(pid),
        }
    }

    /// Closes the handle's descriptors. On v1 this is a no-op beyond
    /// consuming `self` (the control files were never held open past each
    /// call); on v2 it restores the memlock limit saved at construction and
    /// closes the local map/program fds — the pinned map and, once
    /// attached, the program itself stay alive in the kernel regardless, per
    /// `SPEC_FULL.md` §3/§4.4.
    pub fn destroy(self) -> Result<(), DeviceCgroupError> {
        match self {
            DeviceCgroupHandle::V1(h) => h.destroy(),
            #[cfg(feature = "cgroupsv2_devices")]
            DeviceCgroupHandle::V2(h) => h.destroy(),
        }
    }
}
