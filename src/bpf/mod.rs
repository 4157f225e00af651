//! Raw `bpf(2)` syscall shim and filter-program synthesis.
//!
//! Gated behind the `cgroupsv2_devices` feature, exactly like the teacher
//! crate gates its own BPF-dependent device controller: the types here are
//! only meaningful on a host that actually runs cgroup v2.

#[cfg(feature = "cgroupsv2_devices")]
pub mod bpffs;
#[cfg(feature = "cgroupsv2_devices")]
pub mod map;
#[cfg(feature = "cgroupsv2_devices")]
#[cfg_attr(test, allow(dead_code))]
pub mod mocks;
#[cfg(feature = "cgroupsv2_devices")]
pub mod program;
#[cfg(feature = "cgroupsv2_devices")]
pub mod prog;
#[cfg(feature = "cgroupsv2_devices")]
pub mod rlimit;

#[cfg(feature = "cgroupsv2_devices")]
#[derive(Clone, Copy, Debug)]
pub struct ProgramInfo {
    pub id: u32,
    pub fd: i32,
}

#[cfg(feature = "cgroupsv2_devices")]
#[derive(thiserror::Error, Debug)]
pub enum BpfError {
    #[error(transparent)]
    Errno(#[from] errno::Errno),
    #[error("failed to increase memlock rlimit")]
    FailedToIncreaseRLimit,
    #[error("failed to restore memlock rlimit")]
    FailedToRestoreRLimit,
}
