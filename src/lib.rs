//! Device-access cgroup subsystem for a confined application launcher.
//!
//! Given a security tag identifying a confined application, this crate
//! establishes and tears down the kernel-level machinery that restricts which
//! device nodes the application's processes may open: the legacy cgroup v1
//! device controller on hosts still running it, or a synthesised and loaded
//! BPF filter program attached to the process's cgroup v2 hierarchy on
//! unified hosts. It also maintains the freezer-based tracking cgroup used to
//! tell whether any instance of an application is still alive.
//!
//! This crate has no configuration file and reads no environment variables:
//! every filesystem root it touches (`/sys/fs/cgroup`, `/sys/fs/bpf`,
//! `/proc`) is a compile-time default that every public constructor also
//! accepts as an explicit override, so tests run against a scratch directory
//! tree instead of the real kernel filesystem.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

#[cfg(test)]
#[macro_use]
extern crate mockall;

#[cfg(test)]
mod test_support;

pub mod bpf;
pub mod cgroup_probe;
pub mod cleanup;
pub mod device_cgroup;
pub mod device_key;
pub mod error;
pub mod freezer;
mod fsutil;
pub mod mount;
pub mod security_tag;
pub mod syscall;

pub use device_cgroup::{DeviceCgroupError, DeviceCgroupHandle, NewFlags};
pub use device_key::{DeviceKey, DeviceKind};
pub use error::Error;
pub use security_tag::{SecurityTag, ValidationError};
