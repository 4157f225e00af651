//! Crate-wide error composition.
//!
//! Every module defines its own narrow, `thiserror`-derived error enum scoped
//! to its own failure modes. [`Error`] composes them for callers who want a
//! single type to match on at the crate boundary; code inside the crate keeps
//! using the narrow per-module errors.

#[cfg(feature = "cgroupsv2_devices")]
use crate::bpf::BpfError;
use crate::cgroup_probe::CgroupProbeError;
use crate::device_cgroup::DeviceCgroupError;
use crate::freezer::FreezerError;
use crate::mount::MountError;
use crate::security_tag::ValidationError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "cgroupsv2_devices")]
    #[error("bpf error: {0}")]
    Bpf(#[from] BpfError),
    #[error("cgroup probe error: {0}")]
    CgroupProbe(#[from] CgroupProbeError),
    #[error("device cgroup error: {0}")]
    DeviceCgroup(#[from] DeviceCgroupError),
    #[error("freezer error: {0}")]
    Freezer(#[from] FreezerError),
    #[error("mount error: {0}")]
    Mount(#[from] MountError),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Wraps a single `std::io::Error` together with the path that caused it, the
/// way every filesystem-touching module in this crate reports I/O failure.
#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to open {path}: {err}")]
    Open {
        err: std::io::Error,
        path: std::path::PathBuf,
    },
    #[error("failed to write {path}: {err}")]
    Write {
        err: std::io::Error,
        path: std::path::PathBuf,
    },
    #[error("failed to read {path}: {err}")]
    Read {
        err: std::io::Error,
        path: std::path::PathBuf,
    },
}

pub(crate) trait WrapIoResult<T> {
    fn wrap_open(self, path: impl Into<std::path::PathBuf>) -> Result<T, WrappedIoError>;
    fn wrap_write(self, path: impl Into<std::path::PathBuf>) -> Result<T, WrappedIoError>;
    fn wrap_read(self, path: impl Into<std::path::PathBuf>) -> Result<T, WrappedIoError>;
}

impl<T> WrapIoResult<T> for Result<T, std::io::Error> {
    fn wrap_open(self, path: impl Into<std::path::PathBuf>) -> Result<T, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Open {
            err,
            path: path.into(),
        })
    }

    fn wrap_write(self, path: impl Into<std::path::PathBuf>) -> Result<T, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Write {
            err,
            path: path.into(),
        })
    }

    fn wrap_read(self, path: impl Into<std::path::PathBuf>) -> Result<T, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Read {
            err,
            path: path.into(),
        })
    }
}
