//! Small cgroup-file read/write helpers shared by the v1 device controller,
//! the v1 hierarchy probe, and the freezer tracking cgroup.
//!
//! Grounded on the teacher crate's `common::write_cgroup_file[_str]` /
//! `read_cgroup_file`.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{WrapIoResult, WrappedIoError};

pub const CGROUP_PROCS: &str = "cgroup.procs";
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

#[inline]
pub fn write_cgroup_file_str<P: AsRef<Path>>(path: P, data: &str) -> Result<(), WrappedIoError> {
    let path = path.as_ref();
    fs::OpenOptions::new()
        .write(true)
        .truncate(false)
        .open(path)
        .wrap_open(path)?
        .write_all(data.as_bytes())
        .wrap_write(path)
}

#[inline]
pub fn write_cgroup_file<P: AsRef<Path>, T: ToString>(
    path: P,
    data: T,
) -> Result<(), WrappedIoError> {
    write_cgroup_file_str(path, &data.to_string())
}

#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    fs::read_to_string(path).wrap_read(path)
}
