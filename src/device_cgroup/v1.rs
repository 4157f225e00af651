//! The v1 arm: `devices.allow`/`devices.deny`/`cgroup.procs` under
//! `/sys/fs/cgroup/devices/<tag>/`. Grounded on the teacher crate's
//! `v1/devices.rs` and `v1/controller.rs`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Pid, Uid};

use super::{DeviceCgroupError, NewFlags};
use crate::device_key::DeviceKind;
use crate::error::WrapIoResult;
use crate::fsutil::{self, CGROUP_PROCS};
use crate::security_tag::SecurityTag;

const DEVICES_ALLOW: &str = "devices.allow";
const DEVICES_DENY: &str = "devices.deny";
const DEFAULT_DEVICES_ROOT: &str = "/sys/fs/cgroup/devices";

pub struct V1Handle {
    group: PathBuf,
}

impl V1Handle {
    pub fn new(tag: &SecurityTag, flags: NewFlags) -> Result<Self, DeviceCgroupError> {
        Self::new_at(Path::new(DEFAULT_DEVICES_ROOT), tag, flags)
    }

    /// `devices_root` is normally `/sys/fs/cgroup/devices`; overridable so
    /// tests run against a scratch tree instead.
    pub fn new_at(
        devices_root: &Path,
        tag: &SecurityTag,
        flags: NewFlags,
    ) -> Result<Self, DeviceCgroupError> {
        let group = devices_root.join(tag.as_str());

        if !flags.from_existing() {
            match fs::create_dir(&group) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(err) => {
                    return Err(crate::error::WrappedIoError::Open {
                        err,
                        path: group,
                    }
                    .into())
                }
            }
            nix::unistd::chown(&group, Some(Uid::from_raw(0)), Some(Gid::from_raw(0)))?;
            fs::set_permissions(&group, fs::Permissions::from_mode(0o755)).wrap_write(&group)?;
        } else if !group.exists() {
            return Err(crate::error::WrappedIoError::Open {
                err: std::io::Error::from(std::io::ErrorKind::NotFound),
                path: group,
            }
            .into());
        }

        tracing::debug!(tag = tag.as_str(), "opening v1 device cgroup");

        if !flags.from_existing() {
            fsutil::write_cgroup_file_str(group.join(DEVICES_DENY), "a")?;
        }

        Ok(Self { group })
    }

    pub fn allow(&mut self, kind: DeviceKind, major: u32, minor: u32) -> Result<(), DeviceCgroupError> {
        self.write_rule(DEVICES_ALLOW, kind, major, minor)
    }

    pub fn deny(&mut self, kind: DeviceKind, major: u32, minor: u32) -> Result<(), DeviceCgroupError> {
        self.write_rule(DEVICES_DENY, kind, major, minor)
    }

    fn write_rule(
        &mut self,
        file: &str,
        kind: DeviceKind,
        major: u32,
        minor: u32,
    ) -> Result<(), DeviceCgroupError> {
        let minor = if minor == crate::device_key::ANY_MINOR {
            "*".to_string()
        } else {
            minor.to_string()
        };
        let line = format!("{} {}:{} rwm\n", kind.v1_char(), major, minor);
        tracing::debug!(file, %line, "writing device cgroup rule");
        fsutil::write_cgroup_file_str(self.group.join(file), &line)?;
        Ok(())
    }

    pub fn attach(&mut self, pid: Pid) -> Result<(), DeviceCgroupError> {
        fsutil::write_cgroup_file(self.group.join(CGROUP_PROCS), format!("{pid}\n"))?;
        Ok(())
    }

    /// No open descriptors to release; the v1 arm only ever holds a path.
    pub fn destroy(self) -> Result<(), DeviceCgroupError> {
        Ok(())
    }
}
