//! The fault-injection seam for syscalls the mount helper issues.
//!
//! Production code goes through [`LinuxSyscall`]; tests go through
//! [`TestSyscall`], which records every call and lets the test tell it to
//! fail on demand instead of touching the kernel.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use nix::mount::{MntFlags, MsFlags};

use crate::mount::MountError;

pub trait Syscall {
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), MountError>;

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<(), MountError>;
}

#[derive(Clone, Copy)]
pub enum SyscallType {
    Linux,
    Test,
}

impl Default for SyscallType {
    fn default() -> Self {
        if cfg!(test) {
            SyscallType::Test
        } else {
            SyscallType::Linux
        }
    }
}

impl SyscallType {
    pub fn create_syscall(&self) -> Box<dyn Syscall> {
        match self {
            SyscallType::Linux => Box::new(LinuxSyscall),
            SyscallType::Test => Box::<TestSyscall>::default(),
        }
    }
}

pub fn create_syscall() -> Box<dyn Syscall> {
    SyscallType::default().create_syscall()
}

pub struct LinuxSyscall;

impl Syscall for LinuxSyscall {
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), MountError> {
        nix::mount::mount(source, target, fstype, flags, data).map_err(|err| MountError::Mount {
            source: source.map(|p| p.display().to_string()),
            target: target.display().to_string(),
            err,
        })
    }

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<(), MountError> {
        nix::mount::umount2(target, flags).map_err(|err| MountError::Umount {
            target: target.display().to_string(),
            err,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MountCall {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub flags: MsFlags,
    pub data: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UmountCall {
    pub target: PathBuf,
    pub flags: MntFlags,
}

/// Records every call instead of issuing it; tests that need a specific call
/// to fail set `fail_next` before invoking it.
#[derive(Default)]
pub struct TestSyscall {
    mounts: Mutex<Vec<MountCall>>,
    umounts: Mutex<Vec<UmountCall>>,
    fail_next: Mutex<bool>,
}

impl TestSyscall {
    pub fn fail_next_call(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn mount_calls(&self) -> Vec<MountCall> {
        self.mounts.lock().unwrap().clone()
    }

    pub fn umount_calls(&self) -> Vec<UmountCall> {
        self.umounts.lock().unwrap().clone()
    }

    fn take_failure(&self) -> bool {
        std::mem::take(&mut *self.fail_next.lock().unwrap())
    }
}

impl Syscall for TestSyscall {
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), MountError> {
        self.mounts.lock().unwrap().push(MountCall {
            source: source.map(Path::to_path_buf),
            target: target.to_path_buf(),
            fstype: fstype.map(str::to_owned),
            flags,
            data: data.map(str::to_owned),
        });
        if self.take_failure() {
            return Err(MountError::Mount {
                source: source.map(|p| p.display().to_string()),
                target: target.display().to_string(),
                err: nix::Error::EINVAL,
            });
        }
        Ok(())
    }

    fn umount2(&self, target: &Path, flags: MntFlags) -> Result<(), MountError> {
        self.umounts.lock().unwrap().push(UmountCall {
            target: target.to_path_buf(),
            flags,
        });
        if self.take_failure() {
            return Err(MountError::Umount {
                target: target.display().to_string(),
                err: nix::Error::EINVAL,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_mount_calls() {
        let sc = TestSyscall::default();
        sc.mount(
            Some(Path::new("/a")),
            Path::new("/b"),
            None,
            MsFlags::MS_BIND,
            None,
        )
        .unwrap();
        let calls = sc.mount_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, Path::new("/b"));
    }

    #[test]
    fn fail_next_call_fails_exactly_one_call() {
        let sc = TestSyscall::default();
        sc.fail_next_call();
        assert!(sc
            .mount(None, Path::new("/b"), None, MsFlags::empty(), None)
            .is_err());
        assert!(sc
            .mount(None, Path::new("/c"), None, MsFlags::empty(), None)
            .is_ok());
    }
}
