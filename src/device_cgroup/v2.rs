//! The v2 arm: a pinned BPF hash map plus an attached filter program under
//! `/sys/fs/bpf/snap/<sanitised-tag>`. Grounded on the teacher crate's
//! `v2/devices/controller.rs`, generalised from a rule-list compiler to a
//! map-lookup one per `SPEC_FULL.md` §4.5.2/§4.5.4.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::unistd::{Gid, Pid, Uid};

use super::DeviceCgroupError;
use crate::bpf::rlimit::SavedRlimit;
use crate::bpf::{bpffs, map, program, prog, rlimit};
use crate::device_key::DeviceKey;
use crate::security_tag::SecurityTag;

const BPFFS_ROOT: &str = "/sys/fs/bpf";
const SNAP_PIN_DIR: &str = "/sys/fs/bpf/snap";
const MAX_ENTRIES: usize = 500;

pub struct V2Handle {
    map_fd: RawFd,
    prog_fd: Option<RawFd>,
    saved_rlimit: SavedRlimit,
}

impl V2Handle {
    pub fn new(tag: &SecurityTag, flags: super::NewFlags) -> Result<Self, DeviceCgroupError> {
        Self::new_at(Path::new(BPFFS_ROOT), Path::new(SNAP_PIN_DIR), tag, flags)
    }

    pub fn new_at(
        bpffs_root: &Path,
        pin_dir: &Path,
        tag: &SecurityTag,
        flags: super::NewFlags,
    ) -> Result<Self, DeviceCgroupError> {
        let saved_rlimit = rlimit::bump()?;
        let sanitised = tag.sanitised();

        ensure_bpffs_mounted(bpffs_root)?;
        ensure_pin_dir(pin_dir)?;

        let pin_path = pin_dir.join(&sanitised);
        let pin_path_str = pin_path.to_string_lossy().into_owned();

        let map_fd = match map::get_pinned(&pin_path_str) {
            Ok(fd) => {
                if !flags.from_existing() {
                    wipe(fd)?;
                }
                fd
            }
            Err(err) => {
                if flags.from_existing() {
                    crate::cleanup::drop_privileges_for_diagnostics();
                    return Err(DeviceCgroupError::NoExistingMap { path: pin_path_str });
                }
                tracing::debug!(?err, "no existing pinned map, creating a fresh one");
                let fd = map::create(&sanitised)?;
                map::pin(fd, &pin_path_str)?;
                fd
            }
        };

        let prog_fd = if flags.from_existing() {
            None
        } else {
            let bytecode = program::synthesize(map_fd);
            Some(prog::load("GPL", &bytecode)?)
        };

        Ok(Self {
            map_fd,
            prog_fd,
            saved_rlimit,
        })
    }

    pub fn allow(&mut self, key: DeviceKey) -> Result<(), DeviceCgroupError> {
        tracing::debug!(?key, "allowing device");
        map::update(self.map_fd, &key, true)?;
        Ok(())
    }

    pub fn deny(&mut self, key: DeviceKey) -> Result<(), DeviceCgroupError> {
        tracing::debug!(?key, "denying device");
        map::delete(self.map_fd, &key)?;
        Ok(())
    }

    pub fn attach(&mut self, pid: Pid) -> Result<(), DeviceCgroupError> {
        if pid != Pid::this() {
            return Err(DeviceCgroupError::AttachToForeignPid { pid: pid.as_raw() });
        }

        let own_path = crate::cgroup_probe::own_v2_group_path()?;
        let own_path = own_path.unwrap_or_default();
        let basename = own_path.rsplit('/').next().unwrap_or(&own_path);
        let looks_like_snap_unit = basename.starts_with("snap.")
            && (basename.ends_with(".service") || basename.ends_with(".scope"));
        if !looks_like_snap_unit {
            crate::cleanup::drop_privileges_for_diagnostics();
            return Err(DeviceCgroupError::NotASnapCgroup { path: own_path });
        }

        let prog_fd = self
            .prog_fd
            .expect("attach is only called after a fresh program load");
        let cgroup_root = crate::cgroup_probe::default_cgroup_root();
        let cgroup_path = cgroup_root.join(own_path.trim_start_matches('/'));
        let cgroup_dir = fs::File::open(&cgroup_path).map_err(|err| {
            crate::error::WrappedIoError::Open {
                err,
                path: cgroup_path.clone(),
            }
        })?;
        prog::attach(prog_fd, std::os::unix::io::AsRawFd::as_raw_fd(&cgroup_dir))?;
        Ok(())
    }

    /// Restores the memlock limit saved at construction and closes the
    /// local map/program fds. The pinned map and, once attached, the
    /// program stay referenced by the kernel independently of these local
    /// fds, so the allow-list keeps working across this handle's lifetime.
    pub fn destroy(self) -> Result<(), DeviceCgroupError> {
        unsafe {
            libc::close(self.map_fd);
            if let Some(prog_fd) = self.prog_fd {
                libc::close(prog_fd);
            }
        }
        rlimit::restore(self.saved_rlimit)?;
        Ok(())
    }
}

fn ensure_bpffs_mounted(path: &Path) -> Result<(), DeviceCgroupError> {
    let syscall = crate::syscall::create_syscall();
    bpffs::ensure_mounted(syscall.as_ref(), path)?;
    Ok(())
}

fn ensure_pin_dir(pin_dir: &Path) -> Result<(), DeviceCgroupError> {
    match fs::create_dir(pin_dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(err) => {
            return Err(crate::error::WrappedIoError::Open {
                err,
                path: pin_dir.to_path_buf(),
            }
            .into())
        }
    }
    nix::unistd::chown(pin_dir, Some(Uid::from_raw(0)), Some(Gid::from_raw(0)))?;

    // bpffs rejects mode bits on some kernels; ENOTSUP is tolerated.
    if let Err(err) = fs::set_permissions(pin_dir, fs::Permissions::from_mode(0o700)) {
        if err.raw_os_error() != Some(libc::ENOTSUP) {
            return Err(crate::error::WrappedIoError::Write {
                err,
                path: pin_dir.to_path_buf(),
            }
            .into());
        }
    }
    Ok(())
}

fn wipe(map_fd: RawFd) -> Result<(), DeviceCgroupError> {
    let keys = map::list_keys(map_fd)?;
    if keys.len() > MAX_ENTRIES {
        tracing::warn!(count = keys.len(), "pinned map holds more than the expected maximum entries");
    }
    for raw in keys {
        let key = crate::device_key::DeviceKey::from_map_bytes(raw);
        map::delete(map_fd, &key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::bpf::mocks::{mock_libbpf_sys, mock_libc};
    use crate::device_key::DeviceKind;
    use crate::test_support::create_temp_dir;

    // Builds a handle directly rather than through `new_at`, so these tests
    // exercise allow/deny/destroy without going through the bpffs-mount step
    // (covered separately by `bpf::bpffs`'s own tests against a
    // `TestSyscall`). The fds are real (opened against `/dev/null`) so that
    // `destroy`'s real `libc::close` calls land on descriptors this process
    // actually owns, rather than on arbitrary small integers that might
    // already be in use elsewhere.
    fn handle(map_fd: RawFd, prog_fd: Option<RawFd>) -> V2Handle {
        V2Handle {
            map_fd,
            prog_fd,
            saved_rlimit: SavedRlimit::from_raw(libc::rlimit {
                rlim_cur: 1024,
                rlim_max: 1024,
            }),
        }
    }

    fn devnull_fd() -> RawFd {
        use std::os::unix::io::IntoRawFd;
        std::fs::File::open("/dev/null").unwrap().into_raw_fd()
    }

    #[test]
    #[serial(libbpf_sys)]
    fn allow_and_deny_update_the_map() {
        let update = mock_libbpf_sys::bpf_map_update_elem_context();
        update.expect().once().returning(|_, _, _, _| 0);
        let delete = mock_libbpf_sys::bpf_map_delete_elem_context();
        delete.expect().once().returning(|_, _| 0);

        let map_fd = devnull_fd();
        let mut h = handle(map_fd, None);
        h.allow(DeviceKey::new(DeviceKind::Char, 1, 3)).unwrap();
        h.deny(DeviceKey::new(DeviceKind::Char, 1, 3)).unwrap();
        unsafe { libc::close(map_fd) };
    }

    #[test]
    #[serial(libc_rlimit)]
    fn destroy_restores_the_saved_rlimit() {
        let set = mock_libc::setrlimit_context();
        set.expect().once().returning(|_, rlim| {
            let rlim = unsafe { *rlim };
            assert_eq!(rlim.rlim_cur, 1024);
            0
        });

        handle(devnull_fd(), Some(devnull_fd())).destroy().unwrap();
    }

    #[test]
    #[serial(libbpf_sys)]
    fn wipe_deletes_every_enumerated_key() {
        let next = mock_libbpf_sys::bpf_map_get_next_key_context();
        next.expect().times(1).returning(|_, _, next_key| {
            unsafe {
                let slice = std::slice::from_raw_parts_mut(next_key as *mut u8, 12);
                slice.copy_from_slice(&DeviceKey::new(DeviceKind::Char, 1, 3).to_map_bytes());
            }
            0
        });
        next.expect().times(1).returning(|_, _, _| {
            errno::set_errno(errno::Errno(libc::ENOENT));
            -1
        });
        let delete = mock_libbpf_sys::bpf_map_delete_elem_context();
        delete.expect().once().returning(|_, _| 0);

        wipe(7).unwrap();
    }

    #[test]
    fn ensure_pin_dir_creates_missing_directory() {
        let tmp = create_temp_dir("v2_pin_dir").unwrap();
        let pin_dir = tmp.path().join("snap");
        ensure_pin_dir(&pin_dir).unwrap();
        assert!(pin_dir.is_dir());
        // tolerates being called again against an existing directory.
        ensure_pin_dir(&pin_dir).unwrap();
    }
}
