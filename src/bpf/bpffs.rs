//! bpffs detection and on-demand mounting, mirroring the statfs-based
//! detection style of `crate::cgroup_probe::get_cgroup_setup` but for the
//! `BPF_FS_MAGIC` filesystem pinned objects live on.

use std::path::Path;

use nix::sys::statfs::statfs;

use crate::mount::MountError;
use crate::syscall::Syscall;

const BPF_FS_MAGIC: nix::sys::statfs::FsType = nix::sys::statfs::FsType(0xcafe4a11);

pub fn is_bpffs(path: &Path) -> bool {
    match statfs(path) {
        Ok(stat) => stat.filesystem_type() == BPF_FS_MAGIC,
        Err(_) => false,
    }
}

/// Mounts a bpffs at `path` if one isn't already there, matching the
/// fstype/source/flags/data the kernel expects for `mount -t bpf bpf path`.
pub fn ensure_mounted(syscall: &dyn Syscall, path: &Path) -> Result<(), MountError> {
    if is_bpffs(path) {
        return Ok(());
    }
    syscall.mount(
        Some(Path::new("bpf")),
        path,
        Some("bpf"),
        nix::mount::MsFlags::empty(),
        Some("mode=0700"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::TestSyscall;

    #[test]
    fn ensure_mounted_mounts_non_bpffs_path() {
        let tmp = crate::test_support::create_temp_dir("bpffs_mount").unwrap();
        let syscall = TestSyscall::default();
        ensure_mounted(&syscall, tmp.path()).unwrap();
        let calls = syscall.mount_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].fstype.as_deref(), Some("bpf"));
    }
}
