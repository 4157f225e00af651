//! Program load/attach/detach/query wrappers. Grounded on the teacher
//! crate's `v2/devices/bpf.rs::prog` module; same mock-swap idiom.

use std::os::unix::io::RawFd;
use std::ptr;

use libbpf_sys::{bpf_insn, BPF_CGROUP_DEVICE, BPF_F_ALLOW_MULTI, BPF_PROG_TYPE_CGROUP_DEVICE};
#[cfg(not(test))]
use libbpf_sys::{bpf_prog_attach, bpf_prog_detach2, bpf_prog_get_fd_by_id, bpf_prog_load, bpf_prog_query};
use libc::ENOSPC;

use super::{BpfError, ProgramInfo};
#[cfg(test)]
use crate::bpf::mocks::mock_libbpf_sys::{
    bpf_prog_attach, bpf_prog_detach2, bpf_prog_get_fd_by_id, bpf_prog_load, bpf_prog_query,
};

pub fn load(license: &str, insns: &[u8]) -> Result<RawFd, BpfError> {
    let insns_cnt = insns.len() / std::mem::size_of::<bpf_insn>();
    let insns = insns as *const _ as *const bpf_insn;
    let mut opts = libbpf_sys::bpf_prog_load_opts {
        kern_version: 0,
        log_buf: ptr::null_mut::<::std::os::raw::c_char>(),
        log_size: 0,
        ..Default::default()
    };
    #[allow(unused_unsafe)]
    let prog_fd = unsafe {
        bpf_prog_load(
            BPF_PROG_TYPE_CGROUP_DEVICE,
            ptr::null::<::std::os::raw::c_char>(),
            license as *const _ as *const ::std::os::raw::c_char,
            insns,
            insns_cnt as u64,
            &mut opts as *mut libbpf_sys::bpf_prog_load_opts,
        )
    };

    if prog_fd < 0 {
        return Err(errno::errno().into());
    }
    Ok(prog_fd)
}

/// Collects the programs currently attached to a cgroup fd.
pub fn query(cgroup_fd: RawFd) -> Result<Vec<ProgramInfo>, BpfError> {
    let mut prog_ids: Vec<u32> = vec![0_u32; 64];
    let mut attach_flags = 0_u32;
    for _ in 0..10 {
        let mut prog_cnt = prog_ids.len() as u32;
        #[allow(unused_unsafe)]
        let ret = unsafe {
            bpf_prog_query(
                cgroup_fd,
                BPF_CGROUP_DEVICE,
                0,
                &mut attach_flags,
                &prog_ids[0] as *const u32 as *mut u32,
                &mut prog_cnt,
            )
        };
        if ret != 0 {
            let err = errno::errno();
            if err.0 == ENOSPC {
                prog_ids.resize(prog_cnt as usize, 0);
                continue;
            }
            return Err(err.into());
        }

        prog_ids.resize(prog_cnt as usize, 0);
        break;
    }

    let mut prog_fds = Vec::with_capacity(prog_ids.len());
    for prog_id in &prog_ids {
        #[allow(unused_unsafe)]
        let prog_fd = unsafe { bpf_prog_get_fd_by_id(*prog_id) };
        if prog_fd < 0 {
            tracing::debug!("bpf_prog_get_fd_by_id failed: {}", errno::errno());
            continue;
        }
        prog_fds.push(ProgramInfo {
            id: *prog_id,
            fd: prog_fd,
        });
    }
    Ok(prog_fds)
}

pub fn detach2(prog_fd: RawFd, cgroup_fd: RawFd) -> Result<(), BpfError> {
    #[allow(unused_unsafe)]
    let ret = unsafe { bpf_prog_detach2(prog_fd, cgroup_fd, BPF_CGROUP_DEVICE) };
    if ret != 0 {
        return Err(errno::errno().into());
    }
    Ok(())
}

pub fn attach(prog_fd: RawFd, cgroup_fd: RawFd) -> Result<(), BpfError> {
    #[allow(unused_unsafe)]
    let ret = unsafe { bpf_prog_attach(prog_fd, cgroup_fd, BPF_CGROUP_DEVICE, BPF_F_ALLOW_MULTI) };
    if ret != 0 {
        return Err(errno::errno().into());
    }
    Ok(())
}
