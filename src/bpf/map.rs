//! Typed wrappers over the `bpf_map_*`/`bpf_obj_*` syscalls the device
//! cgroup facade uses to maintain its pinned allow-list map. The teacher
//! crate's rule-list-based program never needed a map; this module has no
//! direct teacher counterpart and is grounded on the general libbpf map API
//! surface plus the shim idiom of `prog.rs`/the teacher's `v2/devices/bpf.rs`.

use std::ffi::CString;
use std::os::unix::io::RawFd;

#[cfg(not(test))]
use libbpf_sys::{bpf_map_create, bpf_map_delete_elem, bpf_map_get_next_key, bpf_map_update_elem, bpf_obj_get, bpf_obj_pin};
#[cfg(test)]
use crate::bpf::mocks::mock_libbpf_sys::{
    bpf_map_create, bpf_map_delete_elem, bpf_map_get_next_key, bpf_map_update_elem, bpf_obj_get, bpf_obj_pin,
};

use super::BpfError;
use crate::device_key::DeviceKey;

const KEY_SIZE: u32 = 12; // DeviceKey::to_map_bytes() width.
const VALUE_SIZE: u32 = 1; // single-byte "allowed" marker.
const MAX_ENTRIES: u32 = 500;

/// Creates the hash map backing a filter program's allow-list, named after
/// the owning security tag for `bpftool map show` readability.
pub fn create(name_suffix: &str) -> Result<RawFd, BpfError> {
    let mut name = format!("sdc_{name_suffix}");
    name.truncate(15); // BPF_OBJ_NAME_LEN - 1
    let cname = CString::new(name).unwrap_or_else(|_| CString::new("sdc_map").unwrap());

    let opts = libbpf_sys::bpf_map_create_opts {
        sz: std::mem::size_of::<libbpf_sys::bpf_map_create_opts>() as libbpf_sys::size_t,
        ..Default::default()
    };

    #[allow(unused_unsafe)]
    let fd = unsafe {
        bpf_map_create(
            libbpf_sys::BPF_MAP_TYPE_HASH,
            cname.as_ptr(),
            KEY_SIZE,
            VALUE_SIZE,
            MAX_ENTRIES,
            &opts as *const libbpf_sys::bpf_map_create_opts,
        )
    };
    if fd < 0 {
        return Err(errno::errno().into());
    }
    Ok(fd)
}

/// Inserts or updates `key -> allowed` in the map at `map_fd`.
pub fn update(map_fd: RawFd, key: &DeviceKey, allowed: bool) -> Result<(), BpfError> {
    let key_bytes = key.to_map_bytes();
    let value: u8 = allowed as u8;
    #[allow(unused_unsafe)]
    let ret = unsafe {
        bpf_map_update_elem(
            map_fd,
            key_bytes.as_ptr() as *const std::ffi::c_void,
            &value as *const u8 as *const std::ffi::c_void,
            0,
        )
    };
    if ret != 0 {
        return Err(errno::errno().into());
    }
    Ok(())
}

/// Removes `key` from the map at `map_fd`, tolerating `ENOENT`.
pub fn delete(map_fd: RawFd, key: &DeviceKey) -> Result<(), BpfError> {
    let key_bytes = key.to_map_bytes();
    #[allow(unused_unsafe)]
    let ret = unsafe { bpf_map_delete_elem(map_fd, key_bytes.as_ptr() as *const std::ffi::c_void) };
    if ret != 0 {
        let err = errno::errno();
        if err.0 == libc::ENOENT {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

/// Enumerates every key currently present, used to wipe a map before
/// reusing it for a freshly-created handle (`NewFlags::FROM_EXISTING`).
pub fn list_keys(map_fd: RawFd) -> Result<Vec<[u8; 12]>, BpfError> {
    let mut keys = Vec::new();
    let mut cur: Option<[u8; 12]> = None;
    loop {
        let mut next = [0u8; 12];
        let cur_ptr = match &cur {
            Some(k) => k.as_ptr() as *const std::ffi::c_void,
            None => std::ptr::null(),
        };
        #[allow(unused_unsafe)]
        let ret = unsafe {
            bpf_map_get_next_key(
                map_fd,
                cur_ptr,
                next.as_mut_ptr() as *mut std::ffi::c_void,
            )
        };
        if ret != 0 {
            let err = errno::errno();
            if err.0 == libc::ENOENT {
                break;
            }
            return Err(err.into());
        }
        keys.push(next);
        cur = Some(next);
    }
    Ok(keys)
}

/// Pins `fd` at `path`, creating parent directories' bpffs mount is assumed
/// to already exist (see `bpffs.rs`).
pub fn pin(fd: RawFd, path: &str) -> Result<(), BpfError> {
    let cpath = CString::new(path).expect("pin path has no interior NUL");
    #[allow(unused_unsafe)]
    let ret = unsafe { bpf_obj_pin(fd, cpath.as_ptr()) };
    if ret != 0 {
        return Err(errno::errno().into());
    }
    Ok(())
}

/// Opens a previously-pinned object, returning its fd.
pub fn get_pinned(path: &str) -> Result<RawFd, BpfError> {
    let cpath = CString::new(path).expect("pin path has no interior NUL");
    #[allow(unused_unsafe)]
    let fd = unsafe { bpf_obj_get(cpath.as_ptr()) };
    if fd < 0 {
        return Err(errno::errno().into());
    }
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::bpf::mocks::mock_libbpf_sys;
    use crate::device_key::DeviceKind;

    #[test]
    #[serial(libbpf_sys)]
    fn test_create() {
        let create = mock_libbpf_sys::bpf_map_create_context();
        create.expect().once().returning(|_, _, _, _, _, _| 5);
        assert_eq!(super::create("foo").unwrap(), 5);
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_update() {
        let update = mock_libbpf_sys::bpf_map_update_elem_context();
        update.expect().once().returning(|_, _, _, _| 0);
        let key = DeviceKey::new(DeviceKind::Char, 1, 5);
        assert!(super::update(3, &key, true).is_ok());
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_delete_tolerates_enoent() {
        let delete = mock_libbpf_sys::bpf_map_delete_elem_context();
        delete.expect().once().returning(|_, _| {
            errno::set_errno(errno::Errno(libc::ENOENT));
            -1
        });
        let key = DeviceKey::new(DeviceKind::Char, 1, 5);
        assert!(super::delete(3, &key).is_ok());
    }

    #[test]
    #[serial(libbpf_sys)]
    fn test_list_keys_stops_at_enoent() {
        let next = mock_libbpf_sys::bpf_map_get_next_key_context();
        next.expect().times(1).returning(|_, _, next_key| {
            unsafe {
                let slice = std::slice::from_raw_parts_mut(next_key as *mut u8, 12);
                slice.copy_from_slice(&[1u8; 12]);
            }
            0
        });
        next.expect().times(1).returning(|_, _, _| {
            errno::set_errno(errno::Errno(libc::ENOENT));
            -1
        });

        let keys = super::list_keys(7).unwrap();
        assert_eq!(keys, vec![[1u8; 12]]);
    }
}
