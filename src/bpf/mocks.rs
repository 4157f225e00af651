//! Duplicated signatures of the raw `libc`/`libbpf-sys` FFI entry points this
//! crate's BPF shim calls, `mockall::automock`-ed under `#[cfg(test)]` so
//! tests exercise the shim's logic without making real syscalls. Grounded on
//! the teacher crate's `v2/devices/mocks.rs`.

#[cfg_attr(test, automock())]
pub mod libc {
    #[cfg(target_env = "musl")]
    #[allow(non_camel_case_types)]
    pub type __rlimit_resource_t = libc::c_int;

    #[cfg(not(target_env = "musl"))]
    #[allow(non_camel_case_types)]
    pub type __rlimit_resource_t = libc::__rlimit_resource_t;

    pub fn setrlimit(_resource: __rlimit_resource_t, _rlim: *const libc::rlimit) -> libc::c_int {
        unimplemented!();
    }

    pub fn getrlimit(_resource: __rlimit_resource_t, _rlim: *mut libc::rlimit) -> libc::c_int {
        unimplemented!();
    }
}

#[cfg_attr(test, automock())]
pub mod libbpf_sys {
    pub fn bpf_prog_load(
        _type_: libbpf_sys::bpf_prog_type,
        _name: *const ::std::os::raw::c_char,
        _license: *const ::std::os::raw::c_char,
        _insns: *const libbpf_sys::bpf_insn,
        _insns_cnt: libbpf_sys::size_t,
        _opts: *const libbpf_sys::bpf_prog_load_opts,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_prog_query(
        _target_fd: ::std::os::raw::c_int,
        _type_: libbpf_sys::bpf_attach_type,
        _query_flags: libbpf_sys::__u32,
        _attach_flags: *mut libbpf_sys::__u32,
        _prog_ids: *mut libbpf_sys::__u32,
        _prog_cnt: *mut libbpf_sys::__u32,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_prog_get_fd_by_id(_id: libbpf_sys::__u32) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_prog_detach2(
        _prog_fd: ::std::os::raw::c_int,
        _attachable_fd: ::std::os::raw::c_int,
        _type_: libbpf_sys::bpf_attach_type,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_prog_attach(
        _prog_fd: ::std::os::raw::c_int,
        _attachable_fd: ::std::os::raw::c_int,
        _type_: libbpf_sys::bpf_attach_type,
        _flags: ::std::os::raw::c_uint,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_map_create(
        _map_type: libbpf_sys::bpf_map_type,
        _map_name: *const ::std::os::raw::c_char,
        _key_size: libbpf_sys::__u32,
        _value_size: libbpf_sys::__u32,
        _max_entries: libbpf_sys::__u32,
        _opts: *const libbpf_sys::bpf_map_create_opts,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_map_update_elem(
        _fd: ::std::os::raw::c_int,
        _key: *const ::std::os::raw::c_void,
        _value: *const ::std::os::raw::c_void,
        _flags: libbpf_sys::__u64,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_map_delete_elem(
        _fd: ::std::os::raw::c_int,
        _key: *const ::std::os::raw::c_void,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_map_get_next_key(
        _fd: ::std::os::raw::c_int,
        _key: *const ::std::os::raw::c_void,
        _next_key: *mut ::std::os::raw::c_void,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_obj_pin(
        _fd: ::std::os::raw::c_int,
        _pathname: *const ::std::os::raw::c_char,
    ) -> ::std::os::raw::c_int {
        unimplemented!();
    }

    pub fn bpf_obj_get(_pathname: *const ::std::os::raw::c_char) -> ::std::os::raw::c_int {
        unimplemented!();
    }
}
