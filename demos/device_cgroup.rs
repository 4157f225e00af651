//! Spawns a sleeping process, opens its device cgroup via the polymorphic
//! facade, allows one device, and attaches the process to it. Mirrors the
//! teacher crate's own `create` example, adapted from a generic cgroup
//! manager to this crate's `DeviceCgroupHandle`.

use anyhow::Result;
use nix::libc::pid_t;
use nix::unistd::Pid;
use std::process::Command;

use snap_device_cgroups::cgroup_probe::{get_cgroup_setup, default_cgroup_root};
use snap_device_cgroups::device_key::DeviceKind;
use snap_device_cgroups::security_tag::SecurityTag;
use snap_device_cgroups::{DeviceCgroupHandle, NewFlags};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let tag = SecurityTag::parse("snap.example-cgroup.app")?;
    let setup = get_cgroup_setup(default_cgroup_root())?;
    let mut handle = DeviceCgroupHandle::new(&tag, setup, NewFlags::empty())?;

    // /dev/null, readable and writable by anything in the cgroup.
    handle.allow(DeviceKind::Char, 1, 3)?;

    let cmd = Command::new("sh")
        .args(["-c", "sleep 100"])
        .spawn()
        .expect("spawning sleep");

    handle.attach(Pid::from_raw(cmd.id() as pid_t))?;

    Ok(())
}
