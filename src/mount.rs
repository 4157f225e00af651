//! Mount-protocol rendering.
//!
//! [`render_mount`] and [`render_umount`] turn a `mount(2)`/`umount2(2)` call
//! into the shell-style string used in logs and error messages; the actual
//! syscall is issued through [`crate::syscall::Syscall`]. See `SPEC_FULL.md`
//! §4.2 for the exact rendering rules these functions must reproduce.

use nix::mount::{MntFlags, MsFlags};

#[derive(thiserror::Error, Debug)]
pub enum MountError {
    #[error("syscall error mounting {source:?} -> {target}: {err}")]
    Mount {
        source: Option<String>,
        target: String,
        err: nix::Error,
    },
    #[error("syscall error unmounting {target}: {err}")]
    Umount { target: String, err: nix::Error },
}

/// Renders a `mount(2)` invocation the way a shell command line would spell
/// it, for diagnostics only. `source`/`target == "none"` are omitted;
/// `fstype` is omitted when `None` or `"none"`.
pub fn render_mount(
    source: Option<&str>,
    target: &str,
    fstype: Option<&str>,
    flags: MsFlags,
    data: Option<&str>,
) -> String {
    let mut out = String::from("mount");

    if let Some(fstype) = fstype.filter(|f| *f != "none") {
        out.push_str(" -t ");
        out.push_str(fstype);
    }

    let recursive = flags.contains(MsFlags::MS_REC);
    if flags.contains(MsFlags::MS_BIND) {
        out.push_str(if recursive { " --rbind" } else { " --bind" });
    }
    if flags.contains(MsFlags::MS_MOVE) {
        out.push_str(" --move");
    }
    if flags.contains(MsFlags::MS_SHARED) {
        out.push_str(if recursive {
            " --make-rshared"
        } else {
            " --make-shared"
        });
    }
    if flags.contains(MsFlags::MS_SLAVE) {
        out.push_str(if recursive {
            " --make-rslave"
        } else {
            " --make-slave"
        });
    }
    if flags.contains(MsFlags::MS_PRIVATE) {
        out.push_str(if recursive {
            " --make-rprivate"
        } else {
            " --make-private"
        });
    }
    if flags.contains(MsFlags::MS_UNBINDABLE) {
        out.push_str(if recursive {
            " --make-runbindable"
        } else {
            " --make-unbindable"
        });
    }

    let options = render_options(flags, data);
    if !options.is_empty() {
        out.push_str(" -o ");
        out.push_str(&options);
    }

    if let Some(source) = source.filter(|s| *s != "none") {
        out.push(' ');
        out.push_str(source);
    }
    if target != "none" {
        out.push(' ');
        out.push_str(target);
    }

    out
}

pub fn render_umount(target: &str, flags: MntFlags) -> String {
    let mut out = format!("umount {target}");
    if flags.contains(MntFlags::MNT_FORCE) {
        out.push_str(" -f");
    }
    if flags.contains(MntFlags::MNT_DETACH) {
        out.push_str(" -l");
    }
    out
}

const RESIDUAL_FLAGS: &[(MsFlags, &str)] = &[
    (MsFlags::MS_RDONLY, "ro"),
    (MsFlags::MS_NOSUID, "nosuid"),
    (MsFlags::MS_NODEV, "nodev"),
    (MsFlags::MS_NOEXEC, "noexec"),
    (MsFlags::MS_SYNCHRONOUS, "sync"),
    (MsFlags::MS_REMOUNT, "remount"),
    (MsFlags::MS_MANDLOCK, "mand"),
    (MsFlags::MS_DIRSYNC, "dirsync"),
    (MsFlags::MS_NOATIME, "noatime"),
    (MsFlags::MS_NODIRATIME, "nodiratime"),
    (MsFlags::MS_SILENT, "silent"),
    (MsFlags::MS_POSIXACL, "acl"),
    (MsFlags::MS_RELATIME, "relatime"),
    (MsFlags::MS_KERNMOUNT, "kernmount"),
    (MsFlags::MS_I_VERSION, "iversion"),
    (MsFlags::MS_STRICTATIME, "strictatime"),
    (MsFlags::MS_LAZYTIME, "lazytime"),
];

// These flags are rendered via their own switch above, not the -o list.
fn switch_flags() -> MsFlags {
    MsFlags::MS_BIND
        | MsFlags::MS_MOVE
        | MsFlags::MS_SHARED
        | MsFlags::MS_SLAVE
        | MsFlags::MS_PRIVATE
        | MsFlags::MS_UNBINDABLE
        | MsFlags::MS_REC
}

fn render_options(flags: MsFlags, data: Option<&str>) -> String {
    let mut parts: Vec<String> = RESIDUAL_FLAGS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| name.to_string())
        .collect();

    let residual = flags
        - switch_flags()
        - RESIDUAL_FLAGS
            .iter()
            .fold(MsFlags::empty(), |acc, (f, _)| acc | *f);
    if !residual.is_empty() {
        parts.push(format!("{:#x}", residual.bits()));
    }

    if let Some(data) = data.filter(|d| !d.is_empty()) {
        parts.push(data.to_owned());
    }

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_plain_bind() {
        let s = render_mount(Some("/a"), "/b", None, MsFlags::MS_BIND, None);
        assert_eq!(s, "mount --bind /a /b");
    }

    #[test]
    fn renders_recursive_bind() {
        let flags = MsFlags::MS_BIND | MsFlags::MS_REC;
        let s = render_mount(Some("/a"), "/b", None, flags, None);
        assert_eq!(s, "mount --rbind /a /b");
    }

    #[test]
    fn omits_source_and_target_literal_none() {
        let s = render_mount(Some("none"), "none", None, MsFlags::MS_PRIVATE, None);
        assert_eq!(s, "mount --make-private");
    }

    #[test]
    fn renders_fstype_switch() {
        let s = render_mount(None, "/b", Some("tmpfs"), MsFlags::empty(), None);
        assert_eq!(s, "mount -t tmpfs /b");
    }

    #[test]
    fn renders_residual_options_in_fixed_order() {
        let flags = MsFlags::MS_RDONLY | MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC;
        let s = render_mount(None, "/b", None, flags, None);
        assert_eq!(s, "mount -o ro,nosuid,noexec /b");
    }

    #[test]
    fn renders_data_appended_to_options() {
        let s = render_mount(
            None,
            "/b",
            None,
            MsFlags::MS_RDONLY,
            Some("size=10M,mode=0700"),
        );
        assert_eq!(s, "mount -o ro,size=10M,mode=0700 /b");
    }

    #[test]
    fn scenario_s6_mount_rendering_monster() {
        let source = "/".to_string() + &"a".repeat(4094);
        let target = "/".to_string() + &"b".repeat(4094);
        let flags = MsFlags::MS_BIND
            | MsFlags::MS_MOVE
            | MsFlags::MS_SHARED
            | MsFlags::MS_SLAVE
            | MsFlags::MS_PRIVATE
            | MsFlags::MS_UNBINDABLE
            | MsFlags::MS_REC
            | MsFlags::MS_RDONLY
            | MsFlags::MS_NOSUID
            | MsFlags::MS_NODEV
            | MsFlags::MS_NOEXEC
            | MsFlags::MS_SYNCHRONOUS
            | MsFlags::MS_REMOUNT
            | MsFlags::MS_MANDLOCK
            | MsFlags::MS_DIRSYNC
            | MsFlags::MS_NOATIME
            | MsFlags::MS_NODIRATIME
            | MsFlags::MS_SILENT
            | MsFlags::MS_POSIXACL
            | MsFlags::MS_RELATIME
            | MsFlags::MS_KERNMOUNT
            | MsFlags::MS_I_VERSION
            | MsFlags::MS_STRICTATIME
            | MsFlags::MS_LAZYTIME;

        let rendered = render_mount(Some(&source), &target, Some("fstype"), flags, None);
        let expected_prefix = "mount -t fstype --rbind --move --make-rshared --make-rslave \
             --make-rprivate --make-runbindable -o \
             ro,nosuid,nodev,noexec,sync,remount,mand,dirsync,noatime,nodiratime,silent,acl,\
             relatime,kernmount,iversion,strictatime,lazytime ";
        assert!(rendered.starts_with(expected_prefix));
        assert!(rendered.ends_with(&format!("{source} {target}")));
    }

    #[test]
    fn renders_umount_with_flags() {
        let s = render_umount("/mnt", MntFlags::MNT_FORCE | MntFlags::MNT_DETACH);
        assert_eq!(s, "umount /mnt -f -l");
    }
}
