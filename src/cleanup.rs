//! Cleanup and string primitives.
//!
//! Resource release in this crate is mostly ordinary RAII: `File`, `Dir`, and
//! owned buffers drop on scope exit. [`ScopeGuard`] covers the one case that
//! isn't — releasing a raw fd obtained from a syscall wrapper before it has
//! been wrapped in an owning type. Quoting and bounded-append are the string
//! helpers diagnostic formatting needs.

/// Runs a release closure exactly once, including on an early return. Taking
/// the value out with [`ScopeGuard::disarm`] cancels the release.
pub struct ScopeGuard<F: FnMut()> {
    release: F,
    armed: bool,
}

impl<F: FnMut()> ScopeGuard<F> {
    pub fn new(release: F) -> Self {
        Self {
            release,
            armed: true,
        }
    }

    /// Cancels the release; the caller has taken ownership of the resource.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl<F: FnMut()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if self.armed {
            (self.release)();
        }
    }
}

/// Drops the effective UID to the real UID. Called immediately before
/// constructing an error whose `Display` interpolates a caller-controlled
/// path or tag, so that a latent format-string or path-manipulation weakness
/// in that message can't be weaponised while still running with setuid
/// privilege. Best-effort: if the process isn't setuid (the common case
/// under tests), `geteuid() == getuid()` and this is a no-op; a failing
/// `seteuid` is logged and otherwise ignored, since refusing to format the
/// diagnostic would just trade one problem for a worse one (a silently
/// swallowed fatal error).
pub fn drop_privileges_for_diagnostics() {
    let real_uid = nix::unistd::getuid();
    if nix::unistd::geteuid() != real_uid {
        if let Err(err) = nix::unistd::seteuid(real_uid) {
            tracing::warn!(?err, "failed to drop effective uid before formatting diagnostic");
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("buffer overflow: {needed} bytes needed, {available} available")]
pub struct AppendError {
    needed: usize,
    available: usize,
}

/// Appends `suffix` to `buf` unless doing so would exceed `limit` bytes.
/// Never truncates silently.
pub fn append_bounded(buf: &mut String, suffix: &str, limit: usize) -> Result<(), AppendError> {
    let needed = buf.len() + suffix.len();
    if needed > limit {
        return Err(AppendError {
            needed,
            available: limit.saturating_sub(buf.len()),
        });
    }
    buf.push_str(suffix);
    Ok(())
}

/// Quotes an arbitrary byte string the way a diagnostic message embeds a
/// caller-controlled path or tag: printable ASCII (minus `"` and `\`) passes
/// through, a handful of bytes get a named escape, everything else becomes
/// `\xHH` in lower-case hex. The result is always wrapped in double quotes.
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x0b => out.push_str("\\v"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('"');
    out
}
