//! The `(kind, major, minor)` triple keying the v2 device-permission map.
//!
//! Layout mirrors the packed key the filter program (`bpf::program`)
//! constructs on the eBPF stack: a 1-byte kind tag followed by two 4-byte
//! fields, with the leading byte chosen so the 32-bit fields stay 4-byte
//! aligned despite the packed layout (see `SPEC_FULL.md` §4.5.4 step 2).

/// Sentinel minor value meaning "match any minor for this major".
pub const ANY_MINOR: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    Char,
    Block,
}

impl DeviceKind {
    /// The byte the filter program writes into the key's `kind` field.
    pub fn tag_byte(self) -> u8 {
        match self {
            DeviceKind::Char => b'c',
            DeviceKind::Block => b'b',
        }
    }

    /// The character used in the v1 `devices.allow`/`devices.deny` line.
    pub fn v1_char(self) -> char {
        match self {
            DeviceKind::Char => 'c',
            DeviceKind::Block => 'b',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(C)]
pub struct DeviceKey {
    kind: DeviceKindRepr,
    major: u32,
    minor: u32,
}

// A transparent, ordered stand-in for DeviceKind so DeviceKey can derive Ord;
// the public constructor keeps callers on the DeviceKind enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
enum DeviceKindRepr {
    Block = 0,
    Char = 1,
}

impl From<DeviceKind> for DeviceKindRepr {
    fn from(k: DeviceKind) -> Self {
        match k {
            DeviceKind::Block => DeviceKindRepr::Block,
            DeviceKind::Char => DeviceKindRepr::Char,
        }
    }
}

impl From<DeviceKindRepr> for DeviceKind {
    fn from(k: DeviceKindRepr) -> Self {
        match k {
            DeviceKindRepr::Block => DeviceKind::Block,
            DeviceKindRepr::Char => DeviceKind::Char,
        }
    }
}

impl DeviceKey {
    pub fn new(kind: DeviceKind, major: u32, minor: u32) -> Self {
        Self {
            kind: kind.into(),
            major,
            minor,
        }
    }

    /// The same key with the minor replaced by the "any minor" sentinel; this
    /// is the fallback lookup the filter program performs on a first miss.
    pub fn with_any_minor(self) -> Self {
        Self {
            minor: ANY_MINOR,
            ..self
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind.into()
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// The raw bytes as they are laid out for the BPF map, used both by the
    /// production map-update path and by tests that drive the filter program
    /// through `rbpf`.
    pub fn to_map_bytes(self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0] = self.kind().tag_byte();
        buf[4..8].copy_from_slice(&self.major.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.minor.to_ne_bytes());
        buf
    }

    /// Inverse of [`Self::to_map_bytes`], used when enumerating an existing
    /// pinned map (e.g. to wipe it on fresh creation).
    pub fn from_map_bytes(buf: [u8; 12]) -> Self {
        let kind = match buf[0] {
            b'b' => DeviceKind::Block,
            _ => DeviceKind::Char,
        };
        let major = u32::from_ne_bytes(buf[4..8].try_into().expect("4-byte slice"));
        let minor = u32::from_ne_bytes(buf[8..12].try_into().expect("4-byte slice"));
        Self::new(kind, major, minor)
    }
}
