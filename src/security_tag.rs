//! Security tag validation.
//!
//! A security tag identifies a confined application's isolation domain:
//! `snap.<name>.<component>`, optionally with an instance key folded into
//! `<name>`. See `SPEC_FULL.md` §3 for the full grammar.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^snap\.[a-z](-?[a-z0-9])*(_[A-Za-z0-9]{1,10})?\.([a-zA-Z0-9](-?[a-zA-Z0-9])*|hook\.[a-z](-?[a-z])*)$",
    )
    .expect("static security tag regex is valid")
});

static SNAP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z](-?[a-z0-9])*$").expect("static snap name regex is valid"));

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("security tag {tag:?} does not match the required snap.<name>.<component> grammar")]
    MalformedTag { tag: String },
    #[error("snap name {name:?} is not a valid lower-case dashed identifier")]
    MalformedSnapName { name: String },
}

/// A validated `snap.<name>.<component>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityTag(String);

impl SecurityTag {
    pub fn parse(tag: &str) -> Result<Self, ValidationError> {
        if !TAG_RE.is_match(tag) {
            return Err(ValidationError::MalformedTag {
                tag: tag.to_owned(),
            });
        }
        Ok(Self(tag.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `<name>` portion, with any `_<instance>` suffix still attached.
    pub fn snap_instance(&self) -> &str {
        self.0
            .strip_prefix("snap.")
            .and_then(|rest| rest.split('.').next())
            .expect("tag already validated by TAG_RE")
    }

    /// The bare snap name, with the instance key (if any) stripped off.
    pub fn snap_name(&self) -> &str {
        self.snap_instance()
            .split('_')
            .next()
            .expect("split always yields at least one element")
    }

    /// The sanitised form used as a bpffs path component: dots mapped to
    /// underscores, since bpffs rejects dots in path segments.
    pub fn sanitised(&self) -> String {
        self.0.replace('.', "_")
    }
}

impl std::fmt::Display for SecurityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SecurityTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validates a bare snap name (used for the freezer tracking cgroup and the
/// v2 subtree scan, which key off the snap name rather than a full tag).
pub fn validate_snap_name(name: &str) -> Result<(), ValidationError> {
    if SNAP_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::MalformedSnapName {
            name: name.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_app_tag() {
        assert!(SecurityTag::parse("snap.foo.app").is_ok());
    }

    #[test]
    fn accepts_hook_tag() {
        assert!(SecurityTag::parse("snap.foo.hook.configure").is_ok());
    }

    #[test]
    fn accepts_instance_key() {
        let tag = SecurityTag::parse("snap.foo_bar1.app").unwrap();
        assert_eq!(tag.snap_name(), "foo");
        assert_eq!(tag.snap_instance(), "foo_bar1");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(SecurityTag::parse("foo.app").is_err());
    }

    #[test]
    fn rejects_uppercase_name() {
        assert!(SecurityTag::parse("snap.Foo.app").is_err());
    }

    #[test]
    fn rejects_consecutive_dashes_in_name() {
        assert!(SecurityTag::parse("snap.fo--o.app").is_err());
    }

    #[test]
    fn sanitised_replaces_dots_with_underscores() {
        let tag = SecurityTag::parse("snap.foo.app").unwrap();
        assert_eq!(tag.sanitised(), "snap_foo_app");
    }

    #[test]
    fn dropping_instance_key_still_validates() {
        let tag = SecurityTag::parse("snap.foo_bar1.app").unwrap();
        assert!(SecurityTag::parse(&format!("snap.{}.app", tag.snap_name())).is_ok());
    }

    #[test]
    fn bare_snap_name_is_valid_standalone() {
        assert!(validate_snap_name("foo").is_ok());
        assert!(validate_snap_name("Foo").is_err());
    }

    quickcheck! {
        fn property_round_trip_without_instance(name: String) -> bool {
            // Only exercise the property on inputs that already look like a
            // valid snap name; quickcheck's raw String generator produces
            // mostly-invalid input, which the validator is expected to reject.
            if validate_snap_name(&name).is_err() {
                return true;
            }
            let tag = format!("snap.{name}.app");
            SecurityTag::parse(&tag).is_ok()
        }
    }
}
