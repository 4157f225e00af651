#![cfg(test)]
//! Scratch-directory fixtures shared by this crate's test modules. Grounded
//! on the teacher crate's `test.rs`.

use std::{
    fs,
    io::Write,
    ops::Deref,
    path::{Path, PathBuf},
};

pub struct TempDir {
    path: Option<PathBuf>,
}

impl TempDir {
    pub fn new<P: Into<PathBuf>>(path: P) -> std::io::Result<Self> {
        let p = path.into();
        fs::create_dir_all(&p)?;
        Ok(Self { path: Some(p) })
    }

    pub fn path(&self) -> &Path {
        self.path
            .as_ref()
            .expect("temp dir has already been removed")
    }

    pub fn remove(&mut self) {
        if let Some(p) = &self.path {
            let _ = fs::remove_dir_all(p);
            self.path = None;
        }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        self.remove();
    }
}

impl AsRef<Path> for TempDir {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

impl Deref for TempDir {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

pub fn create_temp_dir(test_name: &str) -> std::io::Result<TempDir> {
    TempDir::new(std::env::temp_dir().join(format!(
        "snap-device-cgroups-test-{test_name}-{}",
        std::process::id()
    )))
}

pub fn set_fixture(dir: &Path, filename: &str, val: &str) -> std::io::Result<PathBuf> {
    let full_path = dir.join(filename);
    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full_path)?
        .write_all(val.as_bytes())?;
    Ok(full_path)
}

/// Builds a scratch directory containing the given empty fixture files,
/// matching the layout a `devices.allow`/`devices.deny`/`cgroup.procs`
/// triple needs.
pub fn setup_with_fixtures(test_name: &str, filenames: &[&str]) -> TempDir {
    let tmp = create_temp_dir(test_name).expect("create temp dir for test");
    for filename in filenames {
        set_fixture(tmp.path(), filename, "").expect("create fixture file");
    }
    tmp
}
