//! Some general utility functions.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;
use std::{fs, io};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::consts::FIFO_PERMISSIONS;

pub fn set_permissions(path: &Path, mode: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(mode);
    fs::set_permissions(path, permissions)
}

/// Creates a named pipe at `path`, replacing a stale pipe left there by an earlier run.
pub fn make_fifo(path: &Path) -> io::Result<()> {
    remove_fifo(path)?;
    mkfifo(path, Mode::from_bits_truncate(FIFO_PERMISSIONS))
        .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
}

/// Removes the named pipe at `path`. A missing file is not an error, any other kind of file is
/// left alone.
pub fn remove_fifo(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
        Ok(_) if !is_fifo(path) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' exists and is not a named pipe", path.display()),
            ))
        },
        Ok(_) => {},
    }
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

pub fn is_fifo(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|metadata| metadata.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "./unit/shared_tests.rs"]
mod shared_tests;
