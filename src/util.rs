use std::{
    ffi::{CStr, CString},
    fs::File,
    io::Read,
    os::fd::{AsFd, OwnedFd},
};

use log::trace;
use rustix::{
    fs::{openat, statat, AtFlags, Dir, FileType, Mode, OFlags},
    io::Result as ErrnoResult,
    path::Arg,
};

/// Opens the named directory relative to `dirfd` for reading its entries.
pub(crate) fn open_dir(dirfd: impl AsFd, path: impl Arg) -> ErrnoResult<OwnedFd> {
    openat(
        dirfd,
        path,
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
        Mode::empty(),
    )
}

/// Lists the names in a directory, skipping "." and "..".
///
/// Only the initial read of the directory can fail.  An error partway through the listing ends
/// it early with whatever was collected so far: the engine may be removing entries underneath
/// us, and a short listing is indistinguishable from one taken a moment later.
pub(crate) fn list_names(fd: impl AsFd) -> ErrnoResult<Vec<CString>> {
    let mut names = vec![];
    for item in Dir::read_from(fd)? {
        match item {
            Ok(entry) => {
                let name = entry.file_name();
                if name != c"." && name != c".." {
                    names.push(name.to_owned());
                }
            }
            Err(err) => {
                trace!("directory listing cut short: {err}");
                break;
            }
        }
    }
    Ok(names)
}

/// Lists the names of subdirectories (including symlinks to directories) in a directory.
pub(crate) fn list_subdirs(fd: impl AsFd) -> ErrnoResult<Vec<CString>> {
    let fd = fd.as_fd();
    let mut names = vec![];
    for item in Dir::read_from(fd)? {
        let Ok(entry) = item else {
            break;
        };
        let name = entry.file_name();
        if name == c"." || name == c".." {
            continue;
        }
        let is_dir = match entry.file_type() {
            FileType::Directory => true,
            FileType::Symlink | FileType::Unknown => is_dir_at(fd, name),
            _ => false,
        };
        if is_dir {
            names.push(name.to_owned());
        }
    }
    Ok(names)
}

fn is_dir_at(dirfd: impl AsFd, name: &CStr) -> bool {
    statat(dirfd, name, AtFlags::empty())
        .map(|stat| FileType::from_raw_mode(stat.st_mode) == FileType::Directory)
        .unwrap_or(false)
}

/// Reads the whole content of the named file relative to `dirfd`.
pub(crate) fn read_file_at(dirfd: impl AsFd, name: impl Arg) -> std::io::Result<Vec<u8>> {
    let fd = openat(dirfd, name, OFlags::RDONLY | OFlags::CLOEXEC, Mode::empty())?;
    let mut content = vec![];
    File::from(fd).read_to_end(&mut content)?;
    Ok(content)
}
