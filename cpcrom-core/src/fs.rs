// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The filesystem holding ROM images and config files.

use crate::FsError;

/// Longest directory entry name returned
pub const MAX_NAME_LEN: usize = 64;

/// Read access to the filesystem.  On the device this is FAT on flash, and
/// on a PC a directory.
///
/// Paths are `/` separated and relative to the filesystem root.  A leading
/// `/` is allowed.
pub trait Filesystem {
    /// Directory iteration state
    type Dir;

    fn stat(&mut self, path: &str) -> Result<FileInfo, FsError>;

    /// Reads from `offset` into `buf`.  Returns the number of bytes read,
    /// which is only less than `buf.len()` at the end of the file.
    fn read_at(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, FsError>;

    fn open_dir(&mut self, path: &str) -> Result<Self::Dir, FsError>;

    /// Returns the next entry, or `None` once the directory is exhausted.
    fn next_entry(&mut self, dir: &mut Self::Dir) -> Result<Option<DirEntry>, FsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Truncated to [`MAX_NAME_LEN`] bytes
    pub name: heapless::String<MAX_NAME_LEN>,
    pub size: u32,
}

impl DirEntry {
    /// Creates an entry, truncating `name` if necessary.
    pub fn new(name: &str, size: u32) -> Self {
        let mut entry = Self {
            name: heapless::String::new(),
            size,
        };
        for ch in name.chars() {
            if entry.name.push(ch).is_err() {
                break;
            }
        }
        entry
    }
}
