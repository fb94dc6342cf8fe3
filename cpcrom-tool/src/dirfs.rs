// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! A [`Filesystem`] over a directory on the PC, standing in for the device's
//! FAT drive.
//!
//! ROMs are often distributed zipped, so a path ending `.zip` is served as
//! the first `.rom` file inside the archive.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use cpcrom_core::{DirEntry, FileInfo, Filesystem, FsError};
use log::{debug, warn};
use zip::ZipArchive;

pub struct DirFs {
    root: PathBuf,
    zips: HashMap<PathBuf, Vec<u8>>,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            zips: HashMap::new(),
        }
    }

    /// Maps a device path to a path under the root.  Paths which would
    /// escape the root are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(FsError::InvalidPath),
            }
        }
        Ok(resolved)
    }

    fn is_zip(path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    }

    /// Contents of the ROM inside a zip file, extracted on first use
    fn zip_contents(&mut self, path: &Path) -> Result<&[u8], FsError> {
        if !self.zips.contains_key(path) {
            let contents = extract_rom(path)?;
            self.zips.insert(path.to_path_buf(), contents);
        }
        self.zips
            .get(path)
            .map(Vec::as_slice)
            .ok_or(FsError::Io)
    }
}

fn io_error(e: io::Error) -> FsError {
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound,
        _ => FsError::Io,
    }
}

fn extract_rom(path: &Path) -> Result<Vec<u8>, FsError> {
    let data = fs::read(path).map_err(io_error)?;
    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(|e| {
        warn!("Failed to open zip archive {}: {e}", path.display());
        FsError::Io
    })?;

    for ii in 0..archive.len() {
        let Ok(mut file) = archive.by_index(ii) else {
            continue;
        };
        let name = file.name().to_string();
        if !name.to_ascii_lowercase().ends_with(".rom") {
            continue;
        }

        debug!("Extracting {name} from {}", path.display());
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).map_err(io_error)?;
        return Ok(contents);
    }

    warn!("No .rom file in {}", path.display());
    Err(FsError::NotFound)
}

impl Filesystem for DirFs {
    type Dir = std::vec::IntoIter<DirEntry>;

    fn stat(&mut self, path: &str) -> Result<FileInfo, FsError> {
        let resolved = self.resolve(path)?;
        if Self::is_zip(&resolved) {
            let size = self.zip_contents(&resolved)?.len() as u32;
            return Ok(FileInfo { size });
        }

        let metadata = fs::metadata(&resolved).map_err(io_error)?;
        if !metadata.is_file() {
            return Err(FsError::NotFound);
        }
        Ok(FileInfo {
            size: u32::try_from(metadata.len()).unwrap_or(u32::MAX),
        })
    }

    fn read_at(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let resolved = self.resolve(path)?;
        if Self::is_zip(&resolved) {
            let contents = self.zip_contents(&resolved)?;
            let start = (offset as usize).min(contents.len());
            let len = buf.len().min(contents.len() - start);
            buf[..len].copy_from_slice(&contents[start..start + len]);
            return Ok(len);
        }

        let mut file = File::open(&resolved).map_err(io_error)?;
        file.seek(SeekFrom::Start(u64::from(offset)))
            .map_err(io_error)?;

        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(read) => total += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(io_error(e)),
            }
        }
        Ok(total)
    }

    /// Lists the files, not subdirectories, sorted by name.
    fn open_dir(&mut self, path: &str) -> Result<Self::Dir, FsError> {
        let resolved = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&resolved).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let metadata = entry.metadata().map_err(io_error)?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let size = u32::try_from(metadata.len()).unwrap_or(u32::MAX);
            entries.push(DirEntry::new(&name, size));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries.into_iter())
    }

    fn next_entry(&mut self, dir: &mut Self::Dir) -> Result<Option<DirEntry>, FsError> {
        Ok(dir.next())
    }
}
