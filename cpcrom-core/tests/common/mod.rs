// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![allow(dead_code)]

use std::collections::BTreeMap;

use cpcrom_core::{
    Command, DirEntry, FileInfo, Filesystem, FirmwareInfo, FsError, HostControl, LatchProtocol,
    LatchSource,
    Response, RomBankStore, RomLoader, CMD_PREFIX, ROM_SIZE,
};

/// In-memory filesystem
#[derive(Default)]
pub struct MemFs {
    files: BTreeMap<String, Vec<u8>>,
    pub fail_dir: bool,
}

pub struct MemDir {
    entries: Vec<(String, u32)>,
    pos: usize,
}

impl MemFs {
    pub fn with(mut self, name: &str, data: &[u8]) -> Self {
        self.insert(name, data);
        self
    }

    pub fn insert(&mut self, name: &str, data: &[u8]) {
        self.files.insert(name.to_string(), data.to_vec());
    }

    fn key(path: &str) -> &str {
        path.trim_start_matches('/')
    }
}

impl Filesystem for MemFs {
    type Dir = MemDir;

    fn stat(&mut self, path: &str) -> Result<FileInfo, FsError> {
        self.files
            .get(Self::key(path))
            .map(|data| FileInfo {
                size: data.len() as u32,
            })
            .ok_or(FsError::NotFound)
    }

    fn read_at(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let data = self.files.get(Self::key(path)).ok_or(FsError::NotFound)?;
        let start = (offset as usize).min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        Ok(len)
    }

    fn open_dir(&mut self, path: &str) -> Result<MemDir, FsError> {
        if self.fail_dir {
            return Err(FsError::Io);
        }
        if path != "/" {
            return Err(FsError::NotFound);
        }
        Ok(MemDir {
            entries: self
                .files
                .iter()
                .map(|(name, data)| (name.clone(), data.len() as u32))
                .collect(),
            pos: 0,
        })
    }

    fn next_entry(&mut self, dir: &mut MemDir) -> Result<Option<DirEntry>, FsError> {
        let entry = dir
            .entries
            .get(dir.pos)
            .map(|(name, size)| DirEntry::new(name, *size));
        dir.pos += 1;
        Ok(entry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    ResetAsserted,
    ResetReleased,
    Delay(u32),
    Led(bool),
}

/// Records what the protocol does to the CPC
#[derive(Default)]
pub struct MockHost {
    pub events: Vec<HostEvent>,
}

impl MockHost {
    pub fn resets(&self) -> usize {
        self.events
            .iter()
            .filter(|event| **event == HostEvent::ResetAsserted)
            .count()
    }
}

impl HostControl for MockHost {
    fn assert_reset(&mut self) {
        self.events.push(HostEvent::ResetAsserted);
    }

    fn release_reset(&mut self) {
        self.events.push(HostEvent::ResetReleased);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.events.push(HostEvent::Delay(ms));
    }

    fn set_led(&mut self, on: bool) {
        self.events.push(HostEvent::Led(on));
    }

    fn enter_storage_mode(&mut self) -> ! {
        panic!("storage mode entered after {:?}", self.events)
    }
}

/// Hands out latch bytes from a script
pub struct ScriptedLatch {
    bytes: std::collections::VecDeque<u8>,
}

impl ScriptedLatch {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.iter().copied().collect(),
        }
    }
}

impl LatchSource for ScriptedLatch {
    fn next_byte(&mut self) -> u8 {
        self.bytes.pop_front().expect("latch script exhausted")
    }
}

pub type Protocol = LatchProtocol<'static, MemFs, MockHost>;

/// A store which lives for the rest of the test run, so can be shared with
/// a bus engine thread
pub fn leaked_store() -> &'static RomBankStore {
    Box::leak(Box::new(RomBankStore::new()))
}

pub fn protocol(store: &'static RomBankStore, fs: MemFs) -> Protocol {
    LatchProtocol::new(store, RomLoader::new(fs), MockHost::default(), FirmwareInfo::default())
}

/// A ROM image with the given header and a name table at 0xC100
pub fn rom_image(rom_type: u8, version: [u8; 3], name: &str) -> Vec<u8> {
    let mut image = vec![0u8; ROM_SIZE];
    image[0] = rom_type;
    image[1..4].copy_from_slice(&version);
    image[4..6].copy_from_slice(&0xC100u16.to_le_bytes());
    let bytes = name.as_bytes();
    image[0x100..0x100 + bytes.len()].copy_from_slice(bytes);
    if let Some(last) = bytes.len().checked_sub(1) {
        image[0x100 + last] |= 0x80;
    }
    for (ii, byte) in image[0x200..0x3F00].iter_mut().enumerate() {
        *byte = (ii as u8) ^ rom_type;
    }
    image
}

pub fn feed_all(protocol: &mut Protocol, bytes: &[u8]) {
    for &byte in bytes {
        protocol.feed(byte);
    }
}

/// Sends a complete command and returns the response window
pub fn command(protocol: &mut Protocol, command: Command, params: &[u8], text: Option<&str>) -> Response {
    let mut bytes = vec![CMD_PREFIX, command.byte()];
    bytes.extend_from_slice(params);
    if let Some(text) = text {
        bytes.push(text.len() as u8);
        bytes.extend_from_slice(text.as_bytes());
    }
    feed_all(protocol, &bytes);
    assert!(protocol.is_idle());
    protocol.response().expect("no response bank").snapshot()
}

pub fn sequence(protocol: &Protocol) -> u8 {
    protocol.response().expect("no response bank").sequence()
}
