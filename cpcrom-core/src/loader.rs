// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Loads ROM images and config files from a [`Filesystem`] into a
//! [`RomBankStore`].

use core::str;
use log::{debug, info, warn};

use crate::config::{Directive, parse_line};
use crate::header::{AMSDOS_HEADER_SIZE, AmsdosHeader};
use crate::{Error, Filesystem, HostHeld, ROM_SIZE, RomBankStore, Slot, StartupError};

/// Config file loaded at startup
pub const DEFAULT_CONFIG: &str = "DEFAULT.CFG";

/// Lower ROM loaded at startup if there is no default config
pub const FALLBACK_LOWER: &str = "OS_6128.ROM";

/// Upper ROM loaded into bank 0 at startup if there is no default config
pub const FALLBACK_BASIC: &str = "BASIC_1.1.ROM";

/// The CPC side utility ROM, loaded into [`FALLBACK_UTILITY_BANK`] at
/// startup if there is no default config, and if present
pub const FALLBACK_UTILITY: &str = "picorom.rom";
pub const FALLBACK_UTILITY_BANK: u8 = 1;

/// Longest config file line.  Longer lines are skipped.
pub const MAX_LINE_LEN: usize = 256;

const CHUNK_SIZE: usize = 512;

/// Where a ROM image lives within its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomSource {
    /// Offset of the image within the file
    pub offset: u32,

    /// Bytes of image to load.  At most [`ROM_SIZE`].
    pub length: u32,

    /// The AMSDOS header, if the file has one
    pub amsdos: Option<AmsdosHeader>,
}

/// What [`RomLoader::apply_config()`] loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub lower_loaded: bool,

    /// Bitmask of upper banks loaded
    pub upper_loaded: u16,

    /// Directives whose ROM failed to load
    pub failures: u8,
}

impl ConfigReport {
    pub fn upper_count(&self) -> u32 {
        self.upper_loaded.count_ones()
    }
}

/// Loads ROMs and config files
pub struct RomLoader<F> {
    fs: F,
}

impl<F: Filesystem> RomLoader<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Works out which part of a ROM file holds the image.
    ///
    /// Files with a valid AMSDOS header supply the header's logical length
    /// from just after the header.  Other files supply up to [`ROM_SIZE`]
    /// bytes from the start.
    pub fn open_rom(&mut self, path: &str) -> Result<RomSource, Error> {
        let info = self.fs.stat(path)?;

        let mut header = [0u8; AMSDOS_HEADER_SIZE];
        let read = self.fs.read_at(path, 0, &mut header)?;

        let source = match AmsdosHeader::detect(&header[..read]) {
            Some(amsdos) => {
                debug!("{path} has AMSDOS header, length {}", amsdos.logical_length);
                RomSource {
                    offset: AMSDOS_HEADER_SIZE as u32,
                    length: u32::from(amsdos.logical_length).min(ROM_SIZE as u32),
                    amsdos: Some(amsdos),
                }
            }
            None => RomSource {
                offset: 0,
                length: info.size.min(ROM_SIZE as u32),
                amsdos: None,
            },
        };
        Ok(source)
    }

    /// Loads an opened ROM file into `slot`.
    ///
    /// A read error part way through leaves an upper bank not present.
    /// Returns the number of image bytes read from the file.
    pub fn load(
        &mut self,
        store: &RomBankStore,
        held: &HostHeld,
        path: &str,
        source: &RomSource,
        slot: Slot,
    ) -> Result<usize, Error> {
        let mut writer = store.writer(held, slot)?;
        let mut chunk = [0u8; CHUNK_SIZE];
        let length = source.length as usize;

        while writer.len() < length {
            let want = (length - writer.len()).min(CHUNK_SIZE);
            let offset = source.offset + writer.len() as u32;
            let read = self.fs.read_at(path, offset, &mut chunk[..want])?;
            if read == 0 {
                break;
            }
            writer.write(&chunk[..read]);
        }

        let loaded = writer.finish();
        info!("Loaded {path} ({loaded} bytes) into {slot:?}");
        Ok(loaded)
    }

    pub fn load_lower(
        &mut self,
        store: &RomBankStore,
        held: &HostHeld,
        path: &str,
    ) -> Result<usize, Error> {
        let source = self.open_rom(path)?;
        self.load(store, held, path, &source, Slot::Lower)
    }

    /// Loads a ROM into an upper bank and marks it present.  The bank is
    /// checked before the file is opened.
    pub fn load_upper(
        &mut self,
        store: &RomBankStore,
        held: &HostHeld,
        path: &str,
        bank: u8,
    ) -> Result<usize, Error> {
        if usize::from(bank) >= crate::NUM_ROM_BANKS {
            return Err(Error::InvalidBank(bank));
        }
        let source = self.open_rom(path)?;
        self.load(store, held, path, &source, Slot::Upper(bank))
    }

    /// Opens a config file for reading.  Doesn't need the CPC held, so
    /// should be called before holding it, in order that a missing config
    /// file changes nothing.
    pub fn open_config<'p>(&mut self, name: &'p str) -> Result<ConfigReader<'p>, Error> {
        self.fs.stat(name)?;
        Ok(ConfigReader::new(name))
    }

    /// Replaces every upper bank with those named by a config.  The lower
    /// ROM is only replaced if the config names one.
    ///
    /// A ROM which fails to load is skipped, leaving its bank empty.  A read
    /// error part way through the config stops it, keeping whatever loaded.
    pub fn apply_config(
        &mut self,
        store: &RomBankStore,
        held: &HostHeld,
        config: &mut ConfigReader<'_>,
    ) -> ConfigReport {
        store.clear_upper(held);
        let mut report = ConfigReport::default();

        loop {
            let line = match config.next_line(&mut self.fs) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed reading {}: {e}", config.path());
                    report.failures = report.failures.saturating_add(1);
                    break;
                }
            };
            let Some(directive) = parse_line(line) else {
                continue;
            };

            let result = match directive {
                Directive::Lower(path) => self.load_lower(store, held, path).map(|_| {
                    report.lower_loaded = true;
                }),
                Directive::Upper { bank, path } => {
                    self.load_upper(store, held, path, bank).map(|_| {
                        report.upper_loaded |= 1 << bank;
                    })
                }
            };
            if let Err(e) = result {
                warn!("Config directive {directive:?} failed: {e}");
                report.failures = report.failures.saturating_add(1);
            }
        }

        report
    }

    /// Opens and applies a config file.  A config file which can't be opened
    /// leaves the store unchanged.
    pub fn load_config_file(
        &mut self,
        store: &RomBankStore,
        held: &HostHeld,
        name: &str,
    ) -> Result<ConfigReport, Error> {
        let mut config = self.open_config(name)?;
        Ok(self.apply_config(store, held, &mut config))
    }

    /// Loads the ROMs the CPC boots with, and selects bank 0.
    ///
    /// Uses [`DEFAULT_CONFIG`] if it exists.  Otherwise loads the 6128
    /// firmware, which must exist, and the utility ROM if it exists.
    pub fn load_startup(&mut self, store: &RomBankStore, held: &HostHeld) -> Result<(), StartupError> {
        store.clear_upper(held);

        match self.load_config_file(store, held, DEFAULT_CONFIG) {
            Ok(report) => {
                info!(
                    "Loaded {DEFAULT_CONFIG}: {} upper ROMs, {} failures",
                    report.upper_count(),
                    report.failures
                );
            }
            Err(e) => {
                warn!("No usable {DEFAULT_CONFIG} ({e}), loading fallback ROMs");
                self.load_lower(store, held, FALLBACK_LOWER)
                    .map_err(StartupError::LowerRom)?;
                self.load_upper(store, held, FALLBACK_BASIC, 0)
                    .map_err(StartupError::BasicRom)?;
                if let Err(e) = self.load_upper(store, held, FALLBACK_UTILITY, FALLBACK_UTILITY_BANK) {
                    debug!("No utility ROM: {e}");
                }
            }
        }

        store.select_bank(0);
        Ok(())
    }
}

/// Reads a config file a line at a time, a chunk at a time, so a config
/// file can be any size.
pub struct ConfigReader<'p> {
    path: &'p str,
    offset: u32,
    chunk: [u8; CHUNK_SIZE],
    start: usize,
    end: usize,
    line: heapless::Vec<u8, MAX_LINE_LEN>,
    line_number: usize,
}

impl<'p> ConfigReader<'p> {
    fn new(path: &'p str) -> Self {
        Self {
            path,
            offset: 0,
            chunk: [0; CHUNK_SIZE],
            start: 0,
            end: 0,
            line: heapless::Vec::new(),
            line_number: 0,
        }
    }

    pub fn path(&self) -> &'p str {
        self.path
    }

    /// Line number of the line last read, counting from 1
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Returns the next line, without its line ending, or `None` at the end
    /// of the file.
    ///
    /// Lines longer than [`MAX_LINE_LEN`], or which aren't valid UTF-8, are
    /// skipped.
    pub fn next_line<F: Filesystem>(&mut self, fs: &mut F) -> Result<Option<&str>, Error> {
        loop {
            let Some(fits) = self.fill_line(fs)? else {
                return Ok(None);
            };
            self.line_number += 1;

            if !fits {
                warn!("{} line {} too long, skipped", self.path, self.line_number);
            } else if str::from_utf8(&self.line).is_err() {
                warn!("{} line {} not valid text, skipped", self.path, self.line_number);
            } else {
                break;
            }
        }
        Ok(str::from_utf8(&self.line).ok())
    }

    /// Reads bytes up to the next newline into `line`.  Returns whether the
    /// line fitted, or `None` if the file has no more bytes.
    fn fill_line<F: Filesystem>(&mut self, fs: &mut F) -> Result<Option<bool>, Error> {
        self.line.clear();
        let mut fits = true;
        let mut started = false;

        loop {
            if self.start == self.end {
                let read = fs.read_at(self.path, self.offset, &mut self.chunk)?;
                if read == 0 {
                    break;
                }
                self.offset += read as u32;
                self.start = 0;
                self.end = read;
            }

            let byte = self.chunk[self.start];
            self.start += 1;
            started = true;
            if byte == b'\n' {
                return Ok(Some(fits));
            }
            if self.line.push(byte).is_err() {
                fits = false;
            }
        }

        Ok(started.then_some(fits))
    }
}
