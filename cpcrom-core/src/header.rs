// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Headers found in ROM files and ROM images.
//!
//! - [`AmsdosHeader`] - the 128 byte header AMSDOS prepends to files saved
//!   from a CPC.  ROM files copied from a CPC disk often carry one, and it
//!   must be stripped before the image is served.
//! - [`RomHeader`] - the first bytes of a CPC upper ROM image, describing its
//!   type, version and where its name lives.

use core::fmt;
use deku::prelude::*;
use static_assertions::const_assert_eq;

use crate::{ADDRESS_MASK, Error};

/// Size of an AMSDOS file header
pub const AMSDOS_HEADER_SIZE: usize = 128;

/// Bytes of the AMSDOS header covered by its checksum
const AMSDOS_CHECKSUM_LEN: usize = 67;

/// Z80 address upper ROMs are paged in at.  Name table pointers are
/// relative to this.
pub const UPPER_ROM_BASE: u16 = 0xC000;

/// Longest ROM name decoded from a name table
pub const MAX_ROM_NAME_LEN: usize = 31;

/// Shown instead of a name for extension ROMs
const EXTENSION_ROM_NAME: &str = "-extension ROM- ";

/// AMSDOS file header
///
/// Only `logical_length` matters for loading ROMs.  The rest is parsed to
/// report on by the tool.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead)]
#[deku(endian = "little")]
pub struct AmsdosHeader {
    pub user_number: u8,
    pub filename: [u8; 8],
    pub extension: [u8; 3],
    #[deku(pad_bytes_before = "4")]
    pub block_number: u8,
    pub last_block: u8,
    pub file_type: u8,
    pub data_length: u16,
    pub data_location: u16,
    pub first_block: u8,
    /// Length of the file contents following the header
    pub logical_length: u16,
    pub entry_address: u16,
    #[deku(pad_bytes_before = "36")]
    pub real_length_high: u8,
    pub real_length: u16,
    #[deku(pad_bytes_after = "59")]
    pub checksum: u16,
}

impl AmsdosHeader {
    /// Returns the header at the start of `data`, if there is one with a
    /// valid checksum.  Files which don't start with a header return `None`.
    pub fn detect(data: &[u8]) -> Option<Self> {
        let data = data.get(..AMSDOS_HEADER_SIZE)?;
        let sum = data[..AMSDOS_CHECKSUM_LEN]
            .iter()
            .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)));

        let (_, header) = Self::from_bytes((data, 0)).ok()?;
        if header.checksum == sum {
            Some(header)
        } else {
            None
        }
    }

    /// The filename as stored, without padding, e.g. `"BASIC.ROM"`.
    pub fn name(&self) -> heapless::String<12> {
        let mut name = heapless::String::new();
        let trimmed = |part: &[u8]| -> usize {
            part.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |pos| pos + 1)
        };
        let base = &self.filename[..trimmed(&self.filename)];
        let ext = &self.extension[..trimmed(&self.extension)];
        for &byte in base {
            let _ = name.push(char::from(byte & 0x7F));
        }
        if !ext.is_empty() {
            let _ = name.push('.');
            for &byte in ext {
                let _ = name.push(char::from(byte & 0x7F));
            }
        }
        name
    }
}

/// ROM type, from the first byte of an upper ROM image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomKind {
    Foreground,
    Background,
    Extension,
    /// The built-in BASIC ROM
    Builtin,
    Unknown(u8),
}

impl From<u8> for RomKind {
    fn from(byte: u8) -> Self {
        match byte {
            0 => RomKind::Foreground,
            1 => RomKind::Background,
            2 => RomKind::Extension,
            0x80 => RomKind::Builtin,
            other => RomKind::Unknown(other),
        }
    }
}

impl RomKind {
    /// Whether ROMs of this type carry a name table
    pub fn has_name_table(&self) -> bool {
        matches!(
            self,
            RomKind::Foreground | RomKind::Background | RomKind::Builtin
        )
    }
}

impl fmt::Display for RomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RomKind::Foreground => write!(f, "Foreground"),
            RomKind::Background => write!(f, "Background"),
            RomKind::Extension => write!(f, "Extension"),
            RomKind::Builtin => write!(f, "Built-in"),
            RomKind::Unknown(byte) => write!(f, "Unknown ({byte:#04x})"),
        }
    }
}

/// The first bytes of an upper ROM image
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead)]
#[deku(endian = "little")]
pub struct RomHeader {
    pub rom_type: u8,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Z80 address of the RSX name table
    pub name_table: u16,
}

/// Size of [`RomHeader`] in an image
pub const ROM_HEADER_SIZE: usize = 6;
const_assert_eq!(ROM_HEADER_SIZE, core::mem::size_of::<RomHeader>());

impl RomHeader {
    /// Parses the header from the first [`ROM_HEADER_SIZE`] bytes of an
    /// image.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        Self::from_bytes((data, 0))
            .map(|(_, header)| header)
            .map_err(|_| Error::Header)
    }

    pub fn kind(&self) -> RomKind {
        RomKind::from(self.rom_type)
    }

    /// Offset of the name table within the image
    pub fn name_table_offset(&self) -> u16 {
        self.name_table.wrapping_sub(UPPER_ROM_BASE) & ADDRESS_MASK
    }

    /// The name to show for this ROM.  Decoded from the name table for ROM
    /// types which have one, a fixed string for extension ROMs, and empty
    /// otherwise.
    pub fn display_name(&self, read: impl Fn(u16) -> u8) -> heapless::String<MAX_ROM_NAME_LEN> {
        match self.kind() {
            kind if kind.has_name_table() => decode_name(self.name_table_offset(), read),
            RomKind::Extension => {
                let mut name = heapless::String::new();
                let _ = name.push_str(EXTENSION_ROM_NAME);
                name
            }
            _ => heapless::String::new(),
        }
    }
}

/// Decodes a name from an RSX name table.
///
/// Characters are 7 bit, and the last has bit 7 set.  Stops after
/// [`MAX_ROM_NAME_LEN`] characters if no terminator is found.  Offsets wrap
/// within the image.
pub fn decode_name(offset: u16, read: impl Fn(u16) -> u8) -> heapless::String<MAX_ROM_NAME_LEN> {
    let mut name = heapless::String::new();
    for ii in 0..MAX_ROM_NAME_LEN as u16 {
        let byte = read(offset.wrapping_add(ii) & ADDRESS_MASK);
        let _ = name.push(char::from(byte & 0x7F));
        if byte & 0x80 != 0 {
            break;
        }
    }
    name
}
