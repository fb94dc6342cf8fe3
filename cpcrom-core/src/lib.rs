// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! cpcrom-core
//!
//! The core of a ROM emulator which sits in the expansion socket of an
//! Amstrad CPC, serving one lower (OS) ROM and up to [`NUM_ROM_BANKS`] upper
//! ROMs, and which can be reconfigured by the CPC itself via a command
//! channel carried on the ROM select latch.
//!
//! This is a `no_std` compatible library.  It contains:
//! - [`RomBankStore`] - the lower and upper ROM images, which banks are
//!   present, and which bank the CPC has selected
//! - [`BusEngine`] - answers every CPC ROM read, driving the data bus or
//!   releasing it
//! - [`LatchProtocol`] - decodes bytes written to the ROM select latch into
//!   bank selections and commands, and writes command responses into the
//!   selected ROM for the CPC to read back
//! - [`RomLoader`] - loads ROM images and config files from a
//!   [`Filesystem`]
//!
//! The hardware and the filesystem are reached through the [`BusPins`],
//! [`LatchSource`], [`HostControl`] and [`Filesystem`] traits.
//!
//! Typically used like this, with the engine on one core and the protocol
//! on the other:
//!
//! ```rust ignore
//! static STORE: RomBankStore = RomBankStore::new();
//!
//! let mut loader = RomLoader::new(fat);
//! with_host_held(&mut host, |held| loader.load_startup(&STORE, held))?;
//!
//! core1.spawn(|| BusEngine::new(&STORE).run(&mut gpio));
//! LatchProtocol::new(&STORE, loader, host, FirmwareInfo::default()).run(&mut pio);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod fs;
pub mod header;
pub mod host;
pub mod loader;
pub mod protocol;
pub mod response;
pub mod store;

pub use bus::{BusEngine, BusLines, BusPins, Drive};
pub use command::Command;
pub use error::{Error, FsError, StartupError};
pub use fs::{DirEntry, FileInfo, Filesystem};
pub use header::{AmsdosHeader, RomHeader, RomKind};
pub use host::{HostControl, HostHeld, LatchSource, with_host_held};
pub use loader::{ConfigReader, ConfigReport, RomLoader, RomSource};
pub use protocol::{FirmwareInfo, Flow, LatchProtocol};
pub use response::{Response, ResponseChannel, Status};
pub use store::{ImageWriter, RomBankStore, Slot};

use static_assertions::{const_assert, const_assert_eq};

/// Firmware version, reported by the `rom-list-first` command
pub const VERSION_MAJOR: u8 = 3;
pub const VERSION_MINOR: u8 = 1;
pub const VERSION_PATCH: u8 = 1;

/// System clock the firmware runs the RP2040 at.  The lowest frequency which
/// reliably meets CPC bus timing.
pub const CLOCK_SPEED_MHZ: u32 = 250;

/// Size of every ROM image, lower and upper
pub const ROM_SIZE: usize = 16384;

/// Address lines A0-A13
pub const ADDRESS_MASK: u16 = 0x3FFF;

/// Number of upper ROM banks.  Limited by RP2040 RAM.
pub const NUM_ROM_BANKS: usize = 12;

/// Value of the active bank when no upper ROM is to be served
pub const NO_BANK: u8 = 0xFF;

/// Offset of the response window within the selected upper ROM
pub const RESP_OFFSET: usize = 0x3F00;

/// Length of the response window
pub const RESP_LEN: usize = 0x100;

/// Latch byte which starts a command sequence
pub const CMD_PREFIX: u8 = 0xFC;

/// Latch bytes which are neither bank selects nor the prefix.  Older
/// versions of the host-side ROM used these for signalling.
pub const LEGACY_LATCH_BYTES: [u8; 3] = [0xFD, 0xFE, 0xFF];

/// Time the CPC is held in reset after its ROMs are changed
pub const RESET_HOLD_MS: u32 = 10;

const_assert!(NUM_ROM_BANKS <= 16);
const_assert!((NUM_ROM_BANKS as u8) < NO_BANK);
const_assert!(RESP_OFFSET + RESP_LEN <= ROM_SIZE);
const_assert_eq!(ROM_SIZE, ADDRESS_MASK as usize + 1);
