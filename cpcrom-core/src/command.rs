// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The commands the CPC can send through the ROM select latch.
//!
//! A command is sent as [`CMD_PREFIX`](crate::CMD_PREFIX), the command byte,
//! its fixed parameter bytes, then for commands taking text a length byte
//! followed by that many bytes of text.

use strum::{Display, EnumIter, FromRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Command {
    /// Hold the CPC in reset and switch to USB mass storage mode
    #[strum(serialize = "picoload")]
    Picoload = 0xFF,

    /// Turn the LED on or off
    #[strum(serialize = "led")]
    Led = 0xFE,

    /// Start a listing of the root directory, returning the first entry
    #[strum(serialize = "dir-first")]
    DirFirst = 0xFD,

    #[strum(serialize = "dir-next")]
    DirNext = 0xFC,

    /// Return the firmware banner and start a listing of the upper banks
    #[strum(serialize = "rom-list-first")]
    RomListFirst = 0xFB,

    #[strum(serialize = "rom-list-next")]
    RomListNext = 0xFA,

    /// Load a ROM file into a bank
    #[strum(serialize = "rom-in")]
    RomIn = 0xF9,

    /// Empty a bank
    #[strum(serialize = "rom-out")]
    RomOut = 0xF8,

    /// Replace all upper ROMs with those in a config file
    #[strum(serialize = "config-set")]
    ConfigSet = 0xF7,
}

impl Command {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Number of fixed parameter bytes
    pub fn param_count(self) -> usize {
        match self {
            Command::Led | Command::RomIn | Command::RomOut => 1,
            _ => 0,
        }
    }

    /// Whether a length prefixed string follows the fixed parameters
    pub fn takes_text(self) -> bool {
        matches!(self, Command::RomIn | Command::ConfigSet)
    }
}
