// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Error types.
//!
//! None of these are fatal to the emulator.  Protocol commands turn them into
//! a response window error string, and carry on.

use thiserror::Error;

/// Errors returned by a [`Filesystem`](crate::Filesystem) implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("file not found")]
    NotFound,

    #[error("invalid path")]
    InvalidPath,

    #[error("I/O error")]
    Io,
}

/// Errors from loading and managing ROM images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid bank number {0}")]
    InvalidBank(u8),

    #[error("invalid ROM header")]
    Header,

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Errors which stop the emulator from starting.  The firmware reports these
/// by flashing the LED [`StartupError::flash_code()`] times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("failed to load fallback lower ROM: {0}")]
    LowerRom(Error),

    #[error("failed to load fallback BASIC ROM: {0}")]
    BasicRom(Error),
}

impl StartupError {
    pub fn flash_code(&self) -> u8 {
        match self {
            StartupError::LowerRom(_) => 4,
            StartupError::BasicRom(_) => 5,
        }
    }
}
