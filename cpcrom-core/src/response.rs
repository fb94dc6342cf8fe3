// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The response window.
//!
//! Command results are returned to the CPC by writing them into the top of
//! the selected upper ROM, where the CPC reads them as ordinary ROM bytes.
//!
//! | Offset | Contents |
//! |--------|----------|
//! | 0 | Sequence number, incremented once per completed command |
//! | 1 | [`Status`] |
//! | 2 | Payload kind - 0 none, 1 text |
//! | 3.. | NUL terminated ASCII text |
//!
//! The CPC polls the sequence number until it changes, then reads the rest,
//! so the sequence number is always written last.

use core::fmt;
use portable_atomic::Ordering;

use crate::{RESP_LEN, RomBankStore};

const SEQ: usize = 0;
const STATUS: usize = 1;
const KIND: usize = 2;
const TEXT: usize = 3;

const KIND_NONE: u8 = 0;
const KIND_TEXT: u8 = 1;

/// Longest text payload, leaving room for the terminating NUL
pub const MAX_TEXT_LEN: usize = RESP_LEN - TEXT - 1;

/// Command outcome, as seen by the CPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    /// A listing command has nothing more to return
    Done = 1,
    Error = 2,
}

impl Status {
    /// Anything other than OK or done is an error.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Status::Ok,
            1 => Status::Done,
            _ => Status::Error,
        }
    }
}

/// The response window of one upper bank
pub struct ResponseChannel<'a> {
    store: &'a RomBankStore,
    bank: u8,
}

impl<'a> ResponseChannel<'a> {
    pub fn new(store: &'a RomBankStore, bank: u8) -> Self {
        Self { store, bank }
    }

    /// Writes a status and a line of text.  Text beyond [`MAX_TEXT_LEN`]
    /// bytes is dropped.
    pub fn write_line(&self, status: Status, args: fmt::Arguments<'_>) {
        let mut text = WindowText {
            channel: self,
            len: 0,
        };
        // Never fails - overflow is truncated
        let _ = fmt::write(&mut text, args);
        let len = text.len;
        self.put(TEXT + len, 0);
        self.put(STATUS, status as u8);
        self.put(KIND, KIND_TEXT);
    }

    /// Writes a status with no text.
    pub fn write_status(&self, status: Status) {
        self.put(TEXT, 0);
        self.put(STATUS, status as u8);
        self.put(KIND, KIND_NONE);
    }

    /// Publishes the response by incrementing the sequence number.
    pub fn bump_sequence(&self) {
        self.set_sequence(self.sequence().wrapping_add(1));
    }

    /// Publishes the response with a specific sequence number.
    pub fn set_sequence(&self, seq: u8) {
        self.store
            .write_window(self.bank, SEQ, seq, Ordering::Release);
    }

    pub fn sequence(&self) -> u8 {
        self.store.read_window(self.bank, SEQ)
    }

    /// Reads the window back, as the CPC would.
    pub fn snapshot(&self) -> Response {
        let mut text = heapless::String::new();
        for offset in TEXT..RESP_LEN {
            match self.store.read_window(self.bank, offset) {
                0 => break,
                byte => {
                    let _ = text.push(char::from(byte));
                }
            }
        }
        Response {
            sequence: self.sequence(),
            status: Status::from_byte(self.store.read_window(self.bank, STATUS)),
            kind: self.store.read_window(self.bank, KIND),
            text,
        }
    }

    fn put(&self, offset: usize, byte: u8) {
        self.store
            .write_window(self.bank, offset, byte, Ordering::Relaxed);
    }
}

struct WindowText<'c, 'a> {
    channel: &'c ResponseChannel<'a>,
    len: usize,
}

impl fmt::Write for WindowText<'_, '_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if self.len >= MAX_TEXT_LEN {
                break;
            }
            // The CPC's character set is ASCII
            let byte = if byte.is_ascii() && byte != 0 { byte } else { b'?' };
            self.channel.put(TEXT + self.len, byte);
            self.len += 1;
        }
        Ok(())
    }
}

/// A decoded response window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub sequence: u8,
    pub status: Status,
    pub kind: u8,
    pub text: heapless::String<MAX_TEXT_LEN>,
}

impl Response {
    pub fn has_text(&self) -> bool {
        self.kind == KIND_TEXT
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:3}] {:?}", self.sequence, self.status)?;
        if self.has_text() {
            write!(f, " \"{}\"", self.text)?;
        }
        Ok(())
    }
}
