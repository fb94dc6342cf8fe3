// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The ROM images served to the CPC.
//!
//! The store is shared between the bus engine, which only reads it, and the
//! latch protocol, which changes it.  There are no locks.  Bank selection is
//! a single atomic store.  ROM image contents are only changed while the CPC
//! is held in reset, which is enforced by requiring a [`HostHeld`] token.
//!
//! Image bytes are held as atomics so the two contexts never race in the
//! language sense, but every access is `Relaxed`, so compiles down to plain
//! loads and stores.

use portable_atomic::{AtomicU8, AtomicU16, Ordering};

use crate::header::ROM_HEADER_SIZE;
use crate::{ADDRESS_MASK, Error, HostHeld, RomHeader, NO_BANK, NUM_ROM_BANKS, RESP_LEN, RESP_OFFSET, ROM_SIZE};

/// Value an image is filled with beyond the end of a short ROM file, as an
/// erased EPROM would read.
pub const ERASED_BYTE: u8 = 0xFF;

type Image = [AtomicU8; ROM_SIZE];

/// One lower ROM image, [`NUM_ROM_BANKS`] upper ROM images, which upper
/// banks hold a loaded image, and which upper bank is active.
///
/// About 208KB, so intended to live in a `static`, which [`Self::new()`]
/// being `const` allows.
pub struct RomBankStore {
    pub(crate) lower: Image,
    pub(crate) upper: [Image; NUM_ROM_BANKS],
    present: AtomicU16,
    active: AtomicU8,
}

/// An image slot in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Lower,
    Upper(u8),
}

impl Default for RomBankStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RomBankStore {
    /// Creates an empty store - no upper banks present, none active, and an
    /// erased lower ROM.
    pub const fn new() -> Self {
        Self {
            lower: [const { AtomicU8::new(ERASED_BYTE) }; ROM_SIZE],
            upper: [const { [const { AtomicU8::new(ERASED_BYTE) }; ROM_SIZE] }; NUM_ROM_BANKS],
            present: AtomicU16::new(0),
            active: AtomicU8::new(NO_BANK),
        }
    }

    /// Makes `bank` the upper ROM served to the CPC, if it is a valid bank
    /// holding an image.  Otherwise no upper ROM is served.
    ///
    /// Returns the bank now active.
    pub fn select_bank(&self, bank: u8) -> Option<u8> {
        let selected = if self.is_present(bank) { bank } else { NO_BANK };
        self.active.store(selected, Ordering::Release);
        (selected != NO_BANK).then_some(selected)
    }

    /// The upper bank most recently selected, if it is valid and present.
    ///
    /// Reloading the selected bank keeps it selected, as a bank is only
    /// deselected by the CPC or by [`Self::unload_upper()`].
    pub fn active_bank(&self) -> Option<u8> {
        self.bus_bank().map(|bank| bank as u8)
    }

    /// Bitmask of upper banks holding an image, bit N for bank N
    pub fn present_mask(&self) -> u16 {
        self.present.load(Ordering::Acquire)
    }

    pub fn is_present(&self, bank: u8) -> bool {
        usize::from(bank) < NUM_ROM_BANKS && self.present_mask() & (1 << bank) != 0
    }

    /// The upper bank the bus engine should serve from.  Checks the present
    /// bit as well as the active bank, so a bank unloaded after being
    /// selected is never served.
    #[inline(always)]
    pub(crate) fn bus_bank(&self) -> Option<usize> {
        let bank = self.active.load(Ordering::Acquire);
        if bank == NO_BANK || self.present.load(Ordering::Acquire) & (1 << bank) == 0 {
            None
        } else {
            Some(usize::from(bank))
        }
    }

    pub fn read_lower(&self, addr: u16) -> u8 {
        self.lower[usize::from(addr & ADDRESS_MASK)].load(Ordering::Relaxed)
    }

    /// Reads a byte from an upper bank's image, whether or not the bank is
    /// present.  Returns [`ERASED_BYTE`] for an invalid bank.
    pub fn read_upper(&self, bank: u8, addr: u16) -> u8 {
        self.upper
            .get(usize::from(bank))
            .map_or(ERASED_BYTE, |image| {
                image[usize::from(addr & ADDRESS_MASK)].load(Ordering::Relaxed)
            })
    }

    /// Copies bytes from an upper bank's image, starting at `addr` and
    /// wrapping at the end of the image.
    pub fn copy_upper(&self, bank: u8, addr: u16, buf: &mut [u8]) {
        for (ii, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_upper(bank, addr.wrapping_add(ii as u16));
        }
    }

    /// Parses the header at the start of an upper bank's image.
    pub fn rom_header(&self, bank: u8) -> Result<RomHeader, Error> {
        let mut raw = [0u8; ROM_HEADER_SIZE];
        self.copy_upper(bank, 0, &mut raw);
        RomHeader::parse(&raw)
    }

    /// Reads a byte from a bank's response window.
    pub(crate) fn read_window(&self, bank: u8, offset: usize) -> u8 {
        debug_assert!(offset < RESP_LEN);
        self.read_upper(bank, (RESP_OFFSET + offset) as u16)
    }

    /// Writes a byte to a bank's response window.
    ///
    /// The only write to image contents allowed without holding the CPC in
    /// reset.  The CPC only reads the window after seeing the sequence byte
    /// change, and the sequence byte is written last.
    pub(crate) fn write_window(&self, bank: u8, offset: usize, byte: u8, ordering: Ordering) {
        debug_assert!(offset < RESP_LEN);
        if let Some(image) = self.upper.get(usize::from(bank)) {
            image[RESP_OFFSET + offset].store(byte, ordering);
        }
    }

    /// Returns a writer which overwrites the image in `slot` from its start.
    ///
    /// For an upper bank, the bank is marked not present until
    /// [`ImageWriter::finish()`] is called, so a load which fails part way
    /// leaves the bank empty rather than serving a partial image.  The bank
    /// stays selected if it was, and is served again once finished.
    pub fn writer<'a>(&'a self, _held: &'a HostHeld, slot: Slot) -> Result<ImageWriter<'a>, Error> {
        if let Slot::Upper(bank) = slot {
            if usize::from(bank) >= NUM_ROM_BANKS {
                return Err(Error::InvalidBank(bank));
            }
            self.clear_present(bank);
        }
        Ok(ImageWriter {
            store: self,
            slot,
            pos: 0,
        })
    }

    /// Overwrites an upper bank's image and marks it present.  Images
    /// shorter than [`ROM_SIZE`] are padded with [`ERASED_BYTE`].
    pub fn load_upper(&self, held: &HostHeld, bank: u8, image: &[u8]) -> Result<usize, Error> {
        let mut writer = self.writer(held, Slot::Upper(bank))?;
        writer.write(image);
        Ok(writer.finish())
    }

    /// Overwrites the lower ROM image.
    pub fn load_lower(&self, held: &HostHeld, image: &[u8]) -> usize {
        // Can't fail for the lower slot
        self.writer(held, Slot::Lower)
            .map(|mut writer| {
                writer.write(image);
                writer.finish()
            })
            .unwrap_or(0)
    }

    /// Marks an upper bank as not present, deselecting it if selected.  The
    /// image contents are left as they are.  Unloading a bank which is not
    /// present is not an error.
    pub fn unload_upper(&self, _held: &HostHeld, bank: u8) -> Result<(), Error> {
        if usize::from(bank) >= NUM_ROM_BANKS {
            return Err(Error::InvalidBank(bank));
        }
        self.clear_present(bank);
        if self.active.load(Ordering::Acquire) == bank {
            self.active.store(NO_BANK, Ordering::Release);
        }
        Ok(())
    }

    /// Marks every upper bank as not present.  The selected bank is kept, so
    /// is served again if a config reloads it.
    pub fn clear_upper(&self, _held: &HostHeld) {
        self.present.store(0, Ordering::Release);
    }

    fn clear_present(&self, bank: u8) {
        // Single writer, so load then store is safe
        let mask = self.present.load(Ordering::Acquire) & !(1 << bank);
        self.present.store(mask, Ordering::Release);
    }

    fn set_present(&self, bank: u8) {
        let mask = self.present.load(Ordering::Acquire) | (1 << bank);
        self.present.store(mask, Ordering::Release);
    }

    fn image(&self, slot: Slot) -> &Image {
        match slot {
            Slot::Lower => &self.lower,
            Slot::Upper(bank) => &self.upper[usize::from(bank)],
        }
    }
}

/// Streams bytes into a ROM image.  Obtained from
/// [`RomBankStore::writer()`], so only exists while the CPC is held in
/// reset.
pub struct ImageWriter<'a> {
    store: &'a RomBankStore,
    slot: Slot,
    pos: usize,
}

impl ImageWriter<'_> {
    /// Appends bytes to the image.  Bytes beyond [`ROM_SIZE`] are dropped.
    ///
    /// Returns the number of bytes written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let image = self.store.image(self.slot);
        let count = bytes.len().min(ROM_SIZE - self.pos);
        for (cell, &byte) in image[self.pos..self.pos + count].iter().zip(bytes) {
            cell.store(byte, Ordering::Relaxed);
        }
        self.pos += count;
        count
    }

    /// Number of bytes written so far
    pub(crate) fn len(&self) -> usize {
        self.pos
    }

    /// Pads the rest of the image with [`ERASED_BYTE`], and for an upper bank
    /// marks it present.
    ///
    /// Returns the number of bytes written before padding.
    pub fn finish(self) -> usize {
        let image = self.store.image(self.slot);
        for cell in &image[self.pos..] {
            cell.store(ERASED_BYTE, Ordering::Relaxed);
        }
        if let Slot::Upper(bank) = self.slot {
            self.store.set_present(bank);
        }
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests_support::NullHost;
    use crate::with_host_held;
    use std::boxed::Box;
    use std::vec::Vec;

    fn store() -> Box<RomBankStore> {
        Box::new(RomBankStore::new())
    }

    #[test]
    fn new_store_is_empty() {
        let store = store();
        assert_eq!(store.present_mask(), 0);
        assert_eq!(store.active_bank(), None);
        assert_eq!(store.read_lower(0), ERASED_BYTE);
    }

    #[test]
    fn select_requires_present_bank() {
        let store = store();
        with_host_held(&mut NullHost, |held| store.load_upper(held, 2, &[1, 2, 3])).unwrap();

        assert_eq!(store.select_bank(2), Some(2));
        assert_eq!(store.active_bank(), Some(2));

        assert_eq!(store.select_bank(3), None);
        assert_eq!(store.active_bank(), None);

        assert_eq!(store.select_bank(NUM_ROM_BANKS as u8), None);
        assert_eq!(store.select_bank(0xF0), None);
    }

    #[test]
    fn short_image_is_padded() {
        let store = store();
        let written =
            with_host_held(&mut NullHost, |held| store.load_upper(held, 0, &[0xAA; 100])).unwrap();
        assert_eq!(written, 100);
        assert_eq!(store.read_upper(0, 99), 0xAA);
        assert_eq!(store.read_upper(0, 100), ERASED_BYTE);
        assert_eq!(store.read_upper(0, 0x3FFF), ERASED_BYTE);
    }

    #[test]
    fn long_image_is_truncated() {
        let store = store();
        let image = vec![0x55; ROM_SIZE + 10];
        let written = with_host_held(&mut NullHost, |held| store.load_lower(held, &image));
        assert_eq!(written, ROM_SIZE);
        assert_eq!(store.read_lower(0x3FFF), 0x55);
    }

    #[test]
    fn unload_clears_active_bank() {
        let store = store();
        with_host_held(&mut NullHost, |held| {
            store.load_upper(held, 5, &[0; 16]).unwrap();
        });
        store.select_bank(5);
        with_host_held(&mut NullHost, |held| store.unload_upper(held, 5)).unwrap();
        assert!(!store.is_present(5));
        assert_eq!(store.active_bank(), None);
    }

    #[test]
    fn unload_invalid_bank() {
        let store = store();
        let result = with_host_held(&mut NullHost, |held| store.unload_upper(held, 12));
        assert_eq!(result, Err(Error::InvalidBank(12)));
    }

    #[test]
    fn abandoned_writer_leaves_bank_absent() {
        let store = store();
        with_host_held(&mut NullHost, |held| {
            store.load_upper(held, 1, &[1; 10]).unwrap();
            let mut writer = store.writer(held, Slot::Upper(1)).unwrap();
            writer.write(&[2; 5]);
        });
        assert!(!store.is_present(1));
    }

    #[test]
    fn clear_upper_removes_all() {
        let store = store();
        with_host_held(&mut NullHost, |held| {
            for bank in 0..NUM_ROM_BANKS as u8 {
                store.load_upper(held, bank, &[bank]).unwrap();
            }
        });
        assert_eq!(store.present_mask(), 0x0FFF);
        store.select_bank(4);
        with_host_held(&mut NullHost, |held| store.clear_upper(held));
        assert_eq!(store.present_mask(), 0);
        assert_eq!(store.active_bank(), None);

        with_host_held(&mut NullHost, |held| store.load_upper(held, 4, &[4])).unwrap();
        assert_eq!(store.active_bank(), Some(4));
    }

    #[test]
    fn reload_keeps_bank_selected() {
        let store = store();
        with_host_held(&mut NullHost, |held| store.load_upper(held, 3, &[1; 8])).unwrap();
        store.select_bank(3);

        with_host_held(&mut NullHost, |held| {
            let mut writer = store.writer(held, Slot::Upper(3)).unwrap();
            assert_eq!(store.active_bank(), None);
            writer.write(&[2; 8]);
            writer.finish();
        });
        assert_eq!(store.active_bank(), Some(3));
        assert_eq!(store.read_upper(3, 0), 2);
    }

    #[test]
    fn copy_wraps() {
        let store = store();
        let mut image: Vec<u8> = vec![0; ROM_SIZE];
        image[0x3FFF] = 0x12;
        image[0] = 0x34;
        with_host_held(&mut NullHost, |held| store.load_upper(held, 0, &image)).unwrap();
        let mut buf = [0; 2];
        store.copy_upper(0, 0x3FFF, &mut buf);
        assert_eq!(buf, [0x12, 0x34]);
    }
}
