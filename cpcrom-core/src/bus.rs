// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The bus emulation engine.
//!
//! Answers every CPC ROM read.  This runs in a tight loop on its own core,
//! so nothing in here may block, allocate, take a lock or log.

use crate::{ADDRESS_MASK, RomBankStore};

/// GPIO bit positions of the bus signals
pub mod gpio {
    /// A0-A13 occupy bits 0-13
    pub const ADDRESS_SHIFT: u32 = 0;
    /// ROMEN, active low
    pub const ROMEN: u32 = 22;
    /// A15 - high when the CPC is reading the upper ROM region
    pub const A15: u32 = 26;
}

/// The bus control and address lines, as sampled at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusLines {
    /// ROMEN asserted - the CPC is reading ROM
    pub rom_enabled: bool,

    /// A15 high - the read is from the upper ROM region
    pub upper: bool,

    /// A0-A13
    pub address: u16,
}

impl BusLines {
    /// Decodes a single read of all GPIO inputs.
    #[inline(always)]
    pub const fn from_gpio(word: u32) -> Self {
        Self {
            rom_enabled: word & (1 << gpio::ROMEN) == 0,
            upper: word & (1 << gpio::A15) != 0,
            address: ((word >> gpio::ADDRESS_SHIFT) as u16) & ADDRESS_MASK,
        }
    }
}

/// What to do with the data bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    /// Output this byte
    Byte(u8),

    /// Tri-state the data lines
    Release,
}

/// Access to the bus pins
pub trait BusPins {
    /// Samples the control and address lines.
    fn sample(&mut self) -> BusLines;

    /// Enables the data line outputs and drives `byte` onto them.
    fn drive(&mut self, byte: u8);

    /// Tri-states the data lines.
    fn release(&mut self);
}

/// Serves ROM reads from a [`RomBankStore`]
#[derive(Clone, Copy)]
pub struct BusEngine<'a> {
    store: &'a RomBankStore,
}

impl<'a> BusEngine<'a> {
    pub const fn new(store: &'a RomBankStore) -> Self {
        Self { store }
    }

    /// Decides how to answer one bus cycle.
    ///
    /// Upper reads with no bank selected, or with the selected bank not
    /// present, release the bus.  This is how an empty ROM socket behaves,
    /// and lets a physical ROM on the same bus answer instead.
    #[inline(always)]
    pub fn respond(&self, lines: BusLines) -> Drive {
        if !lines.rom_enabled {
            return Drive::Release;
        }

        let addr = lines.address & ADDRESS_MASK;
        if !lines.upper {
            return Drive::Byte(self.store.read_lower(addr));
        }

        match self.store.bus_bank() {
            Some(bank) => Drive::Byte(self.store.read_upper(bank as u8, addr)),
            None => Drive::Release,
        }
    }

    /// Samples the bus once and acts on it.
    #[inline(always)]
    pub fn step<P: BusPins>(&self, pins: &mut P) {
        match self.respond(pins.sample()) {
            Drive::Byte(byte) => pins.drive(byte),
            Drive::Release => pins.release(),
        }
    }

    /// Serves the bus forever.
    pub fn run<P: BusPins>(&self, pins: &mut P) -> ! {
        loop {
            self.step(pins);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests_support::NullHost;
    use crate::{NUM_ROM_BANKS, ROM_SIZE, with_host_held};
    use std::boxed::Box;
    use std::vec::Vec;

    fn upper(address: u16) -> BusLines {
        BusLines {
            rom_enabled: true,
            upper: true,
            address,
        }
    }

    fn lower(address: u16) -> BusLines {
        BusLines {
            rom_enabled: true,
            upper: false,
            address,
        }
    }

    fn pattern(seed: u8) -> Vec<u8> {
        (0..ROM_SIZE)
            .map(|ii| (ii as u8).wrapping_mul(7).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn gpio_decode() {
        // D0-D7, on bits 14-21, are ignored
        let word = (1 << gpio::A15) | 0x1234 | (0xAB << 14);
        let lines = BusLines::from_gpio(word);
        assert!(lines.rom_enabled);
        assert!(lines.upper);
        assert_eq!(lines.address, 0x1234);

        let lines = BusLines::from_gpio(1 << gpio::ROMEN);
        assert!(!lines.rom_enabled);
        assert!(!lines.upper);
    }

    #[test]
    fn romen_deasserted_releases() {
        let store = Box::new(RomBankStore::new());
        let engine = BusEngine::new(&store);
        let lines = BusLines {
            rom_enabled: false,
            upper: false,
            address: 0,
        };
        assert_eq!(engine.respond(lines), Drive::Release);
    }

    #[test]
    fn lower_always_served() {
        let store = Box::new(RomBankStore::new());
        let image = pattern(3);
        with_host_held(&mut NullHost, |held| store.load_lower(held, &image));
        let engine = BusEngine::new(&store);
        for addr in [0u16, 1, 0x2000, 0x3FFF] {
            assert_eq!(
                engine.respond(lower(addr)),
                Drive::Byte(image[usize::from(addr)])
            );
        }
    }

    #[test]
    fn select_then_read_every_bank() {
        let store = Box::new(RomBankStore::new());
        with_host_held(&mut NullHost, |held| {
            for bank in (0..NUM_ROM_BANKS as u8).step_by(2) {
                store.load_upper(held, bank, &pattern(bank)).unwrap();
            }
        });
        let engine = BusEngine::new(&store);

        for bank in 0..NUM_ROM_BANKS as u8 {
            store.select_bank(bank);
            let image = pattern(bank);
            for addr in 0..ROM_SIZE as u16 {
                let expected = if bank % 2 == 0 {
                    Drive::Byte(image[usize::from(addr)])
                } else {
                    Drive::Release
                };
                assert_eq!(engine.respond(upper(addr)), expected, "bank {bank} addr {addr:#06x}");
            }
        }
    }

    #[test]
    fn unloaded_bank_released_even_if_active() {
        let store = Box::new(RomBankStore::new());
        with_host_held(&mut NullHost, |held| store.load_upper(held, 0, &[0x42])).unwrap();
        store.select_bank(0);
        let engine = BusEngine::new(&store);
        assert_eq!(engine.respond(upper(0)), Drive::Byte(0x42));

        with_host_held(&mut NullHost, |held| store.unload_upper(held, 0)).unwrap();
        assert_eq!(engine.respond(upper(0)), Drive::Release);
    }

    #[derive(Default)]
    struct Pins {
        next: Option<BusLines>,
        driven: Vec<Drive>,
    }

    impl BusPins for Pins {
        fn sample(&mut self) -> BusLines {
            self.next.take().unwrap_or(BusLines::from_gpio(1 << gpio::ROMEN))
        }
        fn drive(&mut self, byte: u8) {
            self.driven.push(Drive::Byte(byte));
        }
        fn release(&mut self) {
            self.driven.push(Drive::Release);
        }
    }

    #[test]
    fn step_drives_pins() {
        let store = Box::new(RomBankStore::new());
        with_host_held(&mut NullHost, |held| store.load_lower(held, &[0x99]));
        let engine = BusEngine::new(&store);
        let mut pins = Pins {
            next: Some(lower(0)),
            ..Default::default()
        };
        engine.step(&mut pins);
        engine.step(&mut pins);
        assert_eq!(pins.driven, [Drive::Byte(0x99), Drive::Release]);
    }
}
