// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Control of the CPC and of the device itself, plus the source of latch
//! bytes.

use crate::RESET_HOLD_MS;

/// The signals the device drives towards the CPC, and device housekeeping.
pub trait HostControl {
    /// Pull the CPC's reset line low.
    fn assert_reset(&mut self);

    /// Stop driving the CPC's reset line.
    fn release_reset(&mut self);

    fn delay_ms(&mut self, ms: u32);

    /// Set the status LED.
    fn set_led(&mut self, on: bool);

    /// Hand the device over to USB mass storage mode, so ROMs and config
    /// files can be managed from a PC.  Does not return.
    fn enter_storage_mode(&mut self) -> !;
}

/// Delivers the bytes the CPC writes to the ROM select latch, one per call,
/// in the order written.
pub trait LatchSource {
    /// Blocks until the next latch byte arrives.
    fn next_byte(&mut self) -> u8;
}

/// Proof that the CPC is held in reset, so cannot read ROM bytes.
///
/// Only created by [`with_host_held()`], and only lives as long as the
/// closure passed to it.  Every operation which changes ROM image contents
/// requires one.
#[derive(Debug)]
pub struct HostHeld {
    _private: (),
}

/// Holds the CPC in reset while `f` runs, then releases it.
///
/// This is the only synchronisation between the bus engine and anything
/// which changes ROM images - while reset is asserted the CPC issues no ROM
/// reads, so the engine can serve nothing stale or half-written.
pub fn with_host_held<H, R, F>(host: &mut H, f: F) -> R
where
    H: HostControl + ?Sized,
    F: FnOnce(&HostHeld) -> R,
{
    host.assert_reset();
    let held = HostHeld { _private: () };
    let result = f(&held);
    host.delay_ms(RESET_HOLD_MS);
    host.release_reset();
    result
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::vec::Vec;

    #[derive(Debug, PartialEq)]
    enum Event {
        Assert,
        Release,
        Delay(u32),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl HostControl for Recorder {
        fn assert_reset(&mut self) {
            self.events.push(Event::Assert);
        }
        fn release_reset(&mut self) {
            self.events.push(Event::Release);
        }
        fn delay_ms(&mut self, ms: u32) {
            self.events.push(Event::Delay(ms));
        }
        fn set_led(&mut self, _on: bool) {}
        fn enter_storage_mode(&mut self) -> ! {
            panic!("storage mode")
        }
    }

    #[test]
    fn bracket_order() {
        let mut host = Recorder::default();
        let result = with_host_held(&mut host, |_held| 42);
        assert_eq!(result, 42);
        assert_eq!(
            host.events,
            [Event::Assert, Event::Delay(RESET_HOLD_MS), Event::Release]
        );
    }

    struct ResetLine<'a> {
        low: &'a Cell<bool>,
    }

    impl HostControl for ResetLine<'_> {
        fn assert_reset(&mut self) {
            self.low.set(true);
        }
        fn release_reset(&mut self) {
            self.low.set(false);
        }
        fn delay_ms(&mut self, _ms: u32) {}
        fn set_led(&mut self, _on: bool) {}
        fn enter_storage_mode(&mut self) -> ! {
            panic!("storage mode")
        }
    }

    #[test]
    fn reset_held_while_closure_runs() {
        let low = Cell::new(false);
        let mut host = ResetLine { low: &low };
        let held_during = with_host_held(&mut host, |_held| low.get());
        assert!(held_during);
        assert!(!low.get());
    }
}
