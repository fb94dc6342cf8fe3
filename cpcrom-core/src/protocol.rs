// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The latch command protocol.
//!
//! Every byte the CPC writes to the ROM select latch arrives here.  Most are
//! plain bank selects.  [`CMD_PREFIX`] starts a command, which is followed
//! by the command byte and its parameters (see [`Command`]).
//!
//! Command results are written to the response window (see
//! [`crate::response`]) of the bank most recently selected, which the CPC
//! then reads back.

use core::fmt;
use log::{debug, info, warn};

use crate::{
    CLOCK_SPEED_MHZ, CMD_PREFIX, Command, Filesystem, HostControl, LEGACY_LATCH_BYTES,
    LatchSource, NUM_ROM_BANKS, ResponseChannel, RomBankStore, RomLoader, Slot,
    Status, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH, with_host_held,
};

/// Directory listed by the `dir-*` commands
pub const ROOT_DIR: &str = "/";

/// Firmware details reported by `rom-list-first`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub clock_mhz: u32,
}

impl Default for FirmwareInfo {
    fn default() -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            patch: VERSION_PATCH,
            clock_mhz: CLOCK_SPEED_MHZ,
        }
    }
}

/// What the caller should do after a byte has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,

    /// `picoload` was received
    EnterStorageMode,
}

/// A command whose parameters are being collected
#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    command: Command,
    params: heapless::Vec<u8, 2>,
    text_len: Option<u8>,
    text: heapless::Vec<u8, 255>,
}

impl Request {
    fn new(command: Command) -> Self {
        Self {
            command,
            params: heapless::Vec::new(),
            text_len: None,
            text: heapless::Vec::new(),
        }
    }

    fn accept(&mut self, byte: u8) {
        if self.params.len() < self.command.param_count() {
            let _ = self.params.push(byte);
        } else if self.text_len.is_none() {
            self.text_len = Some(byte);
        } else {
            let _ = self.text.push(byte);
        }
    }

    fn is_complete(&self) -> bool {
        if self.params.len() < self.command.param_count() {
            return false;
        }
        if !self.command.takes_text() {
            return true;
        }
        self.text_len
            .is_some_and(|len| self.text.len() == usize::from(len))
    }

    fn param(&self) -> u8 {
        self.params.first().copied().unwrap_or(0)
    }

    /// The text parameter.  Stops at a NUL, and non-ASCII bytes become `?`.
    fn text(&self) -> heapless::String<255> {
        self.text
            .iter()
            .take_while(|&&byte| byte != 0)
            .map(|&byte| if byte.is_ascii() { char::from(byte) } else { '?' })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingCommand,
    CollectingParams(Request),
}

/// Decodes latch bytes and carries out commands
pub struct LatchProtocol<'s, F: Filesystem, H: HostControl> {
    store: &'s RomBankStore,
    loader: RomLoader<F>,
    host: H,
    info: FirmwareInfo,
    state: State,
    list_cursor: u8,
    dir: Option<F::Dir>,
    response_bank: Option<u8>,
}

impl<'s, F: Filesystem, H: HostControl> LatchProtocol<'s, F, H> {
    /// Creates the protocol handler.  Responses go to the store's active
    /// bank until the CPC selects another.
    pub fn new(store: &'s RomBankStore, loader: RomLoader<F>, host: H, info: FirmwareInfo) -> Self {
        Self {
            store,
            loader,
            host,
            info,
            state: State::Idle,
            list_cursor: 0,
            dir: None,
            response_bank: store.active_bank(),
        }
    }

    pub fn store(&self) -> &'s RomBankStore {
        self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Whether the next byte will be treated as a bank select
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// The response window responses currently go to, if any
    pub fn response(&self) -> Option<ResponseChannel<'s>> {
        self.response_bank
            .map(|bank| ResponseChannel::new(self.store, bank))
    }

    /// Handles one latch byte.
    pub fn feed(&mut self, byte: u8) -> Flow {
        match core::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {
                if byte == CMD_PREFIX {
                    self.state = State::AwaitingCommand;
                } else if LEGACY_LATCH_BYTES.contains(&byte) {
                    debug!("Ignoring legacy latch byte {byte:#04x}");
                } else {
                    self.response_bank = self.store.select_bank(byte);
                }
                Flow::Continue
            }
            State::AwaitingCommand => match Command::from_repr(byte) {
                Some(command) => {
                    debug!("Command {command}");
                    self.collect(Request::new(command))
                }
                None => {
                    debug!("Ignoring unknown command {byte:#04x}");
                    Flow::Continue
                }
            },
            State::CollectingParams(mut request) => {
                request.accept(byte);
                self.collect(request)
            }
        }
    }

    /// Handles latch bytes forever, only returning control when the CPC
    /// asks for storage mode.
    pub fn run<L: LatchSource>(mut self, latch: &mut L) -> ! {
        loop {
            if self.feed(latch.next_byte()) == Flow::EnterStorageMode {
                info!("Entering storage mode");
                self.host.assert_reset();
                self.host.enter_storage_mode();
            }
        }
    }

    fn collect(&mut self, request: Request) -> Flow {
        if request.is_complete() {
            self.execute(&request)
        } else {
            self.state = State::CollectingParams(request);
            Flow::Continue
        }
    }

    fn execute(&mut self, request: &Request) -> Flow {
        let before = self.response().map(|channel| channel.sequence());

        match request.command {
            Command::Picoload => return Flow::EnterStorageMode,
            Command::Led => self.led(request.param() != 0),
            Command::DirFirst => self.dir_first(),
            Command::DirNext => self.dir_next(),
            Command::RomListFirst => self.rom_list_first(),
            Command::RomListNext => self.rom_list_next(),
            Command::RomIn => self.rom_in(request.param(), &request.text()),
            Command::RomOut => self.rom_out(request.param()),
            Command::ConfigSet => self.config_set(&request.text()),
        }

        // Measured before the command ran, as loading a ROM may replace the
        // response window
        if let (Some(channel), Some(seq)) = (self.response(), before) {
            channel.set_sequence(seq.wrapping_add(1));
        }
        Flow::Continue
    }

    fn reply(&self, status: Status, args: fmt::Arguments<'_>) {
        match self.response() {
            Some(channel) => channel.write_line(status, args),
            None => debug!("No bank selected, dropping response: {args}"),
        }
    }

    fn reply_status(&self, status: Status) {
        match self.response() {
            Some(channel) => channel.write_status(status),
            None => debug!("No bank selected, dropping {status:?} response"),
        }
    }

    fn led(&mut self, on: bool) {
        self.host.set_led(on);
        self.reply_status(Status::Ok);
    }

    fn dir_first(&mut self) {
        self.dir = None;
        match self.loader.fs_mut().open_dir(ROOT_DIR) {
            Ok(dir) => {
                self.dir = Some(dir);
                self.dir_next();
            }
            Err(e) => {
                warn!("Failed to open {ROOT_DIR}: {e}");
                self.reply(Status::Error, format_args!("Directory read failed"));
            }
        }
    }

    fn dir_next(&mut self) {
        let Some(dir) = self.dir.as_mut() else {
            self.reply_status(Status::Done);
            return;
        };

        match self.loader.fs_mut().next_entry(dir) {
            Ok(Some(entry)) => {
                self.reply(
                    Status::Ok,
                    format_args!("{:<32} {:6}", entry.name.as_str(), entry.size),
                );
            }
            Ok(None) => {
                self.dir = None;
                self.reply_status(Status::Done);
            }
            Err(e) => {
                warn!("Directory read failed: {e}");
                self.dir = None;
                self.reply(Status::Error, format_args!("Directory read failed"));
            }
        }
    }

    fn rom_list_first(&mut self) {
        self.list_cursor = 0;
        let (b1, b2, b3) = match self.response_bank {
            Some(bank) => (
                self.store.read_upper(bank, 1),
                self.store.read_upper(bank, 2),
                self.store.read_upper(bank, 3),
            ),
            None => (0, 0, 0),
        };
        self.reply(
            Status::Ok,
            format_args!(
                "FW: {}.{}.{} {} MHz ROM: {}.{}{} ROMS: {:04X}",
                self.info.major,
                self.info.minor,
                self.info.patch,
                self.info.clock_mhz,
                b1,
                b2,
                b3,
                self.store.present_mask()
            ),
        );
    }

    fn rom_list_next(&mut self) {
        if usize::from(self.list_cursor) >= NUM_ROM_BANKS {
            self.reply_status(Status::Done);
            return;
        }

        let bank = self.list_cursor;
        self.list_cursor += 1;

        if !self.store.is_present(bank) {
            self.reply(Status::Ok, format_args!("{bank:2}: -- Not present"));
            return;
        }

        let header = match self.store.rom_header(bank) {
            Ok(header) => header,
            Err(e) => {
                self.reply(Status::Error, format_args!("{bank:2}: {e}"));
                return;
            }
        };
        let name = header.display_name(|addr| self.store.read_upper(bank, addr));
        self.reply(
            Status::Ok,
            format_args!(
                "{:2}: {:02x} {:<16} {}.{}{}",
                bank,
                header.rom_type,
                name.as_str(),
                header.major,
                header.minor,
                header.patch
            ),
        );
    }

    fn rom_in(&mut self, bank: u8, path: &str) {
        if usize::from(bank) >= NUM_ROM_BANKS {
            self.reply(Status::Error, format_args!("Invalid bank number"));
            return;
        }

        // Opened before holding the CPC, so a missing file doesn't reset it
        let source = match self.loader.open_rom(path) {
            Ok(source) => source,
            Err(e) => {
                warn!("Failed to open {path}: {e}");
                self.reply(Status::Error, format_args!("Failed to load ROM {path}"));
                return;
            }
        };

        let result = with_host_held(&mut self.host, |held| {
            self.loader
                .load(self.store, held, path, &source, Slot::Upper(bank))
        });
        match result {
            Ok(_) => self.reply(Status::Ok, format_args!("Loaded {path} into bank {bank}")),
            Err(e) => {
                warn!("Failed to load {path}: {e}");
                self.reply(Status::Error, format_args!("Failed to load ROM {path}"));
            }
        }
    }

    fn rom_out(&mut self, bank: u8) {
        if usize::from(bank) >= NUM_ROM_BANKS {
            self.reply(Status::Error, format_args!("Invalid bank number"));
            return;
        }

        let store = self.store;
        match with_host_held(&mut self.host, |held| store.unload_upper(held, bank)) {
            Ok(()) => {
                info!("Unloaded bank {bank}");
                self.reply_status(Status::Ok);
            }
            Err(e) => self.reply(Status::Error, format_args!("{e}")),
        }
    }

    fn config_set(&mut self, name: &str) {
        // Opened before holding the CPC, so a missing file changes nothing
        let mut config = match self.loader.open_config(name) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to open config {name}: {e}");
                self.reply(Status::Error, format_args!("Failed to load config {name}"));
                return;
            }
        };

        let report = with_host_held(&mut self.host, |held| {
            self.loader.apply_config(self.store, held, &mut config)
        });
        info!("Applied config {name}: {report:?}");
        self.reply(
            Status::Ok,
            format_args!(
                "Loaded config {name}: {} ROMs, {} failed",
                report.upper_count(),
                report.failures
            ),
        );
    }
}
