// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Replays latch sessions against the core, as if a CPC were sending them.
//!
//! A session script has one step per line.  `#` starts a comment.
//!
//! ```text
//! select 0            # bank select byte
//! raw FC FB           # arbitrary latch bytes
//! roms                # rom-list-first
//! roms-next           # rom-list-next
//! dir                 # dir-first
//! dir-next
//! led 1
//! rom-in 3 MAXAM.ROM
//! rom-out 3
//! config GAMES.CFG    # config-set
//! picoload
//! ```
//!
//! Commands can also be given by their full names, e.g. `rom-list-first`.

use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};
use cpcrom_core::{CMD_PREFIX, Command, Filesystem, Flow, HostControl, LatchProtocol};
use log::{debug, info};
use strum::IntoEnumIterator;

/// Stands in for the CPC's reset line and the device's LED
#[derive(Debug, Default)]
pub struct SimHost {
    pub resets: u32,
    pub led: bool,
}

impl HostControl for SimHost {
    fn assert_reset(&mut self) {
        self.resets += 1;
        debug!("CPC reset asserted");
    }

    fn release_reset(&mut self) {
        debug!("CPC reset released");
    }

    fn delay_ms(&mut self, ms: u32) {
        debug!("Holding reset for {ms}ms");
    }

    fn set_led(&mut self, on: bool) {
        self.led = on;
        info!("LED {}", if on { "on" } else { "off" });
    }

    fn enter_storage_mode(&mut self) -> ! {
        info!("Storage mode requested, exiting");
        std::process::exit(0);
    }
}

/// One line of a session script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Select(u8),
    Raw(Vec<u8>),
    Command {
        command: Command,
        params: Vec<u8>,
        text: Option<String>,
    },
}

impl Step {
    /// The latch bytes the CPC would send for this step
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Step::Select(bank) => vec![*bank],
            Step::Raw(bytes) => bytes.clone(),
            Step::Command {
                command,
                params,
                text,
            } => {
                let mut bytes = vec![CMD_PREFIX, command.byte()];
                bytes.extend_from_slice(params);
                if let Some(text) = text {
                    bytes.push(text.len() as u8);
                    bytes.extend_from_slice(text.as_bytes());
                }
                bytes
            }
        }
    }
}

fn command_by_name(word: &str) -> Option<Command> {
    let name = match word {
        "dir" => "dir-first",
        "roms" => "rom-list-first",
        "roms-next" => "rom-list-next",
        "config" => "config-set",
        other => other,
    };
    Command::iter().find(|command| command.to_string() == name)
}

fn parse_byte(s: &str) -> Result<u8> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| anyhow!("Invalid byte value: {s}"))
}

/// Parses one script line.  Returns `None` for blank and comment lines.
pub fn parse_step(line: &str) -> Result<Option<Step>> {
    let line = line.split('#').next().unwrap_or("").trim();
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };

    let step = match word {
        "select" => {
            let bank = words.next().context("select needs a bank number")?;
            Step::Select(parse_byte(bank)?)
        }
        "raw" => {
            let bytes = words
                .map(|byte| {
                    u8::from_str_radix(byte, 16).map_err(|_| anyhow!("Invalid hex byte: {byte}"))
                })
                .collect::<Result<Vec<_>>>()?;
            Step::Raw(bytes)
        }
        _ => {
            let command = command_by_name(word).with_context(|| format!("Unknown step: {word}"))?;

            let mut params = Vec::new();
            for ii in 0..command.param_count() {
                let value = words
                    .next()
                    .with_context(|| format!("{command} needs parameter {}", ii + 1))?;
                params.push(parse_byte(value)?);
            }

            let text = if command.takes_text() {
                let text = words.collect::<Vec<_>>().join(" ");
                if text.is_empty() {
                    bail!("{command} needs a file name");
                }
                if text.len() > 255 || !text.is_ascii() {
                    bail!("{command} file name must be ASCII and at most 255 bytes");
                }
                Some(text)
            } else {
                None
            };

            Step::Command {
                command,
                params,
                text,
            }
        }
    };
    Ok(Some(step))
}

/// Parses a whole script, returning each step with its line number
pub fn parse_script(script: &str) -> Result<Vec<(usize, Step)>> {
    let mut steps = Vec::new();
    for (index, line) in script.lines().enumerate() {
        let number = index + 1;
        if let Some(step) = parse_step(line).with_context(|| format!("Line {number}"))? {
            steps.push((number, step));
        }
    }
    Ok(steps)
}

/// Feeds each step to the protocol, writing the response window after each
/// command.  Stops at `picoload`.
pub fn run_session<F, H, W>(
    protocol: &mut LatchProtocol<'_, F, H>,
    steps: &[(usize, Step)],
    out: &mut W,
) -> Result<()>
where
    F: Filesystem,
    H: HostControl,
    W: Write,
{
    for (number, step) in steps {
        let mut flow = Flow::Continue;
        for byte in step.encode() {
            flow = protocol.feed(byte);
        }

        match step {
            Step::Select(bank) => match protocol.store().active_bank() {
                Some(active) => writeln!(out, "{number:4}: select {bank} -> bank {active} active")?,
                None => writeln!(out, "{number:4}: select {bank} -> no bank active")?,
            },
            Step::Raw(bytes) => writeln!(out, "{number:4}: raw {bytes:02X?}")?,
            Step::Command { command, .. } => {
                if flow == Flow::EnterStorageMode {
                    writeln!(out, "{number:4}: {command} -> storage mode, session ends")?;
                    return Ok(());
                }
                match protocol.response() {
                    Some(channel) => writeln!(out, "{number:4}: {command} -> {}", channel.snapshot())?,
                    None => writeln!(out, "{number:4}: {command} -> no bank selected, no response")?,
                }
            }
        }
    }

    if !protocol.is_idle() {
        writeln!(out, "Session ended part way through a command")?;
    }
    Ok(())
}
