// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cpcrom")]
#[command(about = "CPC ROM emulator tool - inspect ROMs and configs, and replay latch sessions")]
#[command(version)]
#[command(after_help = "Use 'help <subcommand>' for detailed options (e.g., 'help session')")]
pub struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Shows the type, version and name of a ROM image, and whether it has
    /// an AMSDOS header.  Zipped ROMs are supported.
    Rom {
        /// ROM file (.rom, .bin or .zip)
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Checks a config file, reporting each ROM it loads and whether that
    /// ROM exists.
    Config {
        /// Directory holding the config file and ROMs, as the device's drive
        dir: PathBuf,
        /// Config file name, e.g. DEFAULT.CFG
        config: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replays a script of latch bytes and commands, printing the response
    /// window after each command.
    ///
    /// Script lines:
    ///   select N | raw XX XX.. | led 0|1 | dir | dir-next | roms | roms-next
    ///   rom-in N PATH | rom-out N | config NAME | picoload
    #[command(verbatim_doc_comment)]
    Session {
        /// Directory to serve as the device's drive
        dir: PathBuf,
        /// Load ROMs as the device does at power on, from DEFAULT.CFG or
        /// the fallback ROMs
        #[arg(long)]
        boot: bool,
        /// Session script
        script: PathBuf,
    },
    /// Loads a config, then reads a ROM back through the bus emulation
    /// engine, writing it to a file.
    #[command(group(ArgGroup::new("region").required(true).args(["bank", "lower"])))]
    Dump {
        /// Directory holding the config file and ROMs
        dir: PathBuf,
        /// Config file name
        config: String,
        /// Upper bank to read (decimal, or hex with 0x)
        #[arg(long, value_parser = parse_number)]
        bank: Option<u8>,
        /// Read the lower ROM
        #[arg(long)]
        lower: bool,
        /// File to write the image to
        output: PathBuf,
    },
}

fn parse_number(s: &str) -> Result<u8, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|_| format!("Invalid number: {}", s))
}
