/// cpcrom
///
/// Host side tool for the CPC ROM emulator.  Runs the emulator core against
/// a directory on a PC, standing in for the device's drive, so that:
/// - ROM images can be checked to see how the device will see them
/// - Config files can be checked before copying them to the device
/// - Latch command sessions can be replayed without a CPC
/// - ROMs can be read back through the bus emulation engine, exactly as the
///   CPC would read them

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};

mod args;
use args::{Cli, Commands};
mod dirfs;
use dirfs::DirFs;
mod report;
use report::{ConfigFileReport, RomReport};
mod sim;
use sim::SimHost;

use cpcrom_core::{
    BusEngine, BusLines, Drive, FirmwareInfo, LatchProtocol, ROM_SIZE, RomBankStore, RomLoader,
    with_host_held,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Rom { file, json } => rom(&file, json),
        Commands::Config { dir, config, json } => self::config(dir, &config, json),
        Commands::Session { dir, boot, script } => session(dir, boot, &script),
        Commands::Dump {
            dir,
            config,
            bank,
            lower: _,
            output,
        } => dump(dir, &config, bank, &output),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn rom(file: &Path, json: bool) -> Result<()> {
    let dir = file.parent().unwrap_or(Path::new("."));
    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid file name {}", file.display()))?;

    let mut loader = RomLoader::new(DirFs::new(dir));
    let report = RomReport::build(&mut loader, name)?;
    if json {
        print_json(&report)
    } else {
        report.print();
        Ok(())
    }
}

fn config(dir: PathBuf, name: &str, json: bool) -> Result<()> {
    let mut loader = RomLoader::new(DirFs::new(dir));
    let report = ConfigFileReport::build(&mut loader, name)?;
    if json {
        print_json(&report)?;
    } else {
        report.print();
    }
    if !report.is_ok() {
        bail!("{name} has directives which will not load");
    }
    Ok(())
}

fn session(dir: PathBuf, boot: bool, script: &Path) -> Result<()> {
    let text = fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))?;
    let steps = sim::parse_script(&text)?;

    let store = Box::new(RomBankStore::new());
    let mut loader = RomLoader::new(DirFs::new(dir));
    let mut host = SimHost::default();

    if boot {
        with_host_held(&mut host, |held| loader.load_startup(&store, held)).map_err(|e| {
            anyhow::anyhow!("Startup failed, device would flash {} times: {e}", e.flash_code())
        })?;
        println!(
            "Booted: lower ROM loaded, upper banks {:04X}, bank {:?} active",
            store.present_mask(),
            store.active_bank()
        );
    }

    let mut protocol = LatchProtocol::new(&store, loader, host, FirmwareInfo::default());
    sim::run_session(&mut protocol, &steps, &mut std::io::stdout().lock())
}

/// Reads a whole ROM through the bus engine.  Fails if the engine releases
/// the bus, as it does for an empty bank.
fn read_through_bus(store: &RomBankStore, bank: Option<u8>) -> Result<Vec<u8>> {
    if let Some(bank) = bank {
        if store.select_bank(bank).is_none() {
            bail!("Bank {bank} is empty");
        }
    }

    let engine = BusEngine::new(store);
    let mut image = Vec::with_capacity(ROM_SIZE);
    for address in 0..ROM_SIZE as u16 {
        let lines = BusLines {
            rom_enabled: true,
            upper: bank.is_some(),
            address,
        };
        match engine.respond(lines) {
            Drive::Byte(byte) => image.push(byte),
            Drive::Release => bail!("Bus released at address {address:#06x}"),
        }
    }
    Ok(image)
}

fn dump(dir: PathBuf, config: &str, bank: Option<u8>, output: &Path) -> Result<()> {
    let store = Box::new(RomBankStore::new());
    let mut loader = RomLoader::new(DirFs::new(dir));
    let mut host = SimHost::default();

    let report = with_host_held(&mut host, |held| {
        loader.load_config_file(&store, held, config)
    })
    .with_context(|| format!("Failed to load config {config}"))?;
    if report.failures > 0 {
        log::warn!("{} ROMs in {config} failed to load", report.failures);
    }

    let image = read_through_bus(&store, bank)?;
    fs::write(output, &image).with_context(|| format!("Failed to write {}", output.display()))?;

    let region = match bank {
        Some(bank) => format!("bank {bank}"),
        None => "lower ROM".to_string(),
    };
    println!("Wrote {region} ({} bytes) to {}", image.len(), output.display());
    Ok(())
}
