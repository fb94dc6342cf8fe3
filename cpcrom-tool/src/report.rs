// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The `rom` and `config` reports.

use anyhow::{Context, Result};
use cpcrom_core::config::{Directive, parse_line};
use cpcrom_core::{
    Filesystem, NUM_ROM_BANKS, RomBankStore, RomLoader, Slot, with_host_held,
};
use serde::Serialize;

use crate::sim::SimHost;

#[derive(Debug, Serialize)]
pub struct RomReport {
    pub file: String,
    pub amsdos_name: Option<String>,
    pub offset: u32,
    pub length: u32,
    pub rom_type: u8,
    pub kind: String,
    pub version: String,
    pub name: String,
}

impl RomReport {
    /// Loads a ROM as the device would, and describes the loaded image.
    pub fn build<F: Filesystem>(loader: &mut RomLoader<F>, path: &str) -> Result<Self> {
        let source = loader
            .open_rom(path)
            .with_context(|| format!("Failed to open {path}"))?;

        let store = Box::new(RomBankStore::new());
        let mut host = SimHost::default();
        with_host_held(&mut host, |held| {
            loader.load(&store, held, path, &source, Slot::Upper(0))
        })
        .with_context(|| format!("Failed to load {path}"))?;

        let header = store
            .rom_header(0)
            .with_context(|| format!("Failed to parse header of {path}"))?;
        Ok(Self {
            file: path.to_string(),
            amsdos_name: source.amsdos.as_ref().map(|h| h.name().to_string()),
            offset: source.offset,
            length: source.length,
            rom_type: header.rom_type,
            kind: header.kind().to_string(),
            version: format!("{}.{}{}", header.major, header.minor, header.patch),
            name: header
                .display_name(|addr| store.read_upper(0, addr))
                .to_string(),
        })
    }

    pub fn print(&self) {
        println!("File:          {}", self.file);
        match &self.amsdos_name {
            Some(name) => println!("AMSDOS header: yes ({name}), stripped"),
            None => println!("AMSDOS header: no"),
        }
        println!("Image:         {} bytes from offset {}", self.length, self.offset);
        println!("Type:          {:#04x} ({})", self.rom_type, self.kind);
        println!("Version:       {}", self.version);
        println!("Name:          {}", self.name);
    }
}

#[derive(Debug, Serialize)]
pub struct DirectiveReport {
    pub line: usize,
    /// `None` for the lower ROM
    pub bank: Option<u8>,
    pub path: String,
    pub valid_bank: bool,
    pub exists: bool,
    pub size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConfigFileReport {
    pub config: String,
    pub directives: Vec<DirectiveReport>,
}

impl ConfigFileReport {
    pub fn build<F: Filesystem>(loader: &mut RomLoader<F>, name: &str) -> Result<Self> {
        let mut reader = loader
            .open_config(name)
            .with_context(|| format!("Failed to open config {name}"))?;

        let mut found = Vec::new();
        loop {
            let line = reader
                .next_line(loader.fs_mut())
                .with_context(|| format!("Failed to read config {name}"))?;
            let Some(line) = line else {
                break;
            };
            let (bank, path) = match parse_line(line) {
                Some(Directive::Lower(path)) => (None, path.to_string()),
                Some(Directive::Upper { bank, path }) => (Some(bank), path.to_string()),
                None => continue,
            };
            let size = loader.fs_mut().stat(&path).ok().map(|info| info.size);
            found.push(DirectiveReport {
                line: reader.line_number(),
                bank,
                path,
                valid_bank: bank.is_none_or(|bank| usize::from(bank) < NUM_ROM_BANKS),
                exists: size.is_some(),
                size,
            });
        }

        Ok(Self {
            config: name.to_string(),
            directives: found,
        })
    }

    /// Whether every directive will load
    pub fn is_ok(&self) -> bool {
        self.directives
            .iter()
            .all(|directive| directive.valid_bank && directive.exists)
    }

    pub fn print(&self) {
        println!("Config: {}", self.config);
        println!("Line  Slot   File                             Status");
        for directive in &self.directives {
            let slot = match directive.bank {
                Some(bank) => format!("{bank}"),
                None => "L".to_string(),
            };
            let status = match (directive.valid_bank, directive.size) {
                (false, _) => "invalid bank".to_string(),
                (true, Some(size)) => format!("ok, {size} bytes"),
                (true, None) => "missing".to_string(),
            };
            println!(
                "{:4}  {:<5}  {:<32} {}",
                directive.line, slot, directive.path, status
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirfs::DirFs;
    use std::fs;
    use tempfile::TempDir;

    fn amsdos_wrapped(body: &[u8]) -> Vec<u8> {
        let mut file = vec![0u8; 128];
        file[1..9].copy_from_slice(b"UTOPIA  ");
        file[9..12].copy_from_slice(b"ROM");
        file[24..26].copy_from_slice(&(body.len() as u16).to_le_bytes());
        let sum = file[..67]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(u16::from(b)));
        file[67..69].copy_from_slice(&sum.to_le_bytes());
        file.extend_from_slice(body);
        file
    }

    #[test]
    fn test_rom_report() {
        let dir = TempDir::new().unwrap();
        let mut rom = vec![0u8; 0x4000];
        rom[..6].copy_from_slice(&[1, 1, 2, 0, 0x20, 0xC0]);
        rom[0x20..0x26].copy_from_slice(b"UTOPI\xC1");
        fs::write(dir.path().join("UTOPIA.ROM"), amsdos_wrapped(&rom)).unwrap();

        let mut loader = RomLoader::new(DirFs::new(dir.path()));
        let report = RomReport::build(&mut loader, "UTOPIA.ROM").unwrap();
        assert_eq!(report.amsdos_name.as_deref(), Some("UTOPIA.ROM"));
        assert_eq!(report.offset, 128);
        assert_eq!(report.length, 0x4000);
        assert_eq!(report.kind, "Background");
        assert_eq!(report.version, "1.20");
        assert_eq!(report.name, "UTOPIA");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "UTOPIA");
    }

    #[test]
    fn test_config_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("OS.ROM"), [0u8; 16]).unwrap();
        fs::write(
            dir.path().join("TEST.CFG"),
            "# test\nL: OS.ROM\n0: MISSING.ROM\n14: OS.ROM\n",
        )
        .unwrap();

        let mut loader = RomLoader::new(DirFs::new(dir.path()));
        let report = ConfigFileReport::build(&mut loader, "TEST.CFG").unwrap();
        assert_eq!(report.directives.len(), 3);

        let lower = &report.directives[0];
        assert_eq!((lower.line, lower.bank, lower.exists, lower.size), (2, None, true, Some(16)));
        assert!(!report.directives[1].exists);
        assert!(!report.directives[2].valid_bank);
        assert!(!report.is_ok());
    }

    #[test]
    fn test_config_report_skips_bad_text() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("A.ROM"), [0u8; 16]).unwrap();
        fs::write(dir.path().join("GAMES.CFG"), b"# caf\xe9\n0: A.ROM\n4: A.ROM").unwrap();

        let mut loader = RomLoader::new(DirFs::new(dir.path()));
        let report = ConfigFileReport::build(&mut loader, "GAMES.CFG").unwrap();
        let found: Vec<_> = report
            .directives
            .iter()
            .map(|directive| (directive.line, directive.bank))
            .collect();
        assert_eq!(found, [(2, Some(0)), (3, Some(4))]);
        assert!(report.is_ok());
    }

    #[test]
    fn test_missing_config() {
        let dir = TempDir::new().unwrap();
        let mut loader = RomLoader::new(DirFs::new(dir.path()));
        assert!(ConfigFileReport::build(&mut loader, "NONE.CFG").is_err());
    }
}
