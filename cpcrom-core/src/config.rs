// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Config file parsing.
//!
//! A config file names the ROMs to load, one per line:
//!
//! ```text
//! # CPC 6128 with Maxam and Utopia
//! L: OS_6128.ROM
//! 0: BASIC_1.1.ROM
//! 1: MAXAM15.ROM
//! 7: AMSDOS.ROM
//! ```
//!
//! `L` loads the lower ROM and a number loads that upper bank.  Keys and
//! paths may be separated by `:`, spaces or tabs.  Blank lines, and lines
//! starting with `#` or `;`, are ignored, as is anything unrecognised.

/// A single line of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Lower(&'a str),
    Upper { bank: u8, path: &'a str },
}

fn is_delimiter(ch: char) -> bool {
    matches!(ch, ':' | ' ' | '\t')
}

/// Parses one line.  Returns `None` for lines which aren't directives.
pub fn parse_line(line: &str) -> Option<Directive<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut tokens = line.split(is_delimiter).filter(|token| !token.is_empty());

    let key = tokens.next()?;
    if key.starts_with(['#', ';']) {
        return None;
    }
    let path = tokens.next()?;

    if key.eq_ignore_ascii_case("L") {
        Some(Directive::Lower(path))
    } else if key.bytes().all(|b| b.is_ascii_digit()) {
        let bank = key.parse().ok()?;
        Some(Directive::Upper { bank, path })
    } else {
        None
    }
}
