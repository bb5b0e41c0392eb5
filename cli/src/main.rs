//! pcdctl: bring up a table of storage units and drive them from stdin
//!
//! ```text
//! pcdctl [--walkthrough] [TABLE.json]
//! ```
//!
//! Without a table file the built-in four-unit table is used. With
//! `--walkthrough`, every read-write unit is put through a short
//! write/seek/read sequence before the prompt starts.

mod commands;

use std::error::Error;
use std::io::{self, BufRead, Write as _};
use std::process::ExitCode;

use embedded_io::{Read, Seek, SeekFrom, Write};
use pcdev::{DeviceTable, MemBinder, OpenMode, Permission, Registry, StorageUnit, UnitFile};
use tracing::{error, info, warn};

use crate::commands::Command;

const GREETING: &[u8] = b"Hello, world!\n";

struct Args {
    walkthrough: bool,
    table: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        walkthrough: false,
        table: None,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--walkthrough" => args.walkthrough = true,
            flag if flag.starts_with('-') => return Err(format!("unknown flag {flag:?}")),
            _ if args.table.is_some() => return Err(format!("unexpected argument {arg:?}")),
            _ => args.table = Some(arg),
        }
    }
    Ok(args)
}

/// Count bytes until a zero-length read
fn drain(file: &mut UnitFile<'_>) -> Result<usize, pcdev::IoError> {
    let mut total = 0;
    let mut chunk = [0u8; 64];
    loop {
        match file.read(&mut chunk)? {
            0 => return Ok(total),
            n => total += n,
        }
    }
}

/// Byte counts read at each stage of [`walkthrough`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Walkthrough {
    from_start: usize,
    from_end: usize,
    from_current: usize,
}

/// Write a greeting, then read it back from three seek origins
///
/// Offsets shrink with the unit so that every stage stays inside
/// `[0, capacity]`.
fn walkthrough(unit: &StorageUnit) -> Result<Walkthrough, pcdev::IoError> {
    let label = unit.label();
    let capacity = unit.capacity();
    let mut file = UnitFile::open(unit, OpenMode::ReadWrite)?;

    file.write_all(&GREETING[..GREETING.len().min(capacity)])?;
    file.seek(SeekFrom::Start(0))?;
    let from_start = drain(&mut file)?;
    info!(label, bytes = from_start, "read from start");

    match file.seek(SeekFrom::End(1)) {
        Ok(position) => warn!(label, position, "seek past end was accepted"),
        Err(err) => {
            let position = file.position();
            info!(label, %err, position, "seek past end refused");
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    let back = capacity.min(2) as i64 - capacity as i64;
    let position = file.seek(SeekFrom::End(back))?;
    let from_end = drain(&mut file)?;
    info!(label, position, bytes = from_end, "read from end offset {back}");

    #[allow(clippy::cast_possible_wrap)]
    let forward = capacity.min(10) as i64;
    file.seek(SeekFrom::Start(0))?;
    let position = file.seek(SeekFrom::Current(forward))?;
    let from_current = drain(&mut file)?;
    info!(label, position, bytes = from_current, "read from current offset {forward}");

    Ok(Walkthrough {
        from_start,
        from_end,
        from_current,
    })
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;
    let table = match &args.table {
        Some(path) => DeviceTable::from_path(path)?,
        None => DeviceTable::default(),
    };

    let mut registry = Registry::bring_up(&table, MemBinder::new())?;

    if args.walkthrough {
        for unit in registry
            .units()
            .filter(|unit| unit.permission() == Permission::ReadWrite)
        {
            if let Err(err) = walkthrough(unit) {
                warn!(unit = %unit.label(), %err, "walkthrough failed");
            }
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => writeln!(stdout, "{}", commands::execute(&registry, command))?,
            Err(err) => writeln!(stdout, "error: {err}")?,
        }
        stdout.flush()?;
    }

    if let Some(teardown) = registry.shutdown() {
        info!(
            units = teardown.units,
            sessions = teardown.sessions_closed,
            failures = teardown.release_failures,
            "shut down"
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
