//! Line commands accepted on stdin
//!
//! ```text
//! list
//! open <label> <r|w|rw>
//! read <session> <len>
//! write <session> <text...>
//! seek <session> <offset> <set|cur|end>
//! close <session>
//! quit
//! ```

use pcdev::{Binder, Handle, IoError, OpenMode, Registry, Whence};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Open { label: String, mode: OpenMode },
    Read { session: Handle, len: usize },
    Write { session: Handle, data: Vec<u8> },
    Seek { session: Handle, offset: i64, whence: Whence },
    Close { session: Handle },
    Quit,
}

/// Parse one input line
///
/// # Errors
/// A message naming the bad command or argument.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let mut args = rest.split_whitespace();

    let command = match verb {
        "list" | "ls" => Command::List,
        "open" => Command::Open {
            label: next(&mut args, "label")?.to_string(),
            mode: parse_mode(next(&mut args, "mode")?)?,
        },
        "read" => Command::Read {
            session: parse_session(next(&mut args, "session")?)?,
            len: parse_number(next(&mut args, "length")?)?,
        },
        "write" => {
            let rest = rest.trim_start();
            let (session, text) = rest.split_once(' ').unwrap_or((rest, ""));
            return Ok(Command::Write {
                session: parse_session(session)?,
                data: text.as_bytes().to_vec(),
            });
        }
        "seek" => Command::Seek {
            session: parse_session(next(&mut args, "session")?)?,
            offset: parse_number(next(&mut args, "offset")?)?,
            whence: parse_whence(next(&mut args, "whence")?)?,
        },
        "close" => Command::Close {
            session: parse_session(next(&mut args, "session")?)?,
        },
        "quit" | "exit" => Command::Quit,
        "" => return Err("empty command".to_string()),
        other => return Err(format!("unknown command {other:?}")),
    };
    match args.next() {
        Some(extra) => Err(format!("unexpected argument {extra:?}")),
        None => Ok(command),
    }
}

/// Run a command against the registry and render the reply
pub fn execute<B: Binder>(registry: &Registry<B>, command: Command) -> String {
    let reply = match command {
        Command::List => Ok(list(registry)),
        Command::Open { label, mode } => registry
            .open(&label, mode)
            .map(|session| format!("session {}", session.id())),
        Command::Read { session, len } => registry.read(session, len).map(|bytes| {
            format!("{} bytes: {:?}", bytes.len(), String::from_utf8_lossy(&bytes))
        }),
        Command::Write { session, data } => registry
            .write(session, &data)
            .map(|count| format!("{count} bytes written")),
        Command::Seek {
            session,
            offset,
            whence,
        } => registry
            .seek(session, offset, whence)
            .map(|position| format!("position {position}")),
        Command::Close { session } => registry.close(session).map(|()| "closed".to_string()),
        Command::Quit => Ok(String::new()),
    };
    reply.unwrap_or_else(|err: IoError| format!("error: {err} (errno {})", err.errno()))
}

fn list<B: Binder>(registry: &Registry<B>) -> String {
    registry
        .units()
        .enumerate()
        .map(|(index, unit)| {
            let dev = registry
                .device_number(unit.label())
                .map_or_else(|| "-".to_string(), |dev| dev.to_string());
            let path = registry
                .node(unit.label())
                .map_or("-", |node| node.path.as_str());
            format!(
                "{:<12} {} {:>6} {:>8} {} {:?}",
                unit.label(),
                unit.permission(),
                unit.capacity(),
                dev,
                path,
                registry.unit_state(index).unwrap_or(pcdev::UnitState::Unregistered),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn next<'a>(args: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str, String> {
    args.next().ok_or_else(|| format!("missing {what}"))
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Result<T, String> {
    text.parse().map_err(|_| format!("bad number {text:?}"))
}

fn parse_session(text: &str) -> Result<Handle, String> {
    parse_number(text.trim_start_matches('#')).map(Handle::new)
}

fn parse_mode(text: &str) -> Result<OpenMode, String> {
    match text {
        "r" => Ok(OpenMode::Read),
        "w" => Ok(OpenMode::Write),
        "rw" | "w+" | "r+" => Ok(OpenMode::ReadWrite),
        other => Err(format!("bad mode {other:?}")),
    }
}

fn parse_whence(text: &str) -> Result<Whence, String> {
    match text {
        "set" | "start" => Ok(Whence::FromStart),
        "cur" | "current" => Ok(Whence::FromCurrent),
        "end" => Ok(Whence::FromEnd),
        other => Err(format!("bad whence {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcdev::{DeviceTable, MemBinder};

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("list").unwrap(), Command::List);
        assert_eq!(
            parse("open pcdev-3 rw").unwrap(),
            Command::Open {
                label: "pcdev-3".into(),
                mode: OpenMode::ReadWrite
            }
        );
        assert_eq!(
            parse("seek #2 -510 end").unwrap(),
            Command::Seek {
                session: Handle::new(2),
                offset: -510,
                whence: Whence::FromEnd
            }
        );
        assert_eq!(
            parse("write 1 Hello, world!").unwrap(),
            Command::Write {
                session: Handle::new(1),
                data: b"Hello, world!".to_vec()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("").unwrap_err(), "empty command");
        assert_eq!(parse("read 1").unwrap_err(), "missing length");
        assert_eq!(parse("open a x").unwrap_err(), "bad mode \"x\"");
        assert_eq!(parse("close 1 2").unwrap_err(), "unexpected argument \"2\"");
        assert!(parse("frobnicate").is_err());
    }

    #[test]
    fn test_execute_session() {
        let registry = Registry::bring_up(&DeviceTable::default(), MemBinder::new()).unwrap();
        assert_eq!(execute(&registry, parse("open pcdev-3 rw").unwrap()), "session 1");
        assert_eq!(execute(&registry, parse("write 1 hello").unwrap()), "5 bytes written");
        assert_eq!(execute(&registry, parse("seek 1 0 set").unwrap()), "position 0");
        assert_eq!(execute(&registry, parse("read 1 5").unwrap()), "5 bytes: \"hello\"");
        assert_eq!(
            execute(&registry, parse("seek 1 1 end").unwrap()),
            "error: pcdev-3: seek target 1025 outside [0, 1024] (errno -22)"
        );
        assert_eq!(execute(&registry, parse("close 1").unwrap()), "closed");
    }

    #[test]
    fn test_list_shows_every_unit() {
        let registry = Registry::bring_up(&DeviceTable::default(), MemBinder::new()).unwrap();
        let listing = list(&registry);
        assert_eq!(listing.lines().count(), 4);
        assert!(listing.contains("/dev/pcdev-2"));
        assert!(listing.contains("511:3"));
    }
}
