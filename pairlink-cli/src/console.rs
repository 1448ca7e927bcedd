//! Terminal I/O: parse typed lines into commands, render events as text.

use pairlink_runtime::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Dial(String),
    Status,
    Help,
    Quit,
    /// Any line not starting with '/' is sent to the peer, newline included.
    Send(Vec<u8>),
    Unknown(String),
}

pub const HELP: &str = "\
/start          listen for an inbound peer
/dial ADDR      connect to ADDR (host:port)
/stop           disconnect and go idle
/status         show state, peer and live roles
/quit           exit
anything else   send the line to the connected peer";

/// None for a blank line.
pub fn parse(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        let mut bytes = line.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
        bytes.push(b'\n');
        return Some(Command::Send(bytes));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    Some(match name {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "dial" => Command::Dial(arg.to_string()),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    })
}

pub fn render(event: &Event) -> String {
    match event {
        Event::StateChanged { old, new } => format!("* {} -> {}", old, new),
        Event::Connected { peer } => format!("* connected to {}", peer),
        Event::ConnectFailed { reason } => format!("! connect failed: {}", reason),
        Event::ConnectionLost { reason } => format!("! connection lost: {}", reason),
        Event::DataReceived { bytes } => {
            format!("< {}", String::from_utf8_lossy(bytes).trim_end_matches('\n'))
        }
        Event::DataSent { bytes } => format!("  ({} bytes sent)", bytes.len()),
        Event::TransportUnavailable => "! transport unavailable; use /start to retry".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_runtime::{ConnectionState, LossReason, PeerIdentity};

    #[test]
    fn parses_commands() {
        assert_eq!(parse("  "), None);
        assert_eq!(parse("/start"), Some(Command::Start));
        assert_eq!(
            parse("/dial 10.0.0.2:45700 "),
            Some(Command::Dial("10.0.0.2:45700".into()))
        );
        assert_eq!(parse("/dial"), Some(Command::Dial(String::new())));
        assert_eq!(parse("/exit"), Some(Command::Quit));
        assert_eq!(parse("/frob"), Some(Command::Unknown("frob".into())));
    }

    #[test]
    fn plain_lines_are_sent_with_newline() {
        assert_eq!(parse("hi there\n"), Some(Command::Send(b"hi there\n".to_vec())));
        assert_eq!(parse(" x"), Some(Command::Send(b" x\n".to_vec())));
    }

    #[test]
    fn renders_events() {
        assert_eq!(
            render(&Event::state_changed(
                ConnectionState::Listening,
                ConnectionState::Connected
            )),
            "* listening -> connected"
        );
        assert_eq!(
            render(&Event::Connected {
                peer: PeerIdentity::with_name("AA:BB", "tablet")
            }),
            "* connected to tablet (AA:BB)"
        );
        assert_eq!(
            render(&Event::ConnectionLost {
                reason: LossReason::PeerClosed
            }),
            "! connection lost: peer closed"
        );
        assert_eq!(
            render(&Event::DataReceived {
                bytes: b"hello\n".to_vec()
            }),
            "< hello"
        );
    }
}
