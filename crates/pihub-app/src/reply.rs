//! Response framing and the hub's fixed message strings.

use pihub_server::{ClientHandle, Server};
use tracing::warn;

/// Marker starting every informational response line.
pub const INFO_PREFIX: &str = "> ";
/// Marker starting every error response line.
pub const ERROR_PREFIX: &str = "> err: ";

pub(crate) const WELCOME_MSG: &str =
    "Welcome to PiHub — type `server help` for available commands.";
pub(crate) const CONNECT_SUFFIX: &str = " connected to the server";
pub(crate) const DISCONNECT_MSG: &str = "one of the clients disconnected from the server";
pub(crate) const CMD_INCOMPLETE_MSG: &str =
    "command incomplete (hint: type `server help` for syntax manual)";
pub(crate) const CMD_ERR_MSG: &str =
    "command not found (hint: type `server help` for available commands)";
pub(crate) const GENERIC_FAILURE_MSG: &str = "generic system failure, please try again";

pub(crate) const HELP_LINES: &[&str] = &[
    "available commands:",
    "  gpio set <line> <0|1>              drive a GPIO output",
    "  gpio get <line>                    read back a GPIO line",
    "  sensor list                        list configured sensors",
    "  sensor get <id> <temp|hum|press>   read one measurement",
    "  server status                      memory, network and uptime summary",
    "  server uptime                      host uptime",
    "  server net                         interface byte/packet counters",
    "  server disconnect                  close this session",
    "  server help                        this manual",
];

/// Kind of response line sent back to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyKind {
    Info,
    Error,
}

/// Builds one newline-terminated response line.
pub(crate) fn frame(kind: ReplyKind, msg: &str) -> String {
    let prefix = match kind {
        ReplyKind::Info => INFO_PREFIX,
        ReplyKind::Error => ERROR_PREFIX,
    };
    format!("{prefix}{msg}\n")
}

/// Sends one response line to a single client. Send failures are
/// logged, not propagated; the worker notices a dead peer on its own.
pub(crate) fn send(server: &Server, client: &ClientHandle, kind: ReplyKind, msg: &str) {
    if let Err(e) = server.write(client, frame(kind, msg).as_bytes()) {
        warn!(client = client.key(), error = %e, "failed to send response");
    }
}

/// Broadcasts one response line to every connected client.
pub(crate) fn broadcast(server: &Server, kind: ReplyKind, msg: &str) {
    if let Err(e) = server.broadcast(frame(kind, msg).as_bytes()) {
        warn!(error = %e, "broadcast failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_frame() {
        assert_eq!(frame(ReplyKind::Info, "uptime 5.01 s"), "> uptime 5.01 s\n");
    }

    #[test]
    fn error_frame() {
        assert_eq!(
            frame(ReplyKind::Error, "invalid sensor ID"),
            "> err: invalid sensor ID\n"
        );
    }
}
