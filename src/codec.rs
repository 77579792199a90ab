//! Wire protocol codec
//!
//! Line-oriented UTF-8 text. Inbound bytes are framed on `\n` by
//! [`LineBuffer`]; the first line of a connection is a [`Handshake`], every
//! later line from a messenger decodes to at most one [`Intent`]. Outbound
//! text is written one message per line.

use crate::error::AppError;

/// Longest accepted line, terminator excluded
pub const MAX_LINE_LEN: usize = 2 * 1024;

/// Handshake literal for passive viewers
pub const VIEWER_HANDSHAKE: &str = "viewer";

/// Handshake prefix for named messengers
pub const NAME_PREFIX: &str = "name:";

const CHAT_ACTION: &str = "chat";
const LIST_USERS_ACTION: &str = "listusers";
const HELP_ACTIONS: [&str; 2] = ["help", "?"];

/// Names that would read as an action in the short command form
const RESERVED_NAMES: [&str; 4] = [CHAT_ACTION, LIST_USERS_ACTION, "help", "?"];

/// Decoded first payload of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Join as a passive viewer
    Viewer,
    /// Join as a messenger with this name (uniqueness is checked by the registry)
    Messenger(String),
    /// Anything else; the connection gets closed
    Invalid(String),
}

/// Structured form of a decoded command or membership change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Broadcast { sender: String, body: String },
    PrivateMessage { sender: String, recipient: String, body: String },
    ListUsers { requester: String },
    Help { requester: String },
    /// Legacy bare line, relayed to everyone as `sender: text`
    Relay { sender: String, text: String },
    Join { name: String },
    Leave { name: String },
}

/// Decode a handshake line
pub fn parse_handshake(line: &str) -> Handshake {
    if line == VIEWER_HANDSHAKE {
        return Handshake::Viewer;
    }

    let Some(name) = line.strip_prefix(NAME_PREFIX) else {
        return Handshake::Invalid(format!("unrecognized handshake '{}'", line));
    };

    // Names are matched against trimmed `:`-separated fields, so a name
    // with a separator or surrounding spaces could never be addressed.
    let name = name.trim();
    if name.is_empty() {
        Handshake::Invalid("empty name".to_string())
    } else if name.contains(':') {
        Handshake::Invalid(format!("name '{}' contains ':'", name))
    } else if RESERVED_NAMES.contains(&name) {
        Handshake::Invalid(format!("name '{}' is reserved", name))
    } else {
        Handshake::Messenger(name.to_string())
    }
}

/// Decode one command line sent by the messenger named `sender`
///
/// Returns `None` for lines that match no recognized shape.
pub fn decode_command(sender: &str, line: &str) -> Option<Intent> {
    if line.trim().is_empty() {
        return None;
    }

    if !line.contains(':') {
        if line.trim() == LIST_USERS_ACTION {
            return Some(Intent::ListUsers {
                requester: sender.to_string(),
            });
        }
        return Some(Intent::Relay {
            sender: sender.to_string(),
            text: line.to_string(),
        });
    }

    let mut fields: Vec<&str> = line.split(':').map(|f| f.trim_matches(' ')).collect();
    if fields[0] != sender {
        fields.insert(0, sender);
    }

    match fields.as_slice() {
        [_, action] if *action == LIST_USERS_ACTION => Some(Intent::ListUsers {
            requester: sender.to_string(),
        }),
        [_, action] if HELP_ACTIONS.contains(action) => Some(Intent::Help {
            requester: sender.to_string(),
        }),
        [_, action, body] if *action == CHAT_ACTION => Some(Intent::Broadcast {
            sender: sender.to_string(),
            body: body.to_string(),
        }),
        [_, action, recipient, body] if *action == CHAT_ACTION => Some(Intent::PrivateMessage {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
        }),
        _ => None,
    }
}

/// Serialize one outbound message
pub fn encode(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Accumulates raw reads and yields complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Length of the unterminated tail at the end of `buf`
    tail_len: usize,
    /// Skipping the rest of an oversized line, up to its terminator
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from a read
    ///
    /// A line growing past [`MAX_LINE_LEN`] is dropped, together with every
    /// later byte up to and including its terminator, and the call fails.
    /// Other lines in the same read are kept.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        let mut overflowed = false;
        for &b in bytes {
            if self.discarding {
                if b == b'\n' {
                    self.discarding = false;
                }
                continue;
            }

            if b == b'\n' {
                self.buf.push(b);
                self.tail_len = 0;
            } else if self.tail_len == MAX_LINE_LEN {
                self.buf.truncate(self.buf.len() - self.tail_len);
                self.tail_len = 0;
                self.discarding = true;
                overflowed = true;
            } else {
                self.buf.push(b);
                self.tail_len += 1;
            }
        }

        if overflowed {
            Err(AppError::LineTooLong(MAX_LINE_LEN))
        } else {
            Ok(())
        }
    }

    /// Take the next complete line, without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=end).collect();
        Some(to_text(&line[..end]))
    }

    /// Take every complete line currently buffered
    pub fn drain_lines(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Take the unterminated tail as a message of its own
    ///
    /// Used for peers that send one message per write without a newline.
    /// Only valid once every complete line has been drained.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.tail_len == 0 || self.buf.len() != self.tail_len {
            return None;
        }
        let tail = std::mem::take(&mut self.buf);
        self.tail_len = 0;
        Some(to_text(&tail))
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn to_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
