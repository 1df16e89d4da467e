//! Command protocol definitions
//!
//! One command per frame, textual wire form `<KIND>|<PAYLOAD>`.
//! The kind is matched exactly (case-sensitive); everything after the
//! first `|` is the payload, verbatim.

use std::str::FromStr;

use crate::error::DecodeError;

/// Delimiter between the command kind and its payload
pub const DELIMITER: char = '|';

/// Separator between names in a `GetMembersResponse` payload
pub const MEMBER_SEPARATOR: char = ',';

macro_rules! command_kind_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        $vis enum $name {
            $($variant),*
        }

        impl $name {
            /// Every kind, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// Wire name of this kind
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)*
                }
            }
        }

        impl FromStr for $name {
            type Err = DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok($name::$variant),)*
                    _ => Err(DecodeError::UnknownCommandKind(s.to_string())),
                }
            }
        }
    };
}

command_kind_enum! {
    /// Kinds of commands exchanged between clients and the server
    pub enum CommandKind {
        EnterRoom,
        EnterRoomResponse,
        GetMembers,
        GetMembersResponse,
        SendMessage,
        MessageReceived,
        MemberEntered,
        MemberLeft,
        MemberLeaving,
        MemberCanLeave,
        ServerDisconnecting,
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logical command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub payload: String,
}

impl Command {
    pub fn new(kind: CommandKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Command with an empty payload
    pub fn empty(kind: CommandKind) -> Self {
        Self::new(kind, String::new())
    }

    /// Encode to the wire form, without the trailing newline
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.kind.as_str().len() + 1 + self.payload.len());
        out.push_str(self.kind.as_str());
        out.push(DELIMITER);
        out.push_str(&self.payload);
        out
    }

    /// Decode one frame (newline already stripped)
    pub fn decode(frame: &str) -> Result<Self, DecodeError> {
        let Some((kind, payload)) = frame.split_once(DELIMITER) else {
            return Err(DecodeError::MalformedCommand(frame.to_string()));
        };
        let kind = kind.parse::<CommandKind>()?;
        Ok(Self::new(kind, payload))
    }

    pub fn enter_room(name: &str) -> Self {
        Self::new(CommandKind::EnterRoom, name)
    }

    /// `true|` on acceptance, `false|<reason>` on rejection
    pub fn enter_room_response(result: &Result<(), String>) -> Self {
        let payload = match result {
            Ok(()) => format!("true{}", DELIMITER),
            Err(reason) => format!("false{}{}", DELIMITER, reason),
        };
        Self::new(CommandKind::EnterRoomResponse, payload)
    }

    pub fn get_members_response<S: AsRef<str>>(names: &[S]) -> Self {
        let mut buf = [0; 4];
        let separator: &str = MEMBER_SEPARATOR.encode_utf8(&mut buf);
        let payload = names
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(separator);
        Self::new(CommandKind::GetMembersResponse, payload)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.kind, DELIMITER, self.payload)
    }
}

impl FromStr for Command {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Parse an `EnterRoomResponse` payload
///
/// Anything that is not `true` before the delimiter counts as a rejection.
pub fn parse_enter_room_response(payload: &str) -> Result<(), String> {
    let (flag, reason) = payload.split_once(DELIMITER).unwrap_or((payload, ""));
    if flag == "true" {
        Ok(())
    } else {
        Err(reason.to_string())
    }
}

/// Parse a `GetMembersResponse` payload; empty payload means no members
pub fn parse_members(payload: &str) -> Vec<String> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload.split(MEMBER_SEPARATOR).map(str::to_string).collect()
}
