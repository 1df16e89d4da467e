//! Line framing for commands
//!
//! Wraps `LinesCodec` so a `Framed` stream yields decoded `Command`s and
//! its sink accepts them, one newline-terminated frame each.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec};

use crate::command::Command;
use crate::error::CodecError;

/// Newline-delimited `Command` codec
#[derive(Debug, Clone)]
pub struct CommandCodec {
    lines: LinesCodec,
}

impl CommandCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_length),
        }
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for CommandCodec {
    type Item = Command;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, CodecError> {
        match self.lines.decode(src)? {
            Some(line) => Ok(Some(Command::decode(&line)?)),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Command>, CodecError> {
        match self.lines.decode_eof(src)? {
            Some(line) => Ok(Some(Command::decode(&line)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Command> for CommandCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.lines.encode(item.encode(), dst)?;
        Ok(())
    }
}
