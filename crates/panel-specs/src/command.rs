//! Panel command lists
//!
//! A command list is a flat byte stream:
//!
//! ```text
//! opcode, argc [| 0x80], arg0 .. argN-1, [delay_ms]
//! ...
//! 0xFF, 0xFF
//! ```
//!
//! Bit 7 of `argc` ([`CMD_INIT_DELAY`]) means a delay byte follows the
//! arguments; a delay byte of 255 stands for 500 ms. An entry whose opcode
//! and count AND to `0xFF` terminates the list.

use heapless::Vec;

/// "Delay byte follows" flag in the argument-count byte.
pub const CMD_INIT_DELAY: u8 = 0x80;

/// Capacity of a [`CommandBuf`] in bytes.
pub const COMMAND_BUF_LEN: usize = 32;

const LONG_DELAY_CODE: u8 = 255;
const LONG_DELAY_MS: u16 = 500;

/// One decoded command list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    /// Command opcode
    pub opcode: u8,
    /// Argument bytes
    pub args: &'a [u8],
    /// Delay to apply after the arguments
    pub delay_ms: Option<u16>,
}

/// Decoding iterator over a command list.
#[derive(Debug, Clone)]
pub struct CommandList<'a> {
    rest: &'a [u8],
    truncated: bool,
}

impl<'a> CommandList<'a> {
    /// Decode `bytes`.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self {
            rest: bytes,
            truncated: false,
        }
    }

    /// The stream ended in the middle of an entry.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn stop(&mut self, truncated: bool) -> Option<Command<'a>> {
        self.rest = &[];
        self.truncated = truncated;
        None
    }
}

impl<'a> Iterator for CommandList<'a> {
    type Item = Command<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest;
        let (opcode, argc, tail) = match rest {
            [] => return None,
            [opcode, argc, tail @ ..] => (*opcode, *argc, tail),
            [_] => return self.stop(true),
        };
        if opcode & argc == 0xFF {
            return self.stop(false);
        }
        let count = usize::from(argc & !CMD_INIT_DELAY);
        let Some((args, tail)) = tail.split_at_checked(count) else {
            return self.stop(true);
        };
        let (delay_ms, tail) = if argc & CMD_INIT_DELAY == 0 {
            (None, tail)
        } else {
            match tail {
                [LONG_DELAY_CODE, tail @ ..] => (Some(LONG_DELAY_MS), tail),
                [ms, tail @ ..] => (Some(u16::from(*ms)), tail),
                [] => return self.stop(true),
            }
        };
        self.rest = tail;
        Some(Command {
            opcode,
            args,
            delay_ms,
        })
    }
}

/// Command list encoding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// The list does not fit in [`COMMAND_BUF_LEN`] bytes.
    Overflow,
    /// More than 127 arguments.
    TooManyArgs,
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Overflow => write!(f, "Command list exceeds {COMMAND_BUF_LEN} bytes"),
            Self::TooManyArgs => write!(f, "Command takes at most 127 arguments"),
        }
    }
}

/// Small owned command list, as returned by panels for depth, rotation and
/// invert changes. Always terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuf {
    bytes: Vec<u8, COMMAND_BUF_LEN>,
}

impl Default for CommandBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuf {
    /// Empty (terminated) list.
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = Vec::new();
        // Capacity is far above two bytes.
        let _ = bytes.extend_from_slice(&[0xFF, 0xFF]);
        Self { bytes }
    }

    /// List holding one command.
    pub fn single(opcode: u8, args: &[u8]) -> Result<Self, CommandError> {
        let mut buf = Self::new();
        buf.push(opcode, args, None)?;
        Ok(buf)
    }

    /// Append a command before the terminator.
    #[allow(clippy::arithmetic_side_effects)] // Safety: len >= 2 (terminator always present)
    #[allow(clippy::cast_possible_truncation)] // Safety: args.len() <= 0x7F checked above
    pub fn push(&mut self, opcode: u8, args: &[u8], delay_ms: Option<u8>) -> Result<(), CommandError> {
        if args.len() > usize::from(!CMD_INIT_DELAY) {
            return Err(CommandError::TooManyArgs);
        }
        let mut argc = args.len() as u8;
        if delay_ms.is_some() {
            argc |= CMD_INIT_DELAY;
        }
        let needed = 2 + args.len() + usize::from(delay_ms.is_some());
        if self.bytes.len() + needed > COMMAND_BUF_LEN {
            return Err(CommandError::Overflow);
        }
        self.bytes.truncate(self.bytes.len() - 2);
        let ok = self.bytes.extend_from_slice(&[opcode, argc]).is_ok()
            && self.bytes.extend_from_slice(args).is_ok()
            && delay_ms.map_or(true, |ms| self.bytes.push(ms).is_ok())
            && self.bytes.extend_from_slice(&[0xFF, 0xFF]).is_ok();
        if ok {
            Ok(())
        } else {
            Err(CommandError::Overflow)
        }
    }

    /// Encoded bytes including the terminator.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `true` when the list holds no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= 2
    }

    /// Decode the list.
    #[must_use]
    pub fn iter(&self) -> CommandList<'_> {
        CommandList::new(&self.bytes)
    }
}
