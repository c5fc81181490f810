//! Address Parser
//!
//! Decodes an incoming OSC address into a [`Route`]:
//!
//! ```text
//! /register                 -> GlobalRegister
//! /unregister               -> GlobalUnregister
//! /ctrl/transport_play      -> ControlCommand { name: "transport_play" }
//! /plughost/42/set_volume   -> PluginCommand { plugin_index: 42, method: "set_volume" }
//! /other/1/set_volume       -> NotForThisInstance
//! ```
//!
//! Plugin indices are decoded by a bounded fixed-width decoder: one to three
//! decimal digits are accepted, a fourth digit is rejected outright.

use super::types::MAX_METHOD_LEN;
use std::fmt;

/// Prefix of the global control namespace
pub const CONTROL_PREFIX: &str = "/ctrl/";

/// Widest plugin index accepted in a path segment
pub const MAX_INDEX_DIGITS: usize = 3;

/// Decoded intent of an incoming message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    GlobalRegister,
    GlobalUnregister,
    ControlCommand { name: String },
    PluginCommand { plugin_index: u32, method: String },
    NotForThisInstance,
    Malformed(PathFault),
}

/// Why a path addressed to this instance could not be decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathFault {
    /// No digit where the plugin index should start
    MissingIndex,
    /// Four or more digits
    IndexTooLarge,
    /// Index followed by something other than `/`
    MissingSeparator,
    /// Nothing after the index (or after `/ctrl/`)
    MissingMethod,
}

impl fmt::Display for PathFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathFault::MissingIndex => write!(f, "invalid message, no plugin id"),
            PathFault::IndexTooLarge => write!(f, "invalid plugin id, over 999?"),
            PathFault::MissingSeparator => write!(f, "plugin id not followed by '/'"),
            PathFault::MissingMethod => write!(f, "received message without method"),
        }
    }
}

/// A plugin index read from a path, plus where the decoder stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedIndex {
    pub value: u32,
    pub next_offset: usize,
}

/// Decode a 1 to 3 digit index starting at `offset`.
///
/// Each digit position is inspected individually; a digit in the fourth
/// position fails with [`PathFault::IndexTooLarge`] without any numeric
/// interpretation of the digits seen so far.
pub fn decode_plugin_index(bytes: &[u8], offset: usize) -> Result<ParsedIndex, PathFault> {
    let digit_at = |pos: usize| bytes.get(offset + pos).copied().filter(u8::is_ascii_digit);

    if digit_at(MAX_INDEX_DIGITS).is_some() && (0..MAX_INDEX_DIGITS).all(|p| digit_at(p).is_some()) {
        return Err(PathFault::IndexTooLarge);
    }

    let mut value = 0u32;
    let mut width = 0usize;
    while width < MAX_INDEX_DIGITS {
        match digit_at(width) {
            Some(d) => {
                value = value * 10 + u32::from(d - b'0');
                width += 1;
            }
            None => break,
        }
    }

    if width == 0 {
        return Err(PathFault::MissingIndex);
    }

    Ok(ParsedIndex {
        value,
        next_offset: offset + width,
    })
}

/// Resolve a path against this instance's root name
pub fn parse_route(path: &str, root_name: &str) -> Route {
    match path {
        "/register" => return Route::GlobalRegister,
        "/unregister" => return Route::GlobalUnregister,
        _ => {}
    }

    if let Some(name) = path.strip_prefix(CONTROL_PREFIX) {
        if name.is_empty() {
            return Route::Malformed(PathFault::MissingMethod);
        }
        return Route::ControlCommand {
            name: name.to_string(),
        };
    }

    let rest = match path
        .strip_prefix('/')
        .and_then(|p| p.strip_prefix(root_name))
        .and_then(|p| p.strip_prefix('/'))
    {
        Some(rest) => rest,
        None => return Route::NotForThisInstance,
    };

    let bytes = rest.as_bytes();
    let parsed = match decode_plugin_index(bytes, 0) {
        Ok(parsed) => parsed,
        Err(fault) => return Route::Malformed(fault),
    };

    match bytes.get(parsed.next_offset) {
        Some(b'/') => {}
        None => return Route::Malformed(PathFault::MissingMethod),
        Some(_) => return Route::Malformed(PathFault::MissingSeparator),
    }

    // The index and separator are ASCII, so this slice is on a char boundary
    let method: String = rest[parsed.next_offset + 1..]
        .chars()
        .take(MAX_METHOD_LEN)
        .collect();

    if method.is_empty() {
        return Route::Malformed(PathFault::MissingMethod);
    }

    Route::PluginCommand {
        plugin_index: parsed.value,
        method,
    }
}
