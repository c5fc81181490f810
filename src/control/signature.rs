//! Type-Signature Validator
//!
//! Every command declares an exact ordered list of argument tags. A message
//! is only handed to its handler after [`validate`] has checked the argument
//! count and every positional tag; the returned [`Args`] then gives typed
//! access to the values.

use super::types::{ControlError, ControlResult};
use rosc::OscType;
use std::fmt;
use std::ops::Range;

/// Expected type of one positional argument
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgTag {
    /// 32-bit signed integer (`i`)
    Int32,
    /// 64-bit signed integer (`h`)
    Int64,
    /// 32-bit float (`f`)
    Float,
    /// String (`s`)
    Str,
    /// Count or identifier that may arrive as `i` or `h`; read back as `i64`
    Integer,
}

impl ArgTag {
    /// Whether an argument with the given wire tag satisfies this slot
    pub fn accepts(self, tag: char) -> bool {
        match self {
            ArgTag::Int32 => tag == 'i',
            ArgTag::Int64 => tag == 'h',
            ArgTag::Float => tag == 'f',
            ArgTag::Str => tag == 's',
            ArgTag::Integer => tag == 'i' || tag == 'h',
        }
    }
}

impl fmt::Display for ArgTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgTag::Int32 => write!(f, "'i'"),
            ArgTag::Int64 => write!(f, "'h'"),
            ArgTag::Float => write!(f, "'f'"),
            ArgTag::Str => write!(f, "'s'"),
            ArgTag::Integer => write!(f, "'i' or 'h'"),
        }
    }
}

/// OSC type tag character of a decoded argument
pub fn type_tag(arg: &OscType) -> char {
    match arg {
        OscType::Int(_) => 'i',
        OscType::Long(_) => 'h',
        OscType::Float(_) => 'f',
        OscType::Double(_) => 'd',
        OscType::String(_) => 's',
        OscType::Blob(_) => 'b',
        OscType::Time(_) => 't',
        OscType::Char(_) => 'c',
        OscType::Color(_) => 'r',
        OscType::Midi(_) => 'm',
        OscType::Bool(true) => 'T',
        OscType::Bool(false) => 'F',
        OscType::Array(_) => '[',
        OscType::Nil => 'N',
        OscType::Inf => 'I',
    }
}

/// Type signature string of an argument list, e.g. `"iif"`
pub fn signature_of(args: &[OscType]) -> String {
    args.iter().map(type_tag).collect()
}

/// Check arity and per-position tags against a declared signature
pub fn validate<'a>(
    command: &'a str,
    expected: &[ArgTag],
    args: &'a [OscType],
) -> ControlResult<Args<'a>> {
    if args.len() != expected.len() {
        return Err(ControlError::ArityMismatch {
            command: command.to_string(),
            expected: expected.len(),
            actual: args.len(),
        });
    }

    for (position, (tag, arg)) in expected.iter().zip(args).enumerate() {
        let actual = type_tag(arg);
        if !tag.accepts(actual) {
            return Err(ControlError::TypeMismatch {
                command: command.to_string(),
                position,
                expected: tag.to_string(),
                actual,
            });
        }
    }

    Ok(Args { command, args })
}

/// Validated argument list with typed accessors
#[derive(Clone, Copy, Debug)]
pub struct Args<'a> {
    command: &'a str,
    args: &'a [OscType],
}

impl<'a> Args<'a> {
    pub fn command(&self) -> &'a str {
        self.command
    }

    pub fn raw(&self) -> &'a [OscType] {
        self.args
    }

    fn mismatch(&self, position: usize, expected: ArgTag) -> ControlError {
        ControlError::TypeMismatch {
            command: self.command.to_string(),
            position,
            expected: expected.to_string(),
            actual: self.args.get(position).map(type_tag).unwrap_or('-'),
        }
    }

    pub fn int(&self, position: usize) -> ControlResult<i32> {
        match self.args.get(position) {
            Some(OscType::Int(v)) => Ok(*v),
            _ => Err(self.mismatch(position, ArgTag::Int32)),
        }
    }

    /// 32- or 64-bit integer, normalized to `i64`
    pub fn integer(&self, position: usize) -> ControlResult<i64> {
        match self.args.get(position) {
            Some(OscType::Int(v)) => Ok(i64::from(*v)),
            Some(OscType::Long(v)) => Ok(*v),
            _ => Err(self.mismatch(position, ArgTag::Integer)),
        }
    }

    pub fn float(&self, position: usize) -> ControlResult<f32> {
        match self.args.get(position) {
            Some(OscType::Float(v)) => Ok(*v),
            _ => Err(self.mismatch(position, ArgTag::Float)),
        }
    }

    pub fn string(&self, position: usize) -> ControlResult<&'a str> {
        match self.args.get(position) {
            Some(OscType::String(s)) => Ok(s.as_str()),
            _ => Err(self.mismatch(position, ArgTag::Str)),
        }
    }

    /// Non-negative 32-bit integer as an index
    pub fn index(&self, position: usize, argument: &'static str) -> ControlResult<u32> {
        let value = self.int(position)?;
        u32::try_from(value).map_err(|_| self.out_of_range(argument, value))
    }

    /// Non-negative 32- or 64-bit integer
    pub fn unsigned(&self, position: usize, argument: &'static str) -> ControlResult<u64> {
        let value = self.integer(position)?;
        u64::try_from(value).map_err(|_| self.out_of_range(argument, value))
    }

    /// 32-bit integer within `range`
    pub fn int_in(
        &self,
        position: usize,
        argument: &'static str,
        range: Range<i32>,
    ) -> ControlResult<i32> {
        let value = self.int(position)?;
        if range.contains(&value) {
            Ok(value)
        } else {
            Err(self.out_of_range(argument, value))
        }
    }

    /// Non-empty string
    pub fn label(&self, position: usize, argument: &'static str) -> ControlResult<&'a str> {
        let value = self.string(position)?;
        if value.is_empty() {
            return Err(self.out_of_range(argument, "\"\""));
        }
        Ok(value)
    }

    pub fn out_of_range(&self, argument: &'static str, value: impl fmt::Display) -> ControlError {
        ControlError::RangeViolation {
            command: self.command.to_string(),
            argument,
            value: value.to_string(),
        }
    }
}
