//! Resolved in-memory model of a compiled SDL module.

pub mod aggregate;
pub mod constant;
pub mod declare;
pub mod entry;
pub mod enumeration;
pub mod item;
pub mod module;
pub mod scalar;

use serde::Serialize;

use crate::error::SdlError;
use scalar::ScalarKind;

/// Reserved low range holding the scalar kinds.
pub const SCALAR_MAX: u32 = 0xFF;
pub const DECLARE_MIN: u32 = 0x0000_0100;
pub const DECLARE_MAX: u32 = 0x0FFF_FFFF;
pub const ITEM_MIN: u32 = 0x1000_0000;
pub const ITEM_MAX: u32 = 0x1FFF_FFFF;
pub const AGGREGATE_MIN: u32 = 0x2000_0000;
pub const AGGREGATE_MAX: u32 = 0x2FFF_FFFF;
pub const ENUM_MIN: u32 = 0x3000_0000;
pub const ENUM_MAX: u32 = 0x3FFF_FFFF;

/// Identifier of a declare, item, aggregate or enum within a module,
/// drawn from four disjoint ranges. Issued monotonically per
/// namespace, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(u32);

/// Which table a [`TypeId`] indexes, with the table index decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Scalar(ScalarKind),
    Declare(usize),
    Item(usize),
    Aggregate(usize),
    Enum(usize),
}

impl TypeId {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self(kind.into())
    }

    pub(crate) fn declare(index: usize) -> Self {
        Self(DECLARE_MIN + index as u32)
    }

    pub(crate) fn item(index: usize) -> Self {
        Self(ITEM_MIN + index as u32)
    }

    pub(crate) fn aggregate(index: usize) -> Self {
        Self(AGGREGATE_MIN + index as u32)
    }

    pub(crate) fn enumeration(index: usize) -> Self {
        Self(ENUM_MIN + index as u32)
    }

    pub fn into_raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(value: u32) -> Result<Self, SdlError> {
        Self(value).namespace().map(|_| Self(value))
    }

    pub fn namespace(self) -> Result<Namespace, SdlError> {
        match self.0 {
            v @ ..=SCALAR_MAX => ScalarKind::try_from(v)
                .map(Namespace::Scalar)
                .map_err(|_| SdlError::Abort {
                    detail: format!("type id {v:#x} is not a scalar kind"),
                }),
            v @ DECLARE_MIN..=DECLARE_MAX => {
                Ok(Namespace::Declare((v - DECLARE_MIN) as usize))
            }
            v @ ITEM_MIN..=ITEM_MAX => {
                Ok(Namespace::Item((v - ITEM_MIN) as usize))
            }
            v @ AGGREGATE_MIN..=AGGREGATE_MAX => {
                Ok(Namespace::Aggregate((v - AGGREGATE_MIN) as usize))
            }
            v @ ENUM_MIN..=ENUM_MAX => {
                Ok(Namespace::Enum((v - ENUM_MIN) as usize))
            }
            v => Err(SdlError::Abort {
                detail: format!("type id {v:#x} outside every namespace"),
            }),
        }
    }
}

/// A type reference as it appears on an item, declare base, bitfield
/// or pointer subtype, or entry parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeRef {
    Scalar(ScalarKind),
    /// Declare, item, aggregate or enum by id.
    Named(TypeId),
    /// The pseudo-type of constants; only the tag resolver cares.
    Constant,
}

/// Inclusive array bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub lbound: i64,
    pub hbound: i64,
}

impl Dimension {
    pub fn count(&self) -> u64 {
        (self.hbound - self.lbound + 1).max(0) as u64
    }
}

/// Per-entity alignment request. Absence means the target default
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Alignment {
    NoAlign,
    /// Pad to the entity's natural size.
    Natural,
    /// Pad to an explicit power of two.
    Explicit(u32),
}

/// Display radix for numeric constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Radix {
    Binary,
    Octal,
    Decimal,
    Hex,
}

/// A literal value flowing through directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Value {
    Int(i128),
    Str(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Str(_) => None,
        }
    }
}
