use serde::Serialize;

use crate::error::SdlError;

use super::scalar::ScalarKind;
use super::{Alignment, Dimension, TypeId, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregateKind {
    Structure,
    Union,
    /// A scalar type appeared where STRUCTURE/UNION was expected; the
    /// aggregate becomes a union whose minimum size is that scalar.
    ImplicitUnion(ScalarKind),
}

impl AggregateKind {
    pub fn is_union(&self) -> bool {
        matches!(
            self,
            AggregateKind::Union | AggregateKind::ImplicitUnion(_)
        )
    }
}

/// A structure or union definition with ordered members and computed
/// layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub id: String,
    pub type_id: TypeId,
    pub prefix: Option<String>,
    /// Printed next to the aggregate name (the C struct tag).
    pub marker: Option<String>,
    pub tag: String,
    /// Pointer name anchoring the aggregate; required when an
    /// address-family item targets it.
    pub based_name: Option<String>,
    pub kind: AggregateKind,
    pub alignment: Option<Alignment>,
    /// Member name whose offset is the aggregate's logical zero.
    pub origin_name: Option<String>,
    /// Index into `members` once the origin member was appended.
    pub origin_member: Option<usize>,
    pub dimension: Option<Dimension>,
    pub common: bool,
    pub global: bool,
    pub typedef: bool,
    /// Byte offset within the parent; zero for top-level aggregates.
    pub offset: u64,
    pub size: u64,
    pub members: Vec<Member>,
}

impl Aggregate {
    /// Offsets stay source-literal; backends decide whether to shift
    /// by the origin.
    pub fn origin_offset(&self) -> u64 {
        self.origin_member
            .and_then(|idx| self.members.get(idx))
            .map(|m| m.offset())
            .unwrap_or(0)
    }

    pub fn first_layout_member(&self) -> Option<&Member> {
        self.members.iter().find(|m| !m.is_comment())
    }

    /// Post-close invariant check, run under `--check`.
    pub fn validate(&self) -> Result<(), SdlError> {
        for member in &self.members {
            if member.is_comment() {
                continue;
            }
            let end = member.offset() + member.real_size();
            if end > self.size {
                return Err(SdlError::Abort {
                    detail: format!(
                        "member \"{}\" of \"{}\" ends at {end}, past size {}",
                        member.name().unwrap_or("<filler>"),
                        self.id,
                        self.size
                    ),
                });
            }
            if let Member::Aggregate(sub) = member {
                sub.validate()?;
            }
        }
        Ok(())
    }
}

/// One entry of an aggregate body. Comments participate in emission
/// only, never in layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Member {
    Field(Field),
    Aggregate(Box<Aggregate>),
    Comment(Comment),
}

impl Member {
    pub fn name(&self) -> Option<&str> {
        match self {
            Member::Field(f) => Some(&f.id),
            Member::Aggregate(a) => Some(&a.id),
            Member::Comment(_) => None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Member::Comment(_))
    }

    pub fn offset(&self) -> u64 {
        match self {
            Member::Field(f) => f.offset,
            Member::Aggregate(a) => a.offset,
            Member::Comment(_) => 0,
        }
    }

    /// Occupied bytes including dimension and the char_vary/decimal
    /// adjustments.
    pub fn real_size(&self) -> u64 {
        match self {
            Member::Field(f) => f.real_size(),
            Member::Aggregate(a) => {
                a.size * a.dimension.map(|d| d.count()).unwrap_or(1)
            }
            Member::Comment(_) => 0,
        }
    }
}

/// A data member, fully contained in its aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub id: String,
    pub prefix: Option<String>,
    pub tag: String,
    pub type_ref: TypeRef,
    pub signed: bool,
    /// One element in bytes; for bitfields, the host width.
    pub size: u32,
    pub alignment: Option<Alignment>,
    pub dimension: Option<Dimension>,
    /// Character count for char and char_vary.
    pub length: Option<u32>,
    pub precision: Option<(u32, u32)>,
    pub subtype: Option<TypeRef>,
    pub offset: u64,
    /// Declared length in bits; present exactly for bitfields.
    pub bit_length: Option<u32>,
    /// Bit position within the host integer.
    pub bit_offset: Option<u32>,
    /// Mask constant requested.
    pub mask: bool,
    /// Host width was spelled in the source, blocking promotion.
    pub explicit_host: bool,
    /// Synthesised tail padding.
    pub filler: bool,
}

impl Field {
    pub fn is_bitfield(&self) -> bool {
        self.bit_length.is_some()
    }

    /// Bytes of one element with the string/decimal adjustments.
    pub fn unit_size(&self) -> u64 {
        if self.is_bitfield() {
            return self.size as u64;
        }
        match self.type_ref {
            TypeRef::Scalar(ScalarKind::CharVary) => {
                self.length.unwrap_or(1) as u64 + 2
            }
            TypeRef::Scalar(ScalarKind::Char | ScalarKind::CharStar) => {
                self.length.unwrap_or(1) as u64
            }
            TypeRef::Scalar(ScalarKind::Decimal) => {
                self.precision.map(|(p, _)| p).unwrap_or(1) as u64 + 1
            }
            _ => self.size as u64,
        }
    }

    pub fn real_size(&self) -> u64 {
        self.unit_size() * self.dimension.map(|d| d.count()).unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommentPosition {
    /// Alone on its source line.
    Line,
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub text: String,
    pub position: CommentPosition,
}
