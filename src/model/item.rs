use serde::Serialize;

use super::{Alignment, Dimension, TypeId, TypeRef};

/// A named top-level data slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub type_id: TypeId,
    pub prefix: Option<String>,
    pub tag: String,
    pub type_ref: TypeRef,
    pub signed: bool,
    /// Natural size of one element in bytes.
    pub size: u32,
    pub alignment: Option<Alignment>,
    pub dimension: Option<Dimension>,
    pub common: bool,
    pub global: bool,
    pub typedef: bool,
    /// Character count for char and char_vary.
    pub length: Option<u32>,
    /// Precision and scale for decimal.
    pub precision: Option<(u32, u32)>,
    /// Target type for the pointer families.
    pub subtype: Option<TypeRef>,
}
