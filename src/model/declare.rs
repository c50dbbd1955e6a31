use serde::Serialize;

use super::{TypeId, TypeRef};

/// A type alias. The base reference may chain through other user
/// types; `size` is already derived from the fully resolved base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declare {
    pub id: String,
    pub type_id: TypeId,
    pub prefix: Option<String>,
    pub tag: String,
    pub base: TypeRef,
    pub signed: bool,
    pub size: u32,
}
