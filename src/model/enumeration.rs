use serde::Serialize;

use super::TypeId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumMember {
    pub id: String,
    pub value: i128,
    /// The value was spelled in the source rather than auto-stepped.
    pub explicit: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enumeration {
    pub id: String,
    pub type_id: TypeId,
    pub prefix: Option<String>,
    pub tag: String,
    pub typedef: bool,
    pub members: Vec<EnumMember>,
}
