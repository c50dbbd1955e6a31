use serde::Serialize;

use super::Radix;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstantValue {
    Num { value: i128, radix: Radix },
    Str(String),
}

/// A named constant, user-declared or derived (aggregate sizes,
/// bitfield size/mask constants).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constant {
    pub id: String,
    pub prefix: Option<String>,
    pub tag: String,
    pub comment: Option<String>,
    pub type_name: Option<String>,
    pub value: ConstantValue,
    /// Display width in bytes, used to pad mask literals.
    pub size: u32,
}
