use serde::Serialize;

use super::{Dimension, TypeRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Passing {
    ByValue,
    ByReference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnSpec {
    pub type_ref: TypeRef,
    pub signed: bool,
    pub named: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: Option<String>,
    pub type_ref: TypeRef,
    pub mechanism: Passing,
    pub input: bool,
    pub output: bool,
    pub default: Option<Value>,
    pub dimension: Option<Dimension>,
    pub type_name: Option<String>,
    pub optional: bool,
    pub list: bool,
    pub fill: bool,
    pub length: Option<u32>,
    /// `CHARACTER *`; legal only here.
    pub star_length: bool,
}

/// A function or procedure signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub id: String,
    pub alias: Option<String>,
    pub linkage: Option<String>,
    pub type_name: Option<String>,
    pub variable: bool,
    pub returns: Option<ReturnSpec>,
    pub params: Vec<Parameter>,
}
