use std::collections::HashMap;

use serde::Serialize;

use super::aggregate::Aggregate;
use super::constant::Constant;
use super::declare::Declare;
use super::entry::Entry;
use super::enumeration::Enumeration;
use super::item::Item;
use super::{Dimension, TypeId, TypeRef};

/// The resolved output of one module open/close cycle. Owns every
/// entity created between the two directives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub name: String,
    pub ident: Option<String>,
    pub declares: Vec<Declare>,
    pub items: Vec<Item>,
    pub aggregates: Vec<Aggregate>,
    pub enums: Vec<Enumeration>,
    pub constants: Vec<Constant>,
    pub entries: Vec<Entry>,
    #[serde(skip)]
    pub(crate) symbols: HashMap<String, i64>,
    #[serde(skip)]
    pub(crate) dimensions: Vec<Dimension>,
    #[serde(skip)]
    pub(crate) locals: HashMap<String, i128>,
    // Nested aggregates consume ids without entering the top-level
    // table, so counters run separately from table lengths.
    #[serde(skip)]
    next_declare: usize,
    #[serde(skip)]
    next_item: usize,
    #[serde(skip)]
    next_aggregate: usize,
    #[serde(skip)]
    next_enum: usize,
}

impl Module {
    pub fn new(
        name: String,
        ident: Option<String>,
        symbols: HashMap<String, i64>,
    ) -> Self {
        Self {
            name,
            ident,
            declares: Vec::new(),
            items: Vec::new(),
            aggregates: Vec::new(),
            enums: Vec::new(),
            constants: Vec::new(),
            entries: Vec::new(),
            symbols,
            dimensions: Vec::new(),
            locals: HashMap::new(),
            next_declare: 0,
            next_item: 0,
            next_aggregate: 0,
            next_enum: 0,
        }
    }

    pub(crate) fn issue_declare_id(&mut self) -> TypeId {
        let id = TypeId::declare(self.next_declare);
        self.next_declare += 1;
        id
    }

    pub(crate) fn issue_item_id(&mut self) -> TypeId {
        let id = TypeId::item(self.next_item);
        self.next_item += 1;
        id
    }

    pub(crate) fn issue_aggregate_id(&mut self) -> TypeId {
        let id = TypeId::aggregate(self.next_aggregate);
        self.next_aggregate += 1;
        id
    }

    pub(crate) fn issue_enum_id(&mut self) -> TypeId {
        let id = TypeId::enumeration(self.next_enum);
        self.next_enum += 1;
        id
    }

    pub fn declare_by_id(&self, id: TypeId) -> Option<&Declare> {
        self.declares.iter().find(|d| d.type_id == id)
    }

    pub fn item_by_id(&self, id: TypeId) -> Option<&Item> {
        self.items.iter().find(|i| i.type_id == id)
    }

    pub fn aggregate_by_id(&self, id: TypeId) -> Option<&Aggregate> {
        self.aggregates.iter().find(|a| a.type_id == id)
    }

    pub fn enum_by_id(&self, id: TypeId) -> Option<&Enumeration> {
        self.enums.iter().find(|e| e.type_id == id)
    }

    /// Resolve a source name to a user type, searching the namespaces
    /// in declaration-chain order.
    pub fn lookup_type(&self, name: &str) -> Option<TypeRef> {
        if let Some(d) = self.declares.iter().find(|d| d.id == name) {
            return Some(TypeRef::Named(d.type_id));
        }
        if let Some(i) = self.items.iter().find(|i| i.id == name) {
            return Some(TypeRef::Named(i.type_id));
        }
        if let Some(a) = self.aggregates.iter().find(|a| a.id == name) {
            return Some(TypeRef::Named(a.type_id));
        }
        if let Some(e) = self.enums.iter().find(|e| e.id == name) {
            return Some(TypeRef::Named(e.type_id));
        }
        None
    }

    pub fn symbol(&self, name: &str) -> Option<i64> {
        self.symbols.get(name).copied()
    }

    pub(crate) fn add_dimension(&mut self, dim: Dimension) -> usize {
        self.dimensions.push(dim);
        self.dimensions.len() - 1
    }

    pub fn dimension(&self, key: usize) -> Option<Dimension> {
        self.dimensions.get(key).copied()
    }

    pub(crate) fn set_local(&mut self, name: &str, value: i128) {
        self.locals.insert(name.to_string(), value);
    }

    pub fn local(&self, name: &str) -> Option<i128> {
        self.locals.get(name).copied()
    }

    /// Process-scoped scratch released when the module closes.
    pub(crate) fn clear_tables(&mut self) {
        self.symbols.clear();
        self.dimensions.clear();
        self.locals.clear();
    }
}
