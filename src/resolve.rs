//! Tag and size resolution over the user-type chains. Recursion is
//! bounded: a reference always points at an entity with a smaller
//! TypeID, so every chain bottoms out in a scalar.

use crate::model::module::Module;
use crate::model::scalar::ScalarKind;
use crate::model::{Namespace, TypeId, TypeRef};
use crate::Target;

/// Effective output tag for an entity of type `ty` named `host_id`.
/// An explicit tag wins after trailing underscores are trimmed; the
/// result is lowercased when the host id is all-lowercase.
pub fn resolve_tag(
    module: &Module,
    explicit: Option<&str>,
    ty: TypeRef,
    host_id: &str,
) -> String {
    let tag = match explicit {
        Some(t) => t.trim_end_matches('_').to_string(),
        None => tag_of(module, ty),
    };
    if is_all_lowercase(host_id) {
        tag.to_lowercase()
    } else {
        tag
    }
}

pub fn is_all_lowercase(id: &str) -> bool {
    !id.chars().any(|c| c.is_ascii_uppercase())
}

fn tag_of(module: &Module, ty: TypeRef) -> String {
    match ty {
        TypeRef::Constant => "K".to_string(),
        TypeRef::Scalar(kind) => kind.default_tag().to_string(),
        TypeRef::Named(id) => named_tag(module, id),
    }
}

fn named_tag(module: &Module, id: TypeId) -> String {
    match id.namespace() {
        Ok(Namespace::Scalar(kind)) => kind.default_tag().to_string(),
        Ok(Namespace::Declare(_)) => match module.declare_by_id(id) {
            Some(d) if !d.tag.is_empty() => d.tag.clone(),
            Some(d) => tag_of(module, d.base),
            None => String::new(),
        },
        Ok(Namespace::Item(_)) => match module.item_by_id(id) {
            Some(i) if !i.tag.is_empty() => i.tag.clone(),
            Some(i) => tag_of(module, i.type_ref),
            None => String::new(),
        },
        Ok(Namespace::Aggregate(_)) => match module.aggregate_by_id(id) {
            Some(a) if !a.tag.is_empty() => a.tag.clone(),
            Some(_) => ScalarKind::Structure.default_tag().to_string(),
            None => String::new(),
        },
        Ok(Namespace::Enum(_)) => match module.enum_by_id(id) {
            Some(e) if !e.tag.is_empty() => e.tag.clone(),
            Some(_) => ScalarKind::Enum.default_tag().to_string(),
            None => String::new(),
        },
        // unknown type: the Any default
        Err(_) => String::new(),
    }
}

/// Natural size in bytes of one element of `ty`.
pub fn type_size(module: &Module, target: &Target, ty: TypeRef) -> u32 {
    match ty {
        TypeRef::Constant => 0,
        TypeRef::Scalar(kind) => kind.size_bytes(target.pointer_bytes),
        TypeRef::Named(id) => match id.namespace() {
            Ok(Namespace::Scalar(kind)) => {
                kind.size_bytes(target.pointer_bytes)
            }
            Ok(Namespace::Declare(_)) => {
                module.declare_by_id(id).map(|d| d.size).unwrap_or(0)
            }
            Ok(Namespace::Item(_)) => {
                module.item_by_id(id).map(|i| i.size).unwrap_or(0)
            }
            Ok(Namespace::Aggregate(_)) => module
                .aggregate_by_id(id)
                .map(|a| a.size as u32)
                .unwrap_or(0),
            Ok(Namespace::Enum(_)) => {
                ScalarKind::Enum.size_bytes(target.pointer_bytes)
            }
            Err(_) => 0,
        },
    }
}

/// Default signedness of `ty`, chaining through user types.
pub fn type_signed(module: &Module, ty: TypeRef) -> bool {
    match ty {
        TypeRef::Constant => false,
        TypeRef::Scalar(kind) => kind.default_signed(),
        TypeRef::Named(id) => match id.namespace() {
            Ok(Namespace::Scalar(kind)) => kind.default_signed(),
            Ok(Namespace::Declare(_)) => {
                module.declare_by_id(id).map(|d| d.signed).unwrap_or(false)
            }
            Ok(Namespace::Item(_)) => {
                module.item_by_id(id).map(|i| i.signed).unwrap_or(false)
            }
            _ => false,
        },
    }
}

/// The scalar kind at the bottom of a user-type chain, if any.
pub fn base_scalar(module: &Module, ty: TypeRef) -> Option<ScalarKind> {
    match ty {
        TypeRef::Constant => None,
        TypeRef::Scalar(kind) => Some(kind),
        TypeRef::Named(id) => match id.namespace() {
            Ok(Namespace::Scalar(kind)) => Some(kind),
            Ok(Namespace::Declare(_)) => module
                .declare_by_id(id)
                .and_then(|d| base_scalar(module, d.base)),
            Ok(Namespace::Item(_)) => module
                .item_by_id(id)
                .and_then(|i| base_scalar(module, i.type_ref)),
            Ok(Namespace::Aggregate(_)) => Some(ScalarKind::Structure),
            Ok(Namespace::Enum(_)) => Some(ScalarKind::Enum),
            Err(_) => None,
        },
    }
}
