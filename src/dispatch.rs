//! Directive dispatcher: the entry points the parser drives. Every
//! entry checks the processing gate, folds the pending options into
//! the entity it completes, delegates layout, and fans the resolved
//! entity out to the enabled backends.

use std::collections::HashMap;

use crate::backend::Backend;
use crate::conditional::Conditionals;
use crate::error::{Fault, SdlError, Severity};
use crate::layout::AggBuilder;
use crate::model::aggregate::{
    Aggregate, AggregateKind, Comment, CommentPosition, Field, Member,
};
use crate::model::constant::{Constant, ConstantValue};
use crate::model::declare::Declare;
use crate::model::entry::{Entry, Parameter, Passing, ReturnSpec};
use crate::model::enumeration::{EnumMember, Enumeration};
use crate::model::item::Item;
use crate::model::module::Module;
use crate::model::scalar::ScalarKind;
use crate::model::{Alignment, Dimension, Radix, TypeRef, Value};
use crate::resolve::{
    base_scalar, is_all_lowercase, resolve_tag, type_signed, type_size,
};
use crate::{SourceLocation, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    Prefix,
    Tag,
    BaseAlign,
    Align,
    NoAlign,
    Dimension,
    Length,
    Mask,
    Signed,
    Common,
    Global,
    Typedef,
    Based,
    Marker,
    Origin,
    Counter,
    Increment,
    Radix,
    Enumerate,
    Alias,
    Linkage,
    TypeName,
    Variable,
    ReturnsType,
    ReturnsNamed,
    Named,
    In,
    Out,
    Default,
    Optional,
    List,
    Fill,
    SubType,
    Precision,
    Scale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptValue {
    Flag,
    Int(i128),
    Str(String),
    Type(TypeRef),
    Radix(Radix),
    Star,
    Val(Value),
}

/// The growable pending-options buffer. Options precede the entity
/// they attach to, except inside aggregates where they mutate the
/// predecessor directly.
#[derive(Debug, Default)]
struct Options(Vec<(OptionKey, OptValue)>);

impl Options {
    fn push(&mut self, key: OptionKey, value: OptValue) {
        self.0.push((key, value));
    }

    fn take(&mut self, key: OptionKey) -> Option<OptValue> {
        let at = self.0.iter().position(|(k, _)| *k == key)?;
        Some(self.0.remove(at).1)
    }

    fn flag(&mut self, key: OptionKey) -> bool {
        self.take(key).is_some()
    }

    fn take_str(&mut self, key: OptionKey) -> Option<String> {
        match self.take(key)? {
            OptValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn take_int(&mut self, key: OptionKey) -> Option<i128> {
        match self.take(key)? {
            OptValue::Int(v) => Some(v),
            _ => None,
        }
    }

    fn take_type(&mut self, key: OptionKey) -> Option<TypeRef> {
        match self.take(key)? {
            OptValue::Type(t) => Some(t),
            _ => None,
        }
    }

    fn take_radix(&mut self, key: OptionKey) -> Option<Radix> {
        match self.take(key)? {
            OptValue::Radix(r) => Some(r),
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Options shared by items and members, collected in one pass.
#[derive(Debug, Default)]
struct ItemOpts {
    prefix: Option<String>,
    tag: Option<String>,
    alignment: Option<Alignment>,
    dimension_key: Option<i128>,
    length: Option<OptValue>,
    mask: bool,
    signed: bool,
    common: bool,
    global: bool,
    typedef: bool,
    subtype: Option<TypeRef>,
    precision: Option<i128>,
    scale: Option<i128>,
}

impl ItemOpts {
    fn collect(options: &mut Options) -> Self {
        let mut o = ItemOpts {
            prefix: options.take_str(OptionKey::Prefix),
            tag: options.take_str(OptionKey::Tag),
            alignment: None,
            dimension_key: options.take_int(OptionKey::Dimension),
            length: options.take(OptionKey::Length),
            mask: options.flag(OptionKey::Mask),
            signed: options.flag(OptionKey::Signed),
            common: options.flag(OptionKey::Common),
            global: options.flag(OptionKey::Global),
            typedef: options.flag(OptionKey::Typedef),
            subtype: options.take_type(OptionKey::SubType),
            precision: options.take_int(OptionKey::Precision),
            scale: options.take_int(OptionKey::Scale),
        };
        if let Some(n) = options.take_int(OptionKey::BaseAlign) {
            o.alignment = Some(Alignment::Explicit(n.max(0) as u32));
        } else if options.flag(OptionKey::Align) {
            o.alignment = Some(Alignment::Natural);
        } else if options.flag(OptionKey::NoAlign) {
            o.alignment = Some(Alignment::NoAlign);
        }
        o
    }
}

pub struct Dispatcher {
    target: Target,
    check: bool,
    backends: Vec<Box<dyn Backend>>,
    conds: Conditionals,
    base_symbols: HashMap<String, i64>,
    module: Option<Module>,
    done: Vec<Module>,
    open: Vec<AggBuilder>,
    options: Options,
    params: Vec<Parameter>,
    literal: Option<Vec<String>>,
    /// Size and mask constants queued by aggregate closes, released
    /// when the outermost aggregate completes.
    derived: Vec<Constant>,
    faults: Vec<Fault>,
}

/// Invoke one callback on every language-enabled backend.
fn fan_out<F>(
    backends: &mut [Box<dyn Backend>],
    enabled: &[bool],
    mut f: F,
) -> Result<(), SdlError>
where
    F: FnMut(&mut dyn Backend) -> anyhow::Result<()>,
{
    for (index, backend) in backends.iter_mut().enumerate() {
        if enabled.get(index).copied().unwrap_or(true) {
            f(backend.as_mut()).map_err(|e| SdlError::Abort {
                detail: format!("backend failure: {e}"),
            })?;
        }
    }
    Ok(())
}

fn emit_tree(
    backend: &mut dyn Backend,
    module: &Module,
    agg: &Aggregate,
    depth: usize,
) -> anyhow::Result<()> {
    backend.aggregate_begin(module, agg, depth)?;
    for member in &agg.members {
        match member {
            Member::Field(f) => backend.member(module, agg, f, depth)?,
            Member::Aggregate(sub) => {
                emit_tree(backend, module, sub, depth + 1)?
            }
            Member::Comment(c) => backend.comment(module, c, depth + 1)?,
        }
    }
    backend.aggregate_end(module, agg, depth)
}

impl Dispatcher {
    pub fn new(
        target: Target,
        symbols: HashMap<String, i64>,
        backends: Vec<Box<dyn Backend>>,
    ) -> Self {
        let language_count = backends.len();
        Self {
            target,
            check: false,
            backends,
            conds: Conditionals::new(language_count),
            base_symbols: symbols,
            module: None,
            done: Vec::new(),
            open: Vec::new(),
            options: Options::default(),
            params: Vec::new(),
            literal: None,
            derived: Vec::new(),
            faults: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    pub fn fatal_count(&self) -> usize {
        self.faults
            .iter()
            .filter(|f| f.error.severity() == Severity::Fatal)
            .count()
    }

    pub fn modules(&self) -> &[Module] {
        &self.done
    }

    pub fn into_modules(self) -> Vec<Module> {
        self.done
    }

    pub fn in_aggregate(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    pub fn processing(&self) -> bool {
        self.conds.processing()
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeRef> {
        self.module.as_ref()?.lookup_type(name)
    }

    pub fn local_value(&self, name: &str) -> Option<i128> {
        self.module.as_ref()?.local(name)
    }

    fn record(&mut self, loc: SourceLocation, err: SdlError) -> SdlError {
        self.faults.push(Fault {
            error: err.clone(),
            line: (loc.first_line > 0).then_some(loc.first_line),
            aggregates: self
                .open
                .iter()
                .map(|b| b.agg.id.clone())
                .collect(),
        });
        err
    }

    fn fail(
        &mut self,
        loc: SourceLocation,
        err: SdlError,
    ) -> Result<(), SdlError> {
        Err(self.record(loc, err))
    }

    /// Record a caller-side fault (the parser's syntax errors flow in
    /// here); only fatal kinds propagate.
    pub fn report(
        &mut self,
        loc: SourceLocation,
        err: SdlError,
    ) -> Result<(), SdlError> {
        let err = self.record(loc, err);
        match err.severity() {
            Severity::Fatal => Err(err),
            Severity::Recoverable => Ok(()),
        }
    }

    fn lookup_symbol(&self, name: &str) -> Option<i64> {
        self.module
            .as_ref()
            .and_then(|m| m.symbol(name))
            .or_else(|| self.base_symbols.get(name).copied())
    }

    // ---- module boundaries -------------------------------------------

    pub fn start_module(
        &mut self,
        loc: SourceLocation,
        name: &str,
        ident: Option<&str>,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        if self.module.is_some() {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "module",
                },
            );
        }
        let module = Module::new(
            name.to_string(),
            ident.map(str::to_string),
            self.base_symbols.clone(),
        );
        fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
            b.module_begin(&module)
        })
        .map_err(|e| self.record(loc, e))?;
        self.module = Some(module);
        self.options.clear();
        Ok(())
    }

    pub fn end_module(
        &mut self,
        loc: SourceLocation,
        name: Option<&str>,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            return Ok(());
        }
        let Some(mut module) = self.module.take() else {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "end-module",
                },
            );
        };
        let mut deferred = None;
        if let Some(found) = name {
            if found != module.name {
                let err = SdlError::MatchEndName {
                    expected: module.name.clone(),
                    found: found.to_string(),
                };
                self.record(loc, err.clone());
                deferred = Some(err);
            }
        }
        if !self.open.is_empty() {
            self.open.clear();
            let err = SdlError::InvalidState {
                directive: "end-module inside aggregate",
            };
            self.record(loc, err.clone());
            deferred = deferred.or(Some(err));
        }
        let result =
            fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
                b.module_end(&module)
            });
        module.clear_tables();
        self.done.push(module);
        self.options.clear();
        self.params.clear();
        self.literal = None;
        self.derived.clear();
        if let Err(e) = result {
            return self.fail(loc, e);
        }
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ---- declares and items ------------------------------------------

    pub fn declare(
        &mut self,
        loc: SourceLocation,
        id: &str,
        base: TypeRef,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        let prefix = self.options.take_str(OptionKey::Prefix);
        let explicit_tag = self.options.take_str(OptionKey::Tag);
        self.options.clear();
        if self.module.is_none() {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "declare",
                },
            );
        }
        let duplicate = self
            .module
            .as_ref()
            .map(|m| m.declares.iter().any(|d| d.id == id))
            .unwrap_or(false);
        if duplicate {
            return self.fail(
                loc,
                SdlError::DuplicateId {
                    name: id.to_string(),
                },
            );
        }
        let (tag, size, signed) = {
            let m = self.module.as_ref().unwrap();
            (
                resolve_tag(m, explicit_tag.as_deref(), base, id),
                type_size(m, &self.target, base),
                type_signed(m, base),
            )
        };
        let module = self.module.as_mut().unwrap();
        let type_id = module.issue_declare_id();
        module.declares.push(Declare {
            id: id.to_string(),
            type_id,
            prefix,
            tag,
            base,
            signed,
            size,
        });
        Ok(())
    }

    pub fn dimension(
        &mut self,
        loc: SourceLocation,
        lbound: i64,
        hbound: i64,
    ) -> Result<usize, SdlError> {
        if !self.conds.processing() {
            return Ok(0);
        }
        if self.module.is_none() {
            return Err(self.record(
                loc,
                SdlError::InvalidState {
                    directive: "dimension",
                },
            ));
        }
        let module = self.module.as_mut().unwrap();
        Ok(module.add_dimension(Dimension { lbound, hbound }))
    }

    pub fn item(
        &mut self,
        loc: SourceLocation,
        id: &str,
        ty: TypeRef,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        if self.module.is_none() {
            self.options.clear();
            return self.fail(
                loc,
                SdlError::InvalidState { directive: "item" },
            );
        }
        if self.open.is_empty() {
            self.top_item(loc, id, ty)
        } else {
            self.member_item(loc, id, ty)
        }
    }

    /// Based-pointer rule: an address-family item whose subtype names
    /// an aggregate requires that aggregate to be based.
    fn check_based(
        &self,
        ty: TypeRef,
        subtype: Option<TypeRef>,
    ) -> Option<SdlError> {
        let module = self.module.as_ref()?;
        let kind = base_scalar(module, ty)?;
        if !kind.is_address() {
            return None;
        }
        let TypeRef::Named(sub_id) = subtype? else {
            return None;
        };
        let agg = module.aggregate_by_id(sub_id)?;
        if agg.based_name.is_none() {
            return Some(SdlError::AddressObjectNotBased {
                name: agg.id.clone(),
            });
        }
        None
    }

    fn top_item(
        &mut self,
        loc: SourceLocation,
        id: &str,
        ty: TypeRef,
    ) -> Result<(), SdlError> {
        let mut o = ItemOpts::collect(&mut self.options);
        self.options.clear();
        let mut deferred = None;

        let mut length = None;
        match o.length.take() {
            Some(OptValue::Int(n)) => length = Some(n.max(0) as u32),
            Some(OptValue::Star) => {
                let err = SdlError::InvalidUnknownLength {
                    name: id.to_string(),
                };
                self.record(loc, err.clone());
                deferred = Some(err);
            }
            _ => {}
        }
        if let Some(err) = self.check_based(ty, o.subtype) {
            self.record(loc, err.clone());
            deferred = deferred.or(Some(err));
        }
        let duplicate = self
            .module
            .as_ref()
            .map(|m| m.items.iter().any(|i| i.id == id))
            .unwrap_or(false);
        if duplicate {
            return self.fail(
                loc,
                SdlError::DuplicateId {
                    name: id.to_string(),
                },
            );
        }

        let (tag, size, signed, dimension, kind) = {
            let m = self.module.as_ref().unwrap();
            (
                resolve_tag(m, o.tag.as_deref(), ty, id),
                type_size(m, &self.target, ty),
                o.signed || type_signed(m, ty),
                o.dimension_key
                    .and_then(|k| m.dimension(k.max(0) as usize)),
                base_scalar(m, ty),
            )
        };
        if kind.map(|k| k.is_char()).unwrap_or(false) && length.is_none()
        {
            length = Some(1);
        }
        let precision = o
            .precision
            .map(|p| (p.max(0) as u32, o.scale.unwrap_or(0).max(0) as u32));

        let module = self.module.as_mut().unwrap();
        let type_id = module.issue_item_id();
        let item = Item {
            id: id.to_string(),
            type_id,
            prefix: o.prefix,
            tag,
            type_ref: ty,
            signed,
            size,
            alignment: o.alignment,
            dimension,
            common: o.common,
            global: o.global,
            typedef: o.typedef,
            length,
            precision,
            subtype: o.subtype,
        };
        module.items.push(item);
        let module = self.module.as_ref().unwrap();
        let item_ref = module.items.last().unwrap();
        fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
            b.item(module, item_ref)
        })
        .map_err(|e| self.record(loc, e))?;
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn member_item(
        &mut self,
        loc: SourceLocation,
        id: &str,
        ty: TypeRef,
    ) -> Result<(), SdlError> {
        let mut o = ItemOpts::collect(&mut self.options);
        self.options.clear();
        let mut deferred = None;

        let (tag, size, type_signed_default, dimension, kind) = {
            let m = self.module.as_ref().unwrap();
            (
                resolve_tag(m, o.tag.as_deref(), ty, id),
                type_size(m, &self.target, ty),
                type_signed(m, ty),
                o.dimension_key
                    .and_then(|k| m.dimension(k.max(0) as usize)),
                base_scalar(m, ty),
            )
        };
        let is_bitfield = kind.map(|k| k.is_bitfield()).unwrap_or(false);
        let explicit_host = kind
            .map(|k| k.bitfield_host_bytes().is_some())
            .unwrap_or(false);

        let mut length = None;
        let mut bit_length = None;
        match o.length.take() {
            Some(OptValue::Int(n)) => {
                if is_bitfield {
                    bit_length = Some(n.max(0) as u32);
                } else {
                    length = Some(n.max(0) as u32);
                }
            }
            Some(OptValue::Star) => {
                let err = SdlError::InvalidUnknownLength {
                    name: id.to_string(),
                };
                self.record(loc, err.clone());
                deferred = Some(err);
            }
            _ => {}
        }
        if is_bitfield {
            bit_length = bit_length.or(Some(1));
        } else if kind.map(|k| k.is_char()).unwrap_or(false)
            && length.is_none()
        {
            length = Some(1);
        }
        if let Some(err) = self.check_based(ty, o.subtype) {
            self.record(loc, err.clone());
            deferred = deferred.or(Some(err));
        }

        let field = Field {
            id: id.to_string(),
            prefix: o.prefix,
            tag,
            type_ref: ty,
            signed: if is_bitfield {
                o.signed
            } else {
                o.signed || type_signed_default
            },
            size: if is_bitfield {
                kind.and_then(|k| k.bitfield_host_bytes()).unwrap_or(1)
            } else {
                size
            },
            alignment: o.alignment,
            dimension,
            length,
            precision: o.precision.map(|p| {
                (p.max(0) as u32, o.scale.unwrap_or(0).max(0) as u32)
            }),
            subtype: o.subtype,
            offset: 0,
            bit_length,
            bit_offset: None,
            mask: o.mask,
            explicit_host,
            filler: false,
        };
        let target = self.target;
        let settle = self
            .open
            .last_mut()
            .expect("member outside aggregate")
            .push(&target, Member::Field(field));
        if let Err(err) = settle {
            self.record(loc, err.clone());
            deferred = deferred.or(Some(err));
        }
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ---- aggregates --------------------------------------------------

    pub fn aggregate_begin(
        &mut self,
        loc: SourceLocation,
        id: &str,
        kind: AggregateKind,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        if self.module.is_none() {
            self.options.clear();
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "aggregate",
                },
            );
        }
        let target = self.target;
        if let Some(parent) = self.open.last_mut() {
            if let Err(err) = parent.settle_pending(&target) {
                self.record(loc, err);
            }
        }

        let mut o = ItemOpts::collect(&mut self.options);
        let based_name = self.options.take_str(OptionKey::Based);
        let marker = self.options.take_str(OptionKey::Marker);
        let origin_name = self.options.take_str(OptionKey::Origin);
        self.options.clear();

        let scalar = if kind.is_union() {
            ScalarKind::Union
        } else {
            ScalarKind::Structure
        };
        let (tag, dimension, duplicate) = {
            let m = self.module.as_ref().unwrap();
            (
                resolve_tag(
                    m,
                    o.tag.as_deref(),
                    TypeRef::Scalar(scalar),
                    id,
                ),
                o.dimension_key
                    .take()
                    .and_then(|k| m.dimension(k.max(0) as usize)),
                self.open.is_empty()
                    && m.aggregates.iter().any(|a| a.id == id),
            )
        };
        if duplicate {
            self.record(
                loc,
                SdlError::DuplicateId {
                    name: id.to_string(),
                },
            );
        }
        let module = self.module.as_mut().unwrap();
        let type_id = module.issue_aggregate_id();
        let agg = Aggregate {
            id: id.to_string(),
            type_id,
            prefix: o.prefix.take(),
            marker,
            tag,
            based_name,
            kind,
            alignment: o.alignment,
            origin_name,
            origin_member: None,
            dimension,
            common: o.common,
            global: o.global,
            typedef: o.typedef,
            offset: 0,
            size: 0,
            members: Vec::new(),
        };
        self.open.push(AggBuilder::new(agg));
        Ok(())
    }

    pub fn aggregate_end(
        &mut self,
        loc: SourceLocation,
        name: Option<&str>,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        self.options.clear();
        let Some(mut builder) = self.open.pop() else {
            return self.fail(
                loc,
                SdlError::InvalidState { directive: "end" },
            );
        };
        let mut deferred = None;
        if let Some(found) = name {
            if found != builder.agg.id {
                let err = SdlError::MatchEndName {
                    expected: builder.agg.id.clone(),
                    found: found.to_string(),
                };
                self.record(loc, err.clone());
                deferred = Some(err);
            }
        }
        let target = self.target;
        if let Err(err) = builder.close(&target) {
            self.record(loc, err.clone());
            deferred = deferred.or(Some(err));
        }
        if self.check {
            if let Err(err) = builder.agg.validate() {
                self.record(loc, err.clone());
                deferred = deferred.or(Some(err));
            }
        }
        let agg = builder.finish();
        self.queue_derived(&agg);

        if let Some(parent) = self.open.last_mut() {
            parent.pending = Some(Member::Aggregate(Box::new(agg)));
            return match deferred {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        // outermost close: register, emit the tree, then release the
        // queued derived constants
        let module = self.module.as_mut().unwrap();
        module.aggregates.push(agg);
        let module = self.module.as_ref().unwrap();
        let agg_ref = module.aggregates.last().unwrap();
        let emit =
            fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
                emit_tree(b, module, agg_ref, 0)
            });
        if let Err(e) = emit {
            return self.fail(loc, e);
        }
        let derived = std::mem::take(&mut self.derived);
        let module = self.module.as_ref().unwrap();
        let emit =
            fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
                for constant in &derived {
                    b.constant(module, constant)?;
                }
                Ok(())
            });
        self.module
            .as_mut()
            .unwrap()
            .constants
            .extend(derived);
        if let Err(e) = emit {
            return self.fail(loc, e);
        }
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Aggregate-size constant plus per-bitfield size and mask
    /// constants, tag case following the host id.
    fn queue_derived(&mut self, agg: &Aggregate) {
        for member in &agg.members {
            let Member::Field(f) = member else { continue };
            let Some(bits) = f.bit_length else { continue };
            if f.filler {
                continue;
            }
            self.derived.push(Constant {
                id: f.id.clone(),
                prefix: f.prefix.clone(),
                tag: cased_tag("S", &f.id),
                comment: None,
                type_name: None,
                value: ConstantValue::Num {
                    value: bits as i128,
                    radix: Radix::Decimal,
                },
                size: 4,
            });
            if f.mask {
                let offset = f.bit_offset.unwrap_or(0);
                self.derived.push(Constant {
                    id: f.id.clone(),
                    prefix: f.prefix.clone(),
                    tag: cased_tag("M", &f.id),
                    comment: None,
                    type_name: None,
                    value: ConstantValue::Num {
                        value: mask_value(bits, offset),
                        radix: Radix::Hex,
                    },
                    size: f.size,
                });
            }
        }
        self.derived.push(Constant {
            id: agg.id.clone(),
            prefix: agg.prefix.clone(),
            tag: cased_tag("S", &agg.id),
            comment: None,
            type_name: None,
            value: ConstantValue::Num {
                value: agg.size as i128,
                radix: Radix::Decimal,
            },
            size: 4,
        });
    }

    // ---- constants and enumerations ----------------------------------

    pub fn constant_list(
        &mut self,
        loc: SourceLocation,
        names: &str,
        value: Value,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        let counter = self.options.take_str(OptionKey::Counter);
        let increment = self.options.take_int(OptionKey::Increment);
        let radix = self
            .options
            .take_radix(OptionKey::Radix)
            .unwrap_or(Radix::Decimal);
        let enumerate = self.options.take_str(OptionKey::Enumerate);
        let typedef = self.options.flag(OptionKey::Typedef);
        let prefix = self.options.take_str(OptionKey::Prefix);
        let explicit_tag = self.options.take_str(OptionKey::Tag);
        let type_name = self.options.take_str(OptionKey::TypeName);
        self.options.clear();
        if self.module.is_none() {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "constant",
                },
            );
        }

        let entries = parse_constant_names(names);
        if entries.is_empty() {
            return self.fail(
                loc,
                SdlError::Parse {
                    detail: "constant list names no constants".to_string(),
                },
            );
        }

        if let Some(enum_id) = enumerate {
            return self.build_enumeration(
                loc,
                enum_id,
                entries,
                value,
                increment,
                typedef,
                prefix,
                explicit_tag,
            );
        }

        let mut deferred = None;
        let mut new_constants = Vec::with_capacity(entries.len());
        {
            let module = self.module.as_ref().unwrap();
            let step = increment.unwrap_or(0);
            let start = value.as_int();
            for (index, (id, comment)) in entries.iter().enumerate() {
                if module.constants.iter().any(|c| &c.id == id)
                    || new_constants
                        .iter()
                        .any(|c: &Constant| &c.id == id)
                {
                    deferred = deferred.or(Some(SdlError::DuplicateId {
                        name: id.clone(),
                    }));
                    continue;
                }
                let tag = resolve_tag(
                    module,
                    explicit_tag.as_deref(),
                    TypeRef::Constant,
                    id,
                );
                let value = match (&value, start) {
                    (Value::Str(s), _) => ConstantValue::Str(s.clone()),
                    (_, Some(v)) => ConstantValue::Num {
                        value: v + step * index as i128,
                        radix,
                    },
                    _ => ConstantValue::Num { value: 0, radix },
                };
                new_constants.push(Constant {
                    id: id.clone(),
                    prefix: prefix.clone(),
                    tag,
                    comment: comment.clone(),
                    type_name: type_name.clone(),
                    value,
                    size: 4,
                });
            }
        }
        if let Some(err) = deferred.clone() {
            self.record(loc, err);
        }
        let module = self.module.as_mut().unwrap();
        if let Some(local) = counter {
            for constant in &new_constants {
                if let ConstantValue::Num { value, .. } = constant.value {
                    module.set_local(&local, value);
                }
            }
        }
        module.constants.extend(new_constants.iter().cloned());
        let module = self.module.as_ref().unwrap();
        let emit =
            fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
                for constant in &new_constants {
                    b.constant(module, constant)?;
                }
                Ok(())
            });
        if let Err(e) = emit {
            return self.fail(loc, e);
        }
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_enumeration(
        &mut self,
        loc: SourceLocation,
        id: String,
        entries: Vec<(String, Option<String>)>,
        value: Value,
        increment: Option<i128>,
        typedef: bool,
        prefix: Option<String>,
        explicit_tag: Option<String>,
    ) -> Result<(), SdlError> {
        let duplicate = self
            .module
            .as_ref()
            .map(|m| m.enums.iter().any(|e| e.id == id))
            .unwrap_or(false);
        if duplicate {
            return self.fail(loc, SdlError::DuplicateId { name: id });
        }
        let tag = {
            let m = self.module.as_ref().unwrap();
            resolve_tag(
                m,
                explicit_tag.as_deref(),
                TypeRef::Scalar(ScalarKind::Enum),
                &id,
            )
        };
        // enumerations auto-step by one unless told otherwise
        let step = increment.unwrap_or(1);
        let start = value.as_int().unwrap_or(0);
        let members = entries
            .into_iter()
            .enumerate()
            .map(|(index, (member_id, comment))| EnumMember {
                id: member_id,
                value: start + step * index as i128,
                explicit: index == 0,
                comment,
            })
            .collect();
        let module = self.module.as_mut().unwrap();
        let type_id = module.issue_enum_id();
        module.enums.push(Enumeration {
            id,
            type_id,
            prefix,
            tag,
            typedef,
            members,
        });
        let module = self.module.as_ref().unwrap();
        let def = module.enums.last().unwrap();
        fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
            b.enumeration(module, def)
        })
        .map_err(|e| self.record(loc, e))?;
        Ok(())
    }

    // ---- comments and literal passthrough ----------------------------

    pub fn comment(
        &mut self,
        loc: SourceLocation,
        text: &str,
        position: CommentPosition,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            return Ok(());
        }
        let target = self.target;
        if let Some(builder) = self.open.last_mut() {
            let settle = builder.settle_pending(&target);
            builder.agg.members.push(Member::Comment(Comment {
                text: text.to_string(),
                position,
            }));
            if let Err(err) = settle {
                return self.fail(loc, err);
            }
            return Ok(());
        }
        if self.module.is_none() {
            return Ok(());
        }
        let module = self.module.as_ref().unwrap();
        let comment = Comment {
            text: text.to_string(),
            position,
        };
        fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
            b.comment(module, &comment, 0)
        })
        .map_err(|e| self.record(loc, e))?;
        Ok(())
    }

    pub fn literal_begin(
        &mut self,
        loc: SourceLocation,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            return Ok(());
        }
        if self.literal.is_some() {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "literal",
                },
            );
        }
        self.literal = Some(Vec::new());
        Ok(())
    }

    pub fn literal_line(
        &mut self,
        loc: SourceLocation,
        line: &str,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            return Ok(());
        }
        match self.literal.as_mut() {
            Some(queue) => {
                queue.push(line.to_string());
                Ok(())
            }
            None => self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "literal line",
                },
            ),
        }
    }

    pub fn literal_end(
        &mut self,
        loc: SourceLocation,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.literal = None;
            return Ok(());
        }
        let Some(queue) = self.literal.take() else {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "end-literal",
                },
            );
        };
        if self.module.is_none() {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "end-literal",
                },
            );
        }
        let module = self.module.as_ref().unwrap();
        fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
            for line in &queue {
                b.literal_line(module, line)?;
            }
            Ok(())
        })
        .map_err(|e| self.record(loc, e))?;
        Ok(())
    }

    // ---- entries -----------------------------------------------------

    pub fn parameter(
        &mut self,
        loc: SourceLocation,
        ty: TypeRef,
        mechanism: Passing,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            return Ok(());
        }
        let name = self.options.take_str(OptionKey::Named);
        let input = self.options.flag(OptionKey::In);
        let output = self.options.flag(OptionKey::Out);
        let default = match self.options.take(OptionKey::Default) {
            Some(OptValue::Val(v)) => Some(v),
            Some(OptValue::Int(v)) => Some(Value::Int(v)),
            _ => None,
        };
        let dimension_key = self.options.take_int(OptionKey::Dimension);
        let type_name = self.options.take_str(OptionKey::TypeName);
        let optional = self.options.flag(OptionKey::Optional);
        let list = self.options.flag(OptionKey::List);
        let fill = self.options.flag(OptionKey::Fill);
        let length_opt = self.options.take(OptionKey::Length);
        self.options.clear();
        if self.module.is_none() {
            return self.fail(
                loc,
                SdlError::InvalidState {
                    directive: "parameter",
                },
            );
        }
        let dimension = {
            let m = self.module.as_ref().unwrap();
            dimension_key.and_then(|k| m.dimension(k.max(0) as usize))
        };
        let (length, star_length) = match length_opt {
            Some(OptValue::Int(n)) => (Some(n.max(0) as u32), false),
            // star length is legal exactly here
            Some(OptValue::Star) => (None, true),
            _ => (None, false),
        };
        self.params.push(Parameter {
            name,
            type_ref: ty,
            mechanism,
            input,
            output,
            default,
            dimension,
            type_name,
            optional,
            list,
            fill,
            length,
            star_length,
        });
        Ok(())
    }

    pub fn entry(
        &mut self,
        loc: SourceLocation,
        id: &str,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            self.options.clear();
            self.params.clear();
            return Ok(());
        }
        let alias = self.options.take_str(OptionKey::Alias);
        let linkage = self.options.take_str(OptionKey::Linkage);
        let type_name = self.options.take_str(OptionKey::TypeName);
        let variable = self.options.flag(OptionKey::Variable);
        let returns_type = self.options.take_type(OptionKey::ReturnsType);
        let returns_named =
            self.options.take_str(OptionKey::ReturnsNamed);
        self.options.clear();
        if self.module.is_none() {
            self.params.clear();
            return self.fail(
                loc,
                SdlError::InvalidState { directive: "entry" },
            );
        }
        let duplicate = self
            .module
            .as_ref()
            .map(|m| m.entries.iter().any(|e| e.id == id))
            .unwrap_or(false);
        if duplicate {
            self.params.clear();
            return self.fail(
                loc,
                SdlError::DuplicateId {
                    name: id.to_string(),
                },
            );
        }
        let returns = returns_type.map(|ty| {
            let signed = {
                let m = self.module.as_ref().unwrap();
                type_signed(m, ty)
            };
            ReturnSpec {
                type_ref: ty,
                signed,
                named: returns_named.clone(),
            }
        });
        let entry = Entry {
            id: id.to_string(),
            alias,
            linkage,
            type_name,
            variable,
            returns,
            params: std::mem::take(&mut self.params),
        };
        let module = self.module.as_mut().unwrap();
        module.entries.push(entry);
        let module = self.module.as_ref().unwrap();
        let entry_ref = module.entries.last().unwrap();
        fan_out(&mut self.backends, self.conds.lang_enabled(), |b| {
            b.entry(module, entry_ref)
        })
        .map_err(|e| self.record(loc, e))?;
        Ok(())
    }

    // ---- conditional processing --------------------------------------

    pub fn if_symbol(
        &mut self,
        loc: SourceLocation,
        name: &str,
    ) -> Result<(), SdlError> {
        let value = self.lookup_symbol(name);
        match self.conds.if_symbol(value.unwrap_or(0) != 0) {
            Err(err) => self.fail(loc, err),
            Ok(()) if value.is_none() => self.fail(
                loc,
                SdlError::SymbolNotDefined {
                    name: name.to_string(),
                },
            ),
            Ok(()) => Ok(()),
        }
    }

    pub fn else_if_symbol(
        &mut self,
        loc: SourceLocation,
        name: &str,
    ) -> Result<(), SdlError> {
        let value = self.lookup_symbol(name);
        match self.conds.else_if_symbol(value.unwrap_or(0) != 0) {
            Err(err) => self.fail(loc, err),
            Ok(()) if value.is_none() => self.fail(
                loc,
                SdlError::SymbolNotDefined {
                    name: name.to_string(),
                },
            ),
            Ok(()) => Ok(()),
        }
    }

    pub fn else_branch(
        &mut self,
        loc: SourceLocation,
    ) -> Result<(), SdlError> {
        match self.conds.else_branch() {
            Err(err) => self.fail(loc, err),
            Ok(()) => Ok(()),
        }
    }

    pub fn end_if_symbol(
        &mut self,
        loc: SourceLocation,
    ) -> Result<(), SdlError> {
        match self.conds.end_if_symbol() {
            Err(err) => self.fail(loc, err),
            Ok(()) => Ok(()),
        }
    }

    pub fn if_language(
        &mut self,
        loc: SourceLocation,
        name: &str,
    ) -> Result<(), SdlError> {
        let index = self
            .backends
            .iter()
            .position(|b| b.language().eq_ignore_ascii_case(name));
        match self.conds.if_language(index) {
            Err(err) => self.fail(loc, err),
            Ok(()) => Ok(()),
        }
    }

    pub fn end_if_language(
        &mut self,
        loc: SourceLocation,
        _name: Option<&str>,
    ) -> Result<(), SdlError> {
        match self.conds.end_if_language() {
            Err(err) => self.fail(loc, err),
            Ok(()) => Ok(()),
        }
    }

    // ---- options -----------------------------------------------------

    pub fn option(
        &mut self,
        loc: SourceLocation,
        key: OptionKey,
        value: OptValue,
    ) -> Result<(), SdlError> {
        if !self.conds.processing() {
            return Ok(());
        }
        if self.open.is_empty() {
            self.options.push(key, value);
            return Ok(());
        }
        self.apply_aggregate_option(loc, key, value)
    }

    /// Inside an aggregate, options attach to the previously completed
    /// member; right after the open they configure the aggregate
    /// header itself.
    fn apply_aggregate_option(
        &mut self,
        loc: SourceLocation,
        key: OptionKey,
        value: OptValue,
    ) -> Result<(), SdlError> {
        let dimension = match (key, &value) {
            (OptionKey::Dimension, OptValue::Int(k)) => self
                .module
                .as_ref()
                .and_then(|m| m.dimension((*k).max(0) as usize)),
            _ => None,
        };
        let mut deferred = None;
        let mut subtype_check = None;
        {
            let builder = self.open.last_mut().unwrap();
            match builder.pending.as_mut() {
                Some(Member::Field(f)) => match (key, value) {
                    (OptionKey::Prefix, OptValue::Str(s)) => {
                        f.prefix = Some(s)
                    }
                    (OptionKey::Tag, OptValue::Str(s)) => {
                        f.tag = apply_tag_case(&s, &f.id)
                    }
                    (OptionKey::BaseAlign, OptValue::Int(n)) => {
                        f.alignment =
                            Some(Alignment::Explicit(n.max(0) as u32))
                    }
                    (OptionKey::Align, _) => {
                        f.alignment = Some(Alignment::Natural)
                    }
                    (OptionKey::NoAlign, _) => {
                        f.alignment = Some(Alignment::NoAlign)
                    }
                    (OptionKey::Dimension, _) => f.dimension = dimension,
                    (OptionKey::Length, OptValue::Int(n)) => {
                        if f.is_bitfield() {
                            f.bit_length = Some(n.max(0) as u32);
                        } else {
                            f.length = Some(n.max(0) as u32);
                        }
                    }
                    (OptionKey::Length, OptValue::Star) => {
                        deferred = Some(SdlError::InvalidUnknownLength {
                            name: f.id.clone(),
                        });
                    }
                    (OptionKey::Mask, _) => f.mask = true,
                    (OptionKey::Signed, _) => f.signed = true,
                    (OptionKey::Precision, OptValue::Int(p)) => {
                        let scale =
                            f.precision.map(|(_, s)| s).unwrap_or(0);
                        f.precision = Some((p.max(0) as u32, scale));
                    }
                    (OptionKey::Scale, OptValue::Int(s)) => {
                        let precision =
                            f.precision.map(|(p, _)| p).unwrap_or(1);
                        f.precision = Some((precision, s.max(0) as u32));
                    }
                    (OptionKey::SubType, OptValue::Type(t)) => {
                        f.subtype = Some(t);
                        subtype_check = Some((f.type_ref, t));
                    }
                    (key, _) => {
                        deferred = Some(SdlError::InvalidQualifier {
                            qualifier: format!("{key:?}"),
                        });
                    }
                },
                Some(Member::Aggregate(sub)) => match (key, value) {
                    (OptionKey::Prefix, OptValue::Str(s)) => {
                        sub.prefix = Some(s)
                    }
                    (OptionKey::Tag, OptValue::Str(s)) => {
                        sub.tag = apply_tag_case(&s, &sub.id)
                    }
                    (OptionKey::BaseAlign, OptValue::Int(n)) => {
                        sub.alignment =
                            Some(Alignment::Explicit(n.max(0) as u32))
                    }
                    (OptionKey::Align, _) => {
                        sub.alignment = Some(Alignment::Natural)
                    }
                    (OptionKey::NoAlign, _) => {
                        sub.alignment = Some(Alignment::NoAlign)
                    }
                    (OptionKey::Dimension, _) => {
                        sub.dimension = dimension
                    }
                    (OptionKey::Marker, OptValue::Str(s)) => {
                        sub.marker = Some(s)
                    }
                    (key, _) => {
                        deferred = Some(SdlError::InvalidQualifier {
                            qualifier: format!("{key:?}"),
                        });
                    }
                },
                Some(Member::Comment(_)) | None => {
                    let agg = &mut builder.agg;
                    match (key, value) {
                        (OptionKey::Prefix, OptValue::Str(s)) => {
                            agg.prefix = Some(s)
                        }
                        (OptionKey::Tag, OptValue::Str(s)) => {
                            agg.tag = apply_tag_case(&s, &agg.id)
                        }
                        (OptionKey::BaseAlign, OptValue::Int(n)) => {
                            agg.alignment =
                                Some(Alignment::Explicit(n.max(0) as u32))
                        }
                        (OptionKey::Align, _) => {
                            agg.alignment = Some(Alignment::Natural)
                        }
                        (OptionKey::NoAlign, _) => {
                            agg.alignment = Some(Alignment::NoAlign)
                        }
                        (OptionKey::Dimension, _) => {
                            agg.dimension = dimension
                        }
                        (OptionKey::Based, OptValue::Str(s)) => {
                            agg.based_name = Some(s)
                        }
                        (OptionKey::Marker, OptValue::Str(s)) => {
                            agg.marker = Some(s)
                        }
                        (OptionKey::Origin, OptValue::Str(s)) => {
                            agg.origin_name = Some(s.clone());
                            if agg.origin_member.is_none() {
                                agg.origin_member = agg
                                    .members
                                    .iter()
                                    .position(|m| m.name() == Some(&s));
                            }
                        }
                        (OptionKey::Common, _) => agg.common = true,
                        (OptionKey::Global, _) => agg.global = true,
                        (OptionKey::Typedef, _) => agg.typedef = true,
                        (key, _) => {
                            deferred =
                                Some(SdlError::InvalidQualifier {
                                    qualifier: format!("{key:?}"),
                                });
                        }
                    }
                }
            }
        }
        if let Some((ty, subtype)) = subtype_check {
            if let Some(err) = self.check_based(ty, Some(subtype)) {
                deferred = deferred.or(Some(err));
            }
        }
        match deferred {
            Some(err) => self.fail(loc, err),
            None => Ok(()),
        }
    }
}

fn cased_tag(tag: &str, host_id: &str) -> String {
    if is_all_lowercase(host_id) {
        tag.to_lowercase()
    } else {
        tag.to_string()
    }
}

fn apply_tag_case(tag: &str, host_id: &str) -> String {
    cased_tag(tag.trim_end_matches('_'), host_id)
}

/// Mask literal for a bitfield: `((2^length) - 1) << bit_offset`,
/// kept as a two's-complement bit pattern.
fn mask_value(length: u32, offset: u32) -> i128 {
    if length == 0 {
        return 0;
    }
    let ones = if length >= 128 {
        u128::MAX
    } else {
        (1u128 << length) - 1
    };
    (ones << offset.min(127)) as i128
}

/// Split a constant name list on commas, extracting per-item comments
/// written as `/* ... */` or `{ ... }`.
fn parse_constant_names(names: &str) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    for segment in names.split(',') {
        let mut name = String::new();
        let mut comment = None;
        let mut rest = segment;
        while let Some(open) = rest.find(['/', '{']) {
            let (before, tail) = rest.split_at(open);
            name.push_str(before);
            if let Some(inner) = tail.strip_prefix("/*") {
                match inner.find("*/") {
                    Some(close) => {
                        comment = Some(inner[..close].trim().to_string());
                        rest = &inner[close + 2..];
                    }
                    None => {
                        comment = Some(inner.trim().to_string());
                        rest = "";
                    }
                }
            } else if let Some(inner) = tail.strip_prefix('{') {
                match inner.find('}') {
                    Some(close) => {
                        comment = Some(inner[..close].trim().to_string());
                        rest = &inner[close + 1..];
                    }
                    None => {
                        comment = Some(inner.trim().to_string());
                        rest = "";
                    }
                }
            } else {
                // a stray '/', keep it in the name
                name.push('/');
                rest = &tail[1..];
            }
        }
        name.push_str(rest);
        let name = name.trim().to_string();
        if !name.is_empty() {
            out.push((name, comment));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::parse_constant_names;

    #[test]
    fn constant_names_split_on_commas() {
        let parsed = parse_constant_names("alpha, beta ,gamma");
        assert_eq!(
            parsed,
            vec![
                ("alpha".to_string(), None),
                ("beta".to_string(), None),
                ("gamma".to_string(), None),
            ]
        );
    }

    #[test]
    fn constant_names_extract_comments() {
        let parsed =
            parse_constant_names("a /* first */, b { second }, c");
        assert_eq!(
            parsed,
            vec![
                ("a".to_string(), Some("first".to_string())),
                ("b".to_string(), Some("second".to_string())),
                ("c".to_string(), None),
            ]
        );
    }
}
