//! C declaration emitter.

use std::io::Write;

use anyhow::Result;

use crate::model::aggregate::{Aggregate, Comment, Field};
use crate::model::constant::{Constant, ConstantValue};
use crate::model::entry::{Entry, Parameter, Passing};
use crate::model::enumeration::Enumeration;
use crate::model::item::Item;
use crate::model::module::Module;
use crate::model::scalar::ScalarKind;
use crate::model::{Dimension, Namespace, Radix, TypeRef, Value};

use super::{Backend, EmitConfig};

pub struct CBackend<W: Write> {
    out: W,
    cfg: EmitConfig,
}

impl<W: Write> CBackend<W> {
    pub fn new(out: W, cfg: EmitConfig) -> Self {
        Self { out, cfg }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn indent(&mut self, depth: usize) -> Result<()> {
        for _ in 0..depth {
            write!(self.out, "    ")?;
        }
        Ok(())
    }

    fn scalar_type(kind: ScalarKind, signed: bool) -> &'static str {
        use ScalarKind::*;
        match kind {
            Byte => {
                if signed {
                    "char"
                } else {
                    "unsigned char"
                }
            }
            Word => {
                if signed {
                    "short"
                } else {
                    "unsigned short"
                }
            }
            Long | Enum => {
                if signed {
                    "int"
                } else {
                    "unsigned int"
                }
            }
            Quad => {
                if signed {
                    "long long"
                } else {
                    "unsigned long long"
                }
            }
            Octa => {
                if signed {
                    "__int128"
                } else {
                    "unsigned __int128"
                }
            }
            SFloat | FFloat => "float",
            TFloat | DFloat | GFloat => "double",
            HFloat | XFloat => "long double",
            SFloatComplex | FFloatComplex => "float _Complex",
            TFloatComplex | DFloatComplex | GFloatComplex => {
                "double _Complex"
            }
            HFloatComplex | XFloatComplex => "long double _Complex",
            Decimal | Char | CharVary | CharStar => "char",
            Boolean => "unsigned char",
            Any => "void *",
            Void => "void",
            Bitfield | BitfieldByte | BitfieldWord | BitfieldLong
            | BitfieldQuad | BitfieldOcta => "unsigned int",
            Addr | AddrLong | AddrQuad | AddrHw | Ptr | PtrLong
            | PtrQuad | PtrHw => "void *",
            Structure => "struct",
            Union => "union",
            Entry => "void *",
        }
    }

    /// The C spelling of a type reference; pointer families defer to
    /// their subtype.
    fn type_text(
        &self,
        module: &Module,
        ty: TypeRef,
        signed: bool,
        subtype: Option<TypeRef>,
    ) -> String {
        match ty {
            TypeRef::Scalar(kind) if kind.is_address() => {
                match subtype {
                    Some(sub) => format!(
                        "{} *",
                        self.type_text(module, sub, signed, None)
                    ),
                    None => "void *".to_string(),
                }
            }
            TypeRef::Scalar(kind) => {
                Self::scalar_type(kind, signed).to_string()
            }
            TypeRef::Constant => "int".to_string(),
            TypeRef::Named(id) => match id.namespace() {
                Ok(Namespace::Scalar(kind)) => {
                    Self::scalar_type(kind, signed).to_string()
                }
                Ok(Namespace::Declare(_)) => match module.declare_by_id(id)
                {
                    Some(d) => {
                        self.type_text(module, d.base, d.signed, None)
                    }
                    None => "int".to_string(),
                },
                Ok(Namespace::Item(_)) => match module.item_by_id(id) {
                    Some(i) => self.type_text(
                        module,
                        i.type_ref,
                        i.signed,
                        i.subtype,
                    ),
                    None => "int".to_string(),
                },
                Ok(Namespace::Aggregate(_)) => {
                    match module.aggregate_by_id(id) {
                        Some(a) => format!(
                            "{} {}",
                            if a.kind.is_union() {
                                "union"
                            } else {
                                "struct"
                            },
                            self.struct_tag(a)
                        ),
                        None => "int".to_string(),
                    }
                }
                Ok(Namespace::Enum(_)) => match module.enum_by_id(id) {
                    Some(e) if e.typedef => self
                        .cfg
                        .entity_name(e.prefix.as_deref(), &e.tag, &e.id),
                    Some(e) => format!(
                        "enum {}",
                        self.cfg.entity_name(
                            e.prefix.as_deref(),
                            &e.tag,
                            &e.id
                        )
                    ),
                    None => "int".to_string(),
                },
                Err(_) => "int".to_string(),
            },
        }
    }

    fn struct_tag(&self, agg: &Aggregate) -> String {
        match &agg.marker {
            Some(marker) => marker.clone(),
            None => format!("_{}", agg.id),
        }
    }

    fn dimension_suffix(dim: Option<Dimension>) -> String {
        match dim {
            Some(d) => format!("[{}]", d.count()),
            None => String::new(),
        }
    }

    fn constant_text(value: &ConstantValue, size: u32) -> String {
        match value {
            ConstantValue::Num { value, radix } => match radix {
                Radix::Decimal => format!("{value}"),
                Radix::Hex | Radix::Binary => {
                    let width = (size as usize * 2).max(1);
                    format!("0x{:0width$X}", *value as u128 & mask(size))
                }
                Radix::Octal => {
                    format!("0{:o}", *value as u128 & mask(size))
                }
            },
            ConstantValue::Str(s) => {
                format!("\"{}\"", s.replace('"', "\\\""))
            }
        }
    }
}

/// All-ones pattern for a display width; zero width means no masking.
fn mask(size_bytes: u32) -> u128 {
    match size_bytes {
        0 | 16.. => u128::MAX,
        n => (1u128 << (n * 8)) - 1,
    }
}

impl<W: Write> Backend for CBackend<W> {
    fn language(&self) -> &str {
        "c"
    }

    fn module_begin(&mut self, module: &Module) -> Result<()> {
        if self.cfg.header {
            writeln!(self.out, "/*** MODULE {} ***/", module.name)?;
            if let Some(ident) = &module.ident {
                writeln!(self.out, "/*** IDENT {ident} ***/")?;
            }
            if let Some(copy) = self.cfg.copy_text.clone() {
                for line in copy.lines() {
                    writeln!(self.out, "/* {line} */")?;
                }
            }
        }
        let guard = module.name.to_uppercase().replace('-', "_");
        writeln!(self.out, "#ifndef __SDL_{guard}_H")?;
        writeln!(self.out, "#define __SDL_{guard}_H 1")?;
        Ok(())
    }

    fn module_end(&mut self, module: &Module) -> Result<()> {
        let guard = module.name.to_uppercase().replace('-', "_");
        writeln!(self.out, "#endif /* __SDL_{guard}_H */")?;
        self.out.flush()?;
        Ok(())
    }

    fn item(&mut self, module: &Module, item: &Item) -> Result<()> {
        let ty = self.type_text(
            module,
            item.type_ref,
            item.signed,
            item.subtype,
        );
        let name = self.cfg.entity_name(
            item.prefix.as_deref(),
            &item.tag,
            &item.id,
        );
        let mut suffix = Self::dimension_suffix(item.dimension);
        if let Some(len) = item.length {
            if len > 1 {
                suffix.push_str(&format!("[{len}]"));
            }
        }
        if item.typedef {
            writeln!(self.out, "typedef {ty} {name}{suffix};")?;
        } else if item.common {
            writeln!(self.out, "extern {ty} {name}{suffix};")?;
        } else {
            writeln!(self.out, "{ty} {name}{suffix};")?;
        }
        Ok(())
    }

    fn constant(
        &mut self,
        _module: &Module,
        constant: &Constant,
    ) -> Result<()> {
        let name = self.cfg.constant_name(
            constant.prefix.as_deref(),
            &constant.id,
            &constant.tag,
        );
        write!(
            self.out,
            "#define {name} {}",
            Self::constant_text(&constant.value, constant.size)
        )?;
        if self.cfg.comments {
            if let Some(comment) = &constant.comment {
                write!(self.out, " /* {comment} */")?;
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn enumeration(
        &mut self,
        _module: &Module,
        def: &Enumeration,
    ) -> Result<()> {
        let name = self.cfg.entity_name(
            def.prefix.as_deref(),
            &def.tag,
            &def.id,
        );
        if def.typedef {
            writeln!(self.out, "typedef enum {{")?;
        } else {
            writeln!(self.out, "enum {name} {{")?;
        }
        for member in &def.members {
            let member_name = self
                .cfg
                .entity_name(def.prefix.as_deref(), "", &member.id);
            write!(self.out, "    {member_name} = {},", member.value)?;
            if self.cfg.comments {
                if let Some(comment) = &member.comment {
                    write!(self.out, " /* {comment} */")?;
                }
            }
            writeln!(self.out)?;
        }
        if def.typedef {
            writeln!(self.out, "}} {name};")?;
        } else {
            writeln!(self.out, "}};")?;
        }
        Ok(())
    }

    fn aggregate_begin(
        &mut self,
        _module: &Module,
        agg: &Aggregate,
        depth: usize,
    ) -> Result<()> {
        self.indent(depth)?;
        let keyword = if agg.kind.is_union() {
            "union"
        } else {
            "struct"
        };
        if depth == 0 {
            if agg.typedef {
                writeln!(
                    self.out,
                    "typedef {keyword} {} {{",
                    self.struct_tag(agg)
                )?;
            } else {
                writeln!(
                    self.out,
                    "{keyword} {} {{",
                    self.struct_tag(agg)
                )?;
            }
            if let Some(origin) = &agg.origin_name {
                writeln!(
                    self.out,
                    "    /* origin: {origin} at offset {} */",
                    agg.origin_offset()
                )?;
            }
        } else {
            writeln!(self.out, "{keyword} {{")?;
        }
        Ok(())
    }

    fn member(
        &mut self,
        module: &Module,
        _agg: &Aggregate,
        field: &Field,
        depth: usize,
    ) -> Result<()> {
        self.indent(depth + 1)?;
        let name = self.cfg.entity_name(
            field.prefix.as_deref(),
            &field.tag,
            &field.id,
        );
        if let Some(bits) = field.bit_length {
            let host = match (field.size, field.signed) {
                (1, true) => "char",
                (1, false) => "unsigned char",
                (2, true) => "short",
                (2, false) => "unsigned short",
                (8, true) => "long long",
                (8, false) => "unsigned long long",
                (16, true) => "__int128",
                (16, false) => "unsigned __int128",
                (_, true) => "int",
                (_, false) => "unsigned int",
            };
            writeln!(self.out, "{host} {name} : {bits};")?;
            return Ok(());
        }
        if matches!(
            field.type_ref,
            TypeRef::Scalar(ScalarKind::CharVary)
        ) {
            writeln!(
                self.out,
                "struct {{ unsigned short length; char string[{}]; }} {name}{};",
                field.length.unwrap_or(1),
                Self::dimension_suffix(field.dimension),
            )?;
            return Ok(());
        }
        let ty = self.type_text(
            module,
            field.type_ref,
            field.signed,
            field.subtype,
        );
        let mut suffix = Self::dimension_suffix(field.dimension);
        match field.type_ref {
            TypeRef::Scalar(ScalarKind::Char | ScalarKind::CharStar) => {
                suffix
                    .push_str(&format!("[{}]", field.length.unwrap_or(1)));
            }
            TypeRef::Scalar(ScalarKind::Decimal) => {
                let (p, _) = field.precision.unwrap_or((1, 0));
                suffix.push_str(&format!("[{}]", p + 1));
            }
            _ => {}
        }
        writeln!(self.out, "{ty} {name}{suffix};")?;
        Ok(())
    }

    fn aggregate_end(
        &mut self,
        _module: &Module,
        agg: &Aggregate,
        depth: usize,
    ) -> Result<()> {
        self.indent(depth)?;
        if depth == 0 {
            let name = self.cfg.entity_name(
                agg.prefix.as_deref(),
                &agg.tag,
                &agg.id,
            );
            if agg.typedef {
                writeln!(
                    self.out,
                    "}} {name}{};",
                    Self::dimension_suffix(agg.dimension)
                )?;
            } else {
                writeln!(self.out, "}};")?;
            }
            if let Some(based) = &agg.based_name {
                let keyword = if agg.kind.is_union() {
                    "union"
                } else {
                    "struct"
                };
                writeln!(
                    self.out,
                    "typedef {keyword} {} *{based};",
                    self.struct_tag(agg)
                )?;
            }
        } else {
            let name = self.cfg.entity_name(
                agg.prefix.as_deref(),
                &agg.tag,
                &agg.id,
            );
            writeln!(
                self.out,
                "}} {name}{};",
                Self::dimension_suffix(agg.dimension)
            )?;
        }
        Ok(())
    }

    fn comment(
        &mut self,
        _module: &Module,
        comment: &Comment,
        depth: usize,
    ) -> Result<()> {
        if !self.cfg.comments {
            return Ok(());
        }
        self.indent(if depth == 0 { 0 } else { depth + 1 })?;
        writeln!(self.out, "/* {} */", comment.text)?;
        Ok(())
    }

    fn literal_line(&mut self, _module: &Module, line: &str) -> Result<()> {
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    fn entry(&mut self, module: &Module, entry: &Entry) -> Result<()> {
        let ret = match &entry.returns {
            Some(r) => {
                self.type_text(module, r.type_ref, r.signed, None)
            }
            None => "void".to_string(),
        };
        let name = entry.alias.as_deref().unwrap_or(&entry.id);
        write!(self.out, "extern {ret} {name}(")?;
        if entry.params.is_empty() && !entry.variable {
            write!(self.out, "void")?;
        }
        for (i, param) in entry.params.iter().enumerate() {
            if i != 0 {
                write!(self.out, ", ")?;
            }
            self.write_parameter(module, param)?;
        }
        if entry.variable {
            if !entry.params.is_empty() {
                write!(self.out, ", ")?;
            }
            write!(self.out, "...")?;
        }
        writeln!(self.out, ");")?;
        Ok(())
    }
}

impl<W: Write> CBackend<W> {
    fn write_parameter(
        &mut self,
        module: &Module,
        param: &Parameter,
    ) -> Result<()> {
        let base = self.type_text(module, param.type_ref, true, None);
        let reference = matches!(param.mechanism, Passing::ByReference)
            || param.star_length
            || param.dimension.is_some();
        write!(self.out, "{base}")?;
        if reference {
            write!(self.out, " *")?;
        }
        if let Some(name) = &param.name {
            if reference {
                write!(self.out, "{name}")?;
            } else {
                write!(self.out, " {name}")?;
            }
        }
        if let Some(Value::Int(default)) = &param.default {
            write!(self.out, " /* = {default} */")?;
        }
        Ok(())
    }
}
