use rstest::rstest;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::c::CBackend;
use crate::backend::{Backend, EmitConfig};
use crate::dispatch::Dispatcher;
use crate::model::aggregate::{Aggregate, AggregateKind, Field, Member};
use crate::model::constant::ConstantValue;
use crate::model::module::Module;
use crate::parser::parse_source;
use crate::{AlignMode, Target};

fn compile_with(src: &str, target: Target) -> Dispatcher {
    let mut dispatcher =
        Dispatcher::new(target, HashMap::new(), Vec::new())
            .with_check(true);
    parse_source(src, &mut dispatcher).unwrap();
    dispatcher
}

fn compile(src: &str) -> Dispatcher {
    compile_with(src, Target::default())
}

fn compile_symbols(src: &str, symbols: &[(&str, i64)]) -> Dispatcher {
    let symbols = symbols
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    let mut dispatcher =
        Dispatcher::new(Target::default(), symbols, Vec::new())
            .with_check(true);
    parse_source(src, &mut dispatcher).unwrap();
    dispatcher
}

fn only_module(dispatcher: &Dispatcher) -> &Module {
    assert_eq!(dispatcher.modules().len(), 1);
    &dispatcher.modules()[0]
}

fn aggregate<'a>(module: &'a Module, name: &str) -> &'a Aggregate {
    module
        .aggregates
        .iter()
        .find(|a| a.id == name)
        .unwrap_or_else(|| panic!("no aggregate {name}"))
}

fn field<'a>(agg: &'a Aggregate, name: &str) -> &'a Field {
    agg.members
        .iter()
        .find_map(|m| match m {
            Member::Field(f) if f.id == name => Some(f),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no field {name} in {}", agg.id))
}

fn fault_codes(dispatcher: &Dispatcher) -> Vec<&'static str> {
    dispatcher
        .faults()
        .iter()
        .map(|f| f.error.code())
        .collect()
}

fn constant_value(module: &Module, id: &str, tag: &str) -> i128 {
    let constant = module
        .constants
        .iter()
        .find(|c| c.id == id && c.tag == tag)
        .unwrap_or_else(|| panic!("no constant {id}_{tag}"));
    match constant.value {
        ConstantValue::Num { value, .. } => value,
        ConstantValue::Str(_) => panic!("string constant {id}"),
    }
}

const THREE_SCALARS: &str = "\
MODULE m;
AGGREGATE s STRUCTURE;
    a BYTE;
    b WORD;
    c LONGWORD;
END s;
END_MODULE m;
";

#[test]
fn empty_structure_is_an_error_with_size_zero() {
    let d = compile(
        "MODULE m; AGGREGATE s STRUCTURE; END s; END_MODULE m;",
    );
    assert!(fault_codes(&d).contains(&"NULLSTRUCT"));
    let agg = aggregate(only_module(&d), "s");
    assert_eq!(agg.size, 0);
    assert!(agg.members.is_empty());
}

#[rstest]
#[case::packed(AlignMode::Packed, [0, 1, 3], 7)]
#[case::limit4(AlignMode::Limit(4), [0, 2, 4], 8)]
#[case::natural(AlignMode::Natural, [0, 2, 4], 8)]
fn scalar_member_offsets(
    #[case] align: AlignMode,
    #[case] offsets: [u64; 3],
    #[case] size: u64,
) {
    let d = compile_with(
        THREE_SCALARS,
        Target {
            pointer_bytes: 8,
            align,
        },
    );
    let module = only_module(&d);
    let agg = aggregate(module, "s");
    assert_eq!(field(agg, "a").offset, offsets[0]);
    assert_eq!(field(agg, "b").offset, offsets[1]);
    assert_eq!(field(agg, "c").offset, offsets[2]);
    assert_eq!(agg.size, size);
    assert_eq!(constant_value(module, "s", "s"), size as i128);
}

#[test]
fn bitfield_packing_with_tail_filler() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    f1 BITFIELD LENGTH 3;
    f2 BITFIELD LENGTH 5;
    f3 BITFIELD LENGTH 1;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    let f1 = field(agg, "f1");
    let f2 = field(agg, "f2");
    let f3 = field(agg, "f3");
    assert_eq!((f1.offset, f1.bit_offset), (0, Some(0)));
    assert_eq!((f2.offset, f2.bit_offset), (0, Some(3)));
    assert_eq!((f3.offset, f3.bit_offset), (1, Some(0)));
    // the first host byte is exactly full; only f3's byte gets a tail
    // filler
    let filler = field(agg, "filler_001");
    assert!(filler.filler);
    assert_eq!(filler.offset, 1);
    assert_eq!(filler.bit_offset, Some(1));
    assert_eq!(filler.bit_length, Some(7));
    assert_eq!(agg.size, 2);
}

#[test]
fn adaptive_promotion_widens_the_whole_run() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    a BITFIELD LENGTH 6;
    b BITFIELD LENGTH 6;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    let a = field(agg, "a");
    let b = field(agg, "b");
    assert_eq!(a.size, 2);
    assert_eq!(b.size, 2);
    assert_eq!((a.bit_offset, b.bit_offset), (Some(0), Some(6)));
    assert_eq!(field(agg, "filler_001").bit_length, Some(4));
    assert_eq!(agg.size, 2);
}

#[rstest]
#[case::exactly_64(34, 8, 8)]
#[case::past_64(35, 16, 16)]
fn promotion_at_the_64_bit_boundary(
    #[case] second_len: u32,
    #[case] host: u32,
    #[case] size: u64,
) {
    let d = compile(&format!(
        "MODULE m;
AGGREGATE s STRUCTURE;
    a BITFIELD LENGTH 30;
    b BITFIELD LENGTH {second_len};
END s;
END_MODULE m;"
    ));
    let agg = aggregate(only_module(&d), "s");
    assert_eq!(field(agg, "a").size, host);
    assert_eq!(field(agg, "b").size, host);
    assert_eq!(field(agg, "b").bit_offset, Some(30));
    assert_eq!(agg.size, size);
}

#[test]
fn explicit_host_pins_the_run() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    a BITFIELD WORD LENGTH 10;
    b BITFIELD LENGTH 10;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    let a = field(agg, "a");
    let b = field(agg, "b");
    // the fixed word run seals with a 6-bit filler instead of
    // promoting past the spelled width
    assert_eq!(a.size, 2);
    assert_eq!(field(agg, "filler_001").bit_length, Some(6));
    assert_eq!(b.offset, 2);
    assert_eq!(b.bit_offset, Some(0));
}

#[test]
fn implicit_union_floors_at_the_scalar() {
    let d = compile(
        "MODULE m;
AGGREGATE x STRUCTURE LONGWORD;
    a BITFIELD LENGTH 4;
END x;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "x");
    assert!(matches!(
        agg.kind,
        AggregateKind::ImplicitUnion(crate::model::scalar::ScalarKind::Long)
    ));
    assert_eq!(agg.size, 4);
    let filler = field(agg, "filler_001");
    assert_eq!(filler.bit_length, Some(28));
    assert_eq!(filler.size, 4);
}

#[test]
fn origin_is_recorded_but_offsets_stay_literal() {
    let d = compile(
        "MODULE m;
AGGREGATE q STRUCTURE ORIGIN b;
    a ADDRESS;
    b ADDRESS;
END q;
END_MODULE m;",
    );
    let module = only_module(&d);
    let agg = aggregate(module, "q");
    assert_eq!(field(agg, "a").offset, 0);
    assert_eq!(field(agg, "b").offset, 8);
    assert_eq!(agg.origin_member, Some(1));
    assert_eq!(agg.origin_offset(), 8);
    assert_eq!(constant_value(module, "q", "s"), 16);
}

#[test]
fn union_size_is_the_member_maximum() {
    let d = compile(
        "MODULE m;
AGGREGATE u UNION;
    a LONGWORD;
    b CHARACTER LENGTH 12;
END u;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "u");
    assert_eq!(field(agg, "a").offset, 0);
    assert_eq!(field(agg, "b").offset, 0);
    assert_eq!(agg.size, 12);
}

#[test]
fn char_vary_carries_a_length_prefix() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    s1 CHARACTER LENGTH 6 VARYING;
    t BYTE;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    assert_eq!(field(agg, "t").offset, 8);
    assert_eq!(agg.size, 9);
}

#[test]
fn decimal_carries_a_sign_byte() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    d DECIMAL PRECISION 5 SCALE 2;
    t BYTE;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    assert_eq!(field(agg, "d").precision, Some((5, 2)));
    assert_eq!(field(agg, "t").offset, 6);
    assert_eq!(agg.size, 7);
}

#[test]
fn dimensions_multiply_member_size() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    a WORD DIMENSION 4;
    b BYTE;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    let a = field(agg, "a");
    assert_eq!(a.dimension.map(|d| (d.lbound, d.hbound)), Some((1, 4)));
    assert_eq!(field(agg, "b").offset, 8);
    assert_eq!(agg.size, 9);
}

#[test]
fn mask_and_size_constants_for_bitfields() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    flags BITFIELD LENGTH 3 MASK;
    more BITFIELD LENGTH 5 MASK;
END s;
END_MODULE m;",
    );
    let module = only_module(&d);
    assert_eq!(constant_value(module, "flags", "s"), 3);
    assert_eq!(constant_value(module, "flags", "m"), 0x07);
    assert_eq!(constant_value(module, "more", "s"), 5);
    assert_eq!(constant_value(module, "more", "m"), 0xF8);
    assert_eq!(constant_value(module, "s", "s"), 1);
}

#[test]
fn tags_resolve_through_declare_chains() {
    let d = compile(
        "MODULE m;
DECLARE counter LONGWORD;
ITEM total counter;
ITEM Big QUADWORD;
ITEM trimmed LONGWORD TAG foo_;
END_MODULE m;",
    );
    let module = only_module(&d);
    let total =
        module.items.iter().find(|i| i.id == "total").unwrap();
    assert_eq!(total.tag, "l");
    let big = module.items.iter().find(|i| i.id == "Big").unwrap();
    assert_eq!(big.tag, "Q");
    let trimmed =
        module.items.iter().find(|i| i.id == "trimmed").unwrap();
    assert_eq!(trimmed.tag, "foo");
}

#[rstest]
#[case::taken(1, "dbg")]
#[case::not_taken(0, "rel")]
fn symbol_conditionals_select_a_branch(
    #[case] value: i64,
    #[case] expected: &str,
) {
    let d = compile_symbols(
        "MODULE m;
IFSYMBOL debug;
    CONSTANT dbg EQUALS 1;
ELSE;
    CONSTANT rel EQUALS 1;
END_IFSYMBOL;
END_MODULE m;",
        &[("debug", value)],
    );
    let module = only_module(&d);
    assert_eq!(module.constants.len(), 1);
    assert_eq!(module.constants[0].id, expected);
}

#[test]
fn undefined_symbol_faults_and_takes_the_else() {
    let d = compile_symbols(
        "MODULE m;
IFSYMBOL missing;
    CONSTANT yes EQUALS 1;
ELSE;
    CONSTANT no EQUALS 1;
END_IFSYMBOL;
END_MODULE m;",
        &[],
    );
    assert!(fault_codes(&d).contains(&"UNDEFSYM"));
    assert_eq!(only_module(&d).constants[0].id, "no");
}

#[test]
fn stray_else_is_an_invalid_conditional_state() {
    let d = compile("MODULE m; ELSE; END_MODULE m;");
    assert!(fault_codes(&d).contains(&"BADCOND"));
}

#[test]
fn second_end_module_faults_without_leaking() {
    let d = compile("MODULE m; END_MODULE m; END_MODULE m;");
    assert!(fault_codes(&d).contains(&"BADSTATE"));
    assert_eq!(d.modules().len(), 1);
}

#[test]
fn end_name_mismatch_still_closes() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    a BYTE;
END t;
END_MODULE m;",
    );
    assert!(fault_codes(&d).contains(&"MATCHEND"));
    assert_eq!(aggregate(only_module(&d), "s").size, 1);
}

#[test]
fn star_length_is_for_entry_parameters_only() {
    let d = compile(
        "MODULE m;
ITEM s CHARACTER *;
ENTRY copy PARAMETER (CHARACTER *, LONGWORD VALUE NAMED n)
    RETURNS LONGWORD;
END_MODULE m;",
    );
    assert!(fault_codes(&d).contains(&"UNKLEN"));
    let module = only_module(&d);
    let entry = &module.entries[0];
    assert!(entry.params[0].star_length);
    assert_eq!(entry.params[1].name.as_deref(), Some("n"));
    // only the item faulted
    assert_eq!(
        fault_codes(&d)
            .iter()
            .filter(|c| **c == "UNKLEN")
            .count(),
        1
    );
}

#[test]
fn address_items_require_a_based_target() {
    let d = compile(
        "MODULE m;
AGGREGATE t STRUCTURE;
    a BYTE;
END t;
ITEM p POINTER (t);
END_MODULE m;",
    );
    assert!(fault_codes(&d).contains(&"NOTBASED"));

    let ok = compile(
        "MODULE m;
AGGREGATE t STRUCTURE BASED tp;
    a BYTE;
END t;
ITEM p POINTER (t);
END_MODULE m;",
    );
    assert!(!fault_codes(&ok).contains(&"NOTBASED"));
}

#[test]
fn enumerate_builds_an_enumeration() {
    let d = compile(
        "MODULE m;
CONSTANT red, green, blue EQUALS 0 ENUMERATE colors TYPEDEF;
END_MODULE m;",
    );
    let module = only_module(&d);
    assert!(module.constants.is_empty());
    let colors = &module.enums[0];
    assert_eq!(colors.id, "colors");
    assert!(colors.typedef);
    let values: Vec<i128> =
        colors.members.iter().map(|m| m.value).collect();
    assert_eq!(values, vec![0, 1, 2]);
    assert!(colors.members[0].explicit);
    assert!(!colors.members[1].explicit);
}

#[test]
fn counters_bind_constant_values_to_locals() {
    let d = compile(
        "MODULE m;
CONSTANT a, b, c EQUALS 10 INCREMENT 5 COUNTER #seq;
CONSTANT next EQUALS #seq;
END_MODULE m;",
    );
    let module = only_module(&d);
    assert_eq!(constant_value(module, "c", "k"), 20);
    assert_eq!(constant_value(module, "next", "k"), 20);
}

#[test]
fn constant_list_comments_attach_per_item() {
    let d = compile(
        "MODULE m;
CONSTANT first /* the start */, second EQUALS 1 INCREMENT 1;
END_MODULE m;",
    );
    let module = only_module(&d);
    let first = module
        .constants
        .iter()
        .find(|c| c.id == "first")
        .unwrap();
    assert_eq!(first.comment.as_deref(), Some("the start"));
    assert_eq!(constant_value(module, "second", "k"), 2);
}

#[test]
fn comments_inside_aggregates_become_members() {
    let d = compile(
        "MODULE m;
AGGREGATE s STRUCTURE;
    a BYTE;
    /* gap */
    b WORD;
END s;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "s");
    assert_eq!(agg.members.len(), 3);
    assert!(matches!(agg.members[1], Member::Comment(_)));
    assert_eq!(field(agg, "b").offset, 1);
}

#[test]
fn parse_errors_recover_at_statement_boundaries() {
    let d = compile(
        "MODULE m;
WIBBLE x y;
ITEM a LONGWORD;
END_MODULE m;",
    );
    assert!(fault_codes(&d).contains(&"SYNTAX"));
    assert_eq!(only_module(&d).items.len(), 1);
}

#[test]
fn duplicate_ids_fault_within_a_namespace() {
    let d = compile(
        "MODULE m;
ITEM a LONGWORD;
ITEM a WORD;
CONSTANT a EQUALS 1;
END_MODULE m;",
    );
    assert!(fault_codes(&d).contains(&"DUPID"));
    let module = only_module(&d);
    assert_eq!(module.items.len(), 1);
    // same id in another namespace is fine
    assert_eq!(module.constants.len(), 1);
}

#[test]
fn nested_aggregates_lay_out_recursively() {
    let d = compile(
        "MODULE m;
AGGREGATE outer STRUCTURE;
    head LONGWORD;
    inner STRUCTURE;
        x WORD;
        y WORD;
    END inner;
    tail BYTE;
END outer;
END_MODULE m;",
    );
    let agg = aggregate(only_module(&d), "outer");
    let inner = agg
        .members
        .iter()
        .find_map(|m| match m {
            Member::Aggregate(a) if a.id == "inner" => Some(a),
            _ => None,
        })
        .unwrap();
    assert_eq!(inner.offset, 4);
    assert_eq!(inner.size, 4);
    assert_eq!(field(inner, "y").offset, 2);
    let tail = field(agg, "tail");
    assert_eq!(tail.offset, 8);
    assert_eq!(agg.size, 9);
}

#[test]
fn recompilation_is_deterministic() {
    let first = compile(THREE_SCALARS);
    let second = compile(THREE_SCALARS);
    assert_eq!(first.modules(), second.modules());
}

/// Clonable sink so the emitted text survives the boxed backend.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn c_backend_emits_declarations() {
    let buffer = SharedBuffer::default();
    let cfg = EmitConfig {
        header: true,
        comments: true,
        suppress_prefix: false,
        suppress_tag: false,
        copy_text: None,
    };
    let backend: Box<dyn Backend> =
        Box::new(CBackend::new(buffer.clone(), cfg));
    let mut dispatcher = Dispatcher::new(
        Target::default(),
        HashMap::new(),
        vec![backend],
    );
    parse_source(
        "MODULE demo;
CONSTANT max_units EQUALS 8;
AGGREGATE point STRUCTURE TYPEDEF;
    x LONGWORD;
    y LONGWORD;
END point;
END_MODULE demo;",
        &mut dispatcher,
    )
    .unwrap();
    assert!(dispatcher.faults().is_empty());
    let output =
        String::from_utf8(buffer.0.borrow().clone()).unwrap();
    insta::assert_snapshot!(output.trim_end(), @r###"
    /*** MODULE demo ***/
    #ifndef __SDL_DEMO_H
    #define __SDL_DEMO_H 1
    #define max_units_k 8
    typedef struct _point {
        int l_x;
        int l_y;
    } r_point;
    #define point_s 8
    #endif /* __SDL_DEMO_H */
    "###);
}

#[test]
fn language_conditionals_gate_backend_output() {
    let buffer = SharedBuffer::default();
    let cfg = EmitConfig {
        header: false,
        comments: true,
        suppress_prefix: false,
        suppress_tag: false,
        copy_text: None,
    };
    let backend: Box<dyn Backend> =
        Box::new(CBackend::new(buffer.clone(), cfg));
    let mut dispatcher = Dispatcher::new(
        Target::default(),
        HashMap::new(),
        vec![backend],
    );
    parse_source(
        "MODULE demo;
IFLANGUAGE pascal;
CONSTANT hidden EQUALS 1;
END_IFLANGUAGE;
IFLANGUAGE c;
CONSTANT shown EQUALS 2;
END_IFLANGUAGE;
END_MODULE demo;",
        &mut dispatcher,
    )
    .unwrap();
    let output =
        String::from_utf8(buffer.0.borrow().clone()).unwrap();
    assert!(!output.contains("hidden"));
    assert!(output.contains("#define shown_k 2"));
    // the resolved module still carries both constants
    assert_eq!(only_module(&dispatcher).constants.len(), 2);
}

#[test]
fn literal_lines_pass_through_verbatim() {
    let buffer = SharedBuffer::default();
    let cfg = EmitConfig {
        header: false,
        comments: true,
        suppress_prefix: false,
        suppress_tag: false,
        copy_text: None,
    };
    let backend: Box<dyn Backend> =
        Box::new(CBackend::new(buffer.clone(), cfg));
    let mut dispatcher = Dispatcher::new(
        Target::default(),
        HashMap::new(),
        vec![backend],
    );
    parse_source(
        "MODULE demo;
LITERAL;
#include <stddef.h>
typedef int handmade_t;
END_LITERAL;
END_MODULE demo;",
        &mut dispatcher,
    )
    .unwrap();
    let output =
        String::from_utf8(buffer.0.borrow().clone()).unwrap();
    assert!(output.contains("#include <stddef.h>"));
    assert!(output.contains("typedef int handmade_t;"));
}
