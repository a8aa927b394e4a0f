//! Property-based tests for tag dispatch and product layout in compiled code.
//!
//! Each case compiles a fresh program, so case counts are kept low.

use std::collections::HashMap;

use proptest::prelude::*;

use lambdac::interp::{eval_program, Value};
use lambdac::jit::box_word;
use lambdac::{CodegenConfig, JitProgram, Program, Term, Type};

fn int() -> Type {
    Type::prim("Int")
}

/// `In = [I0: Int | ...]`, `Out = [O0: Int | ...]` and `\s. case s of { p_j => O_j p_j }`.
fn relabel(variants: usize) -> Program {
    let input = Type::sum((0..variants).map(|i| (int(), format!("I{i}"))));
    let output = Type::sum((0..variants).map(|i| (int(), format!("O{i}"))));
    let cases = (0..variants).map(|j| {
        let name = format!("p{j}");
        let body = Term::app(Term::reference(format!("O{j}")), Term::reference(name.clone()));
        (name, body)
    });
    Program::new(vec![int(), input.clone(), output], Term::abs("s", input, Term::desum(Term::reference("s"), cases)))
}

/// `\p. let (a0, .., aN) = p in Rec aN .. a0`
fn reverse(fields: usize) -> (Program, Type) {
    let record = Type::product("Rec", vec![int(); fields]);
    let names: Vec<String> = (0..fields).map(|i| format!("a{i}")).collect();
    let rebuilt = Term::apps(Term::reference("Rec"), names.iter().rev().map(Term::reference));
    let term = Term::abs("p", record.clone(), Term::deproduct(Term::reference("p"), names, rebuilt));
    (Program::new(vec![int(), record.clone()], term), record)
}

fn tag_width() -> impl Strategy<Value = u32> {
    prop_oneof![Just(8u32), Just(16u32), Just(32u32)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn desum_selects_case_matching_tag(
        (variants, tag) in (1usize..12).prop_flat_map(|n| (Just(n), 0..n as u32)),
        payload in any::<u32>(),
        width in tag_width(),
    ) {
        let source = relabel(variants);
        let config = CodegenConfig { tag_width: width, ..CodegenConfig::default() };
        let program = JitProgram::compile(&source, &config, &[]).unwrap();

        let (out_tag, out_payload) = unsafe {
            let out = program.run(program.make_sum(tag, box_word(payload as usize)));
            program.sum_parts(out)
        };
        prop_assert_eq!(out_tag, tag);
        prop_assert_eq!(unsafe { lambdac::jit::unbox_word(out_payload) }, payload as usize);

        let interp = eval_program(&source, Value::sum(tag, Value::word(payload as u64)), &HashMap::new()).unwrap();
        prop_assert_eq!(interp, Value::sum(tag, Value::word(payload as u64)));
    }

    #[test]
    fn deproduct_then_construct_reverses_fields(values in prop::collection::vec(any::<u32>(), 1..7)) {
        let (source, record) = reverse(values.len());
        let program = JitProgram::compile(&source, &CodegenConfig::default(), &[]).unwrap();

        let input = Value::product(values.iter().map(|v| Value::word(*v as u64)));
        let out = unsafe {
            let r = program.run(program.write_value(&input).unwrap());
            program.read_value(&record, r).unwrap()
        };
        let expected = Value::product(values.iter().rev().map(|v| Value::word(*v as u64)));
        prop_assert_eq!(&out, &expected);
        prop_assert_eq!(eval_program(&source, input, &HashMap::new()).unwrap(), expected);
    }
}
