mod common;
use common::*;

use lambdac::interp::Value;
use lambdac::jit::{apply_closure, box_word, unbox_word};
use lambdac::{check_program, CodegenConfig, CompileError, ForeignDecl, JitProgram, Program, Term, Type};

#[test]
fn empty_product_is_a_value_not_a_function() {
    let unit = Type::product("Unit", vec![]);
    let program = jit(&Program::new(vec![unit.clone(), int()], Term::abs("x", int(), r("Unit"))));
    assert_eq!(program.result_type(), &unit);
    unsafe {
        let out = program.run(box_word(0));
        assert!(!out.is_null());
        assert_eq!(program.read_value(&unit, out), Some(Value::product([])));
    }
}

#[test]
fn single_field_product() {
    let boxed = Type::product("Box", vec![int()]);
    let program = jit(&Program::new(vec![int(), boxed.clone()], Term::abs("x", int(), app(r("Box"), r("x")))));
    unsafe {
        let out = program.run(box_word(17));
        assert_eq!(program.read_value(&boxed, out), Some(Value::product([Value::word(17)])));
    }
}

#[test]
fn partially_applied_product_constructor_escapes() {
    let triple = Type::product("Triple", vec![int(), int(), int()]);
    let program = jit(&Program::new(vec![int(), triple.clone()], Term::abs("x", int(), app(r("Triple"), r("x")))));
    assert_eq!(program.result_type(), &Type::curried([int(), int()], triple.clone()));
    unsafe {
        let partial = program.run(box_word(1));
        let partial = apply_closure(partial, box_word(2));
        let out = apply_closure(partial, box_word(3));
        assert_eq!(
            program.read_value(&triple, out),
            Some(Value::product([Value::word(1), Value::word(2), Value::word(3)]))
        );
    }
}

#[test]
fn sum_constructor_as_a_first_class_value() {
    let opt = Type::sum([(int(), "Some"), (int(), "None")]);
    let program = jit(&Program::new(vec![int(), opt.clone()], Term::abs("x", int(), r("None"))));
    assert_eq!(program.result_type(), &Type::func(int(), opt));
    unsafe {
        let ctor = program.run(box_word(0));
        let out = apply_closure(ctor, box_word(5));
        let (tag, payload) = program.sum_parts(out);
        assert_eq!(tag, 1);
        assert_eq!(unbox_word(payload), 5);
    }
}

#[test]
fn product_fields_may_hold_functions() {
    let ops = Type::product("Ops", vec![Type::func(int(), int()), int()]);
    // \x. let (f, y) = Ops succ x in f y
    let term = Term::abs(
        "x",
        int(),
        Term::deproduct(Term::apps(r("Ops"), [r("succ"), r("x")]), ["f", "y"], app(r("f"), r("y"))),
    );
    let mut source = arithmetic(term);
    source.types.push(ops);
    let program = jit(&source);
    assert_eq!(run_word(&program, 10), 11);
}

#[test]
fn tag_width_bounds_variant_count() {
    let sum = |n: usize| Type::sum((0..n).map(|i| (int(), format!("V{i}"))));
    let config = CodegenConfig { tag_width: 8, ..CodegenConfig::default() };
    let identity = Term::abs("x", int(), r("x"));

    let fits = Program::new(vec![int(), sum(256)], identity.clone());
    assert!(check_program(&fits, &config).is_ok());

    let too_wide = Program::new(vec![int(), sum(257)], identity);
    match check_program(&too_wide, &config).unwrap_err() {
        CompileError::TypeInvalid { msg, .. } => assert!(msg.contains("257 variants"), "{msg}"),
        other => panic!("expected invalid type, got {other:?}"),
    }
}

#[test]
fn later_declaration_shadows_constructor_name() {
    let first = Type::sum([(int(), "Mk")]);
    let second = Type::product("Mk", vec![int()]);
    let lowered = check_program(
        &Program::new(vec![int(), first, second.clone()], Term::abs("x", int(), app(r("Mk"), r("x")))),
        &CodegenConfig::default(),
    )
    .unwrap();
    assert_eq!(lowered.result_type, second);
}

#[test]
fn foreign_symbol_may_differ_from_bound_name() {
    extern "C" fn triple(stack: lambdac::jit::Ref) -> lambdac::jit::Ref {
        unsafe { box_word(unbox_word(lambdac::jit::foreign_arg(stack)) * 3) }
    }

    let source = Program::new(vec![int()], Term::abs("x", int(), app(r("times3"), r("x"))))
        .with_foreign(ForeignDecl::new("times3", Type::func(int(), int())).with_symbol("host_triple"));
    let program = JitProgram::compile(&source, &CodegenConfig::default(), &[("host_triple", triple as *const u8)]).unwrap();
    assert_eq!(run_word(&program, 5), 15);
}

#[test]
fn custom_runtime_symbols_are_honoured() {
    let config = CodegenConfig {
        alloc_symbol: "my_alloc".to_string(),
        entry_symbol: "my_main".to_string(),
        ..CodegenConfig::default()
    };
    let program = jit_with(&Program::new(vec![int()], Term::abs("x", int(), r("x"))), &config);
    assert_eq!(run_word(&program, 3), 3);
}
