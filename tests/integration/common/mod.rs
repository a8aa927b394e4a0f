#![allow(dead_code)]

use std::collections::HashMap;
use std::process::Command;
use std::rc::Rc;

use lambdac::interp::{Primitive, Value};
use lambdac::jit::{alloc_sum, box_word, foreign_arg, read_field, unbox_word, Ref};
use lambdac::{CodegenConfig, ForeignDecl, JitProgram, Program, Term, Type};

pub fn lambdac() -> Command {
    Command::new(env!("CARGO_BIN_EXE_lambdac"))
}

pub fn int() -> Type {
    Type::prim("Int")
}

/// `[Zero: Int | NonZero: Int]`, the result of `is_zero`.
pub fn boolean() -> Type {
    Type::sum([(int(), "Zero"), (int(), "NonZero")])
}

pub fn int_pair() -> Type {
    Type::product("IntPair", vec![int(), int()])
}

pub fn r(name: &str) -> Term {
    Term::reference(name)
}

pub fn app(func: Term, arg: Term) -> Term {
    Term::app(func, arg)
}

// Host primitives. Sums are built with the default 32-bit tag.

pub extern "C" fn is_zero(stack: Ref) -> Ref {
    unsafe {
        let n = unbox_word(foreign_arg(stack));
        alloc_sum(32, if n == 0 { 0 } else { 1 }, box_word(n))
    }
}

pub extern "C" fn pred(stack: Ref) -> Ref {
    unsafe { box_word(unbox_word(foreign_arg(stack)).wrapping_sub(1)) }
}

pub extern "C" fn succ(stack: Ref) -> Ref {
    unsafe { box_word(unbox_word(foreign_arg(stack)) + 1) }
}

pub extern "C" fn one(_stack: Ref) -> Ref {
    box_word(1)
}

pub extern "C" fn mul(stack: Ref) -> Ref {
    unsafe {
        let pair = foreign_arg(stack);
        box_word(unbox_word(read_field(pair, 0)) * unbox_word(read_field(pair, 1)))
    }
}

pub fn host_symbols() -> Vec<(&'static str, *const u8)> {
    vec![
        ("is_zero", is_zero as *const u8),
        ("pred", pred as *const u8),
        ("succ", succ as *const u8),
        ("one", one as *const u8),
        ("mul", mul as *const u8),
    ]
}

/// Interpreter counterparts of [`host_symbols`].
pub fn interp_primitives() -> HashMap<String, Primitive> {
    fn word(v: &Value) -> u64 {
        v.as_word().expect("primitive argument is a word")
    }
    let mut prims: HashMap<String, Primitive> = HashMap::new();
    prims.insert(
        "is_zero".into(),
        Rc::new(|v: &Value| Value::sum(if word(v) == 0 { 0 } else { 1 }, v.clone())),
    );
    prims.insert("pred".into(), Rc::new(|v: &Value| Value::word(word(v).wrapping_sub(1))));
    prims.insert("succ".into(), Rc::new(|v: &Value| Value::word(word(v) + 1)));
    prims.insert("one".into(), Rc::new(|_: &Value| Value::word(1)));
    prims.insert(
        "mul".into(),
        Rc::new(|v: &Value| match v {
            Value::Product(fields) => Value::word(word(&fields[0]) * word(&fields[1])),
            other => panic!("mul expects a pair, got {other:?}"),
        }),
    );
    prims
}

/// Declared types and foreign bindings shared by the arithmetic programs.
pub fn arithmetic(term: Term) -> Program {
    Program::new(vec![int(), boolean(), int_pair()], term)
        .with_foreign(ForeignDecl::new("is_zero", Type::func(int(), boolean())))
        .with_foreign(ForeignDecl::new("pred", Type::func(int(), int())))
        .with_foreign(ForeignDecl::new("succ", Type::func(int(), int())))
        .with_foreign(ForeignDecl::new("one", Type::func(int(), int())))
        .with_foreign(ForeignDecl::new("mul", Type::func(int_pair(), int())))
}

/// `fix (\f. \x. case is_zero x of { z => one z; n => mul (IntPair (f (pred n)) x) })`
///
/// The recursive call is the first thing evaluated in its branch: it reuses this
/// frame's stack slots, and `n` is dead by the time it returns.
pub fn factorial() -> Term {
    let recurse = app(r("f"), app(r("pred"), r("n")));
    let body = Term::abs(
        "x",
        int(),
        Term::desum(
            app(r("is_zero"), r("x")),
            [
                ("z", app(r("one"), r("z"))),
                ("n", app(r("mul"), Term::apps(r("IntPair"), [recurse, r("x")]))),
            ],
        ),
    );
    Term::fix(Term::abs("f", Type::func(int(), int()), body))
}

pub fn jit(program: &Program) -> JitProgram {
    jit_with(program, &CodegenConfig::default())
}

pub fn jit_with(program: &Program, config: &CodegenConfig) -> JitProgram {
    JitProgram::compile(program, config, &host_symbols()).unwrap_or_else(|err| panic!("compile failed: {err}"))
}

/// Run a program whose input and result are boxed words.
pub fn run_word(program: &JitProgram, input: usize) -> usize {
    unsafe { unbox_word(program.run(box_word(input))) }
}
