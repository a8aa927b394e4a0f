mod common;
use common::*;

use lambdac::interp::{eval_program, Value};
use lambdac::jit::{apply_closure, box_word, unbox_word, Ref};
use lambdac::{JitProgram, Term, Type};

fn apply_word(closure: Ref, n: usize) -> usize {
    unsafe { unbox_word(apply_closure(closure, box_word(n))) }
}

/// `\u. fact`: hands the recursive closure back to the host.
fn factorial_program() -> JitProgram {
    jit(&arithmetic(Term::abs("u", int(), factorial())))
}

/// `fix (\f. \x. case is_zero x of { z => one z; n => mul (IntPair x (f (pred n))) })`
///
/// `IntPair x` is live across the recursive call, so the call overwrites the
/// shared constructor buffer it partially filled.
fn natural_order_factorial() -> Term {
    let recurse = app(r("f"), app(r("pred"), r("n")));
    let body = Term::abs(
        "x",
        int(),
        Term::desum(
            app(r("is_zero"), r("x")),
            [
                ("z", app(r("one"), r("z"))),
                ("n", app(r("mul"), Term::apps(r("IntPair"), [r("x"), recurse]))),
            ],
        ),
    );
    Term::fix(Term::abs("f", Type::func(int(), int()), body))
}

#[test]
fn factorial_of_five() {
    let program = factorial_program();
    assert_eq!(program.result_type(), &Type::func(int(), int()));
    let fact = unsafe { program.run(box_word(0)) };
    assert_eq!(apply_word(fact, 5), 120);
}

#[test]
fn fixpoint_closure_is_reusable_sequentially() {
    let program = factorial_program();
    let fact = unsafe { program.run(box_word(0)) };
    assert_eq!(apply_word(fact, 5), 120);
    assert_eq!(apply_word(fact, 3), 6);
    assert_eq!(apply_word(fact, 0), 1);
    assert_eq!(apply_word(fact, 10), 3_628_800);
}

#[test]
fn factorial_applied_inside_main() {
    // \u. fact u
    let program = jit(&arithmetic(Term::abs("u", int(), app(factorial(), r("u")))));
    assert_eq!(run_word(&program, 4), 24);
    assert_eq!(run_word(&program, 6), 720);
}

#[test]
fn compiled_factorial_agrees_with_interpreter() {
    let source = arithmetic(Term::abs("u", int(), app(factorial(), r("u"))));
    let program = jit(&source);
    let prims = interp_primitives();
    for n in 0..=8u64 {
        let expected = eval_program(&source, Value::word(n), &prims).unwrap();
        assert_eq!(Some(run_word(&program, n as usize) as u64), expected.as_word(), "fact({n})");
    }
}

#[test]
fn deep_recursion_counts_down() {
    // fix (\f. \x. case is_zero x of { z => z; n => f (pred n) })
    let body = Term::abs(
        "x",
        int(),
        Term::desum(
            app(r("is_zero"), r("x")),
            [("z", r("z")), ("n", app(r("f"), app(r("pred"), r("n"))))],
        ),
    );
    let countdown = Term::fix(Term::abs("f", Type::func(int(), int()), body));
    let program = jit(&arithmetic(Term::abs("u", int(), app(countdown, r("u")))));
    assert_eq!(run_word(&program, 500), 0);
}

#[test]
fn each_entry_call_rebuilds_the_fixpoint() {
    let program = factorial_program();
    let first = unsafe { program.run(box_word(0)) };
    let second = unsafe { program.run(box_word(0)) };
    assert_ne!(first, second);
    // the cell holds the latest closure; recursion through it computes the same function
    assert_eq!(apply_word(second, 4), 24);
    assert_eq!(apply_word(first, 3), 6);
}

/// Application is in place and not re-entrant (DESIGN.md, "Hazards inherent to
/// in-place application"). A recursive call made while a partial application
/// of the same constructor is live clobbers it; the compiled result differs
/// from the interpreter's.
#[test]
fn recursive_call_after_live_partial_application_sees_overwritten_slot() {
    let source = arithmetic(Term::abs("u", int(), app(natural_order_factorial(), r("u"))));
    let program = jit(&source);

    let expected = eval_program(&source, Value::word(5), &interp_primitives()).unwrap();
    assert_eq!(expected.as_word(), Some(120));
    // every level reads x = 1, left in the shared slot by the innermost call
    assert_eq!(run_word(&program, 5), 1);
    assert_eq!(run_word(&program, 0), 1);
}
