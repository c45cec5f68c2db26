//! End-to-end scenarios: compile a program and observe what the generated
//! assembly does on the test emulator.

mod common;

use common::{execute, mirror, TestIo};

use tern::source::Module;

fn run(logical: &str, input: Vec<i64>) -> Vec<i64> {
    let assembly = Module::parse(&mirror(logical))
        .expect("scenario source must parse")
        .compile()
        .expect("scenario source must compile");

    let mut io = TestIo::with_input(input);
    execute(&assembly, &mut io).expect("scenario must run to HLT");
    io.into_output()
}

#[test]
fn global_assignment_prints_three() {
    // Declare one global, store the literal 3, print it.
    let output = run(r"/ ~~~~x ,. x - |1 ,. ! {x} ,. \", vec![]);
    assert_eq!(output, vec![3]);
}

#[test]
fn doubling_function_called_with_five_prints_ten() {
    // double(v) returns v + v; the call passes the literal 5 through the
    // full frame save/advance/restore sequence.
    let output = run(
        r"^double {v } / > {v ( v} ,. \ / ! {<double {0|1}} ,. \",
        vec![],
    );
    assert_eq!(output, vec![10]);
}

#[test]
fn while_loop_counts_to_three() {
    let output = run(
        r"/ ~~~~i ,. i - | ,. 88888888 {i , |1} / ! {i} ,. i - i ( |0 ,. \ \",
        vec![],
    );
    assert_eq!(output, vec![0, 1, 2]);
}

#[test]
fn if_takes_the_true_branch_and_else_the_false_one() {
    // a == 1 holds: print 2; then a > 5 fails: print 9 from the else body.
    let output = run(
        r#"/ ~~~~a ,. a - |0 ,. 69 / ! {0|} ,. \ {a " |0} 69 / ! {|0} ,. \ {a . 0|1} 79 / ! {|2} ,. \ \"#,
        vec![],
    );
    assert_eq!(output, vec![2, 9]);
}

#[test]
fn input_feeds_the_in_operator() {
    // Print the sum of two read values.
    let output = run(r"/ ! { ? ( ? } ,. \", vec![3, 4]);
    assert_eq!(output, vec![7]);
}

#[test]
fn nested_calls_preserve_caller_frames() {
    // g(y) = f(y) + 1 with f(x) = x + x; g(2) = 5.
    let output = run(
        r"^f {x } / > {x ( x} ,. \ ^g {y } / > {<f {y} ( |0} ,. \ / ! {<g {0|}} ,. \",
        vec![],
    );
    assert_eq!(output, vec![5]);
}

#[test]
fn recursion_computes_a_factorial() {
    // fact(n): if n < 2 return 1; return n * fact(n - 1). fact(5) = 120.
    let output = run(
        r"^fact {n } / 69 / > {|0} ,. \ {n , 0|} > {n [ <fact {n ) |0}} ,. \ / ! {<fact {0|1}} ,. \",
        vec![],
    );
    assert_eq!(output, vec![120]);
}

#[test]
fn logical_operators_materialize_booleans() {
    // (1 < 0) and (1 == 1) is 0; (1 < 0) or (1 == 1) is 1.
    let output = run(
        r#"/ ! { {|0 , |} * {|0 " |0} } ,. ! { {|0 , |} + {|0 " |0} } ,. \"#,
        vec![],
    );
    assert_eq!(output, vec![0, 1]);
}

#[test]
fn comparison_chains_fold_without_short_circuit() {
    // 3 < 1 is 0, then 0 < 2 is 1: the chain feeds the first comparison's
    // boolean into the second.
    let output = run(r"/ ! {|1 , |0 , 0|} ,. \", vec![]);
    assert_eq!(output, vec![1]);
}

#[test]
fn assignment_yields_its_value_in_a_larger_expression() {
    // b = (a = 4) + 1: both variables observable afterwards.
    let output = run(
        r"/ ~~~~a ,. ~~~~b ,. b - {a - |0'1} ( |0 ,. ! {a} ,. ! {b} ,. \",
        vec![],
    );
    assert_eq!(output, vec![4, 5]);
}

#[test]
fn sqrt_lowers_to_the_dedicated_instruction() {
    let output = run(r"/ ! {% {|2}} ,. \", vec![]);
    assert_eq!(output, vec![3]);
}

#[test]
fn out_is_an_expression_yielding_its_operand() {
    // x = out(7): prints 7 and stores 7.
    let output = run(
        r"/ ~~~~x ,. x - ! {1|0} ,. ! {x} ,. \",
        vec![],
    );
    assert_eq!(output, vec![7, 7]);
}

#[test]
fn top_level_return_halts_the_program() {
    let output = run(r"/ ! {|0} ,. > {|} ,. ! {0|} ,. \", vec![]);
    assert_eq!(output, vec![1]);
}

#[test]
fn locals_shadow_globals_without_clobbering_them() {
    // A function local named like a global gets its own frame slot.
    let output = run(
        r"^poke {v } / ~~~~x ,. x - v ,. > {x} ,. \ / ~~~~x ,. x - |1 ,. ! {<poke {|2}} ,. ! {x} ,. \",
        vec![],
    );
    assert_eq!(output, vec![9, 3]);
}
