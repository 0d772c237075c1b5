//! Decompiler round-trip tests
//!
//! The decompiled text of a compiled program must compile back to an
//! identical bytecode table, and the rendered source forms must match the
//! words they came from.

use pretty_assertions::assert_eq;
use rstest::rstest;
use strata_forth::bytecode::disasm::decompile;
use strata_forth::{compile, Machine32};

#[rstest]
#[case("1 2 +")]
#[case("variable x 5 x ! x @ x +!")]
#[case(": sq dup * ; 7 sq")]
#[case("1 if 2 then")]
#[case("1 if 2 else 3 then")]
#[case("0 5 do i loop")]
#[case("0 10 do i 2 +loop")]
#[case("begin 1 again")]
#[case("5 begin 1- dup 0= until")]
#[case("5 begin dup while 1- repeat")]
#[case(": f exit ; f")]
#[case("input a a i-> stack")]
#[case("input a output o float64 2 a #!d-> o")]
#[case("output o int32 5 o <- stack 1 o rewind o len")]
#[case("input a a len a pos a end 0 a seek 0 a skip")]
#[case("7 8 9")]
#[case("0x10 -3")]
#[case("halt")]
#[case("pause")]
fn test_round_trip(#[case] source: &str) {
    let compiled = compile(source).expect("compiles");
    let text = decompile(&compiled);
    let recompiled = compile(&text).unwrap_or_else(|err| {
        panic!("decompiled text failed to compile:\n{text}\n{err}");
    });
    assert_eq!(compiled, recompiled, "decompiled:\n{text}");
}

#[test]
fn test_round_trip_kitchen_sink() {
    let source = "\
variable total
input data
output prices float64
output flags bool
: scale 100 * ;
0 10 do data d-> prices loop
data ?-> flags
total @ 1 + total !
1 if pause else halt then
begin total @ 10 < while 1 total +! repeat
";
    let compiled = compile(source).expect("compiles");
    let text = decompile(&compiled);
    let recompiled = compile(&text).expect("recompiles");
    assert_eq!(compiled, recompiled, "decompiled:\n{text}");
}

#[test]
fn test_machine_decompiled_matches_free_function() {
    let machine = Machine32::new(": sq dup * ; 3 sq").expect("compiles");
    assert_eq!(machine.decompiled(), decompile(machine.bytecode()));
}

#[test]
fn test_nested_control_flow_indentation() {
    let text = decompile(&compile("0 3 do i 1 = if i then loop").expect("compiles"));
    assert_eq!(text, "do\n  i\n  1\n  =\n  if\n    i\n  then\nloop\n");
}

#[test]
fn test_current_instruction_renders_source_form() {
    use std::collections::HashMap;
    let mut machine = Machine32::new("pause 1 2 +").expect("compiles");
    machine.run(HashMap::new()).expect("pauses");
    assert_eq!(machine.current_instruction().as_deref(), Some("1"));
}

#[test]
fn test_decompile_hex_literal_as_decimal() {
    let text = decompile(&compile("0x2a").expect("compiles"));
    assert_eq!(text, "42\n");
}
