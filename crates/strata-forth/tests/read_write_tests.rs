//! Typed read and output buffer integration tests
//!
//! Exercises the packed read instructions in all four modes (single or
//! repeated, to-stack or direct-to-output), endianness handling, input
//! positioning words, and output actions.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use strata_forth::{Fault, InputStream, Machine32, Machine64, MachineError};

// ============================================================================
// Helpers
// ============================================================================

fn one_input(name: &str, bytes: Vec<u8>) -> HashMap<String, InputStream> {
    HashMap::from([(name.to_string(), InputStream::new(bytes))])
}

fn le_i32s(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn run32_with(source: &str, inputs: HashMap<String, InputStream>) -> Machine32 {
    let mut machine = Machine32::new(source).expect("compiles");
    machine.run(inputs).expect("runs");
    machine
}

// ============================================================================
// Reads onto the stack
// ============================================================================

#[test]
fn test_single_read_to_stack() {
    let machine = run32_with("input a a i-> stack", one_input("a", le_i32s(&[-7])));
    assert_eq!(machine.stack(), &[-7]);
}

#[test]
fn test_big_endian_read_to_stack() {
    let machine = run32_with("input a a !i-> stack", one_input("a", vec![1, 2, 3, 4]));
    assert_eq!(machine.stack(), &[0x0102_0304]);
}

#[test]
fn test_repeated_read_pops_count() {
    let mut bytes = Vec::new();
    for value in [1i16, 2, 3] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    let machine = run32_with("input a 3 a #h-> stack", one_input("a", bytes));
    assert_eq!(machine.stack(), &[1, 2, 3]);
}

#[test]
fn test_signed_and_unsigned_bytes() {
    let machine = run32_with("input a a b-> stack a B-> stack", one_input("a", vec![0xff, 0xff]));
    assert_eq!(machine.stack(), &[-1, 255]);
}

#[test]
fn test_bool_read_pushes_zero_or_one() {
    let machine = run32_with(
        "input a a ?-> stack a ?-> stack",
        one_input("a", vec![7, 0]),
    );
    assert_eq!(machine.stack(), &[1, 0]);
}

#[test]
fn test_wide_read_on_64_bit_machine() {
    let mut machine = Machine64::new("input a a q-> stack").expect("compiles");
    machine
        .run(one_input("a", (-2i64).to_le_bytes().to_vec()))
        .expect("runs");
    assert_eq!(machine.stack(), &[-2i64]);
}

#[test]
fn test_pointer_width_read() {
    let bytes = (5isize).to_le_bytes().to_vec();
    let machine = run32_with("input a a n-> stack", one_input("a", bytes));
    assert_eq!(machine.stack(), &[5]);
}

#[test]
fn test_float_read_truncates_on_stack() {
    let machine = run32_with(
        "input a a d-> stack",
        one_input("a", 2.75f64.to_le_bytes().to_vec()),
    );
    assert_eq!(machine.stack(), &[2]);
}

// ============================================================================
// Direct reads into outputs
// ============================================================================

#[test]
fn test_loop_of_direct_reads() {
    let source = "input a  output o int32  0 10 do a i-> o loop";
    let machine = run32_with(source, one_input("a", le_i32s(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9])));
    let output = machine.output_at("o").expect("output exists");
    assert_eq!(output.len(), 10);
    assert_eq!(output.as_i32().unwrap(), (0..10).collect::<Vec<_>>());
    assert_eq!(machine.input_position_at("a"), Some(40));
    assert_eq!(machine.fault(), None);
}

#[test]
fn test_repeated_direct_read() {
    let mut bytes = Vec::new();
    for value in [1.5f64, -2.5] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    let machine = run32_with("input a output o float64 2 a #d-> o", one_input("a", bytes));
    assert_eq!(machine.output_at("o").unwrap().as_f64().unwrap(), &[1.5, -2.5]);
}

#[test]
fn test_big_endian_direct_read() {
    let machine = run32_with(
        "input a output o int16 a !h-> o",
        one_input("a", vec![0x01, 0x02]),
    );
    assert_eq!(machine.output_at("o").unwrap().as_i16().unwrap(), &[0x0102]);
}

#[test]
fn test_direct_read_converts_to_output_dtype() {
    // uint8 bytes land in a float64 column
    let machine = run32_with(
        "input a output o float64 3 a #B-> o",
        one_input("a", vec![10, 20, 30]),
    );
    assert_eq!(
        machine.output_at("o").unwrap().as_f64().unwrap(),
        &[10.0, 20.0, 30.0]
    );
}

#[test]
fn test_read_and_write_counters() {
    let machine = run32_with(
        "input a output o int32 a i-> o a i-> stack",
        one_input("a", le_i32s(&[1, 2])),
    );
    assert_eq!(machine.count_writes(), 1);
    assert_eq!(machine.count_reads(), 1);
}

// ============================================================================
// Input positioning
// ============================================================================

#[test]
fn test_len_pos_end_seek_skip() {
    let source = "input a 2 a seek a pos a len 2 a skip a end";
    let machine = run32_with(source, one_input("a", vec![0; 4]));
    assert_eq!(machine.stack(), &[2, 4, -1]);
    assert_eq!(machine.input_position_at("a"), Some(4));
}

#[test]
fn test_end_is_false_midway() {
    let machine = run32_with("input a a end", one_input("a", vec![0; 2]));
    assert_eq!(machine.stack(), &[0]);
}

// ============================================================================
// Output actions
// ============================================================================

#[test]
fn test_write_from_stack() {
    let mut machine = Machine64::new("output o int64 7 o <- stack o len").expect("compiles");
    machine.run(HashMap::new()).expect("runs");
    assert_eq!(machine.output_at("o").unwrap().as_i64().unwrap(), &[7]);
    assert_eq!(machine.stack(), &[1]);
}

#[test]
fn test_rewind_drops_elements() {
    let source = "output o int32 1 o <- stack 2 o <- stack 3 o <- stack 2 o rewind o len";
    let machine = run32_with(source, HashMap::new());
    assert_eq!(machine.output_at("o").unwrap().as_i32().unwrap(), &[1]);
    assert_eq!(machine.stack(), &[1]);
}

#[test]
fn test_write_converts_to_narrow_output() {
    let machine = run32_with("output o uint8 300 o <- stack", HashMap::new());
    assert_eq!(machine.output_at("o").unwrap().as_u8().unwrap(), &[44]);
}

#[test]
fn test_pointer_width_outputs() {
    let machine = run32_with("output o intp 7 o <- stack", HashMap::new());
    let output = machine.output_at("o").expect("output exists");
    assert_eq!(output.as_isize().unwrap(), &[7]);

    let machine = run32_with("output o uintp 9 o <- stack", HashMap::new());
    assert_eq!(machine.output_at("o").unwrap().as_usize().unwrap(), &[9]);
}

#[test]
fn test_outputs_listing() {
    let machine = run32_with("output a int8 output b float32", HashMap::new());
    let names: Vec<&str> = machine.outputs().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(machine.output_at_index(0).is_some());
    assert!(machine.output_at("c").is_none());
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn test_read_beyond() {
    let mut machine = Machine32::new("input a a q-> stack").expect("compiles");
    let err = machine.run(one_input("a", vec![0; 4])).expect_err("faults");
    assert_eq!(err, MachineError::Fault(Fault::ReadBeyond));
    assert_eq!(machine.input_position_at("a"), Some(0));
}

#[test]
fn test_seek_beyond() {
    let mut machine = Machine32::new("input a 9 a seek").expect("compiles");
    let err = machine.run(one_input("a", vec![0; 4])).expect_err("faults");
    assert_eq!(err, MachineError::Fault(Fault::SeekBeyond));
}

#[test]
fn test_skip_beyond() {
    let mut machine = Machine32::new("input a -1 a skip").expect("compiles");
    let err = machine.run(one_input("a", vec![0; 4])).expect_err("faults");
    assert_eq!(err, MachineError::Fault(Fault::SkipBeyond));
}

#[test]
fn test_rewind_beyond() {
    let mut machine = Machine32::new("output o int32 1 o rewind").expect("compiles");
    let err = machine.run(HashMap::new()).expect_err("faults");
    assert_eq!(err, MachineError::Fault(Fault::RewindBeyond));
}

#[test]
fn test_missing_input_is_reported_by_name() {
    let mut machine = Machine32::new("input a input b").expect("compiles");
    let err = machine.run(one_input("a", vec![])).expect_err("missing b");
    assert_eq!(
        err,
        MachineError::MissingInput {
            name: "b".to_string()
        }
    );
}

#[test]
fn test_extra_inputs_are_ignored() {
    let mut inputs = one_input("a", vec![1, 0, 0, 0]);
    inputs.insert("extra".to_string(), InputStream::new(vec![9]));
    let machine = run32_with("input a a i-> stack", inputs);
    assert_eq!(machine.stack(), &[1]);
}

#[test]
fn test_negative_repeat_count_faults() {
    let mut machine = Machine32::new("input a -1 a #i-> stack").expect("compiles");
    let err = machine.run(one_input("a", vec![0; 8])).expect_err("faults");
    assert_eq!(err, MachineError::Fault(Fault::ReadBeyond));
}
