//! Lowering behavior: instruction selection, synthesized expansions, and
//! the storage-cell declaration contract.

use llvm2shasm::ir::{parse_llvm_ir, Block, Instruction, Module};
use llvm2shasm::lower::{emit_shasm, EmitError};

fn lower(ir: &str) -> String {
    let module = parse_llvm_ir(ir, "<test>").unwrap();
    emit_shasm(&module).unwrap()
}

fn lower_err(ir: &str) -> EmitError {
    let module = parse_llvm_ir(ir, "<test>").unwrap();
    emit_shasm(&module).unwrap_err()
}

fn count_lines(text: &str, wanted: &str) -> usize {
    text.lines().filter(|line| *line == wanted).count()
}

#[test]
fn minimal_flow_emits_expected_opcodes() {
    let asm = lower(
        r#"
define i64 @main() {
entry:
  %a = alloca i64, align 8
  %b = alloca i64, align 8
  store i64 7, ptr %a, align 8
  %x = load i64, ptr %a, align 8
  %y = add nsw i64 %x, 3
  store i64 %y, ptr %b, align 8
  %z = load i64, ptr %b, align 8
  %ok = icmp sle i64 %z, 12
  br i1 %ok, label %then, label %else
then:
  ret i64 %z
else:
  ret i64 0
}
"#,
    );

    assert!(asm.contains("    add v_y v_x const_3"));
    assert!(asm.contains("    load v_x v_a const_0"));
    assert!(asm.contains("    store v_a const_0 const_7"));
    assert!(asm.contains("    jmp0 v_ok else"));
    assert!(asm.contains("    halt"));
}

#[test]
fn prologue_jumps_to_the_literal_entry_label() {
    let asm = lower("define i32 @main() {\nentry:\n  ret i32 0\n}\n");
    let lines: Vec<&str> = asm.lines().collect();
    let start = lines.iter().position(|l| *l == "_start:").unwrap();
    assert_eq!(lines[start + 1], "    jmp entry");
    assert_eq!(lines[start + 2], "entry:");
}

#[test]
fn sle_compare_is_one_instruction() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %a = alloca i32
  %x = load i32, ptr %a
  %c = icmp sle i32 %x, 10
  ret i32 %x
}
"#,
    );
    assert!(asm.contains("    lte v_c v_x const_10"));
    assert!(!asm.contains("v_c_cmp_rhs_minus_1"));
}

#[test]
fn slt_compare_synthesizes_exactly_two_instructions() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %a = alloca i32
  %x = load i32, ptr %a
  %c = icmp slt i32 %x, 10
  ret i32 %x
}
"#,
    );
    let lines: Vec<&str> = asm.lines().collect();
    let sub = lines
        .iter()
        .position(|l| *l == "    sub v_c_cmp_rhs_minus_1 const_10 const_1")
        .unwrap();
    assert_eq!(lines[sub + 1], "    lte v_c v_x v_c_cmp_rhs_minus_1");
    assert_eq!(count_lines(&asm, "v_c_cmp_rhs_minus_1 = 0"), 1);
}

#[test]
fn unsupported_predicate_is_rejected() {
    let err = lower_err(
        "define i32 @main() {\nentry:\n  %a = alloca i32\n  %x = load i32, ptr %a\n  %c = icmp eq i32 %x, 0\n  ret i32 0\n}\n",
    );
    assert!(matches!(
        err,
        EmitError::UnsupportedOperator {
            kind: "comparison predicate",
            ..
        }
    ));
}

#[test]
fn rotr32_expands_to_four_instructions_sharing_const_32() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %a = alloca i32
  %v = load i32, ptr %a
  %r1 = call i32 @rotr32(i32 noundef %v, i32 noundef 5)
  %r2 = call i32 @rotr32(i32 noundef %r1, i32 noundef 7)
  ret i32 %r2
}
"#,
    );
    let lines: Vec<&str> = asm.lines().collect();
    let first = lines
        .iter()
        .position(|l| *l == "    sub v_r1_rot_shift const_32 const_5")
        .unwrap();
    assert_eq!(lines[first + 1], "    lshr v_r1_rot_right v_v const_5");
    assert_eq!(lines[first + 2], "    shl v_r1_rot_left v_v v_r1_rot_shift");
    assert_eq!(lines[first + 3], "    or v_r1 v_r1_rot_right v_r1_rot_left");

    // The shared constant cell is declared exactly once for both calls.
    assert_eq!(count_lines(&asm, "const_32 = 32"), 1);
    assert!(asm.contains("    sub v_r2_rot_shift const_32 const_7"));
}

#[test]
fn lshr32_maps_to_a_single_native_shift() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %a = alloca i32
  %v = load i32, ptr %a
  %r = call i32 @lshr32(i32 noundef %v, i32 noundef 3)
  ret i32 %r
}
"#,
    );
    assert!(asm.contains("    lshr v_r v_v const_3"));
    assert!(!asm.contains("_rot_"));
}

#[test]
fn unknown_call_target_is_rejected() {
    let err = lower_err(
        "define i32 @main() {\nentry:\n  %r = call i32 @magic(i32 noundef 1, i32 noundef 2)\n  ret i32 %r\n}\n",
    );
    assert_eq!(
        err,
        EmitError::UnsupportedCallTarget {
            name: "magic".into()
        }
    );
}

#[test]
fn wrong_intrinsic_arity_is_rejected() {
    let err = lower_err(
        "define i32 @main() {\nentry:\n  %r = call i32 @rotr32(i32 noundef 1)\n  ret i32 %r\n}\n",
    );
    assert_eq!(
        err,
        EmitError::UnsupportedArity {
            callee: "rotr32".into(),
            arity: 1
        }
    );
}

#[test]
fn every_distinct_literal_declares_exactly_one_constant() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %a = alloca i32
  store i32 7, ptr %a
  %x = load i32, ptr %a
  %y = add nsw i32 %x, 7
  %z = mul nsw i32 %y, 7
  ret i32 %z
}
"#,
    );
    assert_eq!(count_lines(&asm, "const_7 = 7"), 1);
}

#[test]
fn negative_literals_get_their_own_constant_cells() {
    let asm = lower(
        "define i32 @main() {\nentry:\n  %a = alloca i32\n  %x = load i32, ptr %a\n  %y = add nsw i32 %x, -2\n  ret i32 %y\n}\n",
    );
    assert_eq!(count_lines(&asm, "const_neg_2 = -2"), 1);
    assert!(asm.contains("    add v_y v_x const_neg_2"));
}

#[test]
fn byte_gep_and_two_index_gep_resolve_to_the_same_element_index() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %buf = alloca [4 x i32], align 16
  store i32 9, ptr %buf
  %p = getelementptr inbounds [4 x i32], ptr %buf, i64 0, i64 2
  %q = getelementptr inbounds i8, ptr %buf, i64 8
  %x = load i32, ptr %p
  %y = load i32, ptr %q
  %s = add nsw i32 %x, %y
  ret i32 %s
}
"#,
    );
    // Stride is 4 bytes, so byte offset 8 and element index 2 must agree.
    assert!(asm.contains("    load v_x v_buf const_2"));
    assert!(asm.contains("    load v_y v_buf const_2"));
}

#[test]
fn array_alloca_reserves_one_cell_per_element() {
    let asm = lower(
        "define i32 @main() {\nentry:\n  %buf = alloca [4 x i32], align 16\n  ret i32 0\n}\n",
    );
    assert!(asm.contains("v_buf = 0 0 0 0\n"));
}

#[test]
fn unaligned_byte_offset_is_rejected() {
    let err = lower_err(
        "define i32 @main() {\nentry:\n  %buf = alloca [4 x i32]\n  %q = getelementptr inbounds i8, ptr %buf, i64 3\n  %x = load i32, ptr %q\n  ret i32 %x\n}\n",
    );
    assert_eq!(err, EmitError::UnalignedOffset { offset: 3, stride: 4 });
}

#[test]
fn symbolic_byte_offset_works_at_stride_one() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %buf = alloca [8 x i8]
  %idx = load i8, ptr %buf
  %p = getelementptr inbounds i8, ptr %buf, i64 %idx
  %x = load i8, ptr %p
  ret i32 0
}
"#,
    );
    // The operand's own value cell doubles as the element index.
    assert!(asm.contains("    load v_x v_buf v_idx"));
}

#[test]
fn symbolic_byte_offset_is_rejected_for_wider_strides() {
    let err = lower_err(
        r#"
define i32 @main() {
entry:
  %buf = alloca [4 x i32]
  %idx = load i32, ptr %buf
  %p = getelementptr inbounds i8, ptr %buf, i64 %idx
  %x = load i32, ptr %p
  ret i32 %x
}
"#,
    );
    assert_eq!(
        err,
        EmitError::UnsupportedDynamicOffset {
            token: "%idx".into(),
            stride: 4
        }
    );
}

// Chained geps do not accumulate: the second index replaces the first in
// the pointer's column. Known limitation, kept as given; valid only for
// single-level addressing directly off an allocation.
#[test]
fn chained_gep_replaces_rather_than_accumulates_the_column() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %buf = alloca [4 x i32]
  %p1 = getelementptr inbounds [4 x i32], ptr %buf, i64 0, i64 2
  %p2 = getelementptr inbounds [4 x i32], ptr %p1, i64 0, i64 1
  %x = load i32, ptr %p2
  ret i32 %x
}
"#,
    );
    // A summing scheme would produce const_3 here.
    assert!(asm.contains("    load v_x v_buf const_1"));
}

#[test]
fn casts_lower_to_an_identity_move() {
    let asm = lower(
        "define i64 @main() {\nentry:\n  %a = alloca i32\n  %x = load i32, ptr %a\n  %w = sext i32 %x to i64\n  ret i64 %w\n}\n",
    );
    assert!(asm.contains("    add v_w v_x const_0"));
}

#[test]
fn conditional_branch_lowers_to_negated_jump_plus_fallthrough() {
    let asm = lower(
        r#"
define i32 @main() {
entry:
  %a = alloca i32
  %x = load i32, ptr %a
  %c = icmp sle i32 %x, 0
  br i1 %c, label %for.body, label %for.end
for.body:
  ret i32 1
for.end:
  ret i32 0
}
"#,
    );
    let lines: Vec<&str> = asm.lines().collect();
    let jmp0 = lines
        .iter()
        .position(|l| *l == "    jmp0 v_c for_end")
        .unwrap();
    assert_eq!(lines[jmp0 + 1], "    jmp for_body");
    // Dotted IR labels sanitize to underscores in label lines too.
    assert!(asm.contains("for_body:\n"));
    assert!(asm.contains("for_end:\n"));
}

#[test]
fn return_with_value_copies_into_out_then_halts() {
    let asm = lower("define i32 @main() {\nentry:\n  ret i32 5\n}\n");
    let lines: Vec<&str> = asm.lines().collect();
    let copy = lines
        .iter()
        .position(|l| *l == "    add out const_5 const_0")
        .unwrap();
    assert_eq!(lines[copy + 1], "    halt");
    assert!(asm.contains("out = 0\n"));
}

#[test]
fn return_void_is_a_bare_halt() {
    let asm = lower("define void @main() {\nentry:\n  ret void\n}\n");
    assert!(asm.contains("    halt"));
    assert!(!asm.contains("    add out"));
}

#[test]
fn unknown_value_token_is_rejected() {
    let err = lower_err(
        "define i32 @main() {\nentry:\n  %y = add nsw i32 %ghost, 1\n  ret i32 %y\n}\n",
    );
    assert_eq!(
        err,
        EmitError::UnknownValueToken {
            token: "%ghost".into()
        }
    );
}

#[test]
fn unknown_pointer_token_is_rejected() {
    let err = lower_err("define i32 @main() {\nentry:\n  %x = load i32, ptr %nope\n  ret i32 %x\n}\n");
    assert_eq!(
        err,
        EmitError::UnknownPointerToken {
            token: "%nope".into()
        }
    );
}

// The parser cannot produce a binop outside the closed set, but a module
// built by hand can; the emitter still rejects it.
#[test]
fn emitter_rejects_binops_outside_the_closed_set() {
    let module = Module {
        entry: "entry".into(),
        blocks: vec![Block {
            label: "entry".into(),
            instructions: vec![Instruction::BinOp {
                result: "%x".into(),
                op: "sdiv".into(),
                lhs: "1".into(),
                rhs: "2".into(),
            }],
        }],
    };
    let err = emit_shasm(&module).unwrap_err();
    assert!(matches!(
        err,
        EmitError::UnsupportedOperator {
            kind: "arithmetic op",
            ..
        }
    ));
}

#[test]
fn identical_input_produces_identical_output() {
    let ir = r#"
define i32 @main() {
entry:
  %buf = alloca [4 x i32]
  %p = getelementptr inbounds [4 x i32], ptr %buf, i64 0, i64 1
  store i32 3, ptr %p
  %x = load i32, ptr %p
  ret i32 %x
}
"#;
    assert_eq!(lower(ir), lower(ir));
}
