//! Bytecode decompiler
//!
//! Renders compiled segments back to source form, used for error context
//! (`current_instruction`) and human inspection. Nested segments are
//! rendered recursively with increasing indent; known dictionary entries
//! render by name, anonymous segments by position.

use super::{Bytecode, Opcode, ReadSpec, DICTIONARY_BASE};

/// Render a whole program: declarations, word definitions, then the
/// top-level segment. The output compiles back to the same bytecode table.
pub fn decompile(bytecode: &Bytecode) -> String {
    let mut out = String::new();
    let mut first = true;

    for name in &bytecode.variables {
        first = false;
        out.push_str("variable ");
        out.push_str(name);
        out.push('\n');
    }
    for name in &bytecode.inputs {
        first = false;
        out.push_str("input ");
        out.push_str(name);
        out.push('\n');
    }
    for decl in &bytecode.outputs {
        first = false;
        out.push_str("output ");
        out.push_str(&decl.name);
        out.push(' ');
        out.push_str(decl.dtype.keyword());
        out.push('\n');
    }

    for entry in &bytecode.dictionary {
        if !first {
            out.push('\n');
        }
        first = false;
        let segment = entry.segment();
        out.push_str(": ");
        out.push_str(&entry.name);
        out.push('\n');
        if bytecode.segment_nonempty(segment) {
            out.push_str("  ");
        }
        out.push_str(&decompile_segment(bytecode, segment, "  "));
        out.push_str(";\n");
    }

    if !first && bytecode.segment_nonempty(0) {
        out.push('\n');
    }
    out.push_str(&decompile_segment(bytecode, 0, ""));
    out
}

/// Render one segment, one instruction per line. Lines after the first are
/// prefixed with `indent`.
pub fn decompile_segment(bytecode: &Bytecode, segment: usize, indent: &str) -> String {
    let mut out = String::new();
    let start = bytecode.offsets[segment];
    let stop = bytecode.offsets[segment + 1];
    let mut position = start;
    while position < stop {
        if position != start {
            out.push_str(indent);
        }
        out.push_str(&decompile_at(bytecode, position, indent));
        out.push('\n');
        position += bytecode.instruction_width(position);
    }
    out
}

/// Render the single instruction at an absolute bytecode position.
pub fn decompile_at(bytecode: &Bytecode, position: usize, indent: &str) -> String {
    let word = bytecode.code[position];
    let next = bytecode.code.get(position + 1).copied().unwrap_or(0);

    if let Some(spec) = ReadSpec::decode(word) {
        let input = &bytecode.inputs[bytecode.code[position + 1] as usize];
        let mut arrow = String::new();
        if spec.repeated {
            arrow.push('#');
        }
        if spec.big_endian {
            arrow.push('!');
        }
        arrow.push(spec.letter());
        arrow.push_str("->");
        let target = if spec.direct {
            bytecode.outputs[bytecode.code[position + 2] as usize].name.as_str()
        } else {
            "stack"
        };
        return format!("{input} {arrow} {target}");
    }

    if word >= DICTIONARY_BASE {
        // Operand-first loop encodings: the leading segment reference
        // belongs to the loop word that follows it.
        if next == Opcode::Again as i32 {
            let body = (word - DICTIONARY_BASE) as usize;
            return format!(
                "begin\n{}{}{indent}again",
                body_indent(bytecode, body, indent),
                decompile_segment(bytecode, body, &format!("{indent}  "))
            );
        }
        if next == Opcode::Until as i32 {
            let body = (word - DICTIONARY_BASE) as usize;
            return format!(
                "begin\n{}{}{indent}until",
                body_indent(bytecode, body, indent),
                decompile_segment(bytecode, body, &format!("{indent}  "))
            );
        }
        if next == Opcode::While as i32 {
            let precondition = (word - DICTIONARY_BASE) as usize;
            let postcondition = (bytecode.code[position + 2] - DICTIONARY_BASE) as usize;
            return format!(
                "begin\n{}{}{indent}while\n{}{}{indent}repeat",
                body_indent(bytecode, precondition, indent),
                decompile_segment(bytecode, precondition, &format!("{indent}  ")),
                body_indent(bytecode, postcondition, indent),
                decompile_segment(bytecode, postcondition, &format!("{indent}  "))
            );
        }
        for entry in &bytecode.dictionary {
            if entry.reference == word {
                return entry.name.clone();
            }
        }
        return format!("(anonymous segment at {})", word - DICTIONARY_BASE);
    }

    let Ok(opcode) = Opcode::try_from(word) else {
        return format!("(unrecognized bytecode {word})");
    };
    match opcode {
        Opcode::Literal => bytecode.code[position + 1].to_string(),
        Opcode::Halt => "halt".to_string(),
        Opcode::Pause => "pause".to_string(),
        Opcode::If => {
            let consequent = (bytecode.code[position + 1] - DICTIONARY_BASE) as usize;
            format!(
                "if\n{}{}{indent}then",
                body_indent(bytecode, consequent, indent),
                decompile_segment(bytecode, consequent, &format!("{indent}  "))
            )
        }
        Opcode::IfElse => {
            let consequent = (bytecode.code[position + 1] - DICTIONARY_BASE) as usize;
            let alternate = (bytecode.code[position + 2] - DICTIONARY_BASE) as usize;
            format!(
                "if\n{}{}{indent}else\n{}{}{indent}then",
                body_indent(bytecode, consequent, indent),
                decompile_segment(bytecode, consequent, &format!("{indent}  ")),
                body_indent(bytecode, alternate, indent),
                decompile_segment(bytecode, alternate, &format!("{indent}  "))
            )
        }
        Opcode::Do | Opcode::DoStep => {
            let body = (bytecode.code[position + 1] - DICTIONARY_BASE) as usize;
            let closer = if opcode == Opcode::DoStep { "+loop" } else { "loop" };
            format!(
                "do\n{}{}{indent}{closer}",
                body_indent(bytecode, body, indent),
                decompile_segment(bytecode, body, &format!("{indent}  "))
            )
        }
        Opcode::Exit => "exit".to_string(),
        Opcode::Put => format!("{} !", bytecode.variables[bytecode.code[position + 1] as usize]),
        Opcode::Inc => format!("{} +!", bytecode.variables[bytecode.code[position + 1] as usize]),
        Opcode::Get => format!("{} @", bytecode.variables[bytecode.code[position + 1] as usize]),
        Opcode::LenInput => format!("{} len", bytecode.inputs[bytecode.code[position + 1] as usize]),
        Opcode::Pos => format!("{} pos", bytecode.inputs[bytecode.code[position + 1] as usize]),
        Opcode::End => format!("{} end", bytecode.inputs[bytecode.code[position + 1] as usize]),
        Opcode::Seek => format!("{} seek", bytecode.inputs[bytecode.code[position + 1] as usize]),
        Opcode::Skip => format!("{} skip", bytecode.inputs[bytecode.code[position + 1] as usize]),
        Opcode::Write => format!(
            "{} <- stack",
            bytecode.outputs[bytecode.code[position + 1] as usize].name
        ),
        Opcode::LenOutput => format!(
            "{} len",
            bytecode.outputs[bytecode.code[position + 1] as usize].name
        ),
        Opcode::Rewind => format!(
            "{} rewind",
            bytecode.outputs[bytecode.code[position + 1] as usize].name
        ),
        Opcode::Again | Opcode::Until | Opcode::While => {
            // Reached only for malformed code; loop words normally render
            // from their leading segment reference.
            format!("(unexpected loop word {word})")
        }
        other => nullary_spelling(other).to_string(),
    }
}

/// Two extra spaces before a block body's first line, if it has one.
fn body_indent(bytecode: &Bytecode, segment: usize, indent: &str) -> String {
    if bytecode.segment_nonempty(segment) {
        format!("{indent}  ")
    } else {
        String::new()
    }
}

fn nullary_spelling(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::I => "i",
        Opcode::J => "j",
        Opcode::K => "k",
        Opcode::Dup => "dup",
        Opcode::Drop => "drop",
        Opcode::Swap => "swap",
        Opcode::Over => "over",
        Opcode::Rot => "rot",
        Opcode::Nip => "nip",
        Opcode::Tuck => "tuck",
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Mod => "mod",
        Opcode::DivMod => "/mod",
        Opcode::Negate => "negate",
        Opcode::Add1 => "1+",
        Opcode::Sub1 => "1-",
        Opcode::Abs => "abs",
        Opcode::Min => "min",
        Opcode::Max => "max",
        Opcode::Eq => "=",
        Opcode::Ne => "<>",
        Opcode::Gt => ">",
        Opcode::Ge => ">=",
        Opcode::Lt => "<",
        Opcode::Le => "<=",
        Opcode::EqZero => "0=",
        Opcode::Invert => "invert",
        Opcode::And => "and",
        Opcode::Or => "or",
        Opcode::Xor => "xor",
        Opcode::Lshift => "lshift",
        Opcode::Rshift => "rshift",
        Opcode::False => "false",
        Opcode::True => "true",
        _ => "(operand word)",
    }
}
