//! Désassemblage textuel déterministe d’un [`Program`].
//!
//! Une ligne par instruction : offset, ligne source, mnémonique, opérandes et
//! commentaire `;` facultatif (constante, slot ou nom de fonction). Les cibles
//! de saut sont des offsets absolus.

use std::fmt::Write;

use crate::bytecode::program::{ConstValue, FuncEntry, Op, Program};

const MNEMONIC_WIDTH: usize = 20;
const MAX_STR_PREVIEW: usize = 64;

/// Listing complet : en-tête, table des constantes, instructions.
pub fn disassemble_full(program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        ";; program: consts={}, functions={}, ops={}",
        program.consts.len(),
        program.functions.len(),
        program.code.len()
    );

    if !program.consts.is_empty() {
        let _ = writeln!(out, ";; constants");
        for (idx, value) in &program.consts {
            let _ = writeln!(out, "const[{idx:04}] = {}", show_const(value));
        }
    }

    for unit in program.units() {
        out.push('\n');
        write_unit(&mut out, program, unit);
    }
    out
}

/// Instructions seules, une section par fonction.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for (i, unit) in program.units().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_unit(&mut out, program, unit);
    }
    out
}

/// Rend une instruction (sans fin de ligne).
pub fn disassemble_op(program: &Program, pc: u32) -> Option<String> {
    let op = program.code.get(pc as usize)?;
    let unit = program.unit_at(pc);
    let mut out = String::new();
    write_op(&mut out, program, unit, pc, op);
    Some(out)
}

fn write_unit(out: &mut String, program: &Program, unit: &FuncEntry) {
    let _ = writeln!(
        out,
        "== {} (arity={}, locals={}, entry={:04}) ==",
        unit.name, unit.arity, unit.locals, unit.entry
    );
    for pc in unit.entry..unit.end() {
        if let Some(op) = program.code.get(pc as usize) {
            write_op(out, program, Some(unit), pc, op);
            out.push('\n');
        }
    }
}

fn write_op(out: &mut String, program: &Program, unit: Option<&FuncEntry>, pc: u32, op: &Op) {
    let line = program.lines.line_for_pc(pc);
    let mnemonic = op.mnemonic();
    let (operand, note) = describe(program, unit, op);
    match operand {
        Some(a) => {
            let _ = write!(out, "{pc:04} {line:>4} | {mnemonic:<width$} {a}", width = MNEMONIC_WIDTH);
        }
        None => {
            let _ = write!(out, "{pc:04} {line:>4} | {mnemonic}");
        }
    }
    if let Some(n) = note {
        let _ = write!(out, " ; {n}");
    }
}

fn describe(program: &Program, unit: Option<&FuncEntry>, op: &Op) -> (Option<String>, Option<String>) {
    match *op {
        Op::Const(ix) => (
            Some(ix.to_string()),
            Some(program.consts.get(ix).map_or_else(|| "<bad const>".to_owned(), show_const)),
        ),
        Op::LoadLocal(slot) | Op::StoreLocal(slot) => (
            Some(slot.to_string()),
            unit.and_then(|u| u.slot_name(slot)).map(str::to_owned),
        ),
        Op::LoadFunc(ix) => (Some(ix.to_string()), function_name(program, ix)),
        Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfFalseOrPop(t) | Op::JumpIfTrueOrPop(t) => {
            (Some(format!("{t:04}")), None)
        }
        Op::Call { func, argc } => (Some(format!("{func} {argc}")), function_name(program, func)),
        Op::CallValue { argc } => (Some(argc.to_string()), None),
        Op::CallBuiltin { builtin, argc } => (Some(format!("{} {argc}", builtin.name())), None),
        Op::MakeList(n) => (Some(n.to_string()), None),
        Op::Pop
        | Op::Dup
        | Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Rem
        | Op::Neg
        | Op::Not
        | Op::Eq
        | Op::Ne
        | Op::Lt
        | Op::Le
        | Op::Gt
        | Op::Ge
        | Op::Return
        | Op::Index
        | Op::SetIndex
        | Op::Halt => (None, None),
    }
}

fn function_name(program: &Program, ix: u32) -> Option<String> {
    program.function(ix).map(|f| f.name.clone())
}

fn show_const(value: &ConstValue) -> String {
    match value {
        ConstValue::Str(s) if s.chars().count() > MAX_STR_PREVIEW => {
            let head: String = s.chars().take(MAX_STR_PREVIEW).collect();
            format!("\"{}…\"", head.escape_debug())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::program::{LineTable, MAIN_NAME};

    fn add_program() -> Program {
        let mut p = Program::default();
        let one = p.consts.intern(ConstValue::I64(1)).unwrap();
        let two = p.consts.intern(ConstValue::I64(2)).unwrap();
        p.code = vec![Op::Const(one), Op::Const(two), Op::Add, Op::Halt];
        p.lines = LineTable::new();
        for _ in 0..4 {
            p.lines.push(1);
        }
        p.main = FuncEntry { name: MAIN_NAME.into(), entry: 0, len: 4, ..FuncEntry::default() };
        p
    }

    #[test]
    fn compact_listing() {
        insta::assert_snapshot!(disassemble(&add_program()), @r"
        == <main> (arity=0, locals=0, entry=0000) ==
        0000    1 | CONST                0 ; 1
        0001    1 | CONST                1 ; 2
        0002    1 | ADD
        0003    1 | HALT
        ");
    }

    #[test]
    fn full_listing_has_constants() {
        let text = disassemble_full(&add_program());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ";; program: consts=2, functions=0, ops=4");
        assert_eq!(lines[1], ";; constants");
        assert_eq!(lines[2], "const[0000] = 1");
        assert_eq!(lines[3], "const[0001] = 2");
        assert_eq!(lines[4], "");
        assert!(lines[5].starts_with("== <main>"));
    }

    #[test]
    fn deterministic() {
        let p = add_program();
        assert_eq!(disassemble_full(&p), disassemble_full(&p.clone()));
    }

    #[test]
    fn long_strings_are_truncated_on_char_boundary() {
        let s: String = "é".repeat(100);
        let shown = show_const(&ConstValue::Str(s));
        assert!(shown.ends_with("…\""));
        assert_eq!(shown.chars().filter(|c| *c == 'é').count(), MAX_STR_PREVIEW);
    }

    #[test]
    fn single_op() {
        let p = add_program();
        assert_eq!(disassemble_op(&p, 2).as_deref(), Some("0002    1 | ADD"));
        assert_eq!(disassemble_op(&p, 9), None);
    }
}
