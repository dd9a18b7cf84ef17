//! Validation structurelle de tout [`Program`] avant exécution.
//!
//! Un programme validé ne fait jamais lire la VM hors de son code, de ses
//! constantes, de sa table des fonctions ou des slots d’un cadre. L’équilibre
//! de la pile relève de l’exécution.

use thiserror::Error;

use crate::bytecode::program::{FuncEntry, Op, Program};

/// Motif de rejet d’un programme.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `lines` et `code` de longueurs différentes.
    #[error("line table has {lines} entries but code has {ops} ops")]
    LineTableMismatch {
        /// Entrées de lignes.
        lines: usize,
        /// Instructions.
        ops: usize,
    },
    /// Le point d’entrée ne commence pas à l’offset 0.
    #[error("entry point must start at offset 0, found {0}")]
    BadEntry(u32),
    /// La plage d’une unité sort du code.
    #[error("`{name}` spans {entry}..{end} outside of code (len {len})")]
    RangeOutOfBounds {
        /// Nom de l’unité.
        name: String,
        /// Premier offset.
        entry: u32,
        /// Offset de fin (exclu).
        end: u32,
        /// Longueur du code.
        len: usize,
    },
    /// Deux unités revendiquent la même instruction.
    #[error("op {pc} belongs to both `{first}` and `{second}`")]
    Overlap {
        /// Offset.
        pc: u32,
        /// Premier propriétaire.
        first: String,
        /// Second propriétaire.
        second: String,
    },
    /// Instruction sans unité.
    #[error("op {pc} does not belong to any function")]
    Orphan {
        /// Offset.
        pc: u32,
    },
    /// Métadonnées de slots incohérentes.
    #[error("`{name}` declares arity {arity} with {locals} local slots and {names} slot names")]
    BadSlots {
        /// Nom de l’unité.
        name: String,
        /// Arité déclarée.
        arity: u32,
        /// Nombre de slots déclaré.
        locals: u32,
        /// Noms de slots conservés.
        names: usize,
    },
    /// Indice de constante hors bornes.
    #[error("op {pc} references const {index} but pool size is {size}")]
    BadConst {
        /// Offset.
        pc: u32,
        /// Indice référencé.
        index: u32,
        /// Taille de la table.
        size: usize,
    },
    /// Slot local hors bornes pour l’unité.
    #[error("op {pc} references local {slot} but `{name}` has {locals} slots")]
    BadLocal {
        /// Offset.
        pc: u32,
        /// Slot.
        slot: u32,
        /// Unité propriétaire.
        name: String,
        /// Nombre de slots.
        locals: u32,
    },
    /// Saut hors de l’unité.
    #[error("op {pc} jumps to {target}, outside of `{name}` ({entry}..{end})")]
    BadJump {
        /// Offset.
        pc: u32,
        /// Offset cible.
        target: u32,
        /// Unité propriétaire.
        name: String,
        /// Premier offset de l’unité.
        entry: u32,
        /// Offset de fin de l’unité (exclu).
        end: u32,
    },
    /// Indice de fonction hors bornes.
    #[error("op {pc} references function {index} but the table has {size} entries")]
    BadFunction {
        /// Offset.
        pc: u32,
        /// Indice référencé.
        index: u32,
        /// Taille de la table.
        size: usize,
    },
    /// Native appelée avec un mauvais nombre d’arguments.
    #[error("op {pc} calls `{name}` with {argc} arguments, expected {expected}")]
    BuiltinArity {
        /// Offset.
        pc: u32,
        /// Nom de la native.
        name: &'static str,
        /// Arguments passés.
        argc: u32,
        /// Arité fixe.
        expected: u32,
    },
}

/// Validation structurelle d’un programme.
pub fn validate_program(program: &Program) -> Result<(), ValidationError> {
    let ops = program.code.len();
    if program.lines.len() != ops {
        return Err(ValidationError::LineTableMismatch { lines: program.lines.len(), ops });
    }
    if program.main.entry != 0 {
        return Err(ValidationError::BadEntry(program.main.entry));
    }

    let units: Vec<&FuncEntry> = program.units().collect();
    let mut owner: Vec<Option<usize>> = vec![None; ops];
    for (u, unit) in units.iter().enumerate() {
        if unit.end() as usize > ops {
            return Err(ValidationError::RangeOutOfBounds {
                name: unit.name.clone(),
                entry: unit.entry,
                end: unit.end(),
                len: ops,
            });
        }
        if unit.arity > unit.locals || unit.slot_names.len() > unit.locals as usize {
            return Err(ValidationError::BadSlots {
                name: unit.name.clone(),
                arity: unit.arity,
                locals: unit.locals,
                names: unit.slot_names.len(),
            });
        }
        for pc in unit.entry..unit.end() {
            let slot = &mut owner[pc as usize];
            if let Some(prev) = *slot {
                return Err(ValidationError::Overlap {
                    pc,
                    first: units[prev].name.clone(),
                    second: unit.name.clone(),
                });
            }
            *slot = Some(u);
        }
    }

    let const_count = program.consts.len();
    let func_count = program.functions.len();
    for (pc, op) in program.code.iter().enumerate() {
        let pc = pc as u32;
        let unit = match owner[pc as usize] {
            Some(u) => units[u],
            None => return Err(ValidationError::Orphan { pc }),
        };
        match *op {
            Op::Const(index) if index as usize >= const_count => {
                return Err(ValidationError::BadConst { pc, index, size: const_count });
            }
            Op::LoadLocal(slot) | Op::StoreLocal(slot) if slot >= unit.locals => {
                return Err(ValidationError::BadLocal {
                    pc,
                    slot,
                    name: unit.name.clone(),
                    locals: unit.locals,
                });
            }
            Op::LoadFunc(index) | Op::Call { func: index, .. } if index as usize >= func_count => {
                return Err(ValidationError::BadFunction { pc, index, size: func_count });
            }
            Op::CallBuiltin { builtin, argc } => {
                if let Some(expected) = builtin.arity() {
                    if argc != expected {
                        return Err(ValidationError::BuiltinArity { pc, name: builtin.name(), argc, expected });
                    }
                }
            }
            _ => {}
        }
        if let Some(target) = op.jump_target() {
            if !unit.contains(target) {
                return Err(ValidationError::BadJump {
                    pc,
                    target,
                    name: unit.name.clone(),
                    entry: unit.entry,
                    end: unit.end(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::program::{Builtin, ConstValue, LineTable, MAIN_NAME};

    fn program(code: Vec<Op>, locals: u32) -> Program {
        let mut lines = LineTable::new();
        for _ in &code {
            lines.push(1);
        }
        let len = code.len() as u32;
        let mut p = Program {
            code,
            lines,
            main: FuncEntry { name: MAIN_NAME.into(), entry: 0, len, arity: 0, locals, slot_names: Vec::new() },
            ..Program::default()
        };
        let _ = p.consts.intern(ConstValue::I64(1));
        p
    }

    #[test]
    fn accepts_well_formed() {
        let p = program(vec![Op::Const(0), Op::StoreLocal(0), Op::LoadLocal(0), Op::JumpIfFalse(4), Op::Halt], 1);
        assert_eq!(validate_program(&p), Ok(()));
    }

    #[test]
    fn rejects_bad_const() {
        let p = program(vec![Op::Const(3), Op::Halt], 0);
        assert!(matches!(validate_program(&p), Err(ValidationError::BadConst { pc: 0, index: 3, .. })));
    }

    #[test]
    fn rejects_bad_local() {
        let p = program(vec![Op::LoadLocal(1), Op::Halt], 1);
        assert!(matches!(validate_program(&p), Err(ValidationError::BadLocal { slot: 1, .. })));
    }

    #[test]
    fn rejects_dangling_jump() {
        let p = program(vec![Op::Jump(7), Op::Halt], 0);
        assert!(matches!(validate_program(&p), Err(ValidationError::BadJump { target: 7, .. })));
    }

    #[test]
    fn rejects_jump_into_other_function() {
        let mut p = program(vec![Op::Jump(2), Op::Halt, Op::Const(0), Op::Return], 0);
        p.main.len = 2;
        p.functions.push(FuncEntry { name: "f".into(), entry: 2, len: 2, ..FuncEntry::default() });
        assert!(matches!(validate_program(&p), Err(ValidationError::BadJump { target: 2, .. })));
    }

    #[test]
    fn rejects_orphans_and_unknown_functions() {
        let mut p = program(vec![Op::Halt, Op::Return], 0);
        p.main.len = 1;
        assert_eq!(validate_program(&p), Err(ValidationError::Orphan { pc: 1 }));

        let p = program(vec![Op::Call { func: 0, argc: 0 }, Op::Halt], 0);
        assert!(matches!(validate_program(&p), Err(ValidationError::BadFunction { index: 0, size: 0, .. })));
    }

    #[test]
    fn rejects_builtin_arity() {
        let p = program(vec![Op::Const(0), Op::CallBuiltin { builtin: Builtin::Len, argc: 2 }, Op::Halt], 0);
        assert!(matches!(validate_program(&p), Err(ValidationError::BuiltinArity { name: "len", .. })));
    }

    #[test]
    fn rejects_line_mismatch() {
        let mut p = program(vec![Op::Halt], 0);
        p.lines.push(2);
        assert!(matches!(validate_program(&p), Err(ValidationError::LineTableMismatch { lines: 2, ops: 1 })));
    }
}
