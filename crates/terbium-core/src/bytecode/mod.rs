//! Bytecode : le [`Program`] compilé et sa table des constantes, le
//! validateur structurel passé avant exécution, le désassembleur.

/// Représentation du programme (instructions, constantes, fonctions, lignes).
pub mod program;
pub mod validate;
pub mod disasm;

pub use program::{Builtin, ConstPool, ConstValue, FuncEntry, LineTable, Op, Program, MAIN_NAME};
pub use validate::{validate_program, ValidationError};
