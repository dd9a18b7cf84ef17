//! Structures du bytecode : constantes, instructions et programme compilé.

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    mem, slice,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Valeurs admises dans la table des constantes.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstValue {
    /// Littéral `null`.
    Null,
    /// Booléen.
    Bool(bool),
    /// Entier signé 64 bits.
    I64(i64),
    /// Flottant 64 bits.
    F64(f64),
    /// Chaîne UTF-8.
    Str(String),
}

// Flottants comparés bit à bit pour la déduplication
// (`NaN` occupe une seule entrée, `0.0` et `-0.0` restent distincts).
impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::I64(v) => v.hash(state),
            Self::F64(v) => v.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(i) => write!(f, "{i}"),
            Self::F64(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
        }
    }
}

/// Table des constantes : indices stables (base 0), valeurs dédupliquées.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstPool {
    values: Vec<ConstValue>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<ConstValue, u32>,
}

impl PartialEq for ConstPool {
    fn eq(&self, other: &Self) -> bool { self.values == other.values }
}

impl ConstPool {
    /// Table vide.
    pub fn new() -> Self { Self::default() }

    /// Nombre de constantes.
    pub fn len(&self) -> usize { self.values.len() }

    /// Table vide ?
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Itère en `(index, &ConstValue)`.
    pub fn iter(&self) -> ConstIter<'_> { ConstIter { inner: self.values.iter().enumerate() } }

    /// Indice de `value`, ajoutée si elle n’y est pas encore.
    ///
    /// `None` si la table dépasserait `u32::MAX` entrées.
    pub fn intern(&mut self, value: ConstValue) -> Option<u32> {
        if let Some(&idx) = self.index.get(&value) {
            return Some(idx);
        }
        let idx = u32::try_from(self.values.len()).ok()?;
        self.index.insert(value.clone(), idx);
        self.values.push(value);
        Some(idx)
    }

    /// Constante par indice.
    pub fn get(&self, idx: u32) -> Option<&ConstValue> { self.values.get(idx as usize) }
}

/// Itérateur de [`ConstPool::iter`].
pub struct ConstIter<'a> {
    inner: std::iter::Enumerate<slice::Iter<'a, ConstValue>>,
}

impl<'a> Iterator for ConstIter<'a> {
    type Item = (u32, &'a ConstValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(idx, value)| (idx as u32, value))
    }
}

impl<'a> IntoIterator for &'a ConstPool {
    type Item = (u32, &'a ConstValue);
    type IntoIter = ConstIter<'a>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

/// Table des lignes : une ligne source par pc.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineTable {
    lines: Vec<u32>,
}

impl LineTable {
    /// Table vide.
    pub fn new() -> Self { Self { lines: Vec::new() } }
    /// Ligne du pc suivant.
    pub fn push(&mut self, line: u32) { self.lines.push(line); }
    /// Nombre d’entrées.
    pub fn len(&self) -> usize { self.lines.len() }
    /// Aucune ligne enregistrée ?
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    /// Ligne source de `pc` (0 si inconnue).
    pub fn line_for_pc(&self, pc: u32) -> u32 { self.lines.get(pc as usize).copied().unwrap_or_default() }
    /// Ajoute toutes les entrées de `other`.
    pub fn extend_from(&mut self, other: &Self) { self.lines.extend_from_slice(&other.lines); }
}

/// Fonctions natives : connues du compilateur, implémentées par le runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Builtin {
    /// `print(args...)` : ajoute une ligne à la sortie capturée.
    Print,
    /// `len(x)` : longueur d’une liste ou d’une chaîne.
    Len,
    /// `push(list, value)` : ajout en place.
    Push,
    /// `int(x)` : conversion explicite en entier.
    Int,
    /// `float(x)` : conversion explicite en flottant.
    Float,
    /// `str(x)` : forme affichée d’une valeur.
    Str,
}

impl Builtin {
    /// Toutes les natives, ordre stable.
    pub const ALL: [Self; 6] = [Self::Print, Self::Len, Self::Push, Self::Int, Self::Float, Self::Str];

    /// Nom dans la source.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Len => "len",
            Self::Push => "push",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
        }
    }

    /// Arité fixe, `None` si variadique.
    pub const fn arity(self) -> Option<u32> {
        match self {
            Self::Print => None,
            Self::Len | Self::Int | Self::Float | Self::Str => Some(1),
            Self::Push => Some(2),
        }
    }

    /// Recherche par nom source.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// Instruction de la VM ; opérandes : indices ou immédiats de taille fixe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Op {
    /// Empile la constante `idx`.
    Const(u32),
    /// Dépile.
    Pop,
    /// Duplique le sommet.
    Dup,
    /// Empile le slot local `n` du cadre courant.
    LoadLocal(u32),
    /// Dépile dans le slot local `n` du cadre courant.
    StoreLocal(u32),
    /// Empile une référence à la fonction `idx`.
    LoadFunc(u32),
    /// `a + b` (entiers, flottants, concaténation).
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`.
    Mul,
    /// `a / b`.
    Div,
    /// `a % b`.
    Rem,
    /// `-a`.
    Neg,
    /// `!a`.
    Not,
    /// `a == b`.
    Eq,
    /// `a != b`.
    Ne,
    /// `a < b`.
    Lt,
    /// `a <= b`.
    Le,
    /// `a > b`.
    Gt,
    /// `a >= b`.
    Ge,
    /// Saut inconditionnel vers un offset absolu.
    Jump(u32),
    /// Dépile un booléen ; saute s’il vaut `false`.
    JumpIfFalse(u32),
    /// Sommet `false` : saute et le garde, sinon le dépile (`&&`).
    JumpIfFalseOrPop(u32),
    /// Sommet `true` : saute et le garde, sinon le dépile (`||`).
    JumpIfTrueOrPop(u32),
    /// Appelle `func` avec `argc` arguments pris sur la pile.
    Call {
        /// Indice dans la table des fonctions.
        func: u32,
        /// Nombre d’arguments sur la pile.
        argc: u32,
    },
    /// Appelle la référence de fonction située sous les `argc` arguments.
    CallValue {
        /// Nombre d’arguments sur la pile.
        argc: u32,
    },
    /// Appelle une native avec `argc` arguments.
    CallBuiltin {
        /// La native.
        builtin: Builtin,
        /// Nombre d’arguments sur la pile.
        argc: u32,
    },
    /// Rend le sommet à l’appelant.
    Return,
    /// Construit une liste des `n` valeurs du sommet.
    MakeList(u32),
    /// `list[index]`.
    Index,
    /// `list[index] = value`, laisse `value` sur la pile.
    SetIndex,
    /// Arrête le programme, le sommet est le résultat.
    Halt,
}

impl Op {
    /// Mnémonique en majuscules (désassembleur).
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Const(_) => "CONST",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::LoadLocal(_) => "LOAD_LOCAL",
            Self::StoreLocal(_) => "STORE_LOCAL",
            Self::LoadFunc(_) => "LOAD_FUNC",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Rem => "REM",
            Self::Neg => "NEG",
            Self::Not => "NOT",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Jump(_) => "JUMP",
            Self::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Self::JumpIfFalseOrPop(_) => "JUMP_IF_FALSE_OR_POP",
            Self::JumpIfTrueOrPop(_) => "JUMP_IF_TRUE_OR_POP",
            Self::Call { .. } => "CALL",
            Self::CallValue { .. } => "CALL_VALUE",
            Self::CallBuiltin { .. } => "CALL_BUILTIN",
            Self::Return => "RETURN",
            Self::MakeList(_) => "MAKE_LIST",
            Self::Index => "INDEX",
            Self::SetIndex => "SET_INDEX",
            Self::Halt => "HALT",
        }
    }

    /// Cible de saut, si l’instruction en porte une.
    pub const fn jump_target(&self) -> Option<u32> {
        match *self {
            Self::Jump(t) | Self::JumpIfFalse(t) | Self::JumpIfFalseOrPop(t) | Self::JumpIfTrueOrPop(t) => Some(t),
            _ => None,
        }
    }

    /// Réécrit la cible de saut (sans effet sinon).
    pub fn set_jump_target(&mut self, target: u32) {
        match self {
            Self::Jump(t) | Self::JumpIfFalse(t) | Self::JumpIfFalseOrPop(t) | Self::JumpIfTrueOrPop(t) => *t = target,
            _ => {}
        }
    }

    /// Effet net sur la pile quand l’exécution continue en séquence.
    ///
    /// `JumpIfFalseOrPop`/`JumpIfTrueOrPop` : effet en séquence (-1) ;
    /// `Return` et `Halt` : le résultat dépilé.
    pub const fn stack_effect(&self) -> i64 {
        match *self {
            Self::Const(_) | Self::Dup | Self::LoadLocal(_) | Self::LoadFunc(_) => 1,
            Self::Neg | Self::Not | Self::Jump(_) => 0,
            Self::Pop
            | Self::StoreLocal(_)
            | Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Rem
            | Self::Eq
            | Self::Ne
            | Self::Lt
            | Self::Le
            | Self::Gt
            | Self::Ge
            | Self::JumpIfFalse(_)
            | Self::JumpIfFalseOrPop(_)
            | Self::JumpIfTrueOrPop(_)
            | Self::Index
            | Self::Return
            | Self::Halt => -1,
            Self::SetIndex => -2,
            Self::Call { argc, .. } | Self::CallBuiltin { argc, .. } => 1 - argc as i64,
            Self::CallValue { argc } => -(argc as i64),
            Self::MakeList(n) => 1 - n as i64,
        }
    }
}

/// Entrée de la table des fonctions : plage de code, arité, slots locaux.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FuncEntry {
    /// Nom (`<main>` pour le point d’entrée).
    pub name: String,
    /// Offset de la première instruction.
    pub entry: u32,
    /// Nombre d’instructions de la fonction.
    pub len: u32,
    /// Nombre de paramètres (slots `0..arity`).
    pub arity: u32,
    /// Nombre de slots locaux, paramètres compris.
    pub locals: u32,
    /// Nom par slot (vide si les noms ne sont pas conservés).
    pub slot_names: Vec<String>,
}

impl FuncEntry {
    /// Offset qui suit la dernière instruction.
    pub const fn end(&self) -> u32 { self.entry.saturating_add(self.len) }

    /// `pc` appartient-il à la fonction ?
    pub const fn contains(&self, pc: u32) -> bool { pc >= self.entry && pc < self.end() }

    /// Nom conservé de `slot`.
    pub fn slot_name(&self, slot: u32) -> Option<&str> {
        self.slot_names.get(slot as usize).map(String::as_str)
    }
}

/// Nom du point d’entrée.
pub const MAIN_NAME: &str = "<main>";

/// Programme compilé : un flux d’instructions partagé par le point d’entrée
/// et les fonctions, avec constantes, lignes et table des fonctions.
///
/// Le point d’entrée commence toujours à l’offset 0.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Program {
    /// Instructions, à plat.
    pub code: Vec<Op>,
    /// Ligne source par instruction.
    pub lines: LineTable,
    /// Constantes dédupliquées.
    pub consts: ConstPool,
    /// Point d’entrée (`locals` : slots du cadre racine).
    pub main: FuncEntry,
    /// Table des fonctions, indexée par l’opérande de `CALL`/`LOAD_FUNC`.
    pub functions: Vec<FuncEntry>,
}

impl Program {
    /// Slots locaux du cadre racine.
    pub const fn local_count(&self) -> u32 { self.main.locals }

    /// Fonction par indice.
    pub fn function(&self, idx: u32) -> Option<&FuncEntry> { self.functions.get(idx as usize) }

    /// Indice et entrée par nom (première occurrence).
    pub fn function_named(&self, name: &str) -> Option<(u32, &FuncEntry)> {
        self.functions
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (i as u32, f))
    }

    /// Le point d’entrée puis chaque fonction, dans l’ordre de la table.
    pub fn units(&self) -> impl Iterator<Item = &FuncEntry> {
        std::iter::once(&self.main).chain(self.functions.iter())
    }

    /// Unité (point d’entrée ou fonction) qui contient `pc`.
    pub fn unit_at(&self, pc: u32) -> Option<&FuncEntry> { self.units().find(|u| u.contains(pc)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_deduplicates() {
        let mut pool = ConstPool::new();
        let a = pool.intern(ConstValue::I64(1));
        let b = pool.intern(ConstValue::Str("x".into()));
        let c = pool.intern(ConstValue::I64(1));
        assert_eq!(a, Some(0));
        assert_eq!(b, Some(1));
        assert_eq!(c, Some(0));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn pool_keeps_int_and_float_apart() {
        let mut pool = ConstPool::new();
        let i = pool.intern(ConstValue::I64(1));
        let f = pool.intern(ConstValue::F64(1.0));
        let z = pool.intern(ConstValue::F64(0.0));
        let nz = pool.intern(ConstValue::F64(-0.0));
        assert_ne!(i, f);
        assert_ne!(z, nz);
        assert_eq!(pool.intern(ConstValue::F64(f64::NAN)), pool.intern(ConstValue::F64(f64::NAN)));
    }

    #[test]
    fn builtin_names_roundtrip() {
        for b in Builtin::ALL {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("nope"), None);
        assert_eq!(Builtin::Print.arity(), None);
        assert_eq!(Builtin::Push.arity(), Some(2));
    }

    #[test]
    fn stack_effects() {
        assert_eq!(Op::Const(0).stack_effect(), 1);
        assert_eq!(Op::Add.stack_effect(), -1);
        assert_eq!(Op::Call { func: 0, argc: 3 }.stack_effect(), -2);
        assert_eq!(Op::CallValue { argc: 2 }.stack_effect(), -2);
        assert_eq!(Op::MakeList(0).stack_effect(), 1);
        assert_eq!(Op::SetIndex.stack_effect(), -2);
    }

    #[test]
    fn jump_target_patch() {
        let mut op = Op::JumpIfFalse(0);
        op.set_jump_target(12);
        assert_eq!(op.jump_target(), Some(12));
        let mut add = Op::Add;
        add.set_jump_target(3);
        assert_eq!(add, Op::Add);
    }

    #[test]
    fn unit_lookup() {
        let p = Program {
            code: vec![Op::Halt, Op::Const(0), Op::Return],
            main: FuncEntry { name: MAIN_NAME.into(), entry: 0, len: 1, ..FuncEntry::default() },
            functions: vec![FuncEntry { name: "f".into(), entry: 1, len: 2, ..FuncEntry::default() }],
            ..Program::default()
        };
        assert_eq!(p.unit_at(0).map(|u| u.name.as_str()), Some(MAIN_NAME));
        assert_eq!(p.unit_at(2).map(|u| u.name.as_str()), Some("f"));
        assert!(p.unit_at(3).is_none());
        assert_eq!(p.function_named("f").map(|(i, _)| i), Some(0));
    }
}
