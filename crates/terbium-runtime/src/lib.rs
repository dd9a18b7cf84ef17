//! terbium-runtime — valeurs et services hôte de la VM Terbium
//!
//! Boîte à outils indépendante de la boucle d’exécution :
//!
//! - `Value`   : valeur dynamique (Null/Bool/Int/Float/Str/List/Function)
//! - `ops`     : sémantique des opérateurs (arithmétique vérifiée, comparaisons, égalité structurelle)
//! - `Runtime` : table des natives (`print`, `len`, `push`, `int`, `float`, `str`) + sortie capturée,
//!   registre des listes allouées (libération des cycles en fin d’exécution)
//! - `Output`  : canal de sortie en mémoire alimenté par `print`
//!
//! ⚠️ Ce crate **n’exécute pas** le bytecode (c’est le rôle de `terbium-vm`)
//! et n’écrit jamais sur stdout.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use terbium_core::bytecode::{Builtin, ConstValue};
use thiserror::Error;

pub mod ops;

/// Profondeur au-delà de laquelle l’affichage et la sérialisation des listes s’arrêtent.
pub const MAX_NESTING: usize = 64;

/// Nombre maximal d’éléments de liste rendus par un affichage ou une sérialisation.
///
/// Une liste qui partage ses sous-listes (`x = [x, x]` répété) a une forme
/// développée exponentielle : le rendu s’arrête à ce plafond.
pub const MAX_SHOWN_ITEMS: usize = 100_000;

/* --------------------------- Types de valeur --------------------------- */

/// Cellule partagée d’une liste.
///
/// La destruction est itérative : une liste profondément imbriquée ne
/// consomme pas de pile native en étant libérée.
#[derive(Default)]
pub struct List(RefCell<Vec<Value>>);

impl List {
    /// Nouvelle liste à partir de ses éléments.
    pub fn new(items: Vec<Value>) -> Rc<Self> { Rc::new(Self(RefCell::new(items))) }
}

impl Deref for List {
    type Target = RefCell<Vec<Value>>;
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl Drop for List {
    fn drop(&mut self) {
        let mut pending = std::mem::take(self.0.get_mut());
        while let Some(v) = pending.pop() {
            if let Value::List(rc) = v {
                if let Ok(mut inner) = Rc::try_unwrap(rc) {
                    pending.append(inner.0.get_mut());
                }
            }
        }
    }
}

/// Référence vers une entrée de la table des fonctions.
#[derive(Clone)]
pub struct FuncRef {
    /// Indice dans la table.
    pub index: u32,
    /// Nom (affichage).
    pub name: Rc<str>,
}

/// Valeur dynamique manipulée par la VM.
#[derive(Clone)]
pub enum Value {
    /// Absence de valeur.
    Null,
    /// Booléen.
    Bool(bool),
    /// Entier 64 bits signé (arithmétique vérifiée).
    Int(i64),
    /// Flottant IEEE-754.
    Float(f64),
    /// Chaîne immuable partagée.
    Str(Rc<str>),
    /// Liste mutable partagée par référence.
    List(Rc<List>),
    /// Référence de fonction.
    Function(FuncRef),
}

impl Value {
    /// Nom du type, tel qu’affiché dans les erreurs.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Function(_) => "fn",
        }
    }

    /// Construit une liste.
    pub fn list(items: Vec<Self>) -> Self { Self::List(List::new(items)) }

    /// Construit une chaîne.
    pub fn str(s: &str) -> Self { Self::Str(Rc::from(s)) }
}

impl From<&ConstValue> for Value {
    fn from(c: &ConstValue) -> Self {
        match c {
            ConstValue::Null => Self::Null,
            ConstValue::Bool(b) => Self::Bool(*b),
            ConstValue::I64(i) => Self::Int(*i),
            ConstValue::F64(x) => Self::Float(*x),
            ConstValue::Str(s) => Self::str(s),
        }
    }
}

impl From<bool> for Value { fn from(v: bool) -> Self { Self::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Self::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Self::Float(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Self::str(v) } }

/// Égalité structurelle du langage (voir [`ops::equals`]).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool { ops::equals(self, other) }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::List(_) => write!(f, "List({self})"),
            Self::Function(r) => write!(f, "Function({}#{})", r.name, r.index),
            other => write!(f, "{other}"),
        }
    }
}

/// Affichage utilisateur : chaînes brutes au premier niveau, citées dans les listes.
///
/// Au plus [`MAX_SHOWN_ITEMS`] éléments de liste sont rendus ; la suite
/// devient `...`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shown = Shown { seen: Vec::new(), left: MAX_SHOWN_ITEMS };
        display(self, f, &mut shown, false)
    }
}

struct Shown {
    /// Listes ouvertes (cycles, profondeur).
    seen: Vec<*const List>,
    left: usize,
}

fn display(v: &Value, f: &mut fmt::Formatter<'_>, shown: &mut Shown, nested: bool) -> fmt::Result {
    match v {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(i) => write!(f, "{i}"),
        Value::Float(x) => write!(f, "{x:?}"),
        Value::Str(s) if nested => write!(f, "{:?}", &**s),
        Value::Str(s) => f.write_str(s),
        Value::Function(r) => write!(f, "<fn {}>", r.name),
        Value::List(rc) => {
            let ptr = Rc::as_ptr(rc);
            if shown.seen.contains(&ptr) || shown.seen.len() >= MAX_NESTING {
                return f.write_str("[...]");
            }
            let Ok(items) = rc.try_borrow() else { return f.write_str("[...]") };
            shown.seen.push(ptr);
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                if shown.left == 0 {
                    f.write_str("...")?;
                    break;
                }
                shown.left -= 1;
                display(item, f, shown, true)?;
            }
            shown.seen.pop();
            f.write_str("]")
        }
    }
}

#[cfg(feature = "serde")]
mod ser {
    use std::cell::Cell;

    use super::{Value, MAX_NESTING, MAX_SHOWN_ITEMS};
    use serde::ser::{Serialize, SerializeSeq, Serializer};

    /// Valeur, profondeur, éléments encore autorisés.
    struct Nested<'a>(&'a Value, usize, &'a Cell<usize>);

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            let left = Cell::new(MAX_SHOWN_ITEMS);
            Nested(self, 0, &left).serialize(s)
        }
    }

    impl Serialize for Nested<'_> {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            match self.0 {
                Value::Null => s.serialize_unit(),
                Value::Bool(b) => s.serialize_bool(*b),
                Value::Int(i) => s.serialize_i64(*i),
                Value::Float(x) => s.serialize_f64(*x),
                Value::Str(v) => s.serialize_str(v),
                Value::Function(r) => s.serialize_str(&format!("<fn {}>", r.name)),
                Value::List(rc) => {
                    let items = match rc.try_borrow() {
                        Ok(items) if self.1 < MAX_NESTING => items,
                        _ => return s.serialize_str("[...]"),
                    };
                    let mut seq = s.serialize_seq(None)?;
                    for item in items.iter() {
                        if self.2.get() == 0 {
                            seq.serialize_element("...")?;
                            break;
                        }
                        self.2.set(self.2.get() - 1);
                        seq.serialize_element(&Nested(item, self.1 + 1, self.2))?;
                    }
                    seq.end()
                }
            }
        }
    }
}

/* ------------------------------ Erreurs ------------------------------ */

/// Erreurs produites par les opérations sur les valeurs et par les natives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Type(s) d’opérande inattendu(s).
    #[error("{0}")]
    Type(String),
    /// Division ou reste entier par zéro.
    #[error("division by zero")]
    DivisionByZero,
    /// Dépassement d’un entier 64 bits.
    #[error("integer overflow")]
    Overflow,
    /// Indice hors de la liste.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Indice demandé.
        index: i64,
        /// Longueur de la liste.
        len: usize,
    },
    /// Conversion explicite impossible (`int("x")`, `int(NaN)`…).
    #[error("{0}")]
    Conversion(String),
    /// Mauvaise arité d’une native.
    #[error("`{name}` takes {expected} argument(s) but {got} were supplied")]
    Arity {
        /// Nom du builtin.
        name: &'static str,
        /// Nombre d’arguments attendus.
        expected: u32,
        /// Nombre d’arguments fournis.
        got: u32,
    },
}

/// Résultat du runtime.
pub type RResult<T> = std::result::Result<T, Error>;

/* -------------------------- Signature des natives -------------------------- */

/// Fonction native : reçoit ses arguments et le contexte d’exécution.
pub type NativeFn = fn(&[Value], &mut Output) -> RResult<Value>;

/// Descripteur d’une native.
#[derive(Clone, Copy)]
pub struct NativeEntry {
    /// Builtin implémenté.
    pub builtin: Builtin,
    /// Pointeur de fonction.
    pub func: NativeFn,
}

/// Native associée à un builtin.
pub fn native(builtin: Builtin) -> NativeEntry {
    let func: NativeFn = match builtin {
        Builtin::Print => native_print,
        Builtin::Len => native_len,
        Builtin::Push => native_push,
        Builtin::Int => native_int,
        Builtin::Float => native_float,
        Builtin::Str => native_str,
    };
    NativeEntry { builtin, func }
}

/* ------------------------------ Sortie ------------------------------ */

/// Canal de sortie en mémoire : une entrée par appel à `print`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Output {
    lines: Vec<String>,
}

impl Output {
    /// Ajoute une ligne.
    pub fn push_line(&mut self, line: String) { self.lines.push(line); }
    /// Lignes capturées.
    pub fn lines(&self) -> &[String] { &self.lines }
    /// Consomme le canal.
    pub fn into_lines(self) -> Vec<String> { self.lines }
    /// Aucune ligne ?
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
}

/* ------------------------------ Runtime ------------------------------ */

/// Taille du registre des listes à partir de laquelle les entrées mortes sont purgées.
const PRUNE_FLOOR: usize = 1024;

/// Runtime : natives + sortie capturée, propre à une exécution.
#[derive(Debug, Default)]
pub struct Runtime {
    output: Output,
    /// Listes allouées par [`Runtime::new_list`].
    lists: Vec<Weak<List>>,
    prune_at: usize,
}

impl Runtime {
    /// Runtime vide.
    pub fn new() -> Self { Self::default() }

    /// Appelle un builtin ; l’arité est vérifiée ici (appel dynamique).
    ///
    /// # Errors
    /// Arité, types ou conversion invalides.
    pub fn call(&mut self, builtin: Builtin, args: &[Value]) -> RResult<Value> {
        if let Some(expected) = builtin.arity() {
            let got = u32::try_from(args.len()).unwrap_or(u32::MAX);
            if got != expected {
                return Err(Error::Arity { name: builtin.name(), expected, got });
            }
        }
        (native(builtin).func)(args, &mut self.output)
    }

    /// Sortie capturée jusqu’ici.
    pub const fn output(&self) -> &Output { &self.output }

    /// Récupère la sortie.
    pub fn into_output(self) -> Output { self.output }

    /// Nouvelle liste, inscrite au registre de [`Runtime::release_cycles`].
    pub fn new_list(&mut self, items: Vec<Value>) -> Value {
        if self.lists.len() >= self.prune_at.max(PRUNE_FLOOR) {
            self.lists.retain(|w| w.strong_count() > 0);
            self.prune_at = 2 * self.lists.len();
        }
        let rc = List::new(items);
        self.lists.push(Rc::downgrade(&rc));
        Value::List(rc)
    }

    /// Vide chaque liste inscrite, encore vivante, que `keep` n’atteint pas.
    ///
    /// En fin d’exécution, une telle liste ne survit que par un cycle
    /// (`push(xs, xs)`) : la vider rompt le cycle et libère la mémoire. Les
    /// listes atteintes depuis `keep` (le résultat rendu) sont laissées
    /// intactes, cycles compris. Rend le nombre de listes vidées.
    pub fn release_cycles(&mut self, keep: Option<&Value>) -> usize {
        let reachable = reachable_lists(keep);
        let mut released = 0;
        for weak in std::mem::take(&mut self.lists) {
            let Some(rc) = weak.upgrade() else { continue };
            if reachable.contains(&Rc::as_ptr(&rc)) {
                continue;
            }
            let items = match rc.try_borrow_mut() {
                Ok(mut items) => std::mem::take(&mut *items),
                Err(_) => continue,
            };
            if !items.is_empty() {
                released += 1;
            }
            drop(items);
        }
        released
    }
}

fn reachable_lists(root: Option<&Value>) -> HashSet<*const List> {
    let mut seen = HashSet::new();
    let mut pending: Vec<Value> = root.into_iter().cloned().collect();
    while let Some(v) = pending.pop() {
        let Value::List(rc) = v else { continue };
        if !seen.insert(Rc::as_ptr(&rc)) {
            continue;
        }
        if let Ok(items) = rc.try_borrow() {
            pending.extend(items.iter().cloned());
        };
    }
    seen
}

/* --------------------------- Impl natives --------------------------- */

fn native_print(args: &[Value], out: &mut Output) -> RResult<Value> {
    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
    out.push_line(parts.join(" "));
    Ok(Value::Null)
}

fn native_len(args: &[Value], _: &mut Output) -> RResult<Value> {
    let n = match &args[0] {
        Value::List(l) => l.borrow().len(),
        Value::Str(s) => s.chars().count(),
        other => return Err(Error::Type(format!("`len` expects a list or str, found {}", other.type_name()))),
    };
    i64::try_from(n).map(Value::Int).map_err(|_| Error::Overflow)
}

fn native_push(args: &[Value], _: &mut Output) -> RResult<Value> {
    match &args[0] {
        Value::List(l) => {
            let item = args[1].clone();
            l.borrow_mut().push(item);
            Ok(Value::Null)
        }
        other => Err(Error::Type(format!("`push` expects a list, found {}", other.type_name()))),
    }
}

/// 2^63 : premier flottant hors de `i64`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

#[allow(clippy::cast_possible_truncation)]
fn native_int(args: &[Value], _: &mut Output) -> RResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(x) => {
            let t = x.trunc();
            if t.is_nan() || t < -I64_BOUND || t >= I64_BOUND {
                return Err(Error::Conversion(format!("cannot convert {x:?} to int")));
            }
            Ok(Value::Int(t as i64))
        }
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::Conversion(format!("cannot convert {:?} to int", &**s))),
        other => Err(Error::Type(format!("`int` expects int, float or str, found {}", other.type_name()))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn native_float(args: &[Value], _: &mut Output) -> RResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::Conversion(format!("cannot convert {:?} to float", &**s))),
        other => Err(Error::Type(format!("`float` expects int, float or str, found {}", other.type_name()))),
    }
}

fn native_str(args: &[Value], _: &mut Output) -> RResult<Value> {
    Ok(Value::str(&args[0].to_string()))
}

/* -------------------------------- Prelude -------------------------------- */

/// Prelude pratique pour importer d’un coup.
pub mod prelude {
    pub use crate::{native, Error, FuncRef, List, NativeEntry, NativeFn, Output, RResult, Runtime, Value};
}

/* --------------------------------- Tests --------------------------------- */
