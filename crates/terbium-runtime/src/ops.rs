//! Sémantique des opérateurs sur [`Value`].
//!
//! Pas de promotion implicite int/float : les deux opérandes d’une opération
//! arithmétique ou d’une comparaison d’ordre sont du même type.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use crate::{Error, List, RResult, Value};

/// Opérateur binaire strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

impl BinOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// Comparaison d’ordre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

fn mismatch(op: &str, a: &Value, b: &Value) -> Error {
    Error::Type(format!("cannot apply `{op}` to {} and {}", a.type_name(), b.type_name()))
}

/// Applique un opérateur arithmétique.
///
/// # Errors
/// Types incompatibles, division entière par zéro, dépassement.
pub fn arith(op: BinOp, a: &Value, b: &Value) -> RResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_arith(op, *x, *y).map(Value::Int),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => x / y,
            BinOp::Rem => x % y,
        })),
        (Value::Str(x), Value::Str(y)) if op == BinOp::Add => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::Str(Rc::from(s)))
        }
        _ => Err(mismatch(op.symbol(), a, b)),
    }
}

fn int_arith(op: BinOp, x: i64, y: i64) -> RResult<i64> {
    if matches!(op, BinOp::Div | BinOp::Rem) && y == 0 {
        return Err(Error::DivisionByZero);
    }
    let r = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => x.checked_div(y),
        BinOp::Rem => x.checked_rem(y),
    };
    r.ok_or(Error::Overflow)
}

/// `-a`
///
/// # Errors
/// Opérande non numérique ou `-i64::MIN`.
pub fn neg(a: &Value) -> RResult<Value> {
    match a {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(Error::Overflow),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(Error::Type(format!("cannot negate {}", other.type_name()))),
    }
}

/// `!a`
///
/// # Errors
/// Opérande non booléen.
pub fn not(a: &Value) -> RResult<Value> {
    expect_bool(a, "`!`").map(|b| Value::Bool(!b))
}

/// Exige un booléen (conditions, `!`, opérande gauche de `&&`/`||`).
///
/// # Errors
/// `what` nomme le contexte dans le message.
pub fn expect_bool(a: &Value, what: &str) -> RResult<bool> {
    match a {
        Value::Bool(b) => Ok(*b),
        other => Err(Error::Type(format!("{what} expects bool, found {}", other.type_name()))),
    }
}

/// Comparaison d’ordre entre deux entiers, flottants ou chaînes.
///
/// # Errors
/// Types différents ou non ordonnés.
pub fn compare(op: CmpOp, a: &Value, b: &Value) -> RResult<Value> {
    let ord = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => return Err(mismatch(op.symbol(), a, b)),
    };
    // NaN : toute comparaison est fausse
    let result = ord.is_some_and(|o| match op {
        CmpOp::Lt => o == Ordering::Less,
        CmpOp::Le => o != Ordering::Greater,
        CmpOp::Gt => o == Ordering::Greater,
        CmpOp::Ge => o != Ordering::Less,
    });
    Ok(Value::Bool(result))
}

/// Égalité structurelle : types différents → faux, NaN ≠ NaN,
/// listes comparées élément par élément.
///
/// Le parcours est itératif et chaque paire de listes n’est visitée qu’une
/// fois : une paire déjà rencontrée est supposée égale, ce qui termine sur
/// les cycles et reste linéaire sur les sous-listes partagées.
pub fn equals(a: &Value, b: &Value) -> bool {
    if !matches!((a, b), (Value::List(_), Value::List(_))) {
        return scalar_equals(a, b);
    }
    let mut visited: HashSet<(*const List, *const List)> = HashSet::new();
    let mut pending = vec![(a.clone(), b.clone())];
    while let Some((a, b)) = pending.pop() {
        let (Value::List(x), Value::List(y)) = (&a, &b) else {
            if scalar_equals(&a, &b) {
                continue;
            }
            return false;
        };
        // une liste contenant NaN n’est pas égale à elle-même : pas de raccourci ptr_eq
        if !visited.insert((Rc::as_ptr(x), Rc::as_ptr(y))) {
            continue;
        }
        let (Ok(xs), Ok(ys)) = (x.try_borrow(), y.try_borrow()) else { return false };
        if xs.len() != ys.len() {
            return false;
        }
        pending.extend(xs.iter().cloned().zip(ys.iter().cloned()));
    }
    true
}

#[allow(clippy::float_cmp)]
fn scalar_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => x.index == y.index,
        _ => false,
    }
}

/// `base[index]`
///
/// # Errors
/// Base non liste, indice non entier ou hors bornes.
pub fn index(base: &Value, index: &Value) -> RResult<Value> {
    let (list, i) = index_parts(base, index)?;
    let items = list.borrow();
    checked_slot(i, items.len()).map(|at| items[at].clone())
}

/// `base[index] = value`
///
/// # Errors
/// Mêmes cas que [`index`].
pub fn set_index(base: &Value, index: &Value, value: Value) -> RResult<()> {
    let (list, i) = index_parts(base, index)?;
    let mut items = list.borrow_mut();
    let at = checked_slot(i, items.len())?;
    items[at] = value;
    Ok(())
}

fn index_parts<'a>(base: &'a Value, index: &Value) -> RResult<(&'a crate::List, i64)> {
    match (base, index) {
        (Value::List(l), Value::Int(i)) => Ok((l, *i)),
        (Value::List(_), other) => Err(Error::Type(format!("list index must be int, found {}", other.type_name()))),
        (other, _) => Err(Error::Type(format!("cannot index into {}", other.type_name()))),
    }
}

fn checked_slot(i: i64, len: usize) -> RResult<usize> {
    usize::try_from(i)
        .ok()
        .filter(|at| *at < len)
        .ok_or(Error::IndexOutOfBounds { index: i, len })
}
