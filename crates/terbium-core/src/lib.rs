//! terbium-core — primitives partagées de la chaîne Terbium
//!
//! Fournit :
//! - `Pos`, `Span`, `Position` (offset byte + ligne/colonne 1-based)
//! - `Spanned<T>` pour attacher une localisation à une valeur
//! - le module [`bytecode`] : programme compilé, pool de constantes,
//!   validation structurelle et désassembleur textuel
//!
//! Features :
//! - `serde` (par défaut) : derive (dé)sérialisation sur les structures utiles

#![warn(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Programme bytecode (instructions, constantes, table des fonctions),
/// validation et désassemblage.
pub mod bytecode;

pub use bytecode::disasm;
pub use bytecode::validate;

/* ─────────────────────────── Spans / Positions ─────────────────────────── */

/// Position (offset byte) depuis le début de la source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pos(pub u32);

impl Pos {
    /// Position nulle.
    pub const ZERO: Self = Self(0);
    /// Addition saturée.
    #[must_use]
    pub const fn saturating_add(self, v: u32) -> Self { Self(self.0.saturating_add(v)) }
}

/// Point précis d’une source : ligne et colonne 1-based, plus l’offset byte.
///
/// La colonne est comptée en bytes depuis le début de la ligne.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    /// Ligne (1-based).
    pub line: u32,
    /// Colonne (1-based).
    pub column: u32,
    /// Offset byte (0-based).
    pub offset: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Plage (demi-ouverte) `[start, end)` dans une source, avec la ligne et la
/// colonne de son début.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    /// Début inclus.
    pub start: Pos,
    /// Fin exclue.
    pub end: Pos,
    /// Ligne du début (1-based).
    pub line: u32,
    /// Colonne du début (1-based).
    pub column: u32,
}

impl Span {
    /// Span « vide » utilisé quand la localisation n’a pas de sens
    /// (AST construit à la main, comparaison structurelle).
    pub const DUMMY: Self = Self { start: Pos::ZERO, end: Pos::ZERO, line: 0, column: 0 };

    /// Crée un span.
    pub const fn new(start: Pos, end: Pos, line: u32, column: u32) -> Self {
        Self { start, end, line, column }
    }
    /// Longueur en bytes.
    pub const fn len(&self) -> u32 { self.end.0.saturating_sub(self.start.0) }
    /// Vrai si le span est vide.
    pub const fn is_empty(&self) -> bool { self.start.0 >= self.end.0 }
    /// Position du début.
    pub const fn position(&self) -> Position {
        Position { line: self.line, column: self.column, offset: self.start.0 }
    }
    /// Span couvrant `self` jusqu’à la fin de `other`.
    #[must_use]
    pub const fn to(self, other: Self) -> Self {
        let end = if other.end.0 > self.end.0 { other.end } else { self.end };
        Self { start: self.start, end, line: self.line, column: self.column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Wrapper utilitaire « valeur + span ».
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spanned<T> {
    /// La valeur.
    pub value: T,
    /// La localisation.
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Construit un `Spanned<T>`.
    pub const fn new(value: T, span: Span) -> Self { Self { value, span } }
    /// Applique une fonction à la valeur et conserve le span.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> { Spanned { value: f(self.value), span: self.span } }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        bytecode::{Builtin, ConstPool, ConstValue, FuncEntry, Op, Program},
        Pos, Position, Span, Spanned,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_join_keeps_start_line() {
        let a = Span::new(Pos(4), Pos(6), 2, 1);
        let b = Span::new(Pos(10), Pos(12), 3, 2);
        let j = a.to(b);
        assert_eq!(j.start, Pos(4));
        assert_eq!(j.end, Pos(12));
        assert_eq!((j.line, j.column), (2, 1));
        assert_eq!(j.len(), 8);
    }

    #[test]
    fn position_display() {
        let sp = Span::new(Pos(7), Pos(8), 3, 5);
        assert_eq!(sp.position(), Position { line: 3, column: 5, offset: 7 });
        assert_eq!(sp.position().to_string(), "3:5");
        assert!(Span::DUMMY.is_empty());
    }
}
