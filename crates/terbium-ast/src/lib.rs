//! Terbium AST (Abstract Syntax Tree)
//!
//! Ce crate définit les structures de données qui représentent un programme
//! Terbium après parsing et avant la compilation en bytecode.
//!
//! - Arbre strict : chaque nœud possède ses enfants (`Box`/`Vec`), aucun partage
//! - Chaque nœud porte un `Span` (`terbium-core`) : offsets + ligne/colonne
//! - [`printer`] reconstruit un texte source à partir de l’arbre
//! - [`Program::erase_spans`] neutralise les positions pour comparer deux arbres
//!
//! # Features
//! - `serde` (par défaut) : sérialisation de l’AST (sortie `ast --json`)
//!
//! # Exemple
//! ```rust
//! use terbium_ast::{Expr, ExprKind, Literal};
//! use terbium_core::Span;
//!
//! let lit = Expr::new(ExprKind::Literal(Literal::Int(42)), Span::DUMMY);
//! assert!(!lit.is_blocklike());
//! ```

#![warn(missing_docs)]

use core::fmt;

pub use terbium_core::Span;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod printer;

/* ─────────────────────────── Racine ─────────────────────────── */

/// Un programme complet : un bloc implicite (sans accolades).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Program {
    /// Contenu du programme.
    pub body: Block,
}

/// Un bloc : suite d’instructions et expression finale optionnelle
/// (valeur du bloc, `null` si absente).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Block {
    /// Instructions contenues dans le bloc.
    pub stmts: Vec<Stmt>,
    /// Expression finale (sans `;`).
    pub tail: Option<Box<Expr>>,
    /// Localisation du bloc.
    pub span: Span,
}

/// Identifiant localisé (nom de variable, de fonction, de paramètre).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ident {
    /// Nom.
    pub name: String,
    /// Localisation.
    pub span: Span,
}

impl Ident {
    /// Construit un identifiant.
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }
}

/* ─────────────────────────── Instructions & déclarations ─────────────────────────── */

/// Une instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stmt {
    /// Genre.
    pub kind: StmtKind,
    /// Localisation.
    pub span: Span,
}

/// Genres d’instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StmtKind {
    /// Déclaration (`let`, `fn`).
    Decl(Decl),
    /// Expression évaluée pour ses effets, valeur ignorée.
    Expr(Expr),
    /// `return expr?;`
    Return(Option<Expr>),
    /// `break;`
    Break,
    /// `continue;`
    Continue,
}

/// Déclarations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Decl {
    /// `let name = init;` (sans initialiseur → `null`).
    Let {
        /// Nom lié.
        name: Ident,
        /// Valeur initiale.
        init: Option<Expr>,
    },
    /// `fn name(params) { body }`
    Fn(FnDecl),
}

/// Déclaration de fonction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FnDecl {
    /// Nom de la fonction.
    pub name: Ident,
    /// Paramètres positionnels.
    pub params: Vec<Ident>,
    /// Corps.
    pub body: Block,
}

/* ─────────────────────────── Expressions ─────────────────────────── */

/// Une expression localisée.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Expr {
    /// Genre.
    pub kind: ExprKind,
    /// Localisation.
    pub span: Span,
}

/// Genres d’expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExprKind {
    /// Valeur littérale.
    Literal(Literal),
    /// Référence à une variable, une fonction ou un builtin.
    Ident(String),
    /// Opération unaire.
    Unary {
        /// Opérateur.
        op: UnaryOp,
        /// Opérande.
        expr: Box<Expr>,
    },
    /// Opération binaire (y compris `&&`/`||`, court-circuités).
    Binary {
        /// Opérateur.
        op: BinaryOp,
        /// Opérande gauche.
        lhs: Box<Expr>,
        /// Opérande droite.
        rhs: Box<Expr>,
    },
    /// Affectation `target = value` (cible : identifiant ou indexation).
    Assign {
        /// Cible.
        target: Box<Expr>,
        /// Valeur.
        value: Box<Expr>,
    },
    /// Appel `callee(args)`.
    Call {
        /// Expression appelée.
        callee: Box<Expr>,
        /// Arguments, évalués de gauche à droite.
        args: Vec<Expr>,
    },
    /// Indexation `base[index]`.
    Index {
        /// Liste indexée.
        base: Box<Expr>,
        /// Indice.
        index: Box<Expr>,
    },
    /// Liste littérale `[a, b, c]`.
    List(Vec<Expr>),
    /// Bloc `{ ... }`.
    Block(Block),
    /// `if cond { .. } else ..`
    If {
        /// Condition (doit être un bool).
        cond: Box<Expr>,
        /// Branche vraie.
        then_branch: Block,
        /// Branche fausse : `Block` ou `If` (chaîne `else if`).
        else_branch: Option<Box<Expr>>,
    },
    /// `while cond { .. }`
    While {
        /// Condition.
        cond: Box<Expr>,
        /// Corps.
        body: Block,
    },
}

impl Expr {
    /// Construit une expression.
    pub const fn new(kind: ExprKind, span: Span) -> Self { Self { kind, span } }

    /// `block`, `if` ou `while` : termine une instruction sans `;`.
    pub const fn is_blocklike(&self) -> bool {
        matches!(self.kind, ExprKind::Block(_) | ExprKind::If { .. } | ExprKind::While { .. })
    }

    /// Cible valide d’affectation (identifiant ou indexation).
    pub const fn is_place(&self) -> bool {
        matches!(self.kind, ExprKind::Ident(_) | ExprKind::Index { .. })
    }
}

/// Valeurs littérales.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Literal {
    /// Entier signé 64 bits.
    Int(i64),
    /// Nombre flottant 64 bits.
    Float(f64),
    /// Booléen.
    Bool(bool),
    /// Chaîne UTF-8.
    Str(String),
    /// Valeur nulle (`null`).
    Null,
}

/// Opérateurs binaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinaryOp {
    /// Addition (ou concaténation de chaînes).
    Add,
    /// Soustraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Reste.
    Rem,
    /// Égalité.
    Eq,
    /// Différence.
    Ne,
    /// Inférieur strict.
    Lt,
    /// Inférieur ou égal.
    Le,
    /// Supérieur strict.
    Gt,
    /// Supérieur ou égal.
    Ge,
    /// Conjonction logique.
    And,
    /// Disjonction logique.
    Or,
}

impl BinaryOp {
    /// Symbole source.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Opérateurs unaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnaryOp {
    /// Négation arithmétique (`-x`).
    Neg,
    /// Négation logique (`!x`).
    Not,
}

impl UnaryOp {
    /// Symbole source.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/* ─────────────────────────── Effacement des spans ─────────────────────────── */

impl Program {
    /// Remplace tous les spans par `Span::DUMMY` (comparaison « modulo positions »).
    pub fn erase_spans(&mut self) { erase_block(&mut self.body); }

    /// Variante par valeur de [`Program::erase_spans`].
    #[must_use]
    pub fn without_spans(mut self) -> Self {
        self.erase_spans();
        self
    }
}

fn erase_block(b: &mut Block) {
    b.span = Span::DUMMY;
    for s in &mut b.stmts {
        erase_stmt(s);
    }
    if let Some(t) = &mut b.tail {
        erase_expr(t);
    }
}

fn erase_stmt(s: &mut Stmt) {
    s.span = Span::DUMMY;
    match &mut s.kind {
        StmtKind::Decl(Decl::Let { name, init }) => {
            name.span = Span::DUMMY;
            if let Some(e) = init {
                erase_expr(e);
            }
        }
        StmtKind::Decl(Decl::Fn(f)) => {
            f.name.span = Span::DUMMY;
            for p in &mut f.params {
                p.span = Span::DUMMY;
            }
            erase_block(&mut f.body);
        }
        StmtKind::Expr(e) | StmtKind::Return(Some(e)) => erase_expr(e),
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
    }
}

fn erase_expr(e: &mut Expr) {
    e.span = Span::DUMMY;
    match &mut e.kind {
        ExprKind::Literal(_) | ExprKind::Ident(_) => {}
        ExprKind::Unary { expr, .. } => erase_expr(expr),
        ExprKind::Binary { lhs, rhs, .. } => {
            erase_expr(lhs);
            erase_expr(rhs);
        }
        ExprKind::Assign { target, value } => {
            erase_expr(target);
            erase_expr(value);
        }
        ExprKind::Call { callee, args } => {
            erase_expr(callee);
            args.iter_mut().for_each(erase_expr);
        }
        ExprKind::Index { base, index } => {
            erase_expr(base);
            erase_expr(index);
        }
        ExprKind::List(items) => items.iter_mut().for_each(erase_expr),
        ExprKind::Block(b) => erase_block(b),
        ExprKind::If { cond, then_branch, else_branch } => {
            erase_expr(cond);
            erase_block(then_branch);
            if let Some(e) = else_branch {
                erase_expr(e);
            }
        }
        ExprKind::While { cond, body } => {
            erase_expr(cond);
            erase_block(body);
        }
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use terbium_core::Pos;

    fn sp(a: u32, b: u32) -> Span { Span::new(Pos(a), Pos(b), 1, a + 1) }

    #[test]
    fn erase_spans_reaches_every_node() {
        let mut p = Program {
            body: Block {
                stmts: vec![Stmt {
                    kind: StmtKind::Decl(Decl::Let {
                        name: Ident::new("x", sp(4, 5)),
                        init: Some(Expr::new(ExprKind::Literal(Literal::Int(1)), sp(8, 9))),
                    }),
                    span: sp(0, 10),
                }],
                tail: Some(Box::new(Expr::new(ExprKind::Ident("x".into()), sp(11, 12)))),
                span: sp(0, 12),
            },
        };
        p.erase_spans();
        let Block { stmts, tail, span } = &p.body;
        assert_eq!(*span, Span::DUMMY);
        assert_eq!(stmts[0].span, Span::DUMMY);
        match &stmts[0].kind {
            StmtKind::Decl(Decl::Let { name, init: Some(e) }) => {
                assert_eq!(name.span, Span::DUMMY);
                assert_eq!(e.span, Span::DUMMY);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(tail.as_ref().map(|t| t.span), Some(Span::DUMMY));
    }

    #[test]
    fn blocklike_and_places() {
        let block = Expr::new(ExprKind::Block(Block::default()), Span::DUMMY);
        let ident = Expr::new(ExprKind::Ident("a".into()), Span::DUMMY);
        assert!(block.is_blocklike());
        assert!(!ident.is_blocklike());
        assert!(ident.is_place());
        assert!(!block.is_place());
    }

    #[test]
    fn operators_display() {
        assert_eq!(BinaryOp::Ge.to_string(), ">=");
        assert_eq!(BinaryOp::Or.to_string(), "||");
        assert_eq!(UnaryOp::Not.to_string(), "!");
    }

    #[test]
    fn serde_shape() {
        let e = Expr::new(ExprKind::Literal(Literal::Bool(true)), Span::DUMMY);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"]["Literal"]["Bool"], serde_json::json!(true));
    }
}
