//! terbium-parser — parseur du langage Terbium
//!
//! Branches :
//! - `terbium-lexer` pour la tokenisation (les jetons d’erreur deviennent des diagnostics)
//! - `terbium-core` pour `Span`
//! - `terbium-ast` pour l’AST cible
//!
//! Grammaire (essentiel):
//! ```text
//! program    := item* tail?
//! block      := "{" item* tail? "}"
//! item       := "let" ident ("=" expr)? ";"
//!             | "fn" ident "(" (ident ("," ident)*)? ")" block
//!             | "return" expr? ";" | "break" ";" | "continue" ";"
//!             | blocklike ";"?
//!             | expr ";"
//! tail       := expr
//! blocklike  := block | if | while
//! if         := "if" expr block ("else" (block | if))?
//! while      := "while" expr block
//! expr       := pratt_expression
//! primary    := literal | ident | "(" expr ")" | "[" (expr ("," expr)* ","?)? "]" | blocklike
//! postfix    := primary ( "(" args? ")" | "[" expr "]" )*
//! ```
//!
//! Priorités (de la plus faible à la plus forte) : `=` (droite), `||`, `&&`,
//! `== !=` (non associatif), `< <= > >=` (non associatif), `+ -`, `* / %`,
//! préfixes `- !`, suffixes appel/indexation.
//!
//! Les erreurs sont accumulées : après une erreur, le parseur se resynchronise
//! sur `;`, `}` ou un mot-clé d’instruction, puis continue. Aucun AST partiel
//! n’est rendu.

#![warn(missing_docs)]

use core::mem;

use terbium_ast as ast;
use terbium_ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use terbium_core::{Pos, Span};
use terbium_lexer::{Keyword, LexErrorKind, Lexer, LexerOptions, Token, TokenKind};
use thiserror::Error;
use tracing::debug;

/* ─────────────────────────── Options ─────────────────────────── */

/// Options du parseur.
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Nombre maximal d’erreurs collectées avant abandon.
    pub max_errors: usize,
    /// Profondeur maximale d’imbrication (expressions, blocs).
    pub max_depth: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self { max_errors: 32, max_depth: 256 }
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Catégorie d’erreur de parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Jeton d’erreur produit par le lexer.
    Lex(LexErrorKind),
    /// Jeton inattendu.
    Expected,
    /// Opérateurs non associatifs enchaînés (`a < b < c`).
    NonAssociative,
    /// Cible d’affectation invalide.
    InvalidAssignTarget,
    /// Délimiteur ouvrant jamais refermé.
    Unclosed,
    /// Imbrication trop profonde.
    TooDeep,
}

/// Note secondaire attachée à une erreur (ex. position du `{` ouvrant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNote {
    /// Message.
    pub message: String,
    /// Localisation.
    pub span: Span,
}

/// Erreur de parsing avec span.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    /// Catégorie.
    pub kind: ParseErrorKind,
    /// Message humain.
    pub message: String,
    /// Localisation.
    pub span: Span,
    /// Notes secondaires.
    pub notes: Vec<ParseNote>,
}

impl ParseError {
    fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { kind, message: message.into(), span, notes: Vec::new() }
    }

    fn with_note(mut self, message: impl Into<String>, span: Span) -> Self {
        self.notes.push(ParseNote { message: message.into(), span });
        self
    }

    /// Vrai si l’erreur provient d’un jeton invalide du lexer.
    pub const fn is_lex(&self) -> bool { matches!(self.kind, ParseErrorKind::Lex(_)) }
}

/// Résultat interne du parseur.
pub type PResult<T> = Result<T, ParseError>;

/* ─────────────────────────── API ─────────────────────────── */

/// Parse `src` avec les options par défaut.
pub fn parse(src: &str) -> Result<ast::Program, Vec<ParseError>> {
    Parser::new(src).parse_program()
}

/// Parse `src` avec des options explicites.
pub fn parse_with(src: &str, lexer: LexerOptions, opts: ParserOptions) -> Result<ast::Program, Vec<ParseError>> {
    Parser::with_options(src, lexer, opts).parse_program()
}

/* ─────────────────────────── Parser ─────────────────────────── */

/// Élément d’un bloc : instruction, ou expression finale.
enum Item {
    Stmt(ast::Stmt),
    Tail(Expr),
}

/// Opérateur infixe reconnu par la table de Pratt.
#[derive(Clone, Copy)]
enum Infix {
    Assign,
    Binary(BinaryOp),
}

impl Infix {
    /// Niveau de priorité (1 = le plus faible).
    const fn level(self) -> u8 {
        match self {
            Self::Assign => 1,
            Self::Binary(BinaryOp::Or) => 2,
            Self::Binary(BinaryOp::And) => 3,
            Self::Binary(BinaryOp::Eq | BinaryOp::Ne) => 4,
            Self::Binary(BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge) => 5,
            Self::Binary(BinaryOp::Add | BinaryOp::Sub) => 6,
            Self::Binary(BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem) => 7,
        }
    }

    /// (lbp, rbp) : droite pour `=`, gauche sinon.
    const fn binding_power(self) -> (u8, u8) {
        let l = self.level() * 2;
        match self {
            Self::Assign => (l, l),
            Self::Binary(_) => (l, l + 1),
        }
    }

    const fn non_associative(self) -> bool {
        matches!(self.level(), 4 | 5)
    }
}

fn infix_of(kind: &TokenKind<'_>) -> Option<Infix> {
    Some(match kind {
        TokenKind::Eq => Infix::Assign,
        TokenKind::OrOr => Infix::Binary(BinaryOp::Or),
        TokenKind::AndAnd => Infix::Binary(BinaryOp::And),
        TokenKind::EqEq => Infix::Binary(BinaryOp::Eq),
        TokenKind::Ne => Infix::Binary(BinaryOp::Ne),
        TokenKind::Lt => Infix::Binary(BinaryOp::Lt),
        TokenKind::Le => Infix::Binary(BinaryOp::Le),
        TokenKind::Gt => Infix::Binary(BinaryOp::Gt),
        TokenKind::Ge => Infix::Binary(BinaryOp::Ge),
        TokenKind::Plus => Infix::Binary(BinaryOp::Add),
        TokenKind::Minus => Infix::Binary(BinaryOp::Sub),
        TokenKind::Star => Infix::Binary(BinaryOp::Mul),
        TokenKind::Slash => Infix::Binary(BinaryOp::Div),
        TokenKind::Percent => Infix::Binary(BinaryOp::Rem),
        _ => return None,
    })
}

/// Parser Terbium (1 jeton d’anticipation).
pub struct Parser<'a> {
    /// Lexer interne.
    lx: Lexer<'a>,
    /// Jeton courant (jamais un jeton d’erreur).
    tok: Token<'a>,
    /// Span du dernier jeton consommé.
    prev: Span,
    /// Erreurs collectées.
    errors: Vec<ParseError>,
    /// Options.
    opts: ParserOptions,
    /// Profondeur d’imbrication courante.
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Crée un parser depuis une source.
    pub fn new(src: &'a str) -> Self {
        Self::with_options(src, LexerOptions::default(), ParserOptions::default())
    }

    /// Crée avec options de lexer et de parseur.
    pub fn with_options(src: &'a str, lexer: LexerOptions, opts: ParserOptions) -> Self {
        let lx = Lexer::with_options(src, lexer);
        let eof = Token { kind: TokenKind::Eof, lexeme: "", span: Span::DUMMY };
        let mut p = Self { lx, tok: eof, prev: Span::DUMMY, errors: Vec::new(), opts, depth: 0 };
        p.tok = p.next_significant();
        p
    }

    /// Parse un programme complet.
    ///
    /// # Errors
    /// Toutes les erreurs lexicales et syntaxiques collectées (jamais vide).
    pub fn parse_program(mut self) -> Result<ast::Program, Vec<ParseError>> {
        let (stmts, tail) = self.block_items(false);
        let end = self.tok.span.end;
        let span = Span::new(Pos::ZERO, end, 1, 1);
        debug!(stmts = stmts.len(), errors = self.errors.len(), "parse finished");
        if self.errors.is_empty() {
            Ok(ast::Program { body: ast::Block { stmts, tail, span } })
        } else {
            Err(self.errors)
        }
    }

    /* ─────────── Blocs & items ─────────── */

    fn block_items(&mut self, closing: bool) -> (Vec<ast::Stmt>, Option<Box<Expr>>) {
        let mut stmts = Vec::new();
        let mut tail = None;
        loop {
            if self.saturated() || self.at_block_end(closing) {
                break;
            }
            if self.check(&TokenKind::Semi) {
                self.bump();
                continue;
            }
            if !closing && self.check(&TokenKind::RBrace) {
                let t = self.bump();
                self.report(ParseError::new(ParseErrorKind::Expected, "unexpected `}` without matching `{`", t.span));
                continue;
            }
            let before = self.tok.span.start;
            match self.item(closing) {
                Ok(Item::Stmt(s)) => stmts.push(s),
                Ok(Item::Tail(e)) => {
                    tail = Some(Box::new(e));
                    break;
                }
                Err(e) => {
                    self.report(e);
                    if self.tok.span.start == before && !self.tok.is_eof() {
                        self.bump();
                    }
                    self.synchronize();
                }
            }
        }
        (stmts, tail)
    }

    fn item(&mut self, closing: bool) -> PResult<Item> {
        match &self.tok.kind {
            TokenKind::Kw(Keyword::Let) => self.let_stmt().map(Item::Stmt),
            TokenKind::Kw(Keyword::Fn) => self.fn_decl().map(Item::Stmt),
            TokenKind::Kw(Keyword::Return) => {
                let k = self.bump();
                let value = if self.check(&TokenKind::Semi) || self.at_block_end(true) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let span = self.finish_simple(k.span, "`;` after `return`")?;
                Ok(Item::Stmt(stmt(ast::StmtKind::Return(value), span)))
            }
            TokenKind::Kw(kw @ (Keyword::Break | Keyword::Continue)) => {
                let kind = if *kw == Keyword::Break { ast::StmtKind::Break } else { ast::StmtKind::Continue };
                let k = self.bump();
                let span = self.finish_simple(k.span, "`;`")?;
                Ok(Item::Stmt(stmt(kind, span)))
            }
            TokenKind::LBrace | TokenKind::Kw(Keyword::If | Keyword::While) => {
                // un bloc en position d’instruction la termine
                let e = self.blocklike()?;
                if self.check(&TokenKind::Semi) {
                    let semi = self.bump();
                    let span = e.span.to(semi.span);
                    Ok(Item::Stmt(stmt(ast::StmtKind::Expr(e), span)))
                } else if self.at_block_end(closing) {
                    Ok(Item::Tail(e))
                } else {
                    let span = e.span;
                    Ok(Item::Stmt(stmt(ast::StmtKind::Expr(e), span)))
                }
            }
            _ => {
                let e = self.parse_expr()?;
                if self.check(&TokenKind::Semi) {
                    let semi = self.bump();
                    let span = e.span.to(semi.span);
                    Ok(Item::Stmt(stmt(ast::StmtKind::Expr(e), span)))
                } else if self.at_block_end(closing) {
                    Ok(Item::Tail(e))
                } else {
                    Err(self.expected("`;` after expression"))
                }
            }
        }
    }

    fn let_stmt(&mut self) -> PResult<ast::Stmt> {
        let k = self.bump();
        let name = self.expect_ident()?;
        let init = if self.check(&TokenKind::Eq) {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        let semi = self.expect(&TokenKind::Semi, "`;` after `let` declaration")?;
        Ok(stmt(ast::StmtKind::Decl(ast::Decl::Let { name, init }), k.span.to(semi.span)))
    }

    fn fn_decl(&mut self) -> PResult<ast::Stmt> {
        let k = self.bump();
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen, "`(` after function name")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.expect_ident()?);
            if self.check(&TokenKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "`)` to close parameter list")?;
        let body = self.block()?;
        let span = k.span.to(body.span);
        Ok(stmt(ast::StmtKind::Decl(ast::Decl::Fn(ast::FnDecl { name, params, body })), span))
    }

    /// `;` final de `return`/`break`/`continue`, facultatif devant `}`.
    fn finish_simple(&mut self, start: Span, what: &str) -> PResult<Span> {
        if self.check(&TokenKind::Semi) {
            let semi = self.bump();
            Ok(start.to(semi.span))
        } else if self.at_block_end(true) {
            Ok(start.to(self.prev))
        } else {
            Err(self.expected(what))
        }
    }

    fn block(&mut self) -> PResult<ast::Block> {
        self.nested(|p| {
            let lb = p.expect(&TokenKind::LBrace, "`{`")?;
            let (stmts, tail) = p.block_items(true);
            if p.check(&TokenKind::RBrace) {
                let rb = p.bump();
                Ok(ast::Block { stmts, tail, span: lb.span.to(rb.span) })
            } else {
                let msg = format!("expected `}}` to close block, found {}", p.tok.kind.describe());
                Err(ParseError::new(ParseErrorKind::Unclosed, msg, p.tok.span)
                    .with_note("unclosed `{` opened here", lb.span))
            }
        })
    }

    fn blocklike(&mut self) -> PResult<Expr> {
        self.nested(|p| match &p.tok.kind {
            TokenKind::Kw(Keyword::If) => p.if_expr(),
            TokenKind::Kw(Keyword::While) => {
                let k = p.bump();
                let cond = p.parse_expr()?;
                let body = p.block()?;
                let span = k.span.to(body.span);
                Ok(Expr::new(ExprKind::While { cond: Box::new(cond), body }, span))
            }
            _ => {
                let b = p.block()?;
                let span = b.span;
                Ok(Expr::new(ExprKind::Block(b), span))
            }
        })
    }

    fn if_expr(&mut self) -> PResult<Expr> {
        let k = self.bump();
        let cond = self.parse_expr()?;
        let then_branch = self.block()?;
        let mut span = k.span.to(then_branch.span);
        let else_branch = if self.check_kw(Keyword::Else) {
            self.bump();
            let other = if self.check_kw(Keyword::If) {
                self.blocklike()?
            } else {
                let b = self.block()?;
                let bspan = b.span;
                Expr::new(ExprKind::Block(b), bspan)
            };
            span = span.to(other.span);
            Some(Box::new(other))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::If { cond: Box::new(cond), then_branch, else_branch }, span))
    }

    /* ─────────── Expressions (Pratt) ─────────── */

    /// Parse une expression complète.
    ///
    /// # Errors
    /// Première erreur rencontrée (les erreurs non bloquantes sont collectées à part).
    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.expr_bp(0)
    }

    fn expr_bp(&mut self, min_bp: u8) -> PResult<Expr> {
        self.nested(|p| {
            let mut lhs = p.unary()?;
            while let Some(op) = infix_of(&p.tok.kind) {
                let (lbp, rbp) = op.binding_power();
                if lbp < min_bp {
                    break;
                }
                p.deeper()?;
                p.bump();
                let rhs = p.expr_bp(rbp)?;
                let span = lhs.span.to(rhs.span);
                lhs = match op {
                    Infix::Assign => {
                        if !lhs.is_place() {
                            p.report(ParseError::new(
                                ParseErrorKind::InvalidAssignTarget,
                                "invalid assignment target: expected a variable or an index expression",
                                lhs.span,
                            ));
                        }
                        Expr::new(ExprKind::Assign { target: Box::new(lhs), value: Box::new(rhs) }, span)
                    }
                    Infix::Binary(bop) => {
                        Expr::new(ExprKind::Binary { op: bop, lhs: Box::new(lhs), rhs: Box::new(rhs) }, span)
                    }
                };
                if op.non_associative() {
                    if let Some(next) = infix_of(&p.tok.kind).filter(|n| n.level() == op.level()) {
                        let msg = match next {
                            Infix::Binary(b) => format!("comparison operators cannot be chained (`{b}`)"),
                            Infix::Assign => "comparison operators cannot be chained".to_owned(),
                        };
                        p.report(ParseError::new(ParseErrorKind::NonAssociative, msg, p.tok.span));
                    }
                }
            }
            Ok(lhs)
        })
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.tok.kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.postfix(),
        };
        let t = self.bump();
        self.nested(|p| {
            let e = p.unary()?;
            let span = t.span.to(e.span);
            Ok(Expr::new(ExprKind::Unary { op, expr: Box::new(e) }, span))
        })
    }

    fn postfix(&mut self) -> PResult<Expr> {
        self.nested(|p| {
            let mut e = p.primary()?;
            loop {
                match p.tok.kind {
                    TokenKind::LParen => {
                        p.deeper()?;
                        p.bump();
                        let (args, close) = p.comma_list(&TokenKind::RParen, "`)` to close argument list")?;
                        let span = e.span.to(close);
                        e = Expr::new(ExprKind::Call { callee: Box::new(e), args }, span);
                    }
                    TokenKind::LBracket => {
                        p.deeper()?;
                        p.bump();
                        let index = p.parse_expr()?;
                        let rb = p.expect(&TokenKind::RBracket, "`]` to close index")?;
                        let span = e.span.to(rb.span);
                        e = Expr::new(ExprKind::Index { base: Box::new(e), index: Box::new(index) }, span);
                    }
                    _ => break,
                }
            }
            Ok(e)
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let kind = match &self.tok.kind {
            TokenKind::Int(i) => ExprKind::Literal(Literal::Int(*i)),
            TokenKind::Float(x) => ExprKind::Literal(Literal::Float(*x)),
            TokenKind::Str(s) => ExprKind::Literal(Literal::Str(s.clone())),
            TokenKind::Kw(Keyword::True) => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::Kw(Keyword::False) => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Kw(Keyword::Null) => ExprKind::Literal(Literal::Null),
            TokenKind::Ident(name) => ExprKind::Ident((*name).to_owned()),
            TokenKind::LParen => {
                let lp = self.bump();
                let mut e = self.parse_expr()?;
                let rp = self.expect(&TokenKind::RParen, "`)`").map_err(|err| {
                    if matches!(err.kind, ParseErrorKind::Unclosed) {
                        err.with_note("unclosed `(` opened here", lp.span)
                    } else {
                        err
                    }
                })?;
                e.span = lp.span.to(rp.span);
                return Ok(e);
            }
            TokenKind::LBracket => {
                let lb = self.bump();
                let (items, close) = self.comma_list(&TokenKind::RBracket, "`]` to close list")?;
                return Ok(Expr::new(ExprKind::List(items), lb.span.to(close)));
            }
            TokenKind::LBrace | TokenKind::Kw(Keyword::If | Keyword::While) => return self.blocklike(),
            _ => return Err(self.expected("expression")),
        };
        let t = self.bump();
        Ok(Expr::new(kind, t.span))
    }

    /// Éléments séparés par `,` (virgule finale tolérée) jusqu’à `close`.
    fn comma_list(&mut self, close: &TokenKind<'_>, what: &str) -> PResult<(Vec<Expr>, Span)> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.parse_expr()?);
            if self.check(&TokenKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.expect(close, what)?;
        Ok((items, end.span))
    }

    /* ─────────── Utilitaires tokens ─────────── */

    /// Jeton suivant ; les jetons d’erreur sont rapportés puis sautés.
    fn next_significant(&mut self) -> Token<'a> {
        loop {
            let t = self.lx.next_token();
            if let TokenKind::Error(kind) = &t.kind {
                let msg = kind.to_string();
                self.report(ParseError::new(ParseErrorKind::Lex(kind.clone()), msg, t.span));
                continue;
            }
            return t;
        }
    }

    fn bump(&mut self) -> Token<'a> {
        let next = self.next_significant();
        let t = mem::replace(&mut self.tok, next);
        self.prev = t.span;
        t
    }

    fn check(&self, kind: &TokenKind<'_>) -> bool {
        mem::discriminant(&self.tok.kind) == mem::discriminant(kind)
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        matches!(self.tok.kind, TokenKind::Kw(k) if k == kw)
    }

    fn at_block_end(&self, closing: bool) -> bool {
        self.tok.is_eof() || (closing && self.check(&TokenKind::RBrace))
    }

    fn expect(&mut self, kind: &TokenKind<'_>, what: &str) -> PResult<Token<'a>> {
        if self.check(kind) {
            Ok(self.bump())
        } else if self.tok.is_eof() {
            let mut e = self.expected(what);
            e.kind = ParseErrorKind::Unclosed;
            Err(e)
        } else {
            Err(self.expected(what))
        }
    }

    fn expect_ident(&mut self) -> PResult<ast::Ident> {
        if let TokenKind::Ident(name) = self.tok.kind {
            let t = self.bump();
            Ok(ast::Ident::new(name, t.span))
        } else {
            Err(self.expected("identifier"))
        }
    }

    fn expected(&self, what: &str) -> ParseError {
        let msg = format!("expected {what}, found {}", self.tok.kind.describe());
        ParseError::new(ParseErrorKind::Expected, msg, self.tok.span)
    }

    /* ─────────── Erreurs & récupération ─────────── */

    fn report(&mut self, e: ParseError) {
        if self.errors.len() < self.opts.max_errors {
            self.errors.push(e);
        }
    }

    fn saturated(&self) -> bool {
        self.errors.len() >= self.opts.max_errors
    }

    /// Mode panique : saute jusqu’à `;` (consommé), `}` ou un mot-clé d’instruction.
    fn synchronize(&mut self) {
        loop {
            match &self.tok.kind {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::Kw(
                    Keyword::Fn
                    | Keyword::Let
                    | Keyword::If
                    | Keyword::While
                    | Keyword::Return
                    | Keyword::Break
                    | Keyword::Continue,
                ) => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Un niveau d’imbrication de plus (restauré par `nested`).
    fn deeper(&mut self) -> PResult<()> {
        if self.depth >= self.opts.max_depth {
            let msg = format!("expression nests too deeply (limit {})", self.opts.max_depth);
            return Err(ParseError::new(ParseErrorKind::TooDeep, msg, self.tok.span));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = self.depth;
        self.deeper()?;
        let r = f(self);
        self.depth = saved;
        r
    }
}

const fn stmt(kind: ast::StmtKind, span: Span) -> ast::Stmt {
    ast::Stmt { kind, span }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{Block, Decl, Program, Stmt, StmtKind};
    use pretty_assertions::assert_eq;

    fn parse_ok(src: &str) -> Program {
        match parse(src) {
            Ok(p) => p.without_spans(),
            Err(errs) => panic!("parse failed: {errs:#?}"),
        }
    }

    fn parse_err(src: &str) -> Vec<ParseError> {
        parse(src).expect_err("expected a parse error")
    }

    fn tail(p: &Program) -> &Expr {
        p.body.tail.as_deref().expect("tail expression")
    }

    fn e(kind: ExprKind) -> Expr { Expr::new(kind, Span::DUMMY) }
    fn int(i: i64) -> Expr { e(ExprKind::Literal(Literal::Int(i))) }
    fn ident(n: &str) -> Expr { e(ExprKind::Ident(n.into())) }
    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        e(ExprKind::Binary { op, lhs: Box::new(l), rhs: Box::new(r) })
    }

    #[test]
    fn empty_and_comment_only() {
        assert_eq!(parse_ok(""), Program::default());
        assert_eq!(parse_ok("  // rien\n/* toujours rien */ "), Program::default());
    }

    #[test]
    fn mul_binds_tighter_than_add() {
        let p = parse_ok("1 + 2 * 3");
        assert_eq!(*tail(&p), bin(BinaryOp::Add, int(1), bin(BinaryOp::Mul, int(2), int(3))));
    }

    #[test]
    fn left_assoc_and_prefix() {
        let p = parse_ok("1 - 2 - -3");
        let neg3 = e(ExprKind::Unary { op: UnaryOp::Neg, expr: Box::new(int(3)) });
        assert_eq!(*tail(&p), bin(BinaryOp::Sub, bin(BinaryOp::Sub, int(1), int(2)), neg3));
    }

    #[test]
    fn assignment_is_right_assoc() {
        let p = parse_ok("a = b = 1");
        let inner = e(ExprKind::Assign { target: Box::new(ident("b")), value: Box::new(int(1)) });
        assert_eq!(*tail(&p), e(ExprKind::Assign { target: Box::new(ident("a")), value: Box::new(inner) }));
    }

    #[test]
    fn logic_precedence() {
        let p = parse_ok("a || b && c == d");
        let eq = bin(BinaryOp::Eq, ident("c"), ident("d"));
        assert_eq!(*tail(&p), bin(BinaryOp::Or, ident("a"), bin(BinaryOp::And, ident("b"), eq)));
    }

    #[test]
    fn postfix_binds_tighter_than_prefix() {
        let p = parse_ok("-f(1)[0]");
        let call = e(ExprKind::Call { callee: Box::new(ident("f")), args: vec![int(1)] });
        let idx = e(ExprKind::Index { base: Box::new(call), index: Box::new(int(0)) });
        assert_eq!(*tail(&p), e(ExprKind::Unary { op: UnaryOp::Neg, expr: Box::new(idx) }));
    }

    #[test]
    fn chained_comparison_is_rejected() {
        let errs = parse_err("1 < 2 < 3");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ParseErrorKind::NonAssociative);
        assert_eq!(errs[0].span.column, 7);

        let errs = parse_err("a == b != c;");
        assert_eq!(errs[0].kind, ParseErrorKind::NonAssociative);
        // niveaux différents : autorisé
        let _ = parse_ok("a < b == c < d");
    }

    #[test]
    fn invalid_assignment_target() {
        let errs = parse_err("1 + 2 = 3;");
        assert_eq!(errs[0].kind, ParseErrorKind::InvalidAssignTarget);
        let errs = parse_err("f() = 3;");
        assert_eq!(errs[0].kind, ParseErrorKind::InvalidAssignTarget);
        let _ = parse_ok("xs[0] = 3; x = 1;");
    }

    #[test]
    fn statements_and_tail() {
        let p = parse_ok("let x = 1; fn f(a, b) { a } if x == 1 { 2 } else { 3 }");
        assert_eq!(p.body.stmts.len(), 2);
        assert!(matches!(p.body.stmts[0].kind, StmtKind::Decl(Decl::Let { .. })));
        match &p.body.stmts[1].kind {
            StmtKind::Decl(Decl::Fn(f)) => {
                assert_eq!(f.name.name, "f");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.body.tail.as_deref(), Some(&ident("a")));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(tail(&p).kind, ExprKind::If { .. }));
    }

    #[test]
    fn blocklike_statement_ends_without_semicolon() {
        let p = parse_ok("while false { } 1");
        assert_eq!(p.body.stmts.len(), 1);
        assert_eq!(*tail(&p), int(1));

        let p = parse_ok("if true { 1 };");
        assert_eq!(p.body.stmts.len(), 1);
        assert!(p.body.tail.is_none());
    }

    #[test]
    fn else_if_chain() {
        let p = parse_ok("if a { 1 } else if b { 2 } else { 3 }");
        let ExprKind::If { else_branch: Some(other), .. } = &tail(&p).kind else {
            panic!("expected if");
        };
        assert!(matches!(other.kind, ExprKind::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn lists_and_trailing_commas() {
        let p = parse_ok("[1, [2, 3], ]");
        let inner = e(ExprKind::List(vec![int(2), int(3)]));
        assert_eq!(*tail(&p), e(ExprKind::List(vec![int(1), inner])));
        let _ = parse_ok("f(1, 2,); fn g(a, b,) { }");
    }

    #[test]
    fn return_break_continue() {
        let p = parse_ok("fn f() { while true { break; continue } return 1 }");
        let StmtKind::Decl(Decl::Fn(f)) = &p.body.stmts[0].kind else { panic!() };
        assert_eq!(f.body.stmts.len(), 2);
        assert!(matches!(f.body.stmts[1].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn unmatched_brace_reports_at_eof_with_note() {
        let src = "fn f() {\n  1 + 2\n";
        let errs = parse_err(src);
        assert_eq!(errs.len(), 1);
        let err = &errs[0];
        assert_eq!(err.kind, ParseErrorKind::Unclosed);
        assert_eq!(err.span.start.0 as usize, src.len());
        assert_eq!(err.notes.len(), 1);
        assert_eq!((err.notes[0].span.line, err.notes[0].span.column), (1, 8));
    }

    #[test]
    fn stray_closing_brace() {
        let errs = parse_err("1; }");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("without matching"));
    }

    #[test]
    fn recovery_collects_several_errors() {
        let errs = parse_err("let = 1;\nlet y = ;\nlet z = 3;\n1 +");
        assert_eq!(errs.len(), 3);
        assert_eq!(errs[0].span.line, 1);
        assert_eq!(errs[1].span.line, 2);
        assert_eq!(errs[2].span.line, 4);
    }

    #[test]
    fn lex_errors_are_reported() {
        let errs = parse_err("let x = 1 @ 2;");
        assert!(errs[0].is_lex());
        assert_eq!(errs[0].message, "unexpected character '@'");
    }

    #[test]
    fn missing_semicolon() {
        let errs = parse_err("let x = 1\nlet y = 2;");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.starts_with("expected `;` after `let` declaration"));
    }

    #[test]
    fn max_errors_is_honoured() {
        let src = "@ ".repeat(100);
        let errs = parse_with(&src, LexerOptions::default(), ParserOptions { max_errors: 5, ..ParserOptions::default() })
            .unwrap_err();
        assert_eq!(errs.len(), 5);
    }

    #[test]
    fn nesting_is_bounded() {
        let src = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let errs = parse_err(&src);
        assert!(errs.iter().any(|e| e.kind == ParseErrorKind::TooDeep));

        let chain = vec!["1"; 2000].join(" + ");
        let errs = parse_err(&chain);
        assert!(errs.iter().any(|e| e.kind == ParseErrorKind::TooDeep));

        let ok = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        let _ = parse_ok(&ok);
    }

    #[test]
    fn spans_point_at_source() {
        let p = parse("let x =\n  foo;").unwrap();
        let StmtKind::Decl(Decl::Let { name, init: Some(init) }) = &p.body.stmts[0].kind else { panic!() };
        assert_eq!((name.span.line, name.span.column), (1, 5));
        assert_eq!((init.span.line, init.span.column), (2, 3));
    }

    /* ─────────── Aller-retour impression → parsing ─────────── */

    mod roundtrip {
        use super::*;
        use pretty_assertions::assert_eq;
        use ast::{FnDecl, Ident};
        use proptest::prelude::*;
        use terbium_ast::printer::print_program;

        const KEYWORDS: &[&str] =
            &["fn", "let", "if", "else", "while", "return", "break", "continue", "true", "false", "null"];

        fn name() -> impl Strategy<Value = String> {
            "[a-z_][a-z0-9_]{0,5}".prop_filter("keyword", |s| !KEYWORDS.contains(&s.as_str()))
        }

        fn literal() -> impl Strategy<Value = Literal> {
            prop_oneof![
                (0..=i64::MAX).prop_map(Literal::Int),
                prop_oneof![0.0f64..f64::MAX, 0.0f64..1e-300, Just(f64::MAX)].prop_map(Literal::Float),
                any::<bool>().prop_map(Literal::Bool),
                "\\PC{0,8}".prop_map(Literal::Str),
                Just(Literal::Null),
            ]
        }

        fn binop() -> impl Strategy<Value = BinaryOp> {
            proptest::sample::select(vec![
                BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div, BinaryOp::Rem,
                BinaryOp::Eq, BinaryOp::Ne, BinaryOp::Lt, BinaryOp::Le, BinaryOp::Gt, BinaryOp::Ge,
                BinaryOp::And, BinaryOp::Or,
            ])
        }

        fn block_of(expr: BoxedStrategy<Expr>) -> BoxedStrategy<Block> {
            let stmt = prop_oneof![
                (name(), proptest::option::of(expr.clone()))
                    .prop_map(|(n, init)| StmtKind::Decl(Decl::Let { name: Ident::new(n, Span::DUMMY), init })),
                expr.clone().prop_map(StmtKind::Expr),
                proptest::option::of(expr.clone()).prop_map(StmtKind::Return),
                Just(StmtKind::Break),
                Just(StmtKind::Continue),
            ]
            .prop_map(|kind| Stmt { kind, span: Span::DUMMY });
            (proptest::collection::vec(stmt, 0..3), proptest::option::of(expr))
                .prop_map(|(stmts, tail)| Block { stmts, tail: tail.map(Box::new), span: Span::DUMMY })
                .boxed()
        }

        fn expr() -> BoxedStrategy<Expr> {
            let leaf = prop_oneof![literal().prop_map(ExprKind::Literal), name().prop_map(ExprKind::Ident)]
                .prop_map(e);
            leaf.prop_recursive(4, 24, 3, |inner| {
                let place = prop_oneof![
                    name().prop_map(|n| e(ExprKind::Ident(n))),
                    (inner.clone(), inner.clone())
                        .prop_map(|(b, i)| e(ExprKind::Index { base: Box::new(b), index: Box::new(i) })),
                ];
                let block = block_of(inner.clone());
                prop_oneof![
                    (proptest::sample::select(vec![UnaryOp::Neg, UnaryOp::Not]), inner.clone())
                        .prop_map(|(op, x)| e(ExprKind::Unary { op, expr: Box::new(x) })),
                    (binop(), inner.clone(), inner.clone()).prop_map(|(op, l, r)| bin(op, l, r)),
                    (place, inner.clone())
                        .prop_map(|(t, v)| e(ExprKind::Assign { target: Box::new(t), value: Box::new(v) })),
                    (inner.clone(), proptest::collection::vec(inner.clone(), 0..3))
                        .prop_map(|(c, args)| e(ExprKind::Call { callee: Box::new(c), args })),
                    proptest::collection::vec(inner.clone(), 0..3).prop_map(|xs| e(ExprKind::List(xs))),
                    block.clone().prop_map(|b| e(ExprKind::Block(b))),
                    (inner.clone(), block.clone(), proptest::option::of(block.clone())).prop_map(|(c, t, f)| {
                        let else_branch = f.map(|b| Box::new(e(ExprKind::Block(b))));
                        e(ExprKind::If { cond: Box::new(c), then_branch: t, else_branch })
                    }),
                    (inner, block).prop_map(|(c, body)| e(ExprKind::While { cond: Box::new(c), body })),
                ]
            })
            .boxed()
        }

        fn program() -> impl Strategy<Value = Program> {
            let func = (name(), proptest::collection::vec(name(), 0..3), block_of(expr())).prop_map(|(n, ps, body)| {
                Stmt {
                    kind: StmtKind::Decl(Decl::Fn(FnDecl {
                        name: Ident::new(n, Span::DUMMY),
                        params: ps.into_iter().map(|p| Ident::new(p, Span::DUMMY)).collect(),
                        body,
                    })),
                    span: Span::DUMMY,
                }
            });
            (proptest::collection::vec(func, 0..2), block_of(expr())).prop_map(|(fns, mut body)| {
                let mut stmts = fns;
                stmts.append(&mut body.stmts);
                body.stmts = stmts;
                Program { body }
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(128))]

            #[test]
            fn print_then_parse_is_identity(prog in program()) {
                let text = print_program(&prog);
                let reparsed = parse(&text).map(Program::without_spans);
                prop_assert_eq!(reparsed, Ok(prog), "source:\n{}", text);
            }
        }

        #[test]
        fn reprint_is_stable() {
            let src = "fn fact(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }\nlet xs = [1, 2.5, \"a\\n\"];\nwhile false { }\nfact(5)";
            let once = print_program(&parse(src).unwrap());
            let twice = print_program(&parse(&once).unwrap());
            assert_eq!(once, twice);
            assert_eq!(parse(&once).unwrap().without_spans(), parse_ok(src));
        }
    }
}
