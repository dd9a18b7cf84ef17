//! Impression source d’un AST.
//!
//! Le texte produit se re-parse en un arbre identique (aux spans près) :
//! les opérandes composés sont systématiquement parenthésés et les chaînes
//! ré-échappées. Indentation : 4 espaces.

use std::fmt::Write;

use crate::{Block, Decl, Expr, ExprKind, FnDecl, Literal, Program, Stmt, StmtKind};

const INDENT: &str = "    ";

/// Imprime un programme complet.
pub fn print_program(program: &Program) -> String {
    let mut p = Printer::default();
    p.items(&program.body);
    p.out
}

/// Imprime une expression seule.
pub fn print_expr(expr: &Expr) -> String {
    let mut p = Printer::default();
    p.expr(expr);
    p.out
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    /// Contenu d’un bloc, une ligne par élément.
    ///
    /// Un `if`/`while`/bloc en dernière position sans `;` serait relu comme
    /// expression finale : on force alors le `;`.
    fn items(&mut self, b: &Block) {
        let last = b.stmts.len().saturating_sub(1);
        for (i, s) in b.stmts.iter().enumerate() {
            self.line_start();
            self.stmt(s, i == last && b.tail.is_none());
            self.out.push('\n');
        }
        if let Some(t) = &b.tail {
            self.line_start();
            self.expr(t);
            self.out.push('\n');
        }
    }

    fn block(&mut self, b: &Block) {
        if b.stmts.is_empty() && b.tail.is_none() {
            self.out.push_str("{}");
            return;
        }
        self.out.push_str("{\n");
        self.depth += 1;
        self.items(b);
        self.depth -= 1;
        self.line_start();
        self.out.push('}');
    }

    fn stmt(&mut self, s: &Stmt, closes_block: bool) {
        match &s.kind {
            StmtKind::Decl(Decl::Let { name, init }) => {
                let _ = write!(self.out, "let {}", name.name);
                if let Some(e) = init {
                    self.out.push_str(" = ");
                    self.expr(e);
                }
                self.out.push(';');
            }
            StmtKind::Decl(Decl::Fn(f)) => self.fn_decl(f),
            StmtKind::Expr(e) => {
                self.expr(e);
                if closes_block || !e.is_blocklike() {
                    self.out.push(';');
                }
            }
            StmtKind::Return(value) => {
                self.out.push_str("return");
                if let Some(e) = value {
                    self.out.push(' ');
                    self.expr(e);
                }
                self.out.push(';');
            }
            StmtKind::Break => self.out.push_str("break;"),
            StmtKind::Continue => self.out.push_str("continue;"),
        }
    }

    fn fn_decl(&mut self, f: &FnDecl) {
        let params: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
        let _ = write!(self.out, "fn {}({}) ", f.name.name, params.join(", "));
        self.block(&f.body);
    }

    fn expr(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Literal(lit) => self.literal(lit),
            ExprKind::Ident(name) => self.out.push_str(name),
            ExprKind::Unary { op, expr } => {
                self.out.push_str(op.as_str());
                self.operand(expr);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.operand(lhs);
                let _ = write!(self.out, " {op} ");
                self.operand(rhs);
            }
            ExprKind::Assign { target, value } => {
                self.operand(target);
                self.out.push_str(" = ");
                self.operand(value);
            }
            ExprKind::Call { callee, args } => {
                self.operand(callee);
                self.out.push('(');
                self.comma_list(args);
                self.out.push(')');
            }
            ExprKind::Index { base, index } => {
                self.operand(base);
                self.out.push('[');
                self.expr(index);
                self.out.push(']');
            }
            ExprKind::List(items) => {
                self.out.push('[');
                self.comma_list(items);
                self.out.push(']');
            }
            ExprKind::Block(b) => self.block(b),
            ExprKind::If { cond, then_branch, else_branch } => {
                self.out.push_str("if ");
                self.expr(cond);
                self.out.push(' ');
                self.block(then_branch);
                if let Some(other) = else_branch {
                    self.out.push_str(" else ");
                    self.expr(other);
                }
            }
            ExprKind::While { cond, body } => {
                self.out.push_str("while ");
                self.expr(cond);
                self.out.push(' ');
                self.block(body);
            }
        }
    }

    /// Opérande d’un opérateur ou d’un suffixe : parenthésé sauf s’il est atomique.
    fn operand(&mut self, e: &Expr) {
        let atomic = matches!(
            e.kind,
            ExprKind::Literal(_) | ExprKind::Ident(_) | ExprKind::List(_) | ExprKind::Call { .. } | ExprKind::Index { .. }
        );
        if atomic {
            self.expr(e);
        } else {
            self.out.push('(');
            self.expr(e);
            self.out.push(')');
        }
    }

    fn comma_list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(item);
        }
    }

    fn literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Int(i) => {
                let _ = write!(self.out, "{i}");
            }
            Literal::Float(x) => {
                let _ = write!(self.out, "{x:?}");
            }
            Literal::Bool(b) => {
                let _ = write!(self.out, "{b}");
            }
            Literal::Str(s) => {
                self.out.push('"');
                escape_into(&mut self.out, s);
                self.out.push('"');
            }
            Literal::Null => self.out.push_str("null"),
        }
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", u32::from(c));
            }
            c => out.push(c),
        }
    }
}
