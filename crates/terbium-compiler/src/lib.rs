//! Terbium Compiler — AST → bytecode
//!
//! - Entrée : `terbium_ast::Program`
//! - Sortie : `terbium_core::bytecode::Program` validé (sauts, constantes,
//!   slots et fonctions dans les bornes)
//! - Diagnostics : toutes les erreurs d’une compilation sont collectées avec leur `Span`
//! - Table des symboles à scopes imbriqués, propre à chaque compilation
//!
//! Chaque fonction est émise dans son propre tampon (sauts relatifs à la
//! fonction) ; les tampons sont concaténés à la fin, `<main>` en tête, puis
//! les fonctions dans l’ordre de la table, et les sauts sont relogés.
//!
//! API principale :
//! ```
//! use terbium_compiler::{compile, CompilerOptions};
//!
//! let ast = terbium_parser::parse("1 + 2").unwrap();
//! let program = compile(&ast, CompilerOptions::default()).unwrap();
//! assert_eq!(program.code.len(), 4);
//! ```

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::mem;

use terbium_ast as ast;
use terbium_ast::{BinaryOp, Decl, Expr, ExprKind, Literal, StmtKind, UnaryOp};
use terbium_core::bytecode::{
    validate_program, Builtin, ConstPool, ConstValue, FuncEntry, Op, Program, ValidationError, MAIN_NAME,
};
use terbium_core::Span;
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
/* Options */
// ─────────────────────────────────────────────────────────────────────────────

/// Options du compilateur
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompilerOptions {
    /// Conserver le nom de chaque slot local (annotations du désassembleur)
    pub embed_names: bool,
    /// Nombre maximal de slots locaux par fonction
    pub max_locals: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self { embed_names: true, max_locals: u32::from(u16::MAX) }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
/* Erreurs */
// ─────────────────────────────────────────────────────────────────────────────

/// Catégorie d’erreur de compilation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// Identifiant introuvable
    #[error("unresolved identifier `{0}`")]
    Unresolved(String),
    /// Deux liaisons du même nom dans un scope
    #[error("`{0}` is already declared in this scope")]
    Duplicate(String),
    /// Appel statique avec un mauvais nombre d’arguments
    #[error("`{name}` takes {expected} argument(s) but {got} were supplied")]
    Arity {
        /// Fonction ou builtin appelé
        name: String,
        /// Arité déclarée
        expected: u32,
        /// Arguments fournis
        got: u32,
    },
    /// Référence à une variable locale d’une fonction englobante
    #[error("cannot capture local `{0}` of an enclosing function")]
    Capture(String),
    /// Builtin utilisé comme valeur
    #[error("builtin `{0}` can only be called")]
    BuiltinAsValue(String),
    /// Affectation d’un nom qui n’est pas une variable
    #[error("cannot assign to `{0}`: not a variable")]
    NotAssignable(String),
    /// `break`/`continue` hors boucle
    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),
    /// Limite dépassée (slots, constantes, arguments…)
    #[error("{0}")]
    Limit(String),
    /// Programme généré refusé par le validateur
    #[error("generated program is invalid: {0}")]
    Invalid(ValidationError),
}

/// Erreur de compilation localisée
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct CompileError {
    /// Catégorie (porte l’identifiant fautif)
    pub kind: CompileErrorKind,
    /// Localisation
    pub span: Span,
}

impl CompileError {
    const fn new(kind: CompileErrorKind, span: Span) -> Self { Self { kind, span } }
}

/// Résultat d’une compilation
pub type CResult<T> = Result<T, Vec<CompileError>>;

// ─────────────────────────────────────────────────────────────────────────────
/* Table des symboles */
// ─────────────────────────────────────────────────────────────────────────────

/// Ce à quoi un nom est lié
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// Slot local de la fonction qui a ouvert le scope
    Local(u32),
    /// Entrée de la table des fonctions
    Function(u32),
}

#[derive(Debug)]
struct Scope {
    names: BTreeMap<String, Binding>,
    /// Profondeur de fonction (0 = `<main>`) propriétaire du scope
    func_depth: usize,
}

/// Table des symboles avec pile de scopes
#[derive(Debug, Default)]
struct SymTable {
    scopes: Vec<Scope>,
}

impl SymTable {
    fn push_scope(&mut self, func_depth: usize) {
        self.scopes.push(Scope { names: BTreeMap::new(), func_depth });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Déclare dans le scope courant ; `false` si le nom y existe déjà.
    fn declare(&mut self, name: &str, binding: Binding) -> bool {
        let Some(scope) = self.scopes.last_mut() else { return false };
        if scope.names.contains_key(name) {
            return false;
        }
        scope.names.insert(name.to_owned(), binding);
        true
    }

    /// Recherche de l’intérieur vers l’extérieur.
    fn resolve(&self, name: &str) -> Option<(Binding, usize)> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.names.get(name).map(|b| (*b, s.func_depth)))
    }
}

/// Résolution d’un identifiant en position de valeur ou d’appel
enum Resolved {
    Local(u32),
    Function(u32),
    Builtin(Builtin),
}

// ─────────────────────────────────────────────────────────────────────────────
/* État par fonction */
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct LoopCtx {
    /// Offset (relatif à la fonction) du test de condition
    start: u32,
    /// Profondeur de pile à l’entrée de la boucle
    depth: i64,
    /// Sauts `break` à patcher vers la sortie
    breaks: Vec<usize>,
}

#[derive(Debug, Default)]
struct FunctionState {
    code: Vec<Op>,
    lines: Vec<u32>,
    locals: u32,
    slot_names: Vec<String>,
    /// Profondeur statique de la pile d’opérandes
    depth: i64,
    loops: Vec<LoopCtx>,
}

impl FunctionState {
    fn here(&self) -> u32 { offset(self.code.len()) }
}

#[derive(Debug)]
struct FnSlot {
    name: String,
    arity: u32,
    body: Option<FunctionState>,
}

// ─────────────────────────────────────────────────────────────────────────────
/* Compilateur */
// ─────────────────────────────────────────────────────────────────────────────

/// Compile `program` avec `opts`.
///
/// # Errors
/// Toutes les erreurs de compilation collectées.
pub fn compile(program: &ast::Program, opts: CompilerOptions) -> CResult<Program> {
    Compiler::new(opts).compile(program)
}

/// Compilateur (une instance par compilation)
#[derive(Debug)]
pub struct Compiler {
    opts: CompilerOptions,
    consts: ConstPool,
    functions: Vec<FnSlot>,
    symbols: SymTable,
    /// Fonction en cours d’émission
    cur: FunctionState,
    /// Fonctions englobantes suspendues
    outer: Vec<FunctionState>,
    /// Ligne source courante (attachée à chaque op émise)
    line: u32,
    errors: Vec<CompileError>,
}

impl Compiler {
    /// Nouveau compilateur
    pub fn new(opts: CompilerOptions) -> Self {
        Self {
            opts,
            consts: ConstPool::new(),
            functions: Vec::new(),
            symbols: SymTable::default(),
            cur: FunctionState::default(),
            outer: Vec::new(),
            line: 1,
            errors: Vec::new(),
        }
    }

    /// Compile un programme complet.
    ///
    /// # Errors
    /// Toutes les erreurs collectées ; aucun programme partiel n’est rendu.
    pub fn compile(mut self, program: &ast::Program) -> CResult<Program> {
        let body = &program.body;
        self.symbols.push_scope(0);
        self.block_items(body);
        if let Some(tail) = &body.tail {
            self.expr(tail);
        }
        self.emit(Op::Halt);
        self.symbols.pop_scope();

        if !self.errors.is_empty() {
            debug!(errors = self.errors.len(), "compilation failed");
            return Err(self.errors);
        }
        let program = self.assemble()?;
        debug!(
            ops = program.code.len(),
            consts = program.consts.len(),
            functions = program.functions.len(),
            "compiled program"
        );
        Ok(program)
    }

    /* ─────────── Assemblage ─────────── */

    fn assemble(mut self) -> CResult<Program> {
        let mut program = Program { consts: mem::take(&mut self.consts), ..Program::default() };
        let main = mem::take(&mut self.cur);
        program.main = self.append(&mut program, main, MAIN_NAME.to_owned(), 0);

        for slot in mem::take(&mut self.functions) {
            let Some(body) = slot.body else {
                let msg = format!("function `{}` was declared but never emitted", slot.name);
                return Err(vec![CompileError::new(CompileErrorKind::Limit(msg), Span::DUMMY)]);
            };
            let entry = self.append(&mut program, body, slot.name, slot.arity);
            program.functions.push(entry);
        }

        validate_program(&program)
            .map_err(|e| vec![CompileError::new(CompileErrorKind::Invalid(e), Span::DUMMY)])?;
        Ok(program)
    }

    /// Concatène un tampon de fonction en relogeant ses sauts.
    fn append(&self, program: &mut Program, st: FunctionState, name: String, arity: u32) -> FuncEntry {
        let entry = offset(program.code.len());
        let len = offset(st.code.len());
        program.code.extend(st.code.into_iter().map(|mut op| {
            if let Some(t) = op.jump_target() {
                op.set_jump_target(t + entry);
            }
            op
        }));
        for line in st.lines {
            program.lines.push(line);
        }
        let slot_names = if self.opts.embed_names { st.slot_names } else { Vec::new() };
        FuncEntry { name, entry, len, arity, locals: st.locals, slot_names }
    }

    /* ─────────── Émission ─────────── */

    fn emit(&mut self, op: Op) -> usize {
        self.cur.depth += op.stack_effect();
        self.emit_raw(op)
    }

    /// Émet sans toucher à la profondeur suivie (code après `break`/`continue`).
    fn emit_raw(&mut self, op: Op) -> usize {
        self.cur.code.push(op);
        self.cur.lines.push(self.line);
        self.cur.code.len() - 1
    }

    fn patch(&mut self, at: usize, target: u32) {
        if let Some(op) = self.cur.code.get_mut(at) {
            op.set_jump_target(target);
        }
    }

    fn constant(&mut self, value: ConstValue, span: Span) {
        if let Some(ix) = self.consts.intern(value) {
            self.emit(Op::Const(ix));
        } else {
            self.error(CompileErrorKind::Limit("too many constants".into()), span);
            self.cur.depth += 1;
        }
    }

    fn null(&mut self) {
        self.constant(ConstValue::Null, Span::DUMMY);
    }

    fn error(&mut self, kind: CompileErrorKind, span: Span) {
        self.errors.push(CompileError::new(kind, span));
    }

    fn at_line<T>(&mut self, span: Span, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.line;
        if span.line != 0 {
            self.line = span.line;
        }
        let r = f(self);
        self.line = saved;
        r
    }

    fn func_depth(&self) -> usize { self.outer.len() }

    /* ─────────── Déclarations ─────────── */

    fn declare_local(&mut self, ident: &ast::Ident) -> u32 {
        let slot = self.cur.locals;
        if slot >= self.opts.max_locals {
            self.error(CompileErrorKind::Limit(format!("too many local variables (limit {})", self.opts.max_locals)), ident.span);
        }
        self.cur.locals += 1;
        self.cur.slot_names.push(ident.name.clone());
        if !self.symbols.declare(&ident.name, Binding::Local(slot)) {
            self.error(CompileErrorKind::Duplicate(ident.name.clone()), ident.span);
        }
        slot
    }

    /// Déclare les fonctions du bloc avant son contenu (récursion mutuelle).
    fn hoist(&mut self, stmts: &[ast::Stmt]) -> Vec<u32> {
        let mut ids = Vec::new();
        for s in stmts {
            if let StmtKind::Decl(Decl::Fn(f)) = &s.kind {
                let idx = offset(self.functions.len());
                self.functions.push(FnSlot { name: f.name.name.clone(), arity: offset(f.params.len()), body: None });
                if !self.symbols.declare(&f.name.name, Binding::Function(idx)) {
                    self.error(CompileErrorKind::Duplicate(f.name.name.clone()), f.name.span);
                }
                ids.push(idx);
            }
        }
        ids
    }

    fn function(&mut self, idx: u32, f: &ast::FnDecl) {
        let outer = mem::take(&mut self.cur);
        self.outer.push(outer);
        self.symbols.push_scope(self.func_depth());
        for p in &f.params {
            self.declare_local(p);
        }
        self.at_line(f.name.span, |c| {
            c.block(&f.body);
            c.emit(Op::Return);
        });
        self.symbols.pop_scope();
        let done = mem::replace(&mut self.cur, self.outer.pop().unwrap_or_default());
        if let Some(slot) = self.functions.get_mut(idx as usize) {
            slot.body = Some(done);
        }
    }

    /* ─────────── Blocs & instructions ─────────── */

    /// Instructions d’un bloc (scope courant), fonctions hissées.
    fn block_items(&mut self, block: &ast::Block) {
        let mut fn_ids = self.hoist(&block.stmts).into_iter();
        for s in &block.stmts {
            self.at_line(s.span, |c| match &s.kind {
                StmtKind::Decl(Decl::Fn(f)) => {
                    if let Some(idx) = fn_ids.next() {
                        c.function(idx, f);
                    }
                }
                other => c.stmt(other, s.span),
            });
        }
    }

    /// Bloc en position d’expression : laisse sa valeur sur la pile.
    fn block(&mut self, block: &ast::Block) {
        self.symbols.push_scope(self.func_depth());
        self.block_items(block);
        match &block.tail {
            Some(tail) => self.expr(tail),
            None => self.null(),
        }
        self.symbols.pop_scope();
    }

    fn stmt(&mut self, kind: &StmtKind, span: Span) {
        match kind {
            StmtKind::Decl(Decl::Let { name, init }) => {
                // la valeur est évaluée avant la liaison
                match init {
                    Some(e) => self.expr(e),
                    None => self.null(),
                }
                let slot = self.declare_local(name);
                self.emit(Op::StoreLocal(slot));
            }
            // traitée par `block_items`
            StmtKind::Decl(Decl::Fn(_)) => {}
            StmtKind::Expr(e) => {
                self.expr(e);
                self.emit(Op::Pop);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(e) => self.expr(e),
                    None => self.null(),
                }
                // le retour nettoie le cadre : pas de POP explicite
                let op = if self.func_depth() == 0 { Op::Halt } else { Op::Return };
                self.emit(op);
            }
            StmtKind::Break => self.loop_exit(true, span),
            StmtKind::Continue => self.loop_exit(false, span),
        }
    }

    fn loop_exit(&mut self, is_break: bool, span: Span) {
        let Some(lp) = self.cur.loops.last() else {
            let what = if is_break { "break" } else { "continue" };
            self.error(CompileErrorKind::OutsideLoop(what), span);
            return;
        };
        let (start, loop_depth) = (lp.start, lp.depth);
        for _ in loop_depth..self.cur.depth {
            self.emit_raw(Op::Pop);
        }
        if is_break {
            let at = self.emit_raw(Op::Jump(0));
            if let Some(lp) = self.cur.loops.last_mut() {
                lp.breaks.push(at);
            }
        } else {
            self.emit_raw(Op::Jump(start));
        }
    }

    /* ─────────── Expressions ─────────── */

    fn expr(&mut self, e: &Expr) {
        self.at_line(e.span, |c| c.expr_inner(e));
    }

    fn expr_inner(&mut self, e: &Expr) {
        match &e.kind {
            ExprKind::Literal(lit) => {
                let value = match lit {
                    Literal::Int(i) => ConstValue::I64(*i),
                    Literal::Float(x) => ConstValue::F64(*x),
                    Literal::Bool(b) => ConstValue::Bool(*b),
                    Literal::Str(s) => ConstValue::Str(s.clone()),
                    Literal::Null => ConstValue::Null,
                };
                self.constant(value, e.span);
            }
            ExprKind::Ident(name) => match self.resolve(name, e.span) {
                Some(Resolved::Local(slot)) => {
                    self.emit(Op::LoadLocal(slot));
                }
                Some(Resolved::Function(idx)) => {
                    self.emit(Op::LoadFunc(idx));
                }
                Some(Resolved::Builtin(b)) => {
                    self.error(CompileErrorKind::BuiltinAsValue(b.name().to_owned()), e.span);
                    self.null();
                }
                None => self.null(),
            },
            ExprKind::Unary { op, expr } => {
                self.expr(expr);
                self.emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                });
            }
            ExprKind::Binary { op, lhs, rhs } => match binary_op(*op) {
                Some(code) => {
                    self.expr(lhs);
                    self.expr(rhs);
                    self.emit(code);
                }
                None => self.short_circuit(lhs, rhs, *op == BinaryOp::And),
            },
            ExprKind::Assign { target, value } => self.assign(target, value),
            ExprKind::Call { callee, args } => self.call(callee, args, e.span),
            ExprKind::Index { base, index } => {
                self.expr(base);
                self.expr(index);
                self.emit(Op::Index);
            }
            ExprKind::List(items) => {
                for item in items {
                    self.expr(item);
                }
                self.emit(Op::MakeList(offset(items.len())));
            }
            ExprKind::Block(b) => self.block(b),
            ExprKind::If { cond, then_branch, else_branch } => {
                self.expr(cond);
                let to_else = self.emit(Op::JumpIfFalse(0));
                let base = self.cur.depth;
                self.block(then_branch);
                let to_end = self.emit(Op::Jump(0));
                let else_at = self.cur.here();
                self.patch(to_else, else_at);
                self.cur.depth = base;
                match else_branch {
                    Some(other) => self.expr(other),
                    None => self.null(),
                }
                let end = self.cur.here();
                self.patch(to_end, end);
            }
            ExprKind::While { cond, body } => {
                let start = self.cur.here();
                let depth = self.cur.depth;
                self.cur.loops.push(LoopCtx { start, depth, breaks: Vec::new() });
                self.expr(cond);
                let to_exit = self.emit(Op::JumpIfFalse(0));
                self.block(body);
                self.emit(Op::Pop);
                self.emit(Op::Jump(start));
                let exit = self.cur.here();
                self.patch(to_exit, exit);
                if let Some(lp) = self.cur.loops.pop() {
                    for at in lp.breaks {
                        self.patch(at, exit);
                    }
                }
                self.cur.depth = depth;
                self.null();
            }
        }
    }

    /// `a && b` / `a || b` : le résultat est le dernier opérande évalué.
    fn short_circuit(&mut self, lhs: &Expr, rhs: &Expr, is_and: bool) {
        self.expr(lhs);
        let jump = self.emit(if is_and { Op::JumpIfFalseOrPop(0) } else { Op::JumpIfTrueOrPop(0) });
        self.expr(rhs);
        let end = self.cur.here();
        self.patch(jump, end);
    }

    fn assign(&mut self, target: &Expr, value: &Expr) {
        match &target.kind {
            ExprKind::Ident(name) => {
                let resolved = self.resolve(name, target.span);
                self.expr(value);
                match resolved {
                    Some(Resolved::Local(slot)) => {
                        self.emit(Op::Dup);
                        self.emit(Op::StoreLocal(slot));
                    }
                    Some(Resolved::Function(_) | Resolved::Builtin(_)) => {
                        self.error(CompileErrorKind::NotAssignable(name.clone()), target.span);
                    }
                    None => {}
                }
            }
            ExprKind::Index { base, index } => {
                self.expr(base);
                self.expr(index);
                self.expr(value);
                self.emit(Op::SetIndex);
            }
            _ => {
                // le parseur refuse déjà ces cibles
                self.error(CompileErrorKind::NotAssignable("expression".into()), target.span);
                self.expr(value);
            }
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], span: Span) {
        let argc = offset(args.len());
        if let ExprKind::Ident(name) = &callee.kind {
            match self.resolve(name, callee.span) {
                Some(Resolved::Function(idx)) => {
                    let expected = self.functions.get(idx as usize).map_or(argc, |f| f.arity);
                    if expected != argc {
                        self.error(CompileErrorKind::Arity { name: name.clone(), expected, got: argc }, span);
                    }
                    self.args(args);
                    self.emit(Op::Call { func: idx, argc });
                    return;
                }
                Some(Resolved::Builtin(builtin)) => {
                    if let Some(expected) = builtin.arity() {
                        if expected != argc {
                            self.error(CompileErrorKind::Arity { name: name.clone(), expected, got: argc }, span);
                        }
                    }
                    self.args(args);
                    self.emit(Op::CallBuiltin { builtin, argc });
                    return;
                }
                Some(Resolved::Local(slot)) => {
                    self.emit(Op::LoadLocal(slot));
                }
                None => self.null(),
            }
        } else {
            self.expr(callee);
        }
        self.args(args);
        self.emit(Op::CallValue { argc });
    }

    fn args(&mut self, args: &[Expr]) {
        for a in args {
            self.expr(a);
        }
    }

    /// Résout un nom ; rapporte les erreurs (introuvable, capture).
    fn resolve(&mut self, name: &str, span: Span) -> Option<Resolved> {
        match self.symbols.resolve(name) {
            Some((Binding::Function(idx), _)) => Some(Resolved::Function(idx)),
            Some((Binding::Local(slot), depth)) if depth == self.func_depth() => Some(Resolved::Local(slot)),
            Some((Binding::Local(_), _)) => {
                self.error(CompileErrorKind::Capture(name.to_owned()), span);
                None
            }
            None => {
                if let Some(b) = Builtin::from_name(name) {
                    Some(Resolved::Builtin(b))
                } else {
                    self.error(CompileErrorKind::Unresolved(name.to_owned()), span);
                    None
                }
            }
        }
    }
}

/// Opcode d’un opérateur strict ; `None` pour `&&`/`||`.
const fn binary_op(op: BinaryOp) -> Option<Op> {
    Some(match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Rem => Op::Rem,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::Ne => Op::Ne,
        BinaryOp::Lt => Op::Lt,
        BinaryOp::Le => Op::Le,
        BinaryOp::Gt => Op::Gt,
        BinaryOp::Ge => Op::Ge,
        BinaryOp::And | BinaryOp::Or => return None,
    })
}

#[inline]
fn offset(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
/* Tests */
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile_src(src: &str) -> CResult<Program> {
        let ast = terbium_parser::parse(src).expect("source parses");
        compile(&ast, CompilerOptions::default())
    }

    fn ok(src: &str) -> Program {
        match compile_src(src) {
            Ok(p) => p,
            Err(errs) => panic!("compile failed: {errs:#?}"),
        }
    }

    fn errs(src: &str) -> Vec<CompileErrorKind> {
        compile_src(src).expect_err("expected compile errors").into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn operands_before_operators() {
        let p = ok("1 + 2");
        assert_eq!(p.code, vec![Op::Const(0), Op::Const(1), Op::Add, Op::Halt]);
        assert_eq!(p.consts.get(0), Some(&ConstValue::I64(1)));
    }

    #[test]
    fn empty_program_is_halt_only() {
        let p = ok("");
        assert_eq!(p.code, vec![Op::Halt]);
        assert!(p.consts.is_empty());
        assert_eq!(ok("// rien").code, vec![Op::Halt]);
    }

    #[test]
    fn constants_are_deduplicated() {
        let p = ok("let a = 7; let b = 7; a + b + 7");
        assert_eq!(p.consts.len(), 1);
        assert_eq!(p.main.locals, 2);
        assert_eq!(p.main.slot_names, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn let_reads_outer_binding_before_shadowing() {
        let p = ok("let x = 1; { let x = x + 1; x }");
        // le second `x` lit le slot 0 avant d’écrire le slot 1
        let load0 = p.code.iter().position(|op| *op == Op::LoadLocal(0)).unwrap();
        let store1 = p.code.iter().position(|op| *op == Op::StoreLocal(1)).unwrap();
        assert!(load0 < store1);
    }

    #[test]
    fn functions_are_hoisted_and_relocated() {
        let p = ok("fn even(n) { if n == 0 { true } else { odd(n - 1) } }\nfn odd(n) { if n == 0 { false } else { even(n - 1) } }\neven(4)");
        assert_eq!(p.functions.len(), 2);
        assert_eq!(p.functions[0].name, "even");
        assert_eq!(p.functions[1].arity, 1);
        assert_eq!(p.functions[0].entry, p.main.end());
        assert_eq!(p.functions[1].entry, p.functions[0].end());
        for f in &p.functions {
            for pc in f.entry..f.end() {
                if let Some(t) = p.code[pc as usize].jump_target() {
                    assert!(f.contains(t), "jump {t} escapes {}", f.name);
                }
            }
        }
    }

    #[test]
    fn short_circuit_uses_conditional_jumps() {
        let p = ok("true && false || true");
        assert!(p.code.iter().any(|op| matches!(op, Op::JumpIfFalseOrPop(_))));
        assert!(p.code.iter().any(|op| matches!(op, Op::JumpIfTrueOrPop(_))));
    }

    #[test]
    fn break_pops_loop_temporaries() {
        let p = ok("let xs = []; while true { push(xs, { break; 1 }); }");
        // `push` a déjà `xs` sur la pile au moment du `break`
        // une fois pour le `break`, une fois en fin de corps
        let pop_jumps = p.code.windows(2).filter(|w| w[0] == Op::Pop && matches!(w[1], Op::Jump(_))).count();
        assert_eq!(pop_jumps, 2);
    }

    #[test]
    fn top_level_return_halts() {
        let p = ok("return 3; 4");
        assert_eq!(p.code[1], Op::Halt);
    }

    #[test]
    fn lines_follow_source() {
        let p = ok("1;\n2 +\n3");
        assert_eq!(p.lines.line_for_pc(0), 1);
        assert_eq!(p.lines.len(), p.code.len());
        let add = p.code.iter().position(|op| *op == Op::Add).unwrap();
        assert_eq!(p.lines.line_for_pc(add as u32), 2);
    }

    #[test]
    fn names_can_be_dropped() {
        let ast = terbium_parser::parse("let a = 1; a").unwrap();
        let p = compile(&ast, CompilerOptions { embed_names: false, ..CompilerOptions::default() }).unwrap();
        assert!(p.main.slot_names.is_empty());
        assert_eq!(p.main.locals, 1);
    }

    #[test]
    fn unresolved_and_duplicate() {
        assert_eq!(errs("y + 1"), vec![CompileErrorKind::Unresolved("y".into())]);
        assert_eq!(errs("let a = 1; let a = 2;"), vec![CompileErrorKind::Duplicate("a".into())]);
        assert_eq!(errs("fn f() {} fn f() {}"), vec![CompileErrorKind::Duplicate("f".into())]);
        assert_eq!(errs("fn f(a, a) {}"), vec![CompileErrorKind::Duplicate("a".into())]);
        // ombrage entre blocs : autorisé
        let _ = ok("let a = 1; { let a = 2; a }");
    }

    #[test]
    fn static_arity_checks() {
        assert_eq!(
            errs("fn f(a) { a } f(1, 2)"),
            vec![CompileErrorKind::Arity { name: "f".into(), expected: 1, got: 2 }]
        );
        assert_eq!(errs("len()"), vec![CompileErrorKind::Arity { name: "len".into(), expected: 1, got: 0 }]);
        let _ = ok("print(); print(1, 2, 3)");
    }

    #[test]
    fn no_closures() {
        assert_eq!(errs("let x = 1; fn f() { x }"), vec![CompileErrorKind::Capture("x".into())]);
        // les fonctions englobantes restent visibles
        let _ = ok("fn outer() { fn inner() { outer } inner() }");
    }

    #[test]
    fn builtins_are_shadowable_but_not_values() {
        assert_eq!(errs("let p = print;"), vec![CompileErrorKind::BuiltinAsValue("print".into())]);
        let p = ok("fn len(x) { 0 } len(1)");
        assert!(p.code.iter().any(|op| matches!(op, Op::Call { .. })));
        assert_eq!(errs("len = 1;"), vec![CompileErrorKind::NotAssignable("len".into())]);
    }

    #[test]
    fn loop_control_outside_loop() {
        assert_eq!(errs("break;"), vec![CompileErrorKind::OutsideLoop("break")]);
        assert_eq!(
            errs("while true { fn f() { continue; } }"),
            vec![CompileErrorKind::OutsideLoop("continue")]
        );
    }

    #[test]
    fn errors_are_batched() {
        let all = errs("a; b; let c = 1; let c = 2; break;");
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn every_program_validates() {
        for src in ["", "1", "if true { 1 } else { 2 }", "let i = 0; while i < 3 { i = i + 1; } i", "[1, 2][0]"] {
            assert_eq!(validate_program(&ok(src)), Ok(()), "{src}");
        }
    }
}
