//! terbium — façade de la chaîne Terbium
//!
//! Trois opérations texte → données, pures et déterministes :
//!
//! - [`ast`]       : source → AST (`terbium_ast::Program`)
//! - [`dis`]       : source → listing du bytecode
//! - [`interpret`] : source → valeur finale + sortie de `print`
//!
//! Chaque étape (lexer, parseur, compilateur, VM) rend ses erreurs à
//! l’appelant sous forme de [`Diagnostic`] ; aucune ne s’exécute après une
//! étape en échec. Les variantes `render_*` rendent toujours du texte
//! (sortie réussie, ou une ligne `[ligne:colonne] message` par diagnostic).
//!
//! ```
//! let out = terbium::interpret("fn sq(x) { x * x } sq(7)").unwrap();
//! assert_eq!(out.value.to_string(), "49");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;

use serde::Serialize;
use tracing::{debug, instrument};

pub use terbium_ast as syntax;
pub use terbium_compiler::CompilerOptions;
pub use terbium_core::bytecode::Program;
pub use terbium_core::{Position, Span};
pub use terbium_lexer::LexerOptions;
pub use terbium_parser::ParserOptions;
pub use terbium_runtime::Value;
pub use terbium_vm::VmOptions;

/* ─────────────────────────── Configuration ─────────────────────────── */

/// Options de toutes les étapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Lexer.
    pub lexer: LexerOptions,
    /// Parseur.
    pub parser: ParserOptions,
    /// Compilateur.
    pub compiler: CompilerOptions,
    /// Machine virtuelle.
    pub vm: VmOptions,
}

/* ─────────────────────────── Diagnostics ─────────────────────────── */

/// Étape de la chaîne qui a produit un diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Jeton invalide.
    Lex,
    /// Erreur de syntaxe.
    Syntax,
    /// Erreur de compilation.
    Compile,
    /// Erreur d’exécution.
    Runtime,
    /// Échec de mise en forme d’un résultat (JSON).
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lex => "lex error",
            Self::Syntax => "syntax error",
            Self::Compile => "compile error",
            Self::Runtime => "runtime error",
            Self::Output => "output error",
        })
    }
}

/// Information secondaire attachée à un diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    /// Message.
    pub message: String,
    /// Localisation, si connue.
    pub position: Option<Position>,
}

/// Erreur d’une étape, sous forme de données.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Étape d’origine.
    pub stage: Stage,
    /// Message principal.
    pub message: String,
    /// Position source (ligne et colonne) pour les erreurs statiques,
    /// ligne seule (colonne 0) pour les erreurs d’exécution.
    pub position: Option<Position>,
    /// Instruction fautive (erreurs d’exécution).
    pub pc: Option<u32>,
    /// Notes.
    pub notes: Vec<Note>,
}

/// `Some` si le span désigne un vrai endroit de la source.
fn located(span: Span) -> Option<Position> {
    (span.line > 0).then(|| span.position())
}

impl From<terbium_parser::ParseError> for Diagnostic {
    fn from(e: terbium_parser::ParseError) -> Self {
        let stage = if e.is_lex() { Stage::Lex } else { Stage::Syntax };
        let notes = e.notes.into_iter().map(|n| Note { message: n.message, position: located(n.span) }).collect();
        Self { stage, message: e.message, position: located(e.span), pc: None, notes }
    }
}

impl From<terbium_compiler::CompileError> for Diagnostic {
    fn from(e: terbium_compiler::CompileError) -> Self {
        Self { stage: Stage::Compile, message: e.kind.to_string(), position: located(e.span), pc: None, notes: vec![] }
    }
}

impl From<terbium_vm::RuntimeError> for Diagnostic {
    fn from(e: terbium_vm::RuntimeError) -> Self {
        let position = (e.line > 0).then_some(Position { line: e.line, column: 0, offset: 0 });
        let notes = vec![Note { message: format!("in `{}`", e.function), position: None }];
        Self { stage: Stage::Runtime, message: e.kind.to_string(), position, pc: Some(e.pc), notes }
    }
}

/// Une ligne : `[ligne:colonne] message`, ou `[line N, pc P] message` à l’exécution.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.position, self.pc) {
            (Some(p), None) => write!(f, "[{}:{}] {}", p.line, p.column, self.message),
            (Some(p), Some(pc)) => write!(f, "[line {}, pc {pc:04}] {}", p.line, self.message),
            (None, Some(pc)) => write!(f, "[pc {pc:04}] {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Résultat d’une opération de la façade.
pub type Result<T> = std::result::Result<T, Vec<Diagnostic>>;

fn diagnostics<E: Into<Diagnostic>>(errors: Vec<E>) -> Vec<Diagnostic> {
    errors.into_iter().map(Into::into).collect()
}

/* ─────────────────────────── Opérations ─────────────────────────── */

/// Source → AST.
///
/// # Errors
/// Erreurs lexicales et syntaxiques.
pub fn ast(src: &str) -> Result<syntax::Program> { ast_with(src, &Config::default()) }

/// Source → AST, options explicites.
///
/// # Errors
/// Erreurs lexicales et syntaxiques.
#[instrument(level = "debug", skip_all, fields(len = src.len()))]
pub fn ast_with(src: &str, config: &Config) -> Result<syntax::Program> {
    terbium_parser::parse_with(src, config.lexer, config.parser).map_err(diagnostics)
}

/// Source → AST en JSON (serde, indenté).
///
/// # Errors
/// Erreurs lexicales et syntaxiques.
pub fn ast_json(src: &str) -> Result<String> {
    let program = ast(src)?;
    serde_json::to_string_pretty(&program).map_err(|e| vec![serialization_failure("syntax tree", &e)])
}

fn serialization_failure(what: &str, e: &serde_json::Error) -> Diagnostic {
    Diagnostic {
        stage: Stage::Output,
        message: format!("cannot serialize {what}: {e}"),
        position: None,
        pc: None,
        notes: vec![],
    }
}

/// Source → programme bytecode validé.
///
/// # Errors
/// Erreurs lexicales, syntaxiques ou de compilation.
pub fn compile(src: &str) -> Result<Program> { compile_with(src, &Config::default()) }

/// Source → programme bytecode, options explicites.
///
/// # Errors
/// Erreurs lexicales, syntaxiques ou de compilation.
#[instrument(level = "debug", skip_all, fields(len = src.len()))]
pub fn compile_with(src: &str, config: &Config) -> Result<Program> {
    let tree = ast_with(src, config)?;
    terbium_compiler::compile(&tree, config.compiler).map_err(diagnostics)
}

/// Source → listing complet (en-têtes de fonctions, constantes, instructions).
///
/// # Errors
/// Erreurs lexicales, syntaxiques ou de compilation.
pub fn dis(src: &str) -> Result<String> { dis_with(src, &Config::default()) }

/// [`dis`] avec options explicites.
///
/// # Errors
/// Erreurs lexicales, syntaxiques ou de compilation.
pub fn dis_with(src: &str, config: &Config) -> Result<String> {
    let program = compile_with(src, config)?;
    Ok(terbium_core::disasm::disassemble_full(&program))
}

/// Résultat d’une interprétation réussie.
#[derive(Debug, Serialize)]
pub struct Interpretation {
    /// Valeur finale du programme.
    pub value: Value,
    /// Lignes produites par `print`, dans l’ordre.
    pub output: Vec<String>,
    /// Instructions exécutées.
    pub steps: u64,
}

/// Source → valeur finale + sortie.
///
/// # Errors
/// Erreurs de toutes les étapes ; à l’exécution, seule la première.
pub fn interpret(src: &str) -> Result<Interpretation> { interpret_with(src, &Config::default()) }

/// [`interpret`] avec options explicites (budgets de la VM, etc.).
///
/// # Errors
/// Erreurs de toutes les étapes ; à l’exécution, seule la première.
#[instrument(level = "debug", skip_all, fields(len = src.len()))]
pub fn interpret_with(src: &str, config: &Config) -> Result<Interpretation> {
    let program = compile_with(src, config)?;
    let exec = terbium_vm::run(&program, config.vm).map_err(|e| vec![Diagnostic::from(e)])?;
    debug!(steps = exec.steps, lines = exec.output.lines().len(), "interpretation finished");
    Ok(Interpretation { value: exec.value, output: exec.output.into_lines(), steps: exec.steps })
}

/* ─────────────────────────── Rendus texte ─────────────────────────── */

fn render_errors(errors: &[Diagnostic]) -> String {
    let mut out = String::new();
    for d in errors {
        out.push_str(&d.to_string());
        out.push('\n');
    }
    out
}

/// AST en arbre `{:#?}`, ou les diagnostics.
pub fn render_ast(src: &str) -> String {
    match ast(src) {
        Ok(tree) => format!("{tree:#?}\n"),
        Err(errors) => render_errors(&errors),
    }
}

/// Listing du bytecode, ou les diagnostics.
pub fn render_dis(src: &str) -> String {
    dis(src).unwrap_or_else(|errors| render_errors(&errors))
}

/// Valeur finale puis lignes de sortie, ou les diagnostics.
pub fn render_interpret(src: &str) -> String {
    match interpret(src) {
        Ok(run) => {
            let mut out = format!("{}\n", run.value);
            for line in &run.output {
                out.push_str(line);
                out.push('\n');
            }
            out
        }
        Err(errors) => render_errors(&errors),
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
