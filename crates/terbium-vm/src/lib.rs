//! terbium-vm — interpréteur du bytecode Terbium
//!
//! - Pile d’opérandes unique, un `Frame` par appel (slots locaux propres,
//!   adresse de retour, base de pile)
//! - Programme validé à la construction : aucune lecture hors code,
//!   constantes, fonctions ou slots
//! - Arrêt normal sur `HALT`, `return` au niveau racine ou fin du code d’entrée
//! - Première erreur = arrêt (`VmState::Failed`), avec pc et ligne source
//! - Budgets : `max_steps` (instructions), `max_call_depth`, `max_stack`
//!
//! ```
//! use terbium_vm::{run, VmOptions};
//!
//! let ast = terbium_parser::parse("print(\"hi\"); 40 + 2").unwrap();
//! let program = terbium_compiler::compile(&ast, Default::default()).unwrap();
//! let exec = run(&program, VmOptions::default()).unwrap();
//! assert_eq!(exec.value.to_string(), "42");
//! assert_eq!(exec.output.lines(), ["hi"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::rc::Rc;

use terbium_core::bytecode::{validate_program, FuncEntry, Op, Program, MAIN_NAME};
use terbium_runtime::ops::{self, BinOp, CmpOp};
use terbium_runtime::{FuncRef, Output, Runtime, Value};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Options ─────────────────────────── */

/// Limites d’exécution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VmOptions {
    /// Budget d’instructions (`None` = illimité).
    pub max_steps: Option<u64>,
    /// Profondeur maximale d’appels (cadre racine compris).
    pub max_call_depth: usize,
    /// Taille maximale de la pile d’opérandes.
    pub max_stack: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self { max_steps: None, max_call_depth: 1024, max_stack: 1 << 20 }
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Cause d’un arrêt en erreur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    /// Opérande(s) du mauvais type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Division ou reste entier par zéro.
    #[error("division by zero")]
    DivisionByZero,
    /// Dépassement d’un entier 64 bits.
    #[error("integer overflow")]
    IntegerOverflow,
    /// Dépilement au-delà de la base du cadre courant.
    #[error("stack underflow")]
    StackUnderflow,
    /// Mauvais nombre d’arguments à l’appel.
    #[error("`{name}` takes {expected} argument(s) but {got} were supplied")]
    ArityMismatch {
        /// Fonction appelée.
        name: String,
        /// Arité déclarée.
        expected: u32,
        /// Arguments fournis.
        got: u32,
    },
    /// Appel d’une valeur qui n’est pas une fonction.
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),
    /// Indice hors de la liste.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Indice demandé.
        index: i64,
        /// Longueur de la liste.
        len: usize,
    },
    /// Indice de fonction absent de la table.
    #[error("unknown function #{0}")]
    UnknownFunction(u32),
    /// Conversion explicite impossible.
    #[error("invalid conversion: {0}")]
    InvalidConversion(String),
    /// Trop d’appels imbriqués.
    #[error("call stack overflow (depth limit {0})")]
    StackOverflow(usize),
    /// Pile d’opérandes pleine.
    #[error("operand stack overflow (limit {0})")]
    OperandOverflow(usize),
    /// Budget d’instructions épuisé.
    #[error("instruction budget of {0} exhausted")]
    BudgetExhausted(u64),
    /// Programme refusé par le validateur.
    #[error("invalid program: {0}")]
    InvalidProgram(String),
}

impl From<terbium_runtime::Error> for RuntimeErrorKind {
    fn from(e: terbium_runtime::Error) -> Self {
        use terbium_runtime::Error as E;
        match e {
            E::Type(msg) => Self::TypeMismatch(msg),
            E::DivisionByZero => Self::DivisionByZero,
            E::Overflow => Self::IntegerOverflow,
            E::IndexOutOfBounds { index, len } => Self::IndexOutOfBounds { index, len },
            E::Conversion(msg) => Self::InvalidConversion(msg),
            E::Arity { name, expected, got } => Self::ArityMismatch { name: name.to_owned(), expected, got },
        }
    }
}

/// Erreur d’exécution localisée.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    /// Cause.
    pub kind: RuntimeErrorKind,
    /// Instruction fautive.
    pub pc: u32,
    /// Ligne source de l’instruction (0 si inconnue).
    pub line: u32,
    /// Fonction en cours (`<main>` au niveau racine).
    pub function: String,
}

/// Résultat de la VM.
pub type VmResult<T> = Result<T, RuntimeError>;

type Step<T> = Result<T, RuntimeErrorKind>;

/* ─────────────────────────── État ─────────────────────────── */

/// État observable de la machine.
#[derive(Debug, Clone, PartialEq)]
pub enum VmState {
    /// En cours (ou pas encore démarrée).
    Running,
    /// Arrêt normal avec une valeur.
    Halted(Value),
    /// Arrêt sur erreur.
    Failed(RuntimeError),
}

#[derive(Debug)]
struct Frame {
    /// `None` pour le cadre racine.
    func: Option<u32>,
    return_pc: u32,
    stack_base: usize,
    locals: Vec<Value>,
    end: u32,
}

/// Résultat d’une exécution réussie.
#[derive(Debug)]
pub struct Execution {
    /// Valeur finale.
    pub value: Value,
    /// Lignes produites par `print`.
    pub output: Output,
    /// Instructions exécutées.
    pub steps: u64,
}

/// Valide puis exécute `program` jusqu’à l’arrêt.
///
/// # Errors
/// Première erreur d’exécution, ou programme invalide.
pub fn run(program: &Program, opts: VmOptions) -> VmResult<Execution> {
    let mut vm = Vm::new(program, opts)?;
    let value = vm.run()?;
    let steps = vm.steps();
    Ok(Execution { value, output: vm.into_output(), steps })
}

/* ─────────────────────────── Machine ─────────────────────────── */

enum Flow {
    Continue,
    Halt(Value),
}

/// Machine virtuelle, liée à un programme pour une exécution.
pub struct Vm<'p> {
    program: &'p Program,
    opts: VmOptions,
    consts: Vec<Value>,
    names: Vec<Rc<str>>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    pc: u32,
    steps: u64,
    runtime: Runtime,
    state: VmState,
}

impl Drop for Vm<'_> {
    fn drop(&mut self) {
        self.release_cycles();
    }
}

impl<'p> Vm<'p> {
    /// Prépare une exécution : valide le programme, crée le cadre racine.
    ///
    /// # Errors
    /// `InvalidProgram` si la validation échoue.
    pub fn new(program: &'p Program, opts: VmOptions) -> VmResult<Self> {
        validate_program(program).map_err(|e| RuntimeError {
            kind: RuntimeErrorKind::InvalidProgram(e.to_string()),
            pc: 0,
            line: 0,
            function: MAIN_NAME.to_owned(),
        })?;
        let root = Frame {
            func: None,
            return_pc: 0,
            stack_base: 0,
            locals: vec![Value::Null; program.main.locals as usize],
            end: program.main.end(),
        };
        Ok(Self {
            program,
            opts,
            consts: program.consts.iter().map(|(_, c)| Value::from(c)).collect(),
            names: program.functions.iter().map(|f| Rc::from(f.name.as_str())).collect(),
            stack: Vec::new(),
            frames: vec![root],
            pc: 0,
            steps: 0,
            runtime: Runtime::new(),
            state: VmState::Running,
        })
    }

    /// État courant.
    pub const fn state(&self) -> &VmState { &self.state }

    /// Instructions exécutées jusqu’ici.
    pub const fn steps(&self) -> u64 { self.steps }

    /// Sortie capturée jusqu’ici.
    pub const fn output(&self) -> &Output { self.runtime.output() }

    /// Récupère la sortie capturée.
    pub fn into_output(mut self) -> Output {
        self.release_cycles();
        std::mem::take(&mut self.runtime).into_output()
    }

    /// Rompt les cycles de listes que le résultat n’atteint pas.
    fn release_cycles(&mut self) -> usize {
        let keep = match &self.state {
            VmState::Halted(v) => Some(v),
            _ => None,
        };
        let released = self.runtime.release_cycles(keep);
        if released > 0 {
            debug!(released, "cyclic lists released");
        }
        released
    }

    /// Exécute jusqu’à l’arrêt. Une machine arrêtée rend son résultat sans rien exécuter.
    ///
    /// # Errors
    /// La première erreur rencontrée.
    pub fn run(&mut self) -> VmResult<Value> {
        match &self.state {
            VmState::Halted(v) => return Ok(v.clone()),
            VmState::Failed(e) => return Err(e.clone()),
            VmState::Running => {}
        }
        debug!(ops = self.program.code.len(), functions = self.program.functions.len(), "vm start");
        loop {
            if let Some(max) = self.opts.max_steps {
                if self.steps >= max {
                    warn!(max, "instruction budget exhausted");
                    return Err(self.fail(RuntimeErrorKind::BudgetExhausted(max)));
                }
            }
            let pc = self.pc;
            match self.exec() {
                Ok(Flow::Continue) => self.steps += 1,
                Ok(Flow::Halt(value)) => {
                    debug!(steps = self.steps, "vm halted");
                    self.state = VmState::Halted(value.clone());
                    return Ok(value);
                }
                Err(kind) => {
                    self.pc = pc;
                    return Err(self.fail(kind));
                }
            }
        }
    }

    fn fail(&mut self, kind: RuntimeErrorKind) -> RuntimeError {
        let function = match self.frames.last().and_then(|f| f.func) {
            Some(idx) => self.names.get(idx as usize).map_or_else(String::new, ToString::to_string),
            None => MAIN_NAME.to_owned(),
        };
        let err = RuntimeError { kind, pc: self.pc, line: self.program.lines.line_for_pc(self.pc), function };
        debug!(error = %err, pc = err.pc, "vm failed");
        self.state = VmState::Failed(err.clone());
        err
    }

    /* ─────────── Pile ─────────── */

    fn base(&self) -> usize { self.frames.last().map_or(0, |f| f.stack_base) }

    fn push(&mut self, v: Value) -> Step<()> {
        if self.stack.len() >= self.opts.max_stack {
            return Err(RuntimeErrorKind::OperandOverflow(self.opts.max_stack));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Step<Value> {
        if self.stack.len() <= self.base() {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn peek(&self) -> Step<&Value> {
        if self.stack.len() <= self.base() {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        self.stack.last().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /// Retire les `n` valeurs du sommet, dans l’ordre d’empilement.
    fn take(&mut self, n: u32) -> Step<Vec<Value>> {
        let n = n as usize;
        if self.stack.len() < self.base() + n {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn frame_mut(&mut self) -> Step<&mut Frame> {
        self.frames.last_mut().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /* ─────────── Appels ─────────── */

    fn call(&mut self, func: u32, argc: u32, callee_on_stack: bool) -> Step<()> {
        let entry: &FuncEntry = self.program.function(func).ok_or(RuntimeErrorKind::UnknownFunction(func))?;
        if entry.arity != argc {
            return Err(RuntimeErrorKind::ArityMismatch { name: entry.name.clone(), expected: entry.arity, got: argc });
        }
        if self.frames.len() >= self.opts.max_call_depth {
            warn!(depth = self.frames.len(), "call depth limit reached");
            return Err(RuntimeErrorKind::StackOverflow(self.opts.max_call_depth));
        }
        let (start, locals, end) = (entry.entry, entry.locals as usize, entry.end());
        let mut slots = self.take(argc)?;
        if callee_on_stack {
            self.pop()?;
        }
        slots.resize(locals.max(slots.len()), Value::Null);
        self.frames.push(Frame { func: Some(func), return_pc: self.pc, stack_base: self.stack.len(), locals: slots, end });
        self.pc = start;
        Ok(())
    }

    /// Dépile le cadre courant et rend `result` à l’appelant.
    fn ret(&mut self, result: Value) -> Step<Flow> {
        let frame = self.frames.pop().ok_or(RuntimeErrorKind::StackUnderflow)?;
        if frame.func.is_none() {
            return Ok(Flow::Halt(result));
        }
        self.stack.truncate(frame.stack_base);
        self.push(result)?;
        self.pc = frame.return_pc;
        Ok(Flow::Continue)
    }

    /* ─────────── Boucle ─────────── */

    fn binary(&mut self, f: impl FnOnce(&Value, &Value) -> terbium_runtime::RResult<Value>) -> Step<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let r = f(&a, &b)?;
        self.push(r)
    }

    fn exec(&mut self) -> Step<Flow> {
        let end = self.frames.last().map_or(0, |f| f.end);
        if self.pc >= end {
            // fin du code de l’unité : arrêt (racine) ou retour de `null`
            return match self.frames.last().and_then(|f| f.func) {
                None => Ok(Flow::Halt(self.stack.pop().unwrap_or(Value::Null))),
                Some(_) => self.ret(Value::Null),
            };
        }
        let op = *self
            .program
            .code
            .get(self.pc as usize)
            .ok_or_else(|| RuntimeErrorKind::InvalidProgram(format!("pc {} outside of code", self.pc)))?;
        trace!(pc = self.pc, op = op.mnemonic(), depth = self.stack.len(), "exec");
        self.pc += 1;

        match op {
            Op::Const(ix) => {
                let v = self
                    .consts
                    .get(ix as usize)
                    .cloned()
                    .ok_or_else(|| RuntimeErrorKind::InvalidProgram(format!("constant #{ix} out of range")))?;
                self.push(v)?;
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let v = self.peek()?.clone();
                self.push(v)?;
            }
            Op::LoadLocal(slot) => {
                let v = self
                    .frame_mut()?
                    .locals
                    .get(slot as usize)
                    .cloned()
                    .ok_or_else(|| RuntimeErrorKind::InvalidProgram(format!("slot {slot} out of range")))?;
                self.push(v)?;
            }
            Op::StoreLocal(slot) => {
                let v = self.pop()?;
                let cell = self
                    .frame_mut()?
                    .locals
                    .get_mut(slot as usize)
                    .ok_or_else(|| RuntimeErrorKind::InvalidProgram(format!("slot {slot} out of range")))?;
                *cell = v;
            }
            Op::LoadFunc(idx) => {
                let name = self.names.get(idx as usize).cloned().ok_or(RuntimeErrorKind::UnknownFunction(idx))?;
                self.push(Value::Function(FuncRef { index: idx, name }))?;
            }
            Op::Add => self.binary(|a, b| ops::arith(BinOp::Add, a, b))?,
            Op::Sub => self.binary(|a, b| ops::arith(BinOp::Sub, a, b))?,
            Op::Mul => self.binary(|a, b| ops::arith(BinOp::Mul, a, b))?,
            Op::Div => self.binary(|a, b| ops::arith(BinOp::Div, a, b))?,
            Op::Rem => self.binary(|a, b| ops::arith(BinOp::Rem, a, b))?,
            Op::Eq => self.binary(|a, b| Ok(Value::Bool(ops::equals(a, b))))?,
            Op::Ne => self.binary(|a, b| Ok(Value::Bool(!ops::equals(a, b))))?,
            Op::Lt => self.binary(|a, b| ops::compare(CmpOp::Lt, a, b))?,
            Op::Le => self.binary(|a, b| ops::compare(CmpOp::Le, a, b))?,
            Op::Gt => self.binary(|a, b| ops::compare(CmpOp::Gt, a, b))?,
            Op::Ge => self.binary(|a, b| ops::compare(CmpOp::Ge, a, b))?,
            Op::Neg => {
                let v = self.pop()?;
                self.push(ops::neg(&v)?)?;
            }
            Op::Not => {
                let v = self.pop()?;
                self.push(ops::not(&v)?)?;
            }
            Op::Jump(target) => self.pc = target,
            Op::JumpIfFalse(target) => {
                let v = self.pop()?;
                if !ops::expect_bool(&v, "condition")? {
                    self.pc = target;
                }
            }
            Op::JumpIfFalseOrPop(target) => {
                if ops::expect_bool(self.peek()?, "`&&`")? {
                    self.pop()?;
                } else {
                    self.pc = target;
                }
            }
            Op::JumpIfTrueOrPop(target) => {
                if ops::expect_bool(self.peek()?, "`||`")? {
                    self.pc = target;
                } else {
                    self.pop()?;
                }
            }
            Op::Call { func, argc } => self.call(func, argc, false)?,
            Op::CallValue { argc } => {
                let depth = self.stack.len();
                let at = depth.checked_sub(argc as usize + 1).filter(|at| *at >= self.base());
                let callee = at.and_then(|at| self.stack.get(at)).ok_or(RuntimeErrorKind::StackUnderflow)?;
                match callee {
                    Value::Function(r) => {
                        let idx = r.index;
                        self.call(idx, argc, true)?;
                    }
                    other => return Err(RuntimeErrorKind::NotCallable(other.type_name())),
                }
            }
            Op::CallBuiltin { builtin, argc } => {
                let args = self.take(argc)?;
                let r = self.runtime.call(builtin, &args)?;
                self.push(r)?;
            }
            Op::Return => {
                let result = self.pop()?;
                return self.ret(result);
            }
            Op::MakeList(n) => {
                let items = self.take(n)?;
                let list = self.runtime.new_list(items);
                self.push(list)?;
            }
            Op::Index => self.binary(ops::index)?,
            Op::SetIndex => {
                let value = self.pop()?;
                let index = self.pop()?;
                let base = self.pop()?;
                ops::set_index(&base, &index, value.clone())?;
                self.push(value)?;
            }
            Op::Halt => return Ok(Flow::Halt(self.stack.pop().unwrap_or(Value::Null))),
        }
        Ok(Flow::Continue)
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use terbium_core::bytecode::{ConstPool, ConstValue, LineTable};

    fn exec(src: &str, opts: VmOptions) -> VmResult<Execution> {
        let ast = terbium_parser::parse(src).expect("source parses");
        let program = terbium_compiler::compile(&ast, terbium_compiler::CompilerOptions::default()).expect("source compiles");
        run(&program, opts)
    }

    fn value(src: &str) -> String {
        match exec(src, VmOptions::default()) {
            Ok(e) => e.value.to_string(),
            Err(e) => panic!("{src}: {e}"),
        }
    }

    fn failure(src: &str) -> RuntimeErrorKind {
        exec(src, VmOptions::default()).expect_err("expected a runtime error").kind
    }

    fn hand_built(code: Vec<Op>) -> Program {
        let mut lines = LineTable::new();
        for _ in &code {
            lines.push(1);
        }
        let main = FuncEntry { name: MAIN_NAME.into(), len: code.len() as u32, ..FuncEntry::default() };
        Program { code, lines, consts: ConstPool::new(), main, functions: vec![] }
    }

    #[test]
    fn arithmetic_and_blocks() {
        assert_eq!(value("1 + 2 * 3"), "7");
        assert_eq!(value("if true { 1 } else { 2 }"), "1");
        assert_eq!(value("if false { 1 } else { 2 }"), "2");
        assert_eq!(value("if false { 1 }"), "null");
        assert_eq!(value("\"ab\" + \"cd\""), "abcd");
        assert_eq!(value("7 % 3 == 1 && !(2 > 3)"), "true");
    }

    #[test]
    fn trivial_programs() {
        assert_eq!(value(""), "null");
        assert_eq!(value("/* rien */"), "null");
        assert_eq!(value("42"), "42");
        assert_eq!(value("2.5"), "2.5");
    }

    #[test]
    fn loops_and_control_flow() {
        let src = "let i = 0; let sum = 0;
                   while true {
                       i = i + 1;
                       if i > 10 { break; }
                       if i % 2 == 1 { continue; }
                       sum = sum + i;
                   }
                   sum";
        assert_eq!(value(src), "30");
        assert_eq!(value("while false {}"), "null");
        assert_eq!(value("return 5; 6"), "5");
    }

    #[test]
    fn recursion_and_function_values() {
        assert_eq!(value("fn fib(n) { if n < 2 { n } else { fib(n - 1) + fib(n - 2) } } fib(15)"), "610");
        assert_eq!(value("fn twice(f, x) { f(f(x)) } fn inc(x) { x + 1 } twice(inc, 5)"), "7");
        assert_eq!(value("fn f() { return 1; 2 } f()"), "1");
        assert_eq!(value("fn f() {} str(f)"), "<fn f>");
    }

    #[test]
    fn lists_are_shared() {
        assert_eq!(value("let a = [1]; let b = a; push(b, 2); a[1] = 5; a"), "[1, 5]");
        assert_eq!(value("[[1], \"x\"] == [[1], \"x\"]"), "true");
        assert_eq!(value("len([1, 2, 3]) + len(\"abc\")"), "6");
    }

    #[test]
    fn print_goes_to_output() {
        let e = exec("print(\"a\", 1); print(); print([true])", VmOptions::default()).unwrap();
        assert_eq!(e.output.lines(), ["a 1".to_owned(), String::new(), "[true]".to_owned()]);
        assert_eq!(e.value.to_string(), "null");
    }

    #[test]
    fn runtime_error_kinds() {
        assert_eq!(failure("1 / 0"), RuntimeErrorKind::DivisionByZero);
        assert_eq!(failure("9223372036854775807 + 1"), RuntimeErrorKind::IntegerOverflow);
        assert!(matches!(failure("1 + \"a\""), RuntimeErrorKind::TypeMismatch(_)));
        assert!(matches!(failure("if 1 { 2 }"), RuntimeErrorKind::TypeMismatch(_)));
        assert!(matches!(failure("1 && true"), RuntimeErrorKind::TypeMismatch(_)));
        assert_eq!(failure("let x = 1; x()"), RuntimeErrorKind::NotCallable("int"));
        assert_eq!(
            failure("fn f(a) { a } let g = f; g(1, 2)"),
            RuntimeErrorKind::ArityMismatch { name: "f".into(), expected: 1, got: 2 }
        );
        assert_eq!(failure("[1][3]"), RuntimeErrorKind::IndexOutOfBounds { index: 3, len: 1 });
        assert!(matches!(failure("int(\"x\")"), RuntimeErrorKind::InvalidConversion(_)));
        assert!(matches!(failure("push(1, 2)"), RuntimeErrorKind::TypeMismatch(_)));
    }

    #[test]
    fn errors_carry_location() {
        let err = exec("let a = 1;\nlet b = 0;\nfn f(x, y) { x / y }\nf(a, b)", VmOptions::default()).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
        assert_eq!(err.line, 3);
        assert_eq!(err.function, "f");
    }

    #[test]
    fn call_depth_is_bounded() {
        let opts = VmOptions { max_call_depth: 64, ..VmOptions::default() };
        let err = exec("fn f(n) { f(n + 1) } f(0)", opts).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StackOverflow(64));
    }

    #[test]
    fn step_budget_is_enforced() {
        let opts = VmOptions { max_steps: Some(1_000), ..VmOptions::default() };
        let err = exec("while true {}", opts).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::BudgetExhausted(1_000));
        assert!(exec("1 + 1", opts).is_ok());
    }

    #[test]
    fn shared_sublists_stay_within_the_step_budget() {
        let opts = VmOptions { max_steps: Some(10_000), ..VmOptions::default() };
        let src = "let x = [1]; let i = 0; while i < 60 { x = [x, x]; i = i + 1; } \
                   let s = str(x); print(x); x == x && len(s) > 0";
        let out = exec(src, opts).unwrap();
        assert_eq!(out.value.to_string(), "true");
        assert!(out.steps < 10_000);
        assert!(out.output.lines()[0].contains("..."));
    }

    #[test]
    fn cyclic_lists_are_released_after_the_run() {
        let ast = terbium_parser::parse("let xs = [1]; push(xs, xs); let ys = [2]; push(ys, ys); ys").unwrap();
        let program = terbium_compiler::compile(&ast, terbium_compiler::CompilerOptions::default()).unwrap();
        let mut vm = Vm::new(&program, VmOptions::default()).unwrap();
        let value = vm.run().unwrap();
        assert_eq!(vm.release_cycles(), 1);
        assert_eq!(vm.release_cycles(), 0);
        // le résultat garde son propre cycle
        assert_eq!(value.to_string(), "[2, [...]]");
        drop(vm);
        assert_eq!(value.to_string(), "[2, [...]]");
        if let Value::List(l) = &value {
            l.borrow_mut().clear();
        }
    }

    #[test]
    fn stack_underflow_on_hand_built_program() {
        let program = hand_built(vec![Op::Pop, Op::Halt]);
        let mut vm = Vm::new(&program, VmOptions::default()).unwrap();
        let err = vm.run().unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StackUnderflow);
        assert_eq!(err.pc, 0);
        assert!(matches!(vm.state(), VmState::Failed(_)));
    }

    #[test]
    fn invalid_programs_are_rejected_before_running() {
        let program = hand_built(vec![Op::Call { func: 3, argc: 0 }, Op::Halt]);
        assert!(matches!(
            Vm::new(&program, VmOptions::default()).map(|_| ()).unwrap_err().kind,
            RuntimeErrorKind::InvalidProgram(_)
        ));
    }

    #[test]
    fn running_off_the_end_halts() {
        let mut program = hand_built(vec![Op::Const(0)]);
        program.consts.intern(ConstValue::I64(9));
        let mut vm = Vm::new(&program, VmOptions::default()).unwrap();
        assert_eq!(vm.run().unwrap().to_string(), "9");
        assert!(matches!(vm.state(), VmState::Halted(_)));
        // une machine arrêtée rend le même résultat
        assert_eq!(vm.run().unwrap().to_string(), "9");
    }

    #[test]
    fn interpretation_is_deterministic() {
        let src = "let xs = []; let i = 0; while i < 5 { push(xs, i * i); i = i + 1; } xs";
        assert_eq!(value(src), value(src));
        assert_eq!(value(src), "[0, 1, 4, 9, 16]");
    }
}
