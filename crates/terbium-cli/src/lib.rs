//! terbium-cli — bibliothèque interne du binaire `terbium`
//!
//! Le parsing d'arguments vit dans `main.rs` ; ici on ne garde que des
//! tâches typées, testables, qui écrivent dans des `Write` fournis par
//! l'appelant :
//!
//! - `ast`  : arbre syntaxique (`{:#?}` ou JSON)
//! - `dis`  : listing du bytecode
//! - `run`  : valeur finale + sortie de `print`
//! - `fmt`  : réimpression canonique de la source
//!
//! Les diagnostics partent sur le flux d'erreur, colorés si le terminal
//! le permet (`feature = "color"`).

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    fs,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, bail, Context, Result};
use terbium::{Config, Diagnostic};
use tracing::debug;

#[cfg(feature = "color")]
use owo_colors::{OwoColorize, Stream};

/// Code de sortie quand une étape de la chaîne rapporte des diagnostics.
pub const EXIT_DIAGNOSTICS: u8 = 1;

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande haut-niveau (sans parsing CLI, réservé à main.rs).
#[derive(Debug, Clone)]
pub enum Command {
    Ast(AstTask),
    Dis(DisTask),
    Run(RunTask),
    Fmt(FmtTask),
}

#[derive(Debug, Clone, Default)]
pub struct AstTask {
    pub input: Input,
    pub json: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DisTask {
    pub input: Input,
    pub output: Output,
}

#[derive(Debug, Clone, Default)]
pub struct RunTask {
    pub input: Input,
    /// Valeur, sortie et nombre d'instructions en un objet JSON.
    pub json: bool,
    /// Affiche le temps d'exécution sur stderr.
    pub time: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FmtTask {
    pub input: Input,
    pub output: Output,
    /// N'écrit rien ; échoue si la source n'est pas déjà formatée.
    pub check: bool,
}

/// Entrée texte (source) : fichier ou `-` (=stdin).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Input {
    #[default]
    Stdin,
    Path(PathBuf),
}

impl Input {
    /// `None` ou `-` → stdin.
    pub fn from_arg(p: Option<PathBuf>) -> Self {
        match p {
            Some(path) if path.as_os_str() != "-" => Self::Path(path),
            _ => Self::Stdin,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Stdin => "<stdin>".to_string(),
            Self::Path(p) => display(p),
        }
    }
}

/// Sortie texte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Output {
    #[default]
    Stdout,
    Path(PathBuf),
    /// Réécrit le fichier d'entrée (fmt).
    InPlace,
}

/// Flux de la commande : sortie normale et flux d'erreur.
pub struct Streams<'a> {
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Installe le subscriber `tracing` (stderr). `RUST_LOG` l'emporte sur `-v/-q`.
pub fn init_tracing(verbose: u8, quiet: bool, ansi: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

/// Force ou laisse détecter la couleur des diagnostics.
pub fn set_color(force: Option<bool>) {
    #[cfg(feature = "color")]
    match force {
        Some(on) => owo_colors::set_override(on),
        None => owo_colors::unset_override(),
    }
    #[cfg(not(feature = "color"))]
    let _ = force;
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande. Retourne le code de sortie (0, ou
/// [`EXIT_DIAGNOSTICS`] si la source est refusée).
pub fn execute(cmd: Command, config: &Config, io: &mut Streams<'_>) -> Result<u8> {
    match cmd {
        Command::Ast(t) => ast_entry(&t, config, io),
        Command::Dis(t) => dis_entry(&t, config, io),
        Command::Run(t) => run_entry(&t, config, io),
        Command::Fmt(t) => fmt_entry(&t, config, io),
    }
}

fn ast_entry(task: &AstTask, config: &Config, io: &mut Streams<'_>) -> Result<u8> {
    let src = read_source(&task.input)?;
    let tree = match terbium::ast_with(&src, config) {
        Ok(tree) => tree,
        Err(errors) => return report(&task.input, &errors, io),
    };
    if task.json {
        serde_json::to_writer_pretty(&mut *io.out, &tree).context("sérialisation JSON de l'AST")?;
        writeln!(io.out)?;
    } else {
        writeln!(io.out, "{tree:#?}")?;
    }
    Ok(0)
}

fn dis_entry(task: &DisTask, config: &Config, io: &mut Streams<'_>) -> Result<u8> {
    let src = read_source(&task.input)?;
    match terbium::dis_with(&src, config) {
        Ok(listing) => {
            write_output(&task.output, &task.input, &listing, io)?;
            Ok(0)
        }
        Err(errors) => report(&task.input, &errors, io),
    }
}

fn run_entry(task: &RunTask, config: &Config, io: &mut Streams<'_>) -> Result<u8> {
    let src = read_source(&task.input)?;
    let start = Instant::now();
    let result = terbium::interpret_with(&src, config);
    let elapsed = start.elapsed();

    let code = match result {
        Ok(run) if task.json => {
            serde_json::to_writer_pretty(&mut *io.out, &run).context("sérialisation JSON du résultat")?;
            writeln!(io.out)?;
            0
        }
        Ok(run) => {
            for line in &run.output {
                writeln!(io.out, "{line}")?;
            }
            writeln!(io.out, "{}", run.value)?;
            debug!(steps = run.steps, "run ok");
            0
        }
        Err(errors) if task.json => {
            serde_json::to_writer_pretty(&mut *io.out, &errors).context("sérialisation JSON des diagnostics")?;
            writeln!(io.out)?;
            EXIT_DIAGNOSTICS
        }
        Err(errors) => report(&task.input, &errors, io)?,
    };

    if task.time {
        status_info(io.err, "TIME", &format!("run: {} µs", elapsed.as_micros()))?;
    }
    Ok(code)
}

fn fmt_entry(task: &FmtTask, config: &Config, io: &mut Streams<'_>) -> Result<u8> {
    let src = read_source(&task.input)?;
    let tree = match terbium::ast_with(&src, config) {
        Ok(tree) => tree,
        Err(errors) => return report(&task.input, &errors, io),
    };
    let formatted = terbium::syntax::printer::print_program(&tree);

    if task.check {
        if src == formatted {
            status_ok(io.err, "FMT", &format!("{} déjà formaté", task.input.label()))?;
            return Ok(0);
        }
        bail!("{} n'est pas formaté (mode --check)", task.input.label());
    }

    write_output(&task.output, &task.input, &formatted, io)?;
    if task.output != Output::Stdout {
        status_ok(io.err, "FMT", &task.input.label())?;
    }
    Ok(0)
}

/// Un diagnostic par ligne, préfixé par le fichier et l'étape.
fn report(input: &Input, errors: &[Diagnostic], io: &mut Streams<'_>) -> Result<u8> {
    let label = input.label();
    for d in errors {
        let stage = d.stage.to_string();
        #[cfg(feature = "color")]
        let stage = stage.if_supports_color(Stream::Stderr, |s| s.red()).to_string();
        writeln!(io.err, "{label}: {stage}: {d}")?;
        for note in &d.notes {
            match note.position {
                Some(p) => writeln!(io.err, "  note: [{}:{}] {}", p.line, p.column, note.message)?,
                None => writeln!(io.err, "  note: {}", note.message)?,
            }
        }
    }
    Ok(EXIT_DIAGNOSTICS)
}

// ───────────────────────────── Utilitaires E/S ─────────────────────────────

fn read_source(input: &Input) -> Result<String> {
    match input {
        Input::Stdin => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("lecture de stdin")?;
            Ok(s)
        }
        Input::Path(p) => {
            let f = File::open(p).with_context(|| format!("ouverture: {}", display(p)))?;
            let mut r = BufReader::new(f);
            let mut s = String::new();
            r.read_to_string(&mut s).with_context(|| format!("lecture: {}", display(p)))?;
            Ok(s)
        }
    }
}

fn write_output(output: &Output, input: &Input, text: &str, io: &mut Streams<'_>) -> Result<()> {
    match output {
        Output::Stdout => io.out.write_all(text.as_bytes())?,
        Output::Path(p) => write_text_atomic(p, text)?,
        Output::InPlace => match input {
            Input::Path(p) => write_text_atomic(p, text)?,
            Input::Stdin => bail!("--in-place nécessite un fichier d'entrée"),
        },
    }
    Ok(())
}

fn write_text_atomic(path: &Path, text: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let base = path.file_name().ok_or_else(|| anyhow!("chemin de sortie invalide: {}", display(path)))?;
    let tmp = unique_tmp_path(parent, base);
    {
        let mut w = BufWriter::new(File::create(&tmp).with_context(|| format!("création: {}", display(&tmp)))?);
        w.write_all(text.as_bytes())?;
        w.flush()?;
    }
    if path.exists() {
        // Windows : rename sur cible existante peut échouer
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path).or_else(|_| fs::copy(&tmp, path).and_then(|_| fs::remove_file(&tmp)))?;
    Ok(())
}

fn unique_tmp_path(dir: &Path, base: &std::ffi::OsStr) -> PathBuf {
    let mut i = 0u32;
    loop {
        let candidate = dir.join(format!("{}.tmp{}", base.to_string_lossy(), i));
        if !candidate.exists() {
            return candidate;
        }
        i = i.wrapping_add(1);
    }
}

fn display(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn status_ok(w: &mut dyn Write, tag: &str, msg: &str) -> io::Result<()> {
    #[cfg(feature = "color")]
    {
        writeln!(w, "{} {msg}", tag.if_supports_color(Stream::Stderr, |t| t.green()))
    }
    #[cfg(not(feature = "color"))]
    {
        writeln!(w, "{tag} {msg}")
    }
}

fn status_info(w: &mut dyn Write, tag: &str, msg: &str) -> io::Result<()> {
    #[cfg(feature = "color")]
    {
        writeln!(w, "{} {msg}", tag.if_supports_color(Stream::Stderr, |t| t.blue()))
    }
    #[cfg(not(feature = "color"))]
    {
        writeln!(w, "{tag} {msg}")
    }
}

// ───────────────────────────── Tests ─────────────────────────────
