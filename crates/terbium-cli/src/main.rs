//! `terbium` — CLI principal
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (tracing,
//! couleur), et délégation à `terbium_cli` (lib).

#![forbid(unsafe_code)]

use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use terbium::{Config, VmOptions};
use terbium_cli as cli;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "terbium", version, about = "Terbium : inspecter, désassembler, exécuter et formater des sources", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Couleur des diagnostics et des traces
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Afficher l'arbre syntaxique
    Ast {
        /// Fichier source (ou - pour stdin)
        input: Option<PathBuf>,
        /// Sortie JSON (serde) au lieu de l'arbre Debug
        #[arg(long)]
        json: bool,
    },

    /// Désassembler le bytecode compilé
    Dis {
        /// Fichier source (ou - pour stdin)
        input: Option<PathBuf>,
        /// Fichier de sortie (stdout si omis)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compiler puis exécuter
    Run {
        /// Fichier source (ou - pour stdin)
        input: Option<PathBuf>,
        /// Résultat (valeur, sortie, instructions) en JSON
        #[arg(long)]
        json: bool,
        /// Budget d'instructions (illimité si omis)
        #[arg(long = "max-steps")]
        max_steps: Option<u64>,
        /// Profondeur maximale de la pile d'appels
        #[arg(long = "max-depth")]
        max_depth: Option<usize>,
        /// Afficher le temps d'exécution
        #[arg(long)]
        time: bool,
    },

    /// Réimprimer une source sous forme canonique
    Fmt {
        /// Fichier source (ou - pour stdin)
        input: Option<PathBuf>,
        /// Fichier de sortie (stdout si omis)
        #[arg(short, long, conflicts_with = "in_place")]
        output: Option<PathBuf>,
        /// Réécrire le fichier d'entrée
        #[arg(long = "in-place")]
        in_place: bool,
        /// Vérifier uniquement (erreur si la source diffère)
        #[arg(long)]
        check: bool,
    },
}

// ──────────────────────────── Entrée / Sortie ────────────────────────────

fn output_from_opt(output: Option<PathBuf>, in_place: bool) -> cli::Output {
    if in_place {
        return cli::Output::InPlace;
    }
    output.map_or(cli::Output::Stdout, cli::Output::Path)
}

fn color_override(choice: ColorChoice) -> Option<bool> {
    match choice {
        ColorChoice::Auto => None,
        ColorChoice::Always => Some(true),
        ColorChoice::Never => Some(false),
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn real_main() -> Result<u8> {
    let opt = Opt::parse();

    let force = color_override(opt.color);
    cli::set_color(force);
    cli::init_tracing(opt.verbose, opt.quiet, force.unwrap_or_else(|| io::stderr().is_terminal()));

    let mut config = Config::default();
    let command = match opt.cmd {
        Command::Ast { input, json } => cli::Command::Ast(cli::AstTask { input: cli::Input::from_arg(input), json }),
        Command::Dis { input, output } => cli::Command::Dis(cli::DisTask {
            input: cli::Input::from_arg(input),
            output: output_from_opt(output, false),
        }),
        Command::Run { input, json, max_steps, max_depth, time } => {
            config.vm = VmOptions {
                max_steps,
                max_call_depth: max_depth.unwrap_or(config.vm.max_call_depth),
                ..config.vm
            };
            cli::Command::Run(cli::RunTask { input: cli::Input::from_arg(input), json, time })
        }
        Command::Fmt { input, output, in_place, check } => cli::Command::Fmt(cli::FmtTask {
            input: cli::Input::from_arg(input),
            output: output_from_opt(output, in_place),
            check,
        }),
    };

    let (stdout, stderr) = (io::stdout(), io::stderr());
    let (mut out, mut err) = (stdout.lock(), stderr.lock());
    cli::execute(command, &config, &mut cli::Streams { out: &mut out, err: &mut err })
        .context("échec d'exécution de la commande")
}
