mod model;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream, WriteColor};

use docweave::context::IdGenerator;
use expander::{DiagnosticError, Engine, ProcessingMode};

use crate::model::Config;

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];
const DEFAULT_CONFIG: &str = "docweave.toml";

#[derive(Parser)]
#[command(name = "docweave", version, about = "Markdown template expansion")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a template against a model
    Run(RunArgs),

    /// Run .test.md test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Markdown template to expand
    file: String,

    /// TOML model file. Each top-level key is bound as a root model.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// How data errors are handled: throw, skip or highlight
    #[arg(long)]
    mode: Option<ProcessingMode>,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Parse only, don't expand (exit 0 if valid)
    #[arg(long)]
    check: bool,

    /// Print the block tree
    #[arg(long)]
    blocks: bool,

    /// Config file (defaults to ./docweave.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `docweave file.md` works like `docweave run file.md`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args
        .iter()
        .skip(1)
        .position(|a| !a.starts_with('-'))
        .map(|p| p + 1)
    {
        if !SUBCOMMANDS.contains(&args[pos].as_str()) {
            args.insert(pos, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}

fn do_run(args: RunArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let term_config = term::Config::default();

    // Config file: explicit path must exist, the default one is optional
    let config = match &args.config {
        Some(path) => Config::load(path).unwrap_or_else(|e| fail(e)),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            Config::load(Path::new(DEFAULT_CONFIG)).unwrap_or_else(|e| fail(e))
        }
        None => Config::default(),
    };
    let mode = match args.mode {
        Some(mode) => mode,
        None => config.mode().unwrap_or_else(|e| fail(e)).unwrap_or_default(),
    };
    let model_path = args.model.clone().or(config.model.clone());
    let output_path = args.output.clone().or(config.output.clone());
    log::debug!("mode {}, model {:?}, output {:?}", mode, model_path, output_path);

    // Read source
    let source = std::fs::read_to_string(&args.file)
        .unwrap_or_else(|e| fail(format!("cannot read '{}': {}", args.file, e)));

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let parser = docweave::parser::Parser::new(source, file_id);

    // --check / --blocks: parse without expanding
    if args.check || args.blocks {
        let template = match parser.parse(&mut IdGenerator::new()) {
            Ok(t) => t,
            Err(errors) => {
                for error in &errors {
                    emit(&mut writer.lock(), &term_config, &files, &error.to_diagnostic());
                }
                process::exit(1);
            }
        };
        if args.blocks {
            let doc = &template.document;
            template.blocks.walk(|block, depth| {
                let text: Vec<String> = block.content.iter().map(|&n| doc.plain_text(n)).collect();
                println!(
                    "{}{} {} ({}) {:?}",
                    "  ".repeat(depth),
                    block.kind.name(),
                    block.label,
                    block.anchor,
                    text.join(" ")
                );
            });
        } else {
            eprintln!("ok: {} parsed successfully", args.file);
        }
        return;
    }

    let mut engine = Engine::new(mode).with_source_id(file_id);
    if let Some(path) = &model_path {
        for (name, value) in model::load_models(path).unwrap_or_else(|e| fail(e)) {
            log::debug!("binding root model '{}' ({})", name, value.type_name());
            engine.bind(name, value);
        }
    }

    let mut document = parser.read();
    match engine.process(&mut document) {
        Ok(report) => {
            log::info!(
                "expanded {} block(s), {} handled error(s)",
                report.blocks,
                report.diagnostics.len()
            );
            emit_diagnostics(&writer, &term_config, &files, &report.diagnostics);
            let rendered = document.to_string();
            match &output_path {
                Some(path) => std::fs::write(path, rendered)
                    .unwrap_or_else(|e| fail(format!("cannot write '{}': {}", path.display(), e))),
                None => print!("{}", rendered),
            }
        }
        Err(error) => {
            emit_diagnostic_error(&writer, &term_config, &files, &error);
            process::exit(1);
        }
    }
}

fn emit_diagnostic_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &DiagnosticError,
) {
    if let Some(span) = &error.span {
        let severity = if error.is_warning {
            Severity::Warning
        } else {
            Severity::Error
        };
        let diagnostic = Diagnostic::new(severity)
            .with_message(error.to_string())
            .with_labels(vec![Label::primary(error.source_id, span.clone())])
            .with_notes(error.notes.clone());
        emit(&mut writer.lock(), config, files, &diagnostic);
    } else {
        let prefix = if error.is_warning { "warning" } else { "error" };
        eprintln!("{}: {}", prefix, error);
    }
}

fn emit_diagnostics(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostics: &[DiagnosticError],
) {
    for diag in diagnostics {
        emit_diagnostic_error(writer, config, files, diag);
    }
}

/// Print one diagnostic. A failed write is logged, not fatal; returns
/// whether the diagnostic was printed.
fn emit<W: WriteColor>(
    writer: &mut W,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    diagnostic: &Diagnostic<usize>,
) -> bool {
    match term::emit_to_write_style(writer, config, files, diagnostic) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("cannot print diagnostic: {}", e);
            false
        }
    }
}
