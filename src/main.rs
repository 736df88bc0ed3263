use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use crossterm::style::Stylize;
use reedline::{
    default_emacs_keybindings, ColumnarMenu, DefaultCompleter, DefaultPrompt, DefaultPromptSegment, DefaultValidator, Emacs, KeyCode,
    KeyModifiers, MenuBuilder, Reedline, ReedlineEvent, ReedlineMenu, Signal,
};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use cps_scheme::interpreter::cps::{PRIMITIVES, SPECIAL_FORMS};
use cps_scheme::interpreter::{cps_json, Error, Interpreter};
use cps_scheme::reader::parse_str;
use cps_scheme::{RuntimeError, Value};

#[derive(Parser, Debug)]
#[command(name = "cps-scheme", version, about = "A Scheme interpreter driven by continuations and a trampoline")]
struct Args {
    /// Programs to load, in order
    files: Vec<PathBuf>,

    /// Evaluate an expression and print its value
    #[arg(short, long, value_name = "EXPR")]
    eval: Option<String>,

    /// Exit after loading files and --eval instead of starting the REPL
    #[arg(long)]
    no_repl: bool,

    /// Start without the built-in definitions (square, sqrt, factorial, ...)
    #[arg(long)]
    no_prelude: bool,

    /// Print every parsed top-level datum as JSON and exit
    #[arg(long)]
    dump_json: bool,

    #[arg(long, env = "SCHEME_LOG", default_value = "warn")]
    log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(args: &Args) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = match args.log_file {
        Some(ref path) => {
            let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().unwrap_or(OsStr::new("cps-scheme.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new("%H:%M:%S%.3f".to_string()))
        .with_writer(writer)
        .with_ansi(args.log_file.is_none())
        .init();
    guard
}

fn report_error(err: &dyn std::fmt::Display) { eprintln!("{}", format!(";Error: {}", err).red()); }

fn echo(result: Result<Value, RuntimeError>) {
    match result {
        Ok(Value::Unassigned) => {}
        Ok(val) => println!("{}", format!("=> {:?}", val).cyan()),
        Err(err) => report_error(&err),
    }
}

// Loaded files are run for effect; only their errors are shown.
fn load_file(interpreter: &Interpreter, path: &Path) -> bool {
    info!("loading {}", path.display());
    let src = match fs::read_to_string(path) {
        Ok(src) => src,
        Err(err) => {
            report_error(&format!("{}: {}", path.display(), err));
            return false;
        }
    };
    let mut ok = true;
    let loaded = interpreter.execute(&src, |result| {
        if let Err(err) = result {
            ok = false;
            report_error(&err);
        }
    });
    if let Err(err) = loaded {
        report_error(&format!("{}: {}", path.display(), err));
        return false;
    }
    ok
}

fn dump_json(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut sources = vec![];
    for path in &args.files {
        sources.push(fs::read_to_string(path)?);
    }
    sources.extend(args.eval.clone());
    for src in sources {
        for datum in parse_str(&src)? {
            println!("{}", cps_json::datum_to_json(&datum)?);
        }
    }
    Ok(())
}

fn repl(interpreter: &Interpreter) {
    let mut words: Vec<String> = PRIMITIVES.keys().chain(SPECIAL_FORMS.keys()).map(|s| s.to_string()).collect();
    words.extend(interpreter.identifiers());
    words.sort();
    words.dedup();

    let completer = Box::new(DefaultCompleter::new_with_wordlen(words, 2));
    let completion_menu = Box::new(ColumnarMenu::default().with_name("completion_menu"));
    let mut keybindings = default_emacs_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::UntilFound(vec![ReedlineEvent::Menu("completion_menu".to_string()), ReedlineEvent::MenuNext]),
    );

    let mut line_editor = Reedline::create()
        .with_completer(completer)
        .with_menu(ReedlineMenu::EngineCompleter(completion_menu))
        .with_edit_mode(Box::new(Emacs::new(keybindings)))
        .with_validator(Box::new(DefaultValidator));
    let prompt = DefaultPrompt::new(DefaultPromptSegment::Basic("scheme".to_string()), DefaultPromptSegment::Empty);

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                debug!("read {:?}", buffer);
                if let Err(err) = interpreter.execute(&buffer, echo) {
                    report_error(&err);
                }
            }
            Ok(_) => break,
            Err(err) => {
                report_error(&err);
                break;
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_logging(&args);

    if args.dump_json {
        return match dump_json(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                report_error(&err);
                ExitCode::FAILURE
            }
        };
    }

    let interpreter = if args.no_prelude {
        Interpreter::new()
    } else {
        match Interpreter::with_prelude() {
            Ok(interpreter) => interpreter,
            Err(err) => {
                report_error(&err);
                return ExitCode::FAILURE;
            }
        }
    };

    let mut ok = true;
    for path in &args.files {
        ok &= load_file(&interpreter, path);
    }
    if let Some(ref expr) = args.eval {
        let result: Result<(), Error> = interpreter.execute(expr, |result| {
            match result {
                Ok(Value::Unassigned) => {}
                Ok(val) => println!("{}", val),
                Err(err) => {
                    ok = false;
                    report_error(&err);
                }
            }
        });
        if let Err(err) = result {
            ok = false;
            report_error(&err);
        }
    }

    if !args.no_repl && args.eval.is_none() {
        repl(&interpreter);
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
