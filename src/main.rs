mod debug_report;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::Parser as ClapParser;
use rivescript::{Options, RiveScript};

/// A RiveScript chatbot interpreter REPL (`SPEC_FULL.md` §6.1).
#[derive(ClapParser, Debug)]
#[command(name = "rivescript", version, about = "A RiveScript chatbot interpreter REPL.")]
struct Cli {
    /// RiveScript source files or directories to load (.rive/.rs extensions).
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Skip structural parse errors with a warning instead of aborting.
    #[arg(long)]
    no_strict: bool,

    /// Keep non-ASCII characters in messages instead of stripping them.
    #[arg(long)]
    utf8: bool,

    /// Lowercase every trigger pattern after parsing.
    #[arg(long = "force-case")]
    force_case: bool,

    /// Recursion bound for topic inheritance, redirects, and BEGIN.
    #[arg(long, default_value_t = 50)]
    depth: u32,

    /// Session id to reply as.
    #[arg(long, default_value = "localuser")]
    user: String,

    /// Print the matched trigger and timing for every turn.
    #[arg(long)]
    debug: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = Options { strict: !cli.no_strict, utf8: cli.utf8, force_case: cli.force_case, depth: cli.depth, ..Options::default() };
    let mut bot = RiveScript::new(options);

    let files = match collect_sources(&cli.paths) {
        Ok(files) => files,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    if files.is_empty() {
        eprintln!("error: no .rive or .rs source files found under the given paths");
        process::exit(2);
    }

    match bot.load_all_with_metrics(&files) {
        Ok(metrics) => {
            for warning in bot.warnings() {
                eprintln!("warning: {}:{}: {}", warning.file, warning.line, warning.message);
            }
            log::info!("loaded {} file(s) in {:?}", metrics.parse.len(), metrics.total);
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }

    run_repl(&mut bot, &cli.user, cli.debug);
}

/// Recursively walks `paths`, reading every `.rive`/`.rs` file found (the
/// file-discovery spec.md explicitly delegates to an external collaborator).
fn collect_sources(paths: &[PathBuf]) -> io::Result<Vec<(String, String)>> {
    let mut files = Vec::new();
    for path in paths {
        collect_from(path, &mut files)?;
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn collect_from(path: &Path, out: &mut Vec<(String, String)>) -> io::Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        entries.sort();
        for entry in entries {
            collect_from(&entry, out)?;
        }
        return Ok(());
    }
    if is_source_file(path) {
        let text = fs::read_to_string(path)?;
        out.push((path.display().to_string(), text));
    }
    Ok(())
}

fn is_source_file(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("rive") | Some("rs"))
}

fn run_repl(bot: &mut RiveScript, user: &str, debug: bool) {
    let stdin = io::stdin();
    let mut handle = stdin.lock();

    loop {
        print!("{user}> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match handle.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "/quit" | "/exit") {
            break;
        }

        if debug {
            let (reply, metrics) = bot.reply_with_metrics(user, message);
            debug_report::print_turn(message, &reply, &metrics);
        } else {
            println!("{}", bot.reply(user, message));
        }
    }
}
