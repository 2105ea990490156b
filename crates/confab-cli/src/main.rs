mod logging;
mod runtime;
mod ui;

use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use confab_core::actions::ShellAction;
use confab_core::actions::UserAction;
use confab_core::catalog::find_module;
use confab_core::config::Config;
use confab_core::state::Attachment;
use confab_core::state::ChatState;
use confab_core::state::StageStatus;
use confab_core::state::Turn;
use confab_exec::fixtures::FixtureReplySource;
use confab_exec::source::ReplySource;
use confab_exec::source::SimulatedReplySource;

use crate::logging::LogTarget;
use crate::runtime::Console;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("confab {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "tui" => {
            let options = parse_args(args.collect::<Vec<_>>(), false)?;
            run_tui(options)
        }
        "run" => {
            let options = parse_args(args.collect::<Vec<_>>(), true)?;
            run_prompt(options)
        }
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    config: Option<PathBuf>,
    prompt: Option<String>,
    module: Option<String>,
    json: bool,
}

fn parse_args(args: Vec<String>, headless: bool) -> Result<CliOptions, Box<dyn std::error::Error>> {
    let mut options = CliOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--config requires a path".into());
                };
                options.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--prompt" if headless => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--prompt requires text".into());
                };
                options.prompt = Some(value.clone());
                i += 2;
            }
            "--module" if headless => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--module requires an id".into());
                };
                options.module = Some(value.clone());
                i += 2;
            }
            "--json" if headless => {
                options.json = true;
                i += 1;
            }
            other => {
                return Err(format!("unsupported argument: {other}").into());
            }
        }
    }
    if headless && options.prompt.is_none() {
        return Err("run requires --prompt TEXT".into());
    }
    Ok(options)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("confab").join("config.toml"))
}

fn load_config(options: &CliOptions) -> Result<(Config, Option<PathBuf>), Box<dyn std::error::Error>> {
    let path = options.config.clone().or_else(default_config_path);
    let config = match (&path, &options.config) {
        // An explicit path must exist.
        (Some(path), Some(_)) => Config::load(path)?,
        (Some(path), None) => Config::load_or_default(path)?,
        (None, _) => Config::default(),
    };
    Ok((config, path))
}

/// Fixture paths in the config are relative to the config file.
fn reply_source(
    config: &Config,
    config_path: Option<&Path>,
) -> Result<Box<dyn ReplySource>, Box<dyn std::error::Error>> {
    let Some(fixtures) = config.replies.fixtures.as_deref() else {
        return Ok(Box::new(SimulatedReplySource));
    };
    let mut path = PathBuf::from(fixtures);
    if path.is_relative() {
        if let Some(dir) = config_path.and_then(Path::parent) {
            path = dir.join(path);
        }
    }
    let source = FixtureReplySource::load(&path)?;
    tracing::info!(path = %path.display(), fixtures = source.len(), "using reply fixtures");
    Ok(Box::new(source))
}

fn run_tui(options: CliOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (config, config_path) = load_config(&options)?;
    let log_path = logging::init(LogTarget::File, &config.log.filter)?;
    let state = ChatState::new(config.stage_timing(), config.theme()?);
    let source = reply_source(&config, config_path.as_deref())?;
    tracing::info!(log = ?log_path, "starting terminal console");
    ui::run(Console::new(state, source))
}

fn run_prompt(options: CliOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (config, config_path) = load_config(&options)?;
    logging::init(LogTarget::Stderr, &config.log.filter)?;

    let mut state = ChatState::new(config.stage_timing(), config.theme()?);
    if let Some(id) = options.module.as_deref() {
        let Some(module) = find_module(id) else {
            return Err(format!("unknown module: {id}").into());
        };
        state.selection.module = Some(module.id);
    }
    let source = reply_source(&config, config_path.as_deref())?;
    let mut console = Console::new(state, source);

    let started = Instant::now();
    let prompt = options.prompt.unwrap_or_default();
    console.dispatch(ShellAction::User(UserAction::InputPaste(prompt)), started);
    console.dispatch(ShellAction::User(UserAction::Submit), started);
    let Some(turn_id) = console.state().conversation.streaming else {
        return Err("prompt is empty".into());
    };

    let mut last_printed = None;
    loop {
        let Some(turn) = console.state().conversation.turn(turn_id) else {
            break;
        };
        let statuses = turn.reply.statuses();
        if last_printed.as_ref() != Some(&statuses) {
            println!(
                "[+{:.1}s] {}",
                started.elapsed().as_secs_f32(),
                progress_line(turn)
            );
            last_printed = Some(statuses);
        }
        if !turn.reply.is_streaming() {
            break;
        }
        let Some(deadline) = console.next_deadline() else {
            break;
        };
        thread::sleep(deadline.saturating_duration_since(Instant::now()));
        console.tick(Instant::now());
    }

    let Some(turn) = console.state().conversation.turn(turn_id) else {
        return Err("turn disappeared before completion".into());
    };
    if options.json {
        println!("{}", serde_json::to_string_pretty(turn)?);
    } else {
        print_reply(turn);
    }
    Ok(())
}

fn progress_line(turn: &Turn) -> String {
    let total = turn.reply.stages.len();
    let done = turn.reply.completed_stages();
    match turn
        .reply
        .stages
        .iter()
        .find(|stage| stage.status == StageStatus::Processing)
    {
        Some(stage) => format!("stage {done}/{total} complete, processing: {}", stage.label),
        None => format!("stage {done}/{total} complete"),
    }
}

fn print_reply(turn: &Turn) {
    println!();
    println!("{}", turn.reply.text);
    if !turn.reply.attachments.is_empty() {
        println!();
        println!("Attachments:");
        for attachment in &turn.reply.attachments {
            println!("  - {}", attachment.label());
            if let Attachment::Chart {
                categories, values, ..
            } = attachment
            {
                for (category, value) in categories.iter().zip(values) {
                    println!("      {category:<8} {value}");
                }
            }
        }
    }
    if !turn.reply.follow_ups.is_empty() {
        println!();
        println!("Follow-ups:");
        for follow_up in &turn.reply.follow_ups {
            println!("  - {follow_up}");
        }
    }
}

fn print_help() {
    println!("confab {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  confab tui [--config PATH]");
    println!("  confab run --prompt TEXT [--module ID] [--json] [--config PATH]");
    println!("  confab --help");
    println!("  confab --version");
    println!();
    println!("Set CONFAB_LOG to override the log filter (e.g. CONFAB_LOG=debug).");
}
