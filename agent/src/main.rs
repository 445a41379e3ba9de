//! Chain-routing conversational agent CLI.
//!
//! `agent chat` runs an interactive session; `agent plan` and `agent exec`
//! expose the planner and the execution loop on their own for scripting.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use agent::controller::Controller;
use agent::core::plan_parser::PlanLine;
use agent::core::types::{CODE_KEY, ChatMessage};
use agent::exit_codes;
use agent::io::completion::completion_from_config;
use agent::io::config::{AgentConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use agent::io::sandbox::PythonSandbox;
use agent::io::syntax::PythonSyntaxCheck;
use agent::session::Session;
use agent::skills::{ChainContext, PythonExecutionSkill, Skill, SkillMessage};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

const DEFAULT_EXEC_TASK: &str = "Run the provided code.";

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Conversational agent that routes requests to code and data chains"
)]
struct Cli {
    /// Config file (defaults are used when it does not exist).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Interactive session on stdin. `/code`, `/load <file>`, `/reset`, `/quit`.
    Chat,
    /// Print the plan for one message as `name;score;instruction` lines.
    Plan {
        message: String,
    },
    /// Run a script through the execution and correction loop.
    Exec {
        file: PathBuf,
        /// Task description given to the corrector.
        #[arg(long)]
        task: Option<String>,
    },
}

fn main() {
    agent::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Chat => cmd_chat(&load_config(&cli.config)?),
        Command::Plan { message } => cmd_plan(&load_config(&cli.config)?, &message),
        Command::Exec { file, task } => {
            cmd_exec(&load_config(&cli.config)?, &file, task.as_deref())
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &AgentConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(cfg: &AgentConfig, message: &str) -> Result<i32> {
    let completion = Rc::from(completion_from_config(&cfg.completion));
    let controller = Controller::new(completion, cfg);
    let plan = controller.plan(&[ChatMessage::user(message)], &cfg.catalogue())?;
    for delegation in plan {
        let line = PlanLine {
            target: delegation.target,
            score: delegation.order,
            instruction: delegation.instruction,
        };
        println!("{}", line.format());
    }
    Ok(exit_codes::OK)
}

fn cmd_exec(cfg: &AgentConfig, file: &Path, task: Option<&str>) -> Result<i32> {
    let code = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let task = task.unwrap_or(DEFAULT_EXEC_TASK);

    let skill = PythonExecutionSkill::new(
        Rc::from(completion_from_config(&cfg.completion)),
        Rc::new(PythonSandbox::from_config(&cfg.sandbox)),
        Rc::new(PythonSyntaxCheck::from_config(&cfg.sandbox)),
        &cfg.code_header,
        cfg.sandbox.retries,
    );
    let mut data = Map::new();
    data.insert(CODE_KEY.to_string(), Value::String(code));
    let history = [ChatMessage::user(task)];
    let context = ChainContext {
        history: &history,
        instruction: task,
        messages: vec![SkillMessage::new("user", task, data)],
    };

    let message = skill.execute(&context)?;
    println!("{}", message.message);
    if message.is_error {
        return Ok(exit_codes::EXECUTION_FAILED);
    }
    Ok(exit_codes::OK)
}

fn cmd_chat(cfg: &AgentConfig) -> Result<i32> {
    let mut session = Session::from_config(cfg)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    prompt(&mut stdout)?;
    for line in stdin.lock().lines() {
        let line = line.context("read stdin")?;
        let line = line.trim();
        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("", _) => {}
            ("/quit", _) => break,
            ("/reset", _) => {
                session.reset();
                writeln!(stdout, "Session reset.")?;
            }
            ("/code", _) => match session.code() {
                Some(code) => writeln!(stdout, "{code}")?,
                None => writeln!(stdout, "No code yet.")?,
            },
            ("/load", path) => match fs::read_to_string(path) {
                Ok(code) => {
                    session.set_code(Some(code));
                    writeln!(stdout, "Loaded {path}.")?;
                }
                Err(err) => eprintln!("read {path}: {err}"),
            },
            _ => match session.interact(line) {
                Ok(outcome) => writeln!(stdout, "{}", outcome.reply)?,
                Err(err) => eprintln!("{:#}", err),
            },
        }
        prompt(&mut stdout)?;
    }
    Ok(exit_codes::OK)
}

fn prompt(stdout: &mut io::Stdout) -> Result<()> {
    write!(stdout, "> ")?;
    stdout.flush().context("flush stdout")
}
