use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::SessionConfig;
use crate::diagnostics::{is_consistent, Severity};
use crate::script::Action;
use crate::script_file::{content_digest, load_script, save_script};
use crate::session::EditorSession;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a script's structural invariants and print diagnostics as JSON
    Check {
        /// Script JSON file
        script: PathBuf,
    },

    /// Print complexity metrics and list sizing for a script
    Stats {
        /// Script JSON file
        script: PathBuf,

        /// Height of the step list viewport
        #[arg(long, default_value_t = 600.0)]
        container_height: f64,
    },

    /// Print the range of steps rendered at a scroll position
    Window {
        /// Script JSON file
        script: PathBuf,

        /// Scroll offset of the step list
        #[arg(long, default_value_t = 0.0)]
        scroll_top: f64,

        /// Height of the step list viewport
        #[arg(long, default_value_t = 600.0)]
        container_height: f64,
    },

    /// Replace one action's content, refusing edits that leak outside it
    Edit {
        /// Script JSON file
        script: PathBuf,

        /// Id of the pool entry to replace
        #[arg(long)]
        action_id: String,

        /// JSON file holding the new action
        #[arg(long)]
        action: PathBuf,

        /// Where to write the edited script (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Check { script } => check(&config, &script),
        Commands::Stats {
            script,
            container_height,
        } => stats(&config, &script, container_height),
        Commands::Window {
            script,
            scroll_top,
            container_height,
        } => window(&config, &script, scroll_top, container_height),
        Commands::Edit {
            script,
            action_id,
            action,
            out,
        } => edit(&config, &script, &action_id, &action, out.as_deref()),
    }
}

fn open_session(config: &SessionConfig, path: &Path) -> Result<EditorSession> {
    let script = load_script(path).with_context(|| format!("Failed to load script {:?}", path))?;
    let mut session = EditorSession::new(config.clone())?;
    session.load_script(script)?;
    Ok(session)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check(config: &SessionConfig, path: &Path) -> Result<()> {
    let session = open_session(config, path)?;
    let diagnostics = session.diagnostics();
    print_json(&diagnostics)?;

    if !is_consistent(&diagnostics) {
        let errors = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        bail!("{:?} has {} consistency error(s)", path, errors);
    }
    Ok(())
}

fn stats(config: &SessionConfig, path: &Path, container_height: f64) -> Result<()> {
    let session = open_session(config, path)?;
    let script = session.script();
    print_json(&serde_json::json!({
        "title": script.metadata.title,
        "digest": content_digest(script)?,
        "complexity": session.complexity(),
        "isLarge": session.is_large(),
        "listConfig": session.list_config(container_height),
    }))
}

fn window(config: &SessionConfig, path: &Path, scroll_top: f64, container_height: f64) -> Result<()> {
    let session = open_session(config, path)?;
    let range = session.visible_range(scroll_top, container_height);
    let step_ids: Vec<&str> = session
        .visible_steps(&range)
        .iter()
        .map(|step| step.id.as_str())
        .collect();
    print_json(&serde_json::json!({
        "range": range,
        "stepIds": step_ids,
    }))
}

fn edit(
    config: &SessionConfig,
    path: &Path,
    action_id: &str,
    action_path: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let mut session = open_session(config, path)?;

    let content = std::fs::read_to_string(action_path)
        .with_context(|| format!("Failed to read action {:?}", action_path))?;
    let action: Action = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse action {:?}", action_path))?;

    let outcome = session.apply_action_edit(action_id, action)?;
    if !outcome.applied {
        print_json(&outcome)?;
        bail!("edit to action {:?} was not isolated; script left unchanged", action_id);
    }
    if outcome.affects_multiple_steps {
        eprintln!(
            "[WARN] action {} is shared by steps: {}",
            action_id,
            outcome.affected_steps.join(", ")
        );
    }

    match out {
        Some(out) => {
            save_script(out, session.script())?;
            println!("Wrote {:?}", out);
        }
        None => print_json(session.script())?,
    }
    Ok(())
}
