use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use trellis_checklist::derive_checklist;
use trellis_client::{ClientConfig, HttpClient, TemplateStore};
use trellis_graph::validate;
use trellis_template::{ChecklistSnapshot, ExecutionState, ProgressMode, Template};

/// Trellis - workflow template validation and checklist preview
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a template file against the graph invariants
  Validate {
    /// Path to the template file (JSON)
    template_file: PathBuf,
  },

  /// Derive and print the checklist for a template plus a status snapshot
  Preview {
    /// Path to the template file (JSON)
    template_file: PathBuf,

    /// Path to an execution state file (JSON)
    #[arg(long)]
    status: PathBuf,

    /// Override the template's progress mode (strict, loose, legacy)
    #[arg(long)]
    mode: Option<String>,
  },

  /// Fetch a template from the service and print it as JSON
  Fetch {
    /// The template id
    template_id: i64,

    /// Base URL of the service
    #[arg(long)]
    base_url: String,

    /// Bearer token (defaults to the TRELLIS_TOKEN environment variable)
    #[arg(long)]
    token: Option<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Validate { template_file }) => validate_template(template_file),
    Some(Commands::Preview {
      template_file,
      status,
      mode,
    }) => preview_checklist(template_file, status, mode),
    Some(Commands::Fetch {
      template_id,
      base_url,
      token,
    }) => fetch_template(template_id, base_url, token),
    None => {
      println!("trellis - use --help to see available commands");
      Ok(())
    }
  }
}

fn load_template(template_file: &PathBuf) -> Result<Template> {
  let content = std::fs::read_to_string(template_file)
    .with_context(|| format!("failed to read template file: {}", template_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse template file: {}", template_file.display()))
}

fn validate_template(template_file: PathBuf) -> Result<()> {
  let template = load_template(&template_file)?;

  match validate(&template) {
    Ok(()) => {
      println!(
        "ok: '{}' ({} steps) passes validation",
        template.name,
        template.steps.len()
      );
      Ok(())
    }
    Err(error) => {
      anyhow::bail!("validation failed: {}", error);
    }
  }
}

fn preview_checklist(
  template_file: PathBuf,
  status_file: PathBuf,
  mode: Option<String>,
) -> Result<()> {
  let template = load_template(&template_file)?;
  validate(&template).context("template is not valid")?;

  let status_content = std::fs::read_to_string(&status_file)
    .with_context(|| format!("failed to read status file: {}", status_file.display()))?;
  let state: ExecutionState = serde_json::from_str(&status_content)
    .with_context(|| format!("failed to parse status file: {}", status_file.display()))?;

  let progress_mode = match mode.as_deref() {
    Some("strict") => ProgressMode::Strict,
    Some("loose") => ProgressMode::Loose,
    Some("legacy") => ProgressMode::Legacy,
    Some(other) => anyhow::bail!("unknown progress mode: {}", other),
    // Validation guarantees the mode is present.
    None => template.progress_mode.context("template has no progress mode")?,
  };

  let snapshot = ChecklistSnapshot {
    instance: trellis_template::InstanceId(0),
    progress_mode,
    steps: template.steps,
    state,
  };
  let checklist = derive_checklist(&snapshot);

  eprintln!(
    "checklist for '{}' ({} mode), {}% complete",
    template.name,
    progress_mode.as_str(),
    checklist.progress_percent
  );
  for view in &checklist.views {
    let gate = if view.is_gate { " [gate]" } else { "" };
    let blocked = if view.blocked_by.is_empty() {
      String::new()
    } else {
      let ids: Vec<String> = view.blocked_by.iter().map(|id| id.to_string()).collect();
      format!(" blocked by {}", ids.join(", "))
    };
    println!("{:>3}. {:<32} {:?}{}{}", view.step_id, view.name, view.status, gate, blocked);
  }

  Ok(())
}

fn fetch_template(template_id: i64, base_url: String, token: Option<String>) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { fetch_template_async(template_id, base_url, token).await })
}

async fn fetch_template_async(
  template_id: i64,
  base_url: String,
  token: Option<String>,
) -> Result<()> {
  let token = match token {
    Some(token) => token,
    None => std::env::var("TRELLIS_TOKEN")
      .context("no --token given and TRELLIS_TOKEN is not set")?,
  };

  let config = ClientConfig {
    base_url: base_url
      .parse()
      .with_context(|| format!("invalid base url: {}", base_url))?,
    token,
  };
  let client = HttpClient::new(config);

  let template = client
    .get_template(template_id)
    .await
    .context("failed to fetch template")?;

  eprintln!("fetched '{}' with {} steps", template.name, template.steps.len());
  println!("{}", serde_json::to_string_pretty(&template)?);

  Ok(())
}
