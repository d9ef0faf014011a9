//! Summarize pages and manage pagebrief settings from the command line.
//!
//! Settings, saved prompts and cached summaries live in one JSON store
//! (default `~/.pagebrief/store.json`). API keys found in `OPENAI_API_KEY`
//! or `ANTHROPIC_API_KEY` are copied into the store when it has none.
//!
//! # Examples
//!
//! ```sh
//! # Summarize a saved article
//! pagebrief summarize --url https://example.com/post --file post.txt
//!
//! # Pipe content and use a saved prompt
//! curl -s https://example.com/post | pagebrief summarize --url https://example.com/post --prompt-id prompt-18c2f-0001
//!
//! # Follow-up question
//! pagebrief ask "What does the author recommend?" --file post.txt
//!
//! # Switch to Anthropic
//! pagebrief config set-provider anthropic --model claude-3-5-haiku-latest
//! ```

use clap::{Parser, Subcommand};
use pagebrief::prelude::*;
use std::fmt::Display;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Tab id used for requests made from the command line.
const CLI_TAB: TabId = 0;

/// Summarize web pages with OpenAI or Anthropic models.
#[derive(Parser)]
#[command(name = "pagebrief")]
struct Cli {
    /// JSON store holding settings and cached summaries
    #[arg(long, env = "PAGEBRIEF_STORE", global = true)]
    store: Option<PathBuf>,

    /// Seconds before an LLM request is abandoned
    #[arg(long, default_value_t = 120, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize page text read from a file or stdin
    Summarize {
        /// Page URL (cache key)
        #[arg(long)]
        url: String,

        #[arg(long, default_value = "")]
        title: String,

        /// Read the page text from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// Saved prompt to use
        #[arg(long)]
        prompt_id: Option<String>,

        /// Ad-hoc template; must contain {content}
        #[arg(long)]
        prompt_text: Option<String>,

        /// Ignore any cached summary
        #[arg(long)]
        force: bool,
    },

    /// Ask a question about page text read from a file or stdin
    Ask {
        question: String,

        #[arg(long)]
        file: Option<PathBuf>,

        /// Earlier summary to include as context
        #[arg(long, default_value = "")]
        summary: String,
    },

    /// Manage saved prompts
    #[command(subcommand)]
    Prompts(PromptsCommand),

    /// Manage cached summaries
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Show or change provider settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum PromptsCommand {
    List,
    Add { name: String, content: String },
    Update { id: String, name: String, content: String },
    Delete { id: String },
    /// Make a saved prompt the default
    Default { id: String },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Remove cached summaries, optionally only those of one prompt
    Clear {
        #[arg(long)]
        prompt_id: Option<String>,
    },
    /// Remove expired entries
    Sweep,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    SetProvider {
        provider: ApiProvider,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        api_key: Option<String>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────

fn err(e: impl Display) -> String {
    e.to_string()
}

fn default_store_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pagebrief")
        .join("store.json")
}

fn read_input(file: Option<&Path>) -> Result<String, String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            Ok(buf)
        }
    }
}

/// Show only the last four characters of a key.
fn mask(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".into();
    }
    let tail: Vec<char> = key.chars().rev().take(4).collect();
    format!("…{}", tail.into_iter().rev().collect::<String>())
}

/// Copy keys from the environment into empty settings slots.
fn seed_keys(settings: &SettingsStore) -> Result<(), String> {
    let mut provider = settings.load().map_err(err)?.provider;
    let mut changed = false;
    for (var, slot) in [
        ("OPENAI_API_KEY", &mut provider.openai_api_key),
        ("ANTHROPIC_API_KEY", &mut provider.anthropic_api_key),
    ] {
        if slot.is_empty()
            && let Ok(value) = std::env::var(var)
            && !value.trim().is_empty()
        {
            *slot = value.trim().to_string();
            changed = true;
            info!("Stored API key from {var}");
        }
    }
    if changed {
        settings.save_provider(&provider).map_err(err)?;
    }
    Ok(())
}

// ── Commands ───────────────────────────────────────────────────────

async fn run(cli: Cli) -> Result<String, String> {
    let path = cli.store.unwrap_or_else(default_store_path);
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).map_err(err)?);
    let http = HttpConfig::default().with_timeout(Duration::from_secs(cli.timeout));
    let coordinator = Coordinator::new(
        store,
        Arc::new(SystemClock),
        Arc::new(HttpProviderFactory::new(http)),
    );
    coordinator.sweep_cache();
    let settings = coordinator.settings();
    seed_keys(settings)?;

    match cli.command {
        Command::Summarize {
            url,
            title,
            file,
            prompt_id,
            prompt_text,
            force,
        } => {
            let content = read_input(file.as_deref())?;
            let request = SummarizeRequest {
                content,
                url,
                title,
                force_refresh: force,
                prompt_text,
                prompt_id,
            };
            let summary = coordinator.summarize(CLI_TAB, request).await.map_err(err)?;
            Ok(summary.unwrap_or_default())
        }

        Command::Ask {
            question,
            file,
            summary,
        } => {
            let context = read_input(file.as_deref())?;
            let request = QuestionRequest {
                question,
                context,
                summary,
            };
            coordinator
                .answer_question(None, request)
                .await
                .map_err(err)
        }

        Command::Prompts(cmd) => match cmd {
            PromptsCommand::List => {
                let prompts = settings.load().map_err(err)?.prompts;
                let lines: Vec<String> = prompts
                    .saved_prompts
                    .iter()
                    .map(|p| {
                        let marker = if p.id == prompts.default_prompt_id { "*" } else { " " };
                        format!("{marker} {}  {}", p.id, p.name)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            PromptsCommand::Add { name, content } => {
                let prompt = settings.add_prompt(&name, &content).map_err(err)?;
                Ok(format!("Added prompt {}", prompt.id))
            }
            PromptsCommand::Update { id, name, content } => {
                settings.update_prompt(&id, &name, &content).map_err(err)?;
                Ok(format!("Updated prompt {id}"))
            }
            PromptsCommand::Delete { id } => {
                settings.delete_prompt(&id).map_err(err)?;
                Ok(format!("Deleted prompt {id}"))
            }
            PromptsCommand::Default { id } => {
                settings.set_default_prompt(&id).map_err(err)?;
                Ok(format!("Default prompt is now {id}"))
            }
        },

        Command::Cache(cmd) => {
            let removed = match cmd {
                CacheCommand::Clear { prompt_id: Some(id) } => {
                    coordinator.cache().clear_for_prompt(&id)
                }
                CacheCommand::Clear { prompt_id: None } => coordinator.cache().clear(),
                CacheCommand::Sweep => coordinator.cache().clean_expired(),
            }
            .map_err(err)?;
            Ok(format!("Removed {removed} cached summaries"))
        }

        Command::Config(ConfigCommand::Show) => {
            let s = settings.load().map_err(err)?;
            let p = &s.provider;
            Ok(format!(
                "store:     {}\nprovider:  {}\nopenai:    {} ({})\nanthropic: {} ({})\ndefault prompt: {}",
                path.display(),
                p.api_provider.display_name(),
                p.openai_model,
                mask(&p.openai_api_key),
                p.anthropic_model,
                mask(&p.anthropic_api_key),
                s.prompts.default_prompt_id,
            ))
        }

        Command::Config(ConfigCommand::SetProvider {
            provider,
            model,
            api_key,
        }) => {
            let mut p = settings.load().map_err(err)?.provider;
            p.api_provider = provider;
            let (model_slot, key_slot) = match provider {
                ApiProvider::OpenAi => (&mut p.openai_model, &mut p.openai_api_key),
                ApiProvider::Anthropic => (&mut p.anthropic_model, &mut p.anthropic_api_key),
            };
            if let Some(model) = model {
                *model_slot = model;
            }
            if let Some(key) = api_key {
                *key_slot = key;
            }
            settings.save_provider(&p).map_err(err)?;
            Ok(format!("Provider set to {}", provider.display_name()))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
