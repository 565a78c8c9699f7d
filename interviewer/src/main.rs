use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand};
use interviewer::cache::SqliteCacheStore;
use interviewer::prompt_library::PromptLibrary;
use interviewer::session::{InterviewParams, Session, DEFAULT_QUESTION, DEFAULT_RESUME, MODELS};
use interviewer::settings::{Settings, DEFAULT_ENV_FILE};
use interviewer::transport::OpenAiTransport;
use interviewer::{CompletionClient, CompletionRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "interviewer", about = "Practice interviews against a completion model")]
struct Cli {
    /// Secrets file with OPENAI_API_KEY and optional OPENAI_ORG_ID
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive interview
    Chat {
        #[arg(long, default_value = MODELS[0], value_parser = PossibleValuesParser::new(MODELS))]
        model: String,
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(0..=2048))]
        max_tokens: u32,
        #[arg(long, default_value_t = 0.7)]
        temperature: f64,
        /// Resume text file (defaults to the bundled sample)
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Question template file with {{resume}} and {{transcript}} placeholders
        #[arg(long)]
        question: Option<PathBuf>,
        #[arg(long)]
        no_cache: bool,
    },
    /// Send a single completion request and print the normalized result
    Complete {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = MODELS[0])]
        model: String,
        #[arg(long, default_value_t = 100)]
        max_tokens: u32,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        #[arg(long, default_value = "test")]
        tag: String,
    },
    /// Manage saved prompts
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },
}

#[derive(Subcommand)]
enum PromptsAction {
    List,
    Show { id: String },
    Delete { id: String },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_client(settings: &Settings, cache_dir: Option<&Path>) -> CompletionClient {
    let transport = OpenAiTransport::new(
        settings.openai_api_key.clone(),
        settings.openai_org_id.clone(),
    );
    let client = CompletionClient::new(Arc::new(transport));

    let Some(dir) = cache_dir else {
        return client;
    };
    match SqliteCacheStore::open(dir) {
        Ok(store) => {
            info!("Using completion cache at {}", dir.display());
            client.with_cache(Arc::new(store))
        }
        Err(e) => {
            warn!("Cache unavailable at {} ({}), continuing without", dir.display(), e);
            client
        }
    }
}

fn read_text(path: Option<&Path>, default: &str) -> Result<String, BoxError> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?,
        None => default.to_string(),
    };
    Ok(text.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env_file(&cli.env_file)?;

    match cli.command {
        Command::Chat {
            model,
            max_tokens,
            temperature,
            resume,
            question,
            no_cache,
        } => {
            let cache_dir = (!no_cache).then_some(settings.disk_cache_dir.as_path());
            let client = Arc::new(build_client(&settings, cache_dir));
            let session = Session::new(
                client,
                InterviewParams {
                    model,
                    max_tokens,
                    temperature,
                },
                read_text(resume.as_deref(), DEFAULT_RESUME)?,
                read_text(question.as_deref(), DEFAULT_QUESTION)?,
            );
            run_chat(&settings, &session).await
        }
        Command::Complete {
            prompt,
            model,
            max_tokens,
            cache_dir,
            tag,
        } => {
            let client = build_client(&settings, cache_dir.as_deref());
            let request = CompletionRequest::new(prompt)
                .with_model(model)
                .with_max_tokens(max_tokens);
            let result = client.complete(&request, Some(&tag)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Prompts { action } => {
            let library = PromptLibrary::new(&settings.prompt_history_path);
            match action {
                PromptsAction::List => {
                    for id in library.list()? {
                        println!("{id}");
                    }
                }
                PromptsAction::Show { id } => {
                    let saved = library.load(&id)?;
                    println!("params: {}", serde_json::to_string_pretty(&saved.params)?);
                    println!("inputs: {}", serde_json::to_string_pretty(&saved.inputs)?);
                    println!("\n{}", saved.prompt_text);
                }
                PromptsAction::Delete { id } => {
                    library.delete(&id)?;
                    println!("deleted {id}");
                }
            }
            Ok(())
        }
    }
}

const CHAT_HELP: &str = "Commands: /feedback, /transcript, /save <name>, /quit";

async fn run_chat(settings: &Settings, session: &Session) -> Result<(), BoxError> {
    let library = PromptLibrary::new(&settings.prompt_history_path);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{CHAT_HELP}\n");
    for line in session.transcript().await.lines() {
        println!("{line}\n");
    }

    loop {
        print!("Candidate: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => println!("{CHAT_HELP}"),
            "/transcript" => println!("{}\n", session.transcript().await.lines().join("\n\n")),
            "/feedback" => match session.feedback().await {
                Ok(result) => println!("\n{}\n", result.completion.trim()),
                Err(e) => eprintln!("Feedback request failed: {e}"),
            },
            cmd if cmd.starts_with("/save") => {
                let name = cmd.trim_start_matches("/save").trim();
                let name = if name.is_empty() { "interview" } else { name };
                match session.save_prompt(&library, name).await {
                    Ok(id) => println!("Saved prompt {id}"),
                    Err(e) => eprintln!("Failed to save prompt: {e}"),
                }
            }
            text => match session.submit(text).await {
                Ok(reply) if reply.text.is_empty() => println!(),
                Ok(reply) => println!("\n{reply}\n"),
                Err(e) => {
                    error!("Interview turn failed: {}", e);
                    eprintln!("Request failed: {e}. Your answer was not recorded; send it again to retry.");
                }
            },
        }
    }

    match session.dump_transcript(&settings.chat_turns_dir).await {
        Ok(path) => info!("Transcript written to {}", path.display()),
        Err(e) => warn!("Failed to write transcript: {}", e),
    }
    Ok(())
}
