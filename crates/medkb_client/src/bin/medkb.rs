//! medkb: terminal front end for the medical knowledge base.
//! Resolves config, then either runs chat exchanges (one question from the
//! command line, or one per stdin line) or a one-shot health/document call.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use medkb_client::config::{self, Config};
use medkb_client::{ApiClient, ChatBackend, ChatSession, Message, SessionOptions, Source};
use tokio::io::AsyncBufReadExt;

#[derive(Parser)]
#[command(name = "medkb", version, about = "Ask the medical knowledge base", long_about = None)]
struct Cli {
    /// Config file (default: $MEDKB_CONFIG, then ~/.medkb/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Ask questions (the default when no subcommand is given)
    Chat(ChatArgs),
    /// Check that the backend is up
    Health,
    /// Manage knowledge-base documents
    Documents {
        #[command(subcommand)]
        action: DocumentAction,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Default)]
struct ChatArgs {
    /// Which backend endpoint answers the questions
    #[arg(long, value_enum, default_value_t = EndpointKind::Chat)]
    endpoint: EndpointKind,

    /// Ask a single question; without it, every stdin line is a question.
    /// A question spelled like a subcommand goes after `--`: `medkb chat -- health`
    question: Option<String>,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum EndpointKind {
    #[default]
    Chat,
    Sources,
}

#[derive(Subcommand)]
enum DocumentAction {
    /// List uploaded documents
    List,
    /// Upload a document file
    Upload { file: PathBuf },
    /// Delete a document by id
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", msg);
    process::exit(1);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Some(Command::Config { action }) = &cli.command {
        run_config(cli.config.as_deref(), action);
        return;
    }

    let cfg = config::resolve(cli.config.as_deref()).unwrap_or_else(|e| fail(e));
    let client = ApiClient::new(&cfg);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(format!("failed to create runtime: {}", e)));

    let Cli { command, chat, .. } = cli;
    let ok = rt.block_on(async move {
        match command {
            None => run_chat(&cfg, &client, chat).await,
            Some(Command::Chat(args)) => run_chat(&cfg, &client, args).await,
            Some(Command::Health) => {
                let health = client.health().await.unwrap_or_else(|e| fail(e));
                println!("status: {}", health.status);
                true
            }
            Some(Command::Documents { action }) => run_documents(&client, action).await,
            Some(Command::Config { .. }) => unreachable!("handled before runtime start"),
        }
    });

    if !ok {
        process::exit(1);
    }
}

fn run_config(path: Option<&Path>, action: &ConfigAction) {
    match action {
        ConfigAction::Show => {
            let mut cfg = config::resolve(path).unwrap_or_else(|e| fail(e));
            cfg.api.base_url = Some(cfg.base_url().to_string());
            let yaml = serde_yaml::to_string(&cfg).unwrap_or_else(|e| fail(e));
            print!("{}", yaml);
        }
        ConfigAction::Init { force } => {
            let path = config::resolve_config_path(path).unwrap_or_else(|| {
                fail("unable to determine config path (set --config or MEDKB_CONFIG)")
            });
            if path.exists() && !force {
                fail(format!("{} already exists (use --force)", path.display()));
            }
            let mut cfg = Config::default();
            cfg.api.base_url = Some(config::DEFAULT_BASE_URL.into());
            config::save(&path, &cfg).unwrap_or_else(|e| fail(e));
            println!("Wrote {}", path.display());
        }
    }
}

/// Runs chat exchanges. Returns false if any exchange failed.
async fn run_chat(cfg: &Config, client: &ApiClient, args: ChatArgs) -> bool {
    let options = match args.endpoint {
        EndpointKind::Chat => SessionOptions::chat(cfg),
        EndpointKind::Sources => SessionOptions::sources(cfg),
    };
    let mut session = ChatSession::new(options);

    if let Some(question) = args.question {
        if question.trim().is_empty() {
            fail("no question provided");
        }
        return exchange(&mut session, client, question).await;
    }

    let interactive = io::stdin().is_terminal();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut all_ok = true;
    loop {
        if interactive {
            eprint!("> ");
            let _ = io::stderr().flush();
        }
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => fail(format!("failed to read stdin: {}", e)),
        };
        if line.trim() == "/quit" {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        all_ok &= exchange(&mut session, client, line).await;
    }
    all_ok
}

/// One question/answer round trip, rendered to stdout.
async fn exchange(session: &mut ChatSession, client: &ApiClient, question: String) -> bool {
    session.set_draft(question);
    let Some(pending) = session.begin() else {
        return true;
    };
    eprintln!("Analyzing medical documents...");

    let result = client
        .ask(&session.options().endpoint, pending.question())
        .await;

    let mut sources = None;
    let Some(reply) = session.finish(pending, result, |s| sources = Some(s)) else {
        return false;
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    render(&mut out, reply, sources.as_deref());
    sources.is_some()
}

fn render(out: &mut impl Write, reply: &Message, sources: Option<&[Source]>) {
    let _ = writeln!(out, "{}", reply.content());
    if let Some(sources) = sources {
        if !sources.is_empty() {
            let _ = writeln!(out, "\nSources:");
            for (i, src) in sources.iter().enumerate() {
                let _ = writeln!(out, "  [{}] {}", i + 1, src.content);
                if let Some(meta) = &src.metadata {
                    let meta = serde_json::Value::Object(meta.clone());
                    let _ = writeln!(out, "      {}", meta);
                }
            }
        }
    }
    let _ = out.flush();
}

async fn run_documents(client: &ApiClient, action: DocumentAction) -> bool {
    match action {
        DocumentAction::List => {
            let docs = client.list_documents().await.unwrap_or_else(|e| fail(e));
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!("{}\t{}\t{}", doc.id, doc.name, doc.upload_date);
            }
            true
        }
        DocumentAction::Upload { file } => {
            let receipt = client
                .upload_document(&file)
                .await
                .unwrap_or_else(|e| fail(e));
            println!("{}", receipt.message);
            receipt.success
        }
        DocumentAction::Delete { id } => {
            let receipt = client.delete_document(&id).await.unwrap_or_else(|e| fail(e));
            if receipt.success {
                println!("Deleted {}", id);
            } else {
                eprintln!("Backend did not delete {}", id);
            }
            receipt.success
        }
    }
}
