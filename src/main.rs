//! Deskhook CLI
//!
//! Relay prompts to the local editor-assistant extension, inspect the
//! request queue, and watch terminal output streams.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use deskhook::dispatch::{Dispatcher, PromptSubmission};
use deskhook::terminal::{StreamEvent, TerminalStream};
use deskhook::tracker::{ActionSource, ActionStore};
use deskhook::tui::WatchApp;
use deskhook::webhook::{PollOptions, SendResult, StatusProbe, WebhookClient};
use deskhook::{config, DeliveryOutcome, DeskhookConfig};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

/// Deskhook - developer console companion for the editor extension
#[derive(Parser, Debug)]
#[command(name = "deskhook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Deskhook home directory (default: $DESKHOOK_HOME or ~/.deskhook)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Override the webhook endpoint
    #[arg(long)]
    webhook_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a prompt to the assistant (reads stdin when no prompt is given)
    Send {
        /// Prompt text
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,

        /// Context file to attach ("-" for stdin)
        #[arg(long)]
        context: Option<PathBuf>,

        /// Where this prompt originated
        #[arg(long, value_enum, default_value_t = SourceArg::Manual)]
        source: SourceArg,

        /// Action type label recorded in the history
        #[arg(long, default_value = "prompt")]
        action_type: String,

        /// Follow the request until the extension finishes processing it
        #[arg(long)]
        wait: bool,
    },

    /// Show extension health and readiness
    Health,

    /// Show the extension's work queue
    Queue,

    /// Probe the status of a submitted request
    Status {
        request_id: String,

        /// Poll until the request completes or fails
        #[arg(long)]
        wait: bool,
    },

    /// Send a discrete action through the generic envelope
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },

    /// Connectivity test against the extension
    Test,

    /// Inspect and manage the action history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Watch terminal output streams
    Watch {
        /// Plain line output instead of the TUI
        #[arg(long)]
        plain: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ActionCommand {
    /// Hand the assistant a task to execute
    ExecuteTask { task: String },
    /// Open an assistant chat with this prompt
    CopilotChat { prompt: String },
    /// Create a file (content read from --content or stdin)
    CreateFile {
        file_path: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Ask the assistant to modify a file
    ModifyFile {
        file_path: String,
        prompt: String,
    },
    /// Run a command in the editor's terminal
    RunCommand { command: String },
    /// Query workspace state
    QueryWorkspace { query: String },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List recent actions
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Remove everything
    Clear,
    /// Remove delivered and fallback-copied actions
    ClearCompleted,
    /// Remove one action
    Remove { id: String },
    /// Re-send a failed or fallback-copied action
    Retry { id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Logs,
    StickyNotes,
    Manual,
}

impl From<SourceArg> for ActionSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Logs => ActionSource::Logs,
            SourceArg::StickyNotes => ActionSource::StickyNotes,
            SourceArg::Manual => ActionSource::Manual,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The TUI owns the screen; only non-TUI paths get log output
    let tui_mode = matches!(&cli.command, Command::Watch { plain: false });
    if !tui_mode {
        let filter = if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
        };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let home = match cli.home {
        Some(home) => home,
        None => config::deskhook_home()?,
    };
    let mut config = config::load(home).await?;
    if let Some(url) = cli.webhook_url {
        config.webhook_url = url;
    }

    match cli.command {
        Command::Send {
            prompt,
            context,
            source,
            action_type,
            wait,
        } => run_send(&config, prompt, context, source, action_type, wait).await,
        Command::Health => run_health(&config).await,
        Command::Queue => run_queue(&config).await,
        Command::Status { request_id, wait } => run_status(&config, &request_id, wait).await,
        Command::Action { command } => run_action(&config, command).await,
        Command::Test => run_test(&config).await,
        Command::History { command } => run_history(&config, command).await,
        Command::Watch { plain } => {
            if plain {
                run_watch_plain(&config).await
            } else {
                run_watch_tui(&config).await
            }
        }
    }
}

async fn open_store(config: &DeskhookConfig) -> anyhow::Result<Arc<RwLock<ActionStore>>> {
    let store = ActionStore::new(config.history_file(), config.history_capacity)
        .await
        .context("could not open the action history")?;
    Ok(Arc::new(RwLock::new(store)))
}

async fn run_send(
    config: &DeskhookConfig,
    prompt: Vec<String>,
    context: Option<PathBuf>,
    source: SourceArg,
    action_type: String,
    wait: bool,
) -> anyhow::Result<()> {
    let prompt_text = if prompt.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("could not read prompt from stdin")?;
        buf.trim().to_string()
    } else {
        prompt.join(" ")
    };
    if prompt_text.is_empty() {
        anyhow::bail!("empty prompt");
    }

    let context_text = match context {
        Some(path) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("could not read context from stdin")?;
            Some(buf)
        }
        Some(path) => Some(
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("could not read context file {}", path.display()))?,
        ),
        None => None,
    };

    let store = open_store(config).await?;
    let dispatcher = Dispatcher::new(WebhookClient::new(config), store);

    let submission = PromptSubmission::new(prompt_text)
        .with_context(context_text)
        .with_source(source.into())
        .with_action_type(action_type);

    let outcome = dispatcher.send(submission).await?;
    report_outcome(&outcome);

    if wait {
        if let DeliveryOutcome::Delivered { action, .. } = &outcome {
            follow(&dispatcher, &action.id).await?;
        }
    }
    Ok(())
}

fn report_outcome(outcome: &DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Delivered { action, result } => {
            if result.is_queued() {
                let position = result
                    .queue_position
                    .map(|p| format!(" at position {}", p))
                    .unwrap_or_default();
                println!("Queued{} (request {})", position, display_request_id(result));
            } else {
                println!("Sent to the editor (request {})", display_request_id(result));
            }
            println!("Tracked as action {}", action.id);
        }
        DeliveryOutcome::CopiedToClipboard {
            reason,
            suggestions,
            ..
        } => {
            println!("Could not deliver: {}", reason);
            println!("The full prompt is on your clipboard.");
            for suggestion in suggestions {
                println!("  hint: {}", suggestion);
            }
        }
        DeliveryOutcome::Lost {
            reason,
            clipboard_error,
            ..
        } => {
            eprintln!("Could not deliver: {}", reason);
            eprintln!("Clipboard fallback also failed: {}", clipboard_error);
        }
    }
}

fn display_request_id(result: &SendResult) -> &str {
    result.request_id.as_deref().unwrap_or("unknown")
}

async fn follow(dispatcher: &Dispatcher, action_id: &str) -> anyhow::Result<()> {
    let followed = dispatcher
        .follow(action_id, PollOptions::default(), |status| {
            println!("  status: {}", status);
        })
        .await?;

    match followed {
        Some(outcome) => println!("Finished: {}", outcome.status),
        None => println!("Nothing to follow (no request id)"),
    }
    Ok(())
}

async fn run_health(config: &DeskhookConfig) -> anyhow::Result<()> {
    let client = WebhookClient::new(config);

    match client.get_health().await {
        Some(health) => {
            println!("status:    {:?}", health.status);
            println!("workspace: {}", if health.workspace.ready { "ready" } else { "not ready" });
            println!("chat:      {}", if health.chat.busy { "busy" } else { "idle" });
        }
        None => println!("Extension is not reachable at {}", client.webhook_url()),
    }

    let readiness = client.is_ready().await;
    match (readiness.ready, &readiness.reason) {
        (true, _) if readiness.stuck_detected => {
            println!("ready (busy flag was stale and got overridden)")
        }
        (true, _) => println!("ready"),
        (false, Some(reason)) => println!("not ready: {}", reason),
        (false, None) => println!("not ready"),
    }
    Ok(())
}

async fn run_queue(config: &DeskhookConfig) -> anyhow::Result<()> {
    let client = WebhookClient::new(config);

    match client.get_queue_status().await {
        Some(queue) => {
            println!(
                "processing: {}",
                if queue.is_processing { "yes" } else { "no" }
            );
            if let Some(current) = &queue.current_task_id {
                println!("current:    {}", current);
            }
            println!("queued:     {}", queue.queue_length);
            for (i, task) in queue.pending_tasks.iter().enumerate() {
                println!("  {}. {}", i + 1, task);
            }
        }
        None => println!("Extension is not reachable at {}", client.webhook_url()),
    }
    Ok(())
}

async fn run_status(config: &DeskhookConfig, request_id: &str, wait: bool) -> anyhow::Result<()> {
    let client = WebhookClient::new(config);

    if wait {
        let outcome = client
            .poll_for_completion(request_id, PollOptions::default(), |status| {
                println!("  status: {}", status);
            })
            .await;
        println!("Finished: {}", outcome.status);
        if let Some(error) = outcome.error {
            println!("  {}", error);
        }
        return Ok(());
    }

    match client.get_request_status(request_id).await {
        StatusProbe::Status(status) => {
            println!("status: {}", status.status);
            if let Some(message) = status.message {
                println!("  {}", message);
            }
            if let Some(error) = status.error {
                println!("  error: {}", error);
            }
        }
        StatusProbe::NotFound => {
            println!("Request not found; the extension may have restarted");
        }
        StatusProbe::Unreachable(detail) => {
            println!("Could not check status: {}", detail);
        }
    }
    Ok(())
}

async fn run_action(config: &DeskhookConfig, command: ActionCommand) -> anyhow::Result<()> {
    use deskhook::webhook::{WebhookAction, WebhookPayload};

    let payload = match command {
        ActionCommand::ExecuteTask { task } => {
            WebhookPayload::new(WebhookAction::ExecuteTask).with_task(task)
        }
        ActionCommand::CopilotChat { prompt } => {
            WebhookPayload::new(WebhookAction::CopilotChat).with_prompt(prompt)
        }
        ActionCommand::CreateFile { file_path, content } => {
            let content = match content {
                Some(content) => content,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("could not read file content from stdin")?;
                    buf
                }
            };
            WebhookPayload::new(WebhookAction::CreateFile)
                .with_file_path(file_path)
                .with_content(content)
        }
        ActionCommand::ModifyFile { file_path, prompt } => {
            WebhookPayload::new(WebhookAction::ModifyFile)
                .with_file_path(file_path)
                .with_prompt(prompt)
        }
        ActionCommand::RunCommand { command } => {
            WebhookPayload::new(WebhookAction::RunCommand).with_command(command)
        }
        ActionCommand::QueryWorkspace { query } => {
            WebhookPayload::new(WebhookAction::QueryWorkspace).with_query(query)
        }
    };

    let result = WebhookClient::new(config).send_webhook(&payload).await;
    if result.success {
        println!("Accepted (request {})", display_request_id(&result));
        if let Some(message) = result.message {
            println!("  {}", message);
        }
    } else {
        println!(
            "Action failed: {}",
            result
                .message
                .clone()
                .or(result.error.clone())
                .unwrap_or_default()
        );
        for suggestion in &result.suggestions {
            println!("  hint: {}", suggestion);
        }
    }
    Ok(())
}

async fn run_test(config: &DeskhookConfig) -> anyhow::Result<()> {
    let client = WebhookClient::new(config);
    let result = client.test_connection().await;

    if result.success {
        println!("Extension answered at {}", client.webhook_url());
        if let Some(message) = result.message {
            println!("  {}", message);
        }
    } else {
        println!(
            "Test failed: {}",
            result.message.or(result.error).unwrap_or_default()
        );
    }
    Ok(())
}

async fn run_history(config: &DeskhookConfig, command: HistoryCommand) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    match command {
        HistoryCommand::List { limit } => {
            let store = store.read().await;
            let actions = store.recent_actions(limit);
            if actions.is_empty() {
                println!("No actions recorded");
                return Ok(());
            }
            for action in actions {
                println!(
                    "{}  {}  [{}] {} - {}",
                    action.created_at.format("%Y-%m-%d %H:%M:%S"),
                    action.id,
                    action.source,
                    action.status,
                    action.preview
                );
                if let Some(error) = &action.error {
                    println!("    error: {}", error);
                }
            }
        }
        HistoryCommand::Clear => {
            store.write().await.clear_all().await?;
            println!("History cleared");
        }
        HistoryCommand::ClearCompleted => {
            let removed = store.write().await.clear_completed().await?;
            println!("Removed {} completed action(s)", removed);
        }
        HistoryCommand::Remove { id } => {
            if store.write().await.remove_action(&id).await? {
                println!("Removed {}", id);
            } else {
                println!("No action {}", id);
            }
        }
        HistoryCommand::Retry { id } => {
            let dispatcher = Dispatcher::new(WebhookClient::new(config), store);
            match dispatcher.retry(&id).await? {
                Some(outcome) => report_outcome(&outcome),
                None => println!("Cannot retry {} (unknown id or still in flight)", id),
            }
        }
    }
    Ok(())
}

async fn run_watch_plain(config: &DeskhookConfig) -> anyhow::Result<()> {
    let (handle, mut events) = TerminalStream::new(config).connect();
    handle.list().await?;
    handle.subscribe_all().await?;

    println!("Watching terminal streams at {} (Ctrl+C to stop)", config.terminal_ws_url);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(StreamEvent::StateChanged(state)) => {
                    eprintln!("[stream {}]", state);
                }
                Some(StreamEvent::Message(msg)) => print_stream_message(&msg),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    Ok(())
}

fn print_stream_message(msg: &deskhook::terminal::ServerMessage) {
    use deskhook::terminal::ServerMessage;

    match msg {
        ServerMessage::Terminals { terminals } => {
            eprintln!("[{} terminal(s)]", terminals.len());
        }
        ServerMessage::Output { id, data } => {
            for line in data.lines() {
                println!("{}: {}", id, line);
            }
        }
        ServerMessage::TerminalOpened { id, .. } => eprintln!("[opened {}]", id),
        ServerMessage::TerminalClosed { id } => eprintln!("[closed {}]", id),
        ServerMessage::TerminalCreated { id, .. } => eprintln!("[created {}]", id),
        ServerMessage::Subscribed { id } => eprintln!("[subscribed {}]", id),
        ServerMessage::Unsubscribed { id } => eprintln!("[unsubscribed {}]", id),
        ServerMessage::Error { message } => eprintln!("[stream error: {}]", message),
    }
}

async fn run_watch_tui(config: &DeskhookConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let client = WebhookClient::new(config);
    let mut app = WatchApp::new(config, client, store)?;
    app.run().await?;
    Ok(())
}
