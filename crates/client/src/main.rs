//! PressDock CLI
//!
//! Interactive chat against a workspace plus workspace CRUD commands.
//! The heavy lifting lives in the library; this binary is the thin chrome
//! around snapshots and intents.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;

use pressdock::cache::{file_tree_key, LocalCache};
use pressdock::connection::ConnectionConfig;
use pressdock::files::FileMap;
use pressdock::logging::init_logging;
use pressdock::preview;
use pressdock::session::{SessionClient, SessionEvent};
use pressdock::workspaces::WorkspaceApi;
use pressdock_protocol::Sender;

#[derive(Parser)]
#[command(
    name = "pressdock",
    about = "Workspace client for the PressDock WordPress agent",
    version
)]
struct Cli {
    /// WebSocket endpoint of the agent backend
    #[arg(long, env = "PRESSDOCK_URL", default_value = "ws://127.0.0.1:4000")]
    url: String,

    /// HTTP endpoint of the workspace CRUD API
    #[arg(long, env = "PRESSDOCK_API_URL", default_value = "http://127.0.0.1:4000")]
    api_url: String,

    /// Bearer token passed to both endpoints
    #[arg(long, env = "PRESSDOCK_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive chat session against a workspace
    Chat {
        #[arg(long)]
        workspace: String,
    },
    /// Manage workspaces through the CRUD API
    Workspaces {
        #[command(subcommand)]
        action: WorkspacesAction,
    },
}

#[derive(Subcommand)]
enum WorkspacesAction {
    /// List workspaces
    List,
    /// Create a workspace and print its id
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a workspace
    Delete { id: String },
    /// Print the stored conversation for a workspace
    History { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        url,
        api_url,
        token,
        command,
    } = Cli::parse();
    let _logging = init_logging()?;

    match command {
        Commands::Chat { workspace } => run_chat(&url, token, &workspace).await,
        Commands::Workspaces { action } => run_workspaces(&api_url, token, action).await,
    }
}

async fn run_chat(url: &str, token: Option<String>, workspace_id: &str) -> Result<()> {
    let config = ConnectionConfig {
        base_url: url.to_string(),
        token,
        ..Default::default()
    };
    let client = SessionClient::new(config);
    client.connect(workspace_id).await?;
    println!("Connected to workspace {workspace_id}. Type a message, /help for commands.");

    let renderer = spawn_renderer(client.clone());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => client.clear_session(),
            "/reconnect" => client.reconnect(),
            "/status" => {
                let snapshot = client.snapshot();
                println!(
                    "connection: {:?}  processing: {}  messages: {}  files: {}",
                    snapshot.connection,
                    snapshot.is_processing,
                    snapshot.messages.len(),
                    snapshot.files.len()
                );
                if snapshot.streaming.is_streaming {
                    println!(
                        "streaming: {} chunk(s), {} byte(s) so far",
                        snapshot.streaming.chunk_count,
                        snapshot.streaming.content.len()
                    );
                }
            }
            "/files" => {
                for entry in &client.snapshot().files {
                    println!("{:?}\t{}\t({:?})", entry.kind, entry.path, entry.status);
                }
            }
            "/preview" => {
                let snapshot = client.snapshot();
                let files = FileMap::from_entries(snapshot.files.clone());
                let payload = preview::build_payload(&files);
                match payload.plugin_entry {
                    Some(entry) => println!(
                        "preview payload: {} file(s), plugin entry {}",
                        payload.files.len(),
                        entry
                    ),
                    None => println!(
                        "preview payload: {} file(s), no plugin entry detected",
                        payload.files.len()
                    ),
                }
            }
            "/help" => {
                println!("/status /files /preview /clear /reconnect /quit");
            }
            text => {
                client.send_user_message(text);
            }
        }
    }

    // best-effort local copy of the file tree for the next launch
    if let Some(cache) = LocalCache::open_default() {
        let snapshot = client.snapshot();
        cache.put(&file_tree_key(workspace_id), &snapshot.files);
    }

    client.disconnect();
    renderer.abort();
    Ok(())
}

fn spawn_renderer(client: SessionClient) -> tokio::task::JoinHandle<()> {
    let mut events = client.subscribe();
    tokio::spawn(async move {
        let mut printed = 0usize;
        loop {
            match events.recv().await {
                Ok(SessionEvent::Updated { .. }) => {
                    let snapshot = client.snapshot();
                    for message in snapshot.messages.iter().skip(printed) {
                        let who = match message.sender {
                            Sender::User => "you",
                            Sender::Assistant => "agent",
                            Sender::System => "system",
                        };
                        println!("[{who}] {}", message.content);
                    }
                    printed = snapshot.messages.len();
                }
                Ok(SessionEvent::OperationTimedOut { operation_id }) => {
                    println!("[system] operation timed out: {operation_id}");
                }
                Ok(SessionEvent::ReconnectFailed) => {
                    println!("[system] connection lost; /reconnect to retry");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn run_workspaces(
    api_url: &str,
    token: Option<String>,
    action: WorkspacesAction,
) -> Result<()> {
    let api = WorkspaceApi::new(api_url, token);
    match action {
        WorkspacesAction::List => {
            for workspace in api.list().await? {
                println!(
                    "{}\t{}\t({} messages)",
                    workspace.id, workspace.name, workspace.message_count
                );
            }
        }
        WorkspacesAction::Create { name, description } => {
            let id = api
                .create(&name, description.as_deref(), serde_json::Value::Null)
                .await?;
            println!("{id}");
        }
        WorkspacesAction::Delete { id } => {
            api.delete(&id).await?;
            println!("deleted {id}");
        }
        WorkspacesAction::History { id } => {
            for message in api.history(&id).await? {
                let who = match message.sender {
                    Sender::User => "you",
                    Sender::Assistant => "agent",
                    Sender::System => "system",
                };
                println!("[{who}] {}", message.content);
            }
        }
    }
    Ok(())
}
