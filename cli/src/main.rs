use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use luxlist::auth::AuthClient;
use luxlist::config::ClientConfig;
use luxlist::error::{ConfigError, FetchError, LoginError, StorageError};
use luxlist::nav::{LOGIN_PATH, MemoryNavigator, Navigator, RouteDecision, guard};
use luxlist::net::fetch::FetchClient;
use luxlist::net::options::{FormPayload, RequestOptions};
use luxlist::pages::login::LoginPage;
use luxlist::ping::LivenessMonitor;
use luxlist::session::auth_state::AuthStore;
use luxlist::session::redirect::PendingRedirect;
use luxlist::session::storage::{FileStore, KeyValueStore, MemoryStore};

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

const AUTH_STATE_FILE: &str = "auth-storage.json";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error("invalid form field `{0}`; expected name=value")]
    InvalidField(String),
    #[error("failed to read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("stdin read failed: {0}")]
    Stdin(std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("unknown command `{0}`; try `help`")]
    UnknownCommand(String),
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
}

#[derive(Parser, Debug)]
#[command(name = "luxlist", about = "Luxlist session client")]
struct Cli {
    #[arg(long, env = "LUXLIST_API_URL")]
    api_url: Option<String>,

    /// Auth state is kept here between runs.
    #[arg(long, env = "LUXLIST_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and print where the client would navigate next.
    Login { name: String },
    /// Sign out. Local state is cleared even if the server is unreachable.
    Logout,
    /// Print the locally stored user, or ask the server with `--remote`.
    Whoami {
        #[arg(long, default_value_t = false)]
        remote: bool,
    },
    /// GET a JSON resource.
    Get {
        path: String,
        /// Skip the session expiry handling.
        #[arg(long, default_value_t = false)]
        no_auth: bool,
    },
    /// POST a multipart form with one file.
    Upload {
        path: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long = "field", help = "Extra text field as name=value")]
        fields: Vec<String>,
    },
    /// Interactive session: navigate, sign in and out, fetch.
    Shell,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = load_config(cli.api_url.as_deref())?;
    config.state_dir = cli.state_dir;

    let nav = Arc::new(MemoryNavigator::default());
    let auth = AuthClient::new(build_client(config, nav.clone())?);

    match cli.command {
        Command::Login { name } => run_login(&auth, &name).await,
        Command::Logout => {
            auth.logout().await;
            println!("signed out");
            Ok(())
        }
        Command::Whoami { remote } => run_whoami(&auth, remote).await,
        Command::Get { path, no_auth } => run_get(auth.fetch(), &path, no_auth).await,
        Command::Upload { path, file, fields } => run_upload(auth.fetch(), &path, &file, &fields).await,
        Command::Shell => run_shell(&auth, &nav).await,
    }
}

/// Environment config with the already-resolved API URL flag taking the place
/// of `LUXLIST_API_URL`.
fn load_config(api_url: Option<&str>) -> Result<ClientConfig, CliError> {
    let config = ClientConfig::from_lookup(|key| match key {
        "LUXLIST_API_URL" => api_url.map(str::to_owned),
        _ => std::env::var(key).ok(),
    })?;
    Ok(config)
}

fn build_client(config: ClientConfig, nav: Arc<MemoryNavigator>) -> Result<FetchClient, CliError> {
    let storage: Arc<dyn KeyValueStore> = match &config.state_dir {
        Some(dir) => Arc::new(FileStore::open(dir.join(AUTH_STATE_FILE))?),
        None => Arc::new(MemoryStore::new()),
    };
    // Pending redirects are per session, never written to disk.
    let redirect = PendingRedirect::in_memory();
    Ok(FetchClient::new(config, nav, AuthStore::new(storage), redirect)?)
}

async fn run_login(auth: &AuthClient, name: &str) -> Result<(), CliError> {
    let success = auth.login(name).await?;
    println!("signed in as {} -> {}", success.user.name, success.target);
    Ok(())
}

async fn run_whoami(auth: &AuthClient, remote: bool) -> Result<(), CliError> {
    let user = if remote { auth.profile().await? } else { auth.fetch().auth().user() };
    match user {
        Some(user) => println!("{}", user.name),
        None => println!("not signed in"),
    }
    Ok(())
}

async fn run_get(fetch: &FetchClient, path: &str, no_auth: bool) -> Result<(), CliError> {
    let json: Value = if no_auth {
        fetch.fetch_without_auth(path, RequestOptions::get()).await?
    } else {
        fetch.fetch_with_auth(path, RequestOptions::get()).await?
    };
    print_json(&json)
}

async fn run_upload(fetch: &FetchClient, path: &str, file: &Path, fields: &[String]) -> Result<(), CliError> {
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|source| CliError::ReadFile { path: file.to_owned(), source })?;
    let file_name = file
        .file_name()
        .map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());

    let mut form = FormPayload::new().file("file", file_name, bytes, None);
    for raw in fields {
        let (name, value) = parse_field(raw)?;
        form = form.text(name, value);
    }

    let json: Value = fetch
        .fetch_with_auth_form(path, RequestOptions::post().form(form))
        .await?;
    print_json(&json)
}

fn parse_field(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(CliError::InvalidField(raw.to_owned())),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

// =============================================================================
// SHELL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Go(String),
    Login(String),
    Logout,
    Whoami,
    Get(String),
    Where,
    Help,
    Quit,
}

fn parse_shell_line(line: &str) -> Result<Option<ShellCommand>, CliError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let arg = |name: &'static str| {
        if rest.is_empty() { Err(CliError::MissingArgument(name)) } else { Ok(rest.to_owned()) }
    };

    let command = match word {
        "go" => ShellCommand::Go(arg("go")?),
        "login" => ShellCommand::Login(arg("login")?),
        "logout" => ShellCommand::Logout,
        "whoami" => ShellCommand::Whoami,
        "get" => ShellCommand::Get(arg("get")?),
        "where" => ShellCommand::Where,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(CliError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(command))
}

async fn run_shell(auth: &AuthClient, nav: &MemoryNavigator) -> Result<(), CliError> {
    let monitor = LivenessMonitor::new(auth.fetch().clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_help();
    while let Some(line) = lines.next_line().await.map_err(CliError::Stdin)? {
        let command = match parse_shell_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if command == ShellCommand::Quit {
            break;
        }
        if let Err(e) = run_shell_command(auth, nav, &monitor, command).await {
            eprintln!("error: {e}");
        }
    }

    monitor.shutdown();
    Ok(())
}

async fn run_shell_command(
    auth: &AuthClient,
    nav: &MemoryNavigator,
    monitor: &LivenessMonitor,
    command: ShellCommand,
) -> Result<(), CliError> {
    match command {
        ShellCommand::Go(url) => {
            navigate(auth, nav, &url);
            if let Some(ping) = monitor.on_route_change(&nav.current_url()) {
                match ping.await {
                    Ok(Ok(())) => {}
                    Ok(Err(FetchError::SessionExpired)) => announce_login_page(nav),
                    Ok(Err(e)) => eprintln!("ping failed: {e}"),
                    Err(e) => eprintln!("ping task failed: {e}"),
                }
            }
            println!("at {}", nav.current_url());
        }
        ShellCommand::Login(name) => {
            let mut page = LoginPage::mount(&nav.current_url());
            page.acknowledge_notice();
            page.form.name = name;
            match page.submit(auth).await {
                Some(success) => println!("signed in as {} -> {}", success.user.name, success.target),
                None => eprintln!("{}", page.form.error.unwrap_or_default()),
            }
        }
        ShellCommand::Logout => {
            auth.logout().await;
            nav.push(LOGIN_PATH);
            println!("signed out");
        }
        ShellCommand::Whoami => run_whoami(auth, false).await?,
        ShellCommand::Get(path) => {
            let result = run_get(auth.fetch(), &path, false).await;
            if matches!(result, Err(CliError::Fetch(FetchError::SessionExpired))) {
                announce_login_page(nav);
            }
            result?;
        }
        ShellCommand::Where => {
            println!("at {}", nav.current_url());
            match auth.fetch().redirect().peek() {
                Some(target) => println!("resume after login: {target}"),
                None => println!("resume after login: /"),
            }
        }
        ShellCommand::Help => print_help(),
        ShellCommand::Quit => {}
    }
    Ok(())
}

fn navigate(auth: &AuthClient, nav: &MemoryNavigator, url: &str) {
    match guard(url, &auth.fetch().auth().get()) {
        RouteDecision::Render(route) => {
            tracing::debug!(?route, "render");
            nav.push(url);
        }
        RouteDecision::RedirectToLogin { from } => {
            println!("{from} needs a signed-in user");
            nav.push(LOGIN_PATH);
        }
    }
}

fn announce_login_page(nav: &MemoryNavigator) {
    if let Some(notice) = LoginPage::mount(&nav.current_url()).notice() {
        println!("{}: {}", notice.title, notice.text);
    }
}

fn print_help() {
    println!("commands: go <url> | login <name> | logout | whoami | get <path> | where | help | quit");
}
