//! sessiongate - check requests against the configured authentication mode,
//! and log users in and out of sessions.
//!
//! Configuration comes from the environment (or a `.env` file):
//! `AUTH_MODE`, `SESSION_NAME`, `SESSION_DURATION`, `SESSION_STORE_PATH`.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessiongate_core::password::hash_password;
use sessiongate_core::{
    build_provider, login, AuthConfig, AuthMode, AuthProvider, AuthRequest, ExcludedPaths,
    InMemoryUserDirectory, RequestGate, DEFAULT_EXCLUDED_PATHS,
};

/// Log file name inside `SESSIONGATE_LOG_DIR`
const LOG_FILE_NAME: &str = "sessiongate.log";

#[derive(Parser)]
#[command(name = "sessiongate", version, about = "Request authentication and session tool")]
struct Cli {
    /// JSON array of users to authenticate against
    #[arg(long, global = true, env = "SESSIONGATE_USERS")]
    users: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one request through the gate
    Check {
        #[arg(long)]
        path: String,
        /// Authorization header value
        #[arg(long)]
        authorization: Option<String>,
        /// Cookie as NAME=VALUE (repeatable)
        #[arg(long = "cookie")]
        cookies: Vec<String>,
        /// Extra excluded path patterns (defaults are always included)
        #[arg(long = "exclude")]
        excluded: Vec<String>,
    },
    /// Prompt for a password and open a session
    Login {
        #[arg(long)]
        email: String,
    },
    /// Destroy a session
    Logout {
        #[arg(long)]
        token: String,
    },
    /// Prompt for a password and print its hash for the users file
    HashPassword,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os("SESSIONGATE_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let cli = Cli::parse();
    let config = AuthConfig::from_env().context("Invalid authentication configuration")?;
    info!(mode = %config.mode, "sessiongate starting");

    match cli.command {
        Command::Check {
            path,
            authorization,
            cookies,
            excluded,
        } => check(&config, cli.users.as_deref(), path, authorization, &cookies, &excluded),
        Command::Login { email } => login_interactive(&config, cli.users.as_deref(), &email),
        Command::Logout { token } => logout(&config, cli.users.as_deref(), &token),
        Command::HashPassword => {
            let password = rpassword::prompt_password("Password: ")?;
            if password.is_empty() {
                bail!("Password cannot be empty");
            }
            println!("{}", hash_password(&password)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_users(path: Option<&Path>) -> Result<Arc<InMemoryUserDirectory>> {
    match path {
        Some(path) => Ok(Arc::new(InMemoryUserDirectory::load_json(path)?)),
        None => {
            warn!("No users file given, every credential will be rejected");
            Ok(Arc::new(InMemoryUserDirectory::new()))
        }
    }
}

fn check(
    config: &AuthConfig,
    users_path: Option<&Path>,
    path: String,
    authorization: Option<String>,
    cookies: &[String],
    extra_excluded: &[String],
) -> Result<ExitCode> {
    let provider = build_provider(config, load_users(users_path)?)?;

    let mut patterns: Vec<&str> = DEFAULT_EXCLUDED_PATHS.to_vec();
    patterns.extend(extra_excluded.iter().map(String::as_str));
    let gate = RequestGate::new(provider, ExcludedPaths::new(&patterns));

    let mut request = AuthRequest::new(path);
    request.authorization = authorization;
    for cookie in cookies {
        let (name, value) = cookie
            .split_once('=')
            .with_context(|| format!("Cookie must be NAME=VALUE, got {:?}", cookie))?;
        request = request.with_cookie(name.trim(), value.trim());
    }

    match gate.authorize(&mut request) {
        Ok(()) => {
            match request.current_user {
                Some(user) => println!("200 allowed: {} ({})", user.display_name(), user.id),
                None => println!("200 allowed"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(rejection) => {
            println!("{} {}", rejection.status(), rejection.body());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn login_interactive(config: &AuthConfig, users_path: Option<&Path>, email: &str) -> Result<ExitCode> {
    if !config.mode.uses_sessions() {
        bail!("AUTH_MODE {} does not use sessions", config.mode);
    }
    if config.mode != AuthMode::SessionDb {
        warn!(mode = %config.mode, "Session will not outlive this process");
    }

    let users = load_users(users_path)?;
    let provider = build_provider(config, users.clone())?;
    let password = rpassword::prompt_password("Password: ")?;

    match login(&*provider, &*users, email, &password) {
        Some((user, token)) => {
            let cookie_name = config.session_cookie_name.as_deref().unwrap_or_default();
            println!("Logged in as {}", user.display_name());
            println!("Set-Cookie: {}={}", cookie_name, token);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("Login failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn logout(config: &AuthConfig, users_path: Option<&Path>, token: &str) -> Result<ExitCode> {
    let cookie_name = config
        .session_cookie_name
        .as_deref()
        .with_context(|| format!("AUTH_MODE {} does not use sessions", config.mode))?;
    let provider = build_provider(config, load_users(users_path)?)?;

    let request = AuthRequest::new("/").with_cookie(cookie_name, token);
    if provider.destroy_session(&request) {
        println!("Session destroyed");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("No such session");
        Ok(ExitCode::FAILURE)
    }
}
