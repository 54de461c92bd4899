//! Clinica command line tool.
//!
//! Drives the session core against a clinic backend: sign in, inspect the
//! session, call authenticated endpoints, validate tenants. Contexts name
//! servers the way kubeconfig does; neither tokens nor passwords are ever
//! written to disk.

mod config;

use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use config::{Config, Context};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinica_session::{
    AccessToken, AuthStatus, GuardDecision, LogoutReason, Navigator, RedirectTarget, Session,
    SessionConfig, UserProfile,
};

#[derive(Parser)]
#[command(name = "clinicactl")]
#[command(version, about = "Clinica Command Line Tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Clinic API base URL (overrides the current context)
    #[arg(long)]
    server_url: Option<String>,

    /// Tenant slug (overrides the current context)
    #[arg(long)]
    tenant: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Context management
    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },
    /// Bootstrap the session and report where it stands
    Status,
    /// Sign in and show the account the server reports
    Login {
        /// Account email
        #[arg(long)]
        email: String,
        /// Account password; falls back to CLINICA_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Perform an authenticated GET and print the response
    ///
    /// Tokens are never persisted, so pass --email to sign in first:
    ///     clinicactl get /patients --email amara@mercy.clinic
    #[command(verbatim_doc_comment)]
    Get {
        /// Request path, e.g. /patients
        path: String,
        /// Sign in with this email before the request
        #[arg(long)]
        email: Option<String>,
        /// Account password; falls back to CLINICA_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// End the current session on the server
    Logout,
    /// Tenant utilities
    Tenant {
        #[command(subcommand)]
        command: TenantCommand,
    },
}

#[derive(Subcommand)]
enum ContextCommand {
    /// Add a new context for connecting to a clinic server
    /// Examples:
    ///     clinicactl context add local --server-url=http://localhost:8080
    ///     clinicactl context add prod --server-url=https://api.clinica.example --tenant=mercy --set-current
    #[command(verbatim_doc_comment)]
    Add {
        /// Context name
        name: String,
        /// Server URL (e.g., http://localhost:8080)
        #[arg(long)]
        server_url: String,
        /// Tenant slug this context is scoped to
        #[arg(long)]
        tenant: Option<String>,
        /// Set as current context
        #[arg(long)]
        set_current: bool,
    },
    /// List all configured contexts
    /// Example:
    ///     clinicactl context list
    #[command(verbatim_doc_comment)]
    List,
    /// Switch to a different context
    /// Examples:
    ///     clinicactl context use local
    ///     clinicactl context use prod
    #[command(verbatim_doc_comment)]
    Use {
        /// Context name to switch to
        name: String,
    },
    /// Delete a context
    /// Example:
    ///     clinicactl context delete old-env
    #[command(verbatim_doc_comment)]
    Delete {
        /// Context name to delete
        name: String,
    },
    /// Show current active context
    /// Example:
    ///     clinicactl context current
    #[command(verbatim_doc_comment)]
    Current,
}

#[derive(Subcommand)]
enum TenantCommand {
    /// Check whether a tenant slug is registered
    Validate {
        /// Tenant slug, e.g. mercy
        slug: String,
    },
}

/// The CLI's navigator: where a frontend would route, we print.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, target: RedirectTarget) {
        println!("-> {}", target.as_path());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,clinica_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    let session_config = resolve_session_config(&config, cli.server_url, cli.tenant);
    tracing::debug!(base_url = %session_config.base_url, tenant = ?session_config.tenant, "resolved session config");

    match cli.command {
        Commands::Context { command } => handle_context_command(&mut config, command),
        Commands::Status => cmd_status(&session_config).await,
        Commands::Login { email, password } => cmd_login(&session_config, &email, password).await,
        Commands::Get {
            path,
            email,
            password,
        } => cmd_get(&session_config, &path, email, password).await,
        Commands::Logout => cmd_logout(&session_config).await,
        Commands::Tenant { command } => match command {
            TenantCommand::Validate { slug } => cmd_validate_tenant(&session_config, &slug).await,
        },
    }
}

/// Precedence: flags, then the current context, then environment defaults.
fn resolve_session_config(
    config: &Config,
    server_url: Option<String>,
    tenant: Option<String>,
) -> SessionConfig {
    let mut session_config = SessionConfig::from_env();
    if let Some((_, ctx)) = config.get_current_context() {
        session_config.base_url = ctx.server_url.trim_end_matches('/').to_string();
        if ctx.tenant.is_some() {
            session_config.tenant = ctx.tenant.clone();
        }
    }
    if let Some(url) = server_url {
        session_config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(tenant) = tenant {
        session_config.tenant = Some(tenant);
    }
    session_config
}

fn build_session(config: &SessionConfig) -> Result<Session> {
    Session::new(config.clone(), Arc::new(PrintNavigator)).context("failed to build session")
}

fn handle_context_command(config: &mut Config, command: ContextCommand) -> Result<()> {
    match command {
        ContextCommand::Add {
            name,
            server_url,
            tenant,
            set_current,
        } => {
            config
                .contexts
                .insert(name.clone(), Context::new(server_url, tenant));
            if set_current || config.current_context.is_none() {
                config.current_context = Some(name.clone());
            }
            config.save()?;
            println!("Context '{}' added.", name);
            if config.current_context.as_ref() == Some(&name) {
                println!("Context '{}' is now the current context.", name);
            }
        }
        ContextCommand::List => {
            println!("  {:<20} {:<30} {:<15}", "NAME", "SERVER URL", "TENANT");
            for (name, ctx) in &config.contexts {
                let current_mark = if config.current_context.as_ref() == Some(name) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<20} {:<30} {:<15}",
                    current_mark,
                    name,
                    ctx.server_url,
                    ctx.tenant.as_deref().unwrap_or("-")
                );
            }
        }
        ContextCommand::Use { name } => {
            if config.contexts.contains_key(&name) {
                config.current_context = Some(name.clone());
                config.save()?;
                println!("Switched to context '{}'.", name);
            } else {
                eprintln!("Context '{}' not found.", name);
                std::process::exit(1);
            }
        }
        ContextCommand::Delete { name } => {
            if config.contexts.remove(&name).is_some() {
                if config.current_context.as_ref() == Some(&name) {
                    config.current_context = None;
                }
                config.save()?;
                println!("Context '{}' deleted.", name);
            } else {
                eprintln!("Context '{}' not found.", name);
                std::process::exit(1);
            }
        }
        ContextCommand::Current => {
            if let Some((name, ctx)) = config.get_current_context() {
                println!("Current context: {} ({})", name, ctx.server_url);
                if let Some(tenant) = &ctx.tenant {
                    println!("Tenant: {}", tenant);
                }
            } else {
                println!("No current context set.");
            }
        }
    }
    Ok(())
}

async fn cmd_status(config: &SessionConfig) -> Result<()> {
    let session = build_session(config)?;
    match session.bootstrap().await {
        AuthStatus::Authenticated => {
            println!("Status: authenticated");
            if let Some(user) = session.store().user() {
                println!("Signed in as {} <{}>", user.name, user.email);
                if let Some(role) = user.role {
                    println!("Role: {}", role);
                }
            }
        }
        AuthStatus::Unauthenticated => println!("Status: unauthenticated"),
        AuthStatus::Unknown => println!("Status: unknown"),
    }
    Ok(())
}

async fn cmd_login(config: &SessionConfig, email: &str, password: Option<String>) -> Result<()> {
    let password = require_password(password)?;
    let session = build_session(config)?;
    let user = sign_in(&session, email, &password).await?;
    println!("Signed in as {} <{}>", user.name, user.email);
    Ok(())
}

async fn cmd_get(
    config: &SessionConfig,
    path: &str,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let session = build_session(config)?;
    if let Some(email) = email {
        let password = require_password(password)?;
        sign_in(&session, &email, &password).await?;
    } else if session.bootstrap().await != AuthStatus::Authenticated {
        anyhow::bail!("not signed in; pass --email (tokens are never persisted between runs)");
    }

    let response = session.client().get(path).await.context("request failed")?;
    match response.json::<serde_json::Value>() {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

async fn cmd_logout(config: &SessionConfig) -> Result<()> {
    let session = build_session(config)?;
    session.bootstrap().await;
    session.logout(LogoutReason::UserRequested).await;
    println!("Signed out");
    Ok(())
}

async fn cmd_validate_tenant(config: &SessionConfig, slug: &str) -> Result<()> {
    let session = build_session(config)?;
    match session.resolve_tenant(&format!("/{}", slug)).await {
        GuardDecision::Render => println!("Tenant '{}' is valid", slug),
        _ => println!("Tenant '{}' is not registered", slug),
    }
    Ok(())
}

fn require_password(password: Option<String>) -> Result<String> {
    password
        .or_else(|| std::env::var("CLINICA_PASSWORD").ok())
        .context("password required: pass --password or set CLINICA_PASSWORD")
}

async fn sign_in(session: &Session, email: &str, password: &str) -> Result<UserProfile> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LoginReply {
        access_token: String,
        #[serde(default)]
        user: Option<UserProfile>,
    }

    let response = session
        .client()
        .post(
            "/auth/login",
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await
        .context("login request failed")?;
    let reply: LoginReply = response.json().context("malformed login response")?;

    session
        .store()
        .set_access_token(AccessToken::new(reply.access_token));
    let user = reply.user.unwrap_or_else(|| UserProfile {
        name: email.to_string(),
        email: email.to_string(),
        role: None,
        avatar: None,
    });
    session.store().set_user(user.clone());
    Ok(user)
}
