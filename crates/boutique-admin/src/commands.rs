use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use boutique_core::auth::{
    decode_key, hash_admin_password, verify_admin_password, FileCookieJar, FileStore, KeyStore,
    SessionSealer,
};
use boutique_core::notify::{send_invoice, Attachment, InvoiceEmail};
use boutique_core::remote::Envelope;
use boutique_core::{
    Config, FunctionsClient, GateEvent, GuardAction, InvokeHooks, Invoker, RemoteError,
    SessionGate, SessionMonitor, SessionVerdict,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "boutique-admin", version, about = "Storefront back-office operator tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Verify the operator password and start an admin session
    Login,
    /// Clear every admin session signal
    Logout,
    /// Run one session check and print the verdict
    Status,
    /// Show whether navigating to PATH is allowed
    Guard { path: String },
    /// Re-check the session periodically and print changes
    Watch {
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
    /// Invoke a storefront function with retry
    Invoke {
        function: String,
        /// JSON request body
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Send an order invoice email
    SendInvoice {
        #[arg(long)]
        order: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        name: Option<String>,
        /// Rendered invoice PDF to attach
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Print an Argon2 hash for `admin_password_hash`
    HashPassword,
    /// Replace the keychain sealing key, invalidating every session
    RotateKey,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Login => login(&config),
        Command::Logout => {
            open_gate(&config)?.logout()?;
            println!("Logged out");
            Ok(())
        }
        Command::Status => {
            print_verdict(&open_gate(&config)?.check());
            Ok(())
        }
        Command::Guard { path } => {
            let gate = open_gate(&config)?;
            match gate.guard(&path) {
                GuardAction::Allow => println!("allow"),
                GuardAction::RedirectToLogin => {
                    println!("redirect -> {}", gate.config().routes.login_path)
                }
            }
            Ok(())
        }
        Command::Watch { seconds } => watch(&config, seconds).await,
        Command::Invoke {
            function,
            payload,
            retries,
        } => invoke(&config, &function, &payload, retries).await,
        Command::SendInvoice {
            order,
            to,
            name,
            pdf,
        } => send(&config, order, to, name, pdf).await,
        Command::HashPassword => {
            let password = rpassword::prompt_password("New admin password: ")?;
            let confirm = rpassword::prompt_password("Repeat password: ")?;
            if password != confirm {
                bail!("Passwords do not match");
            }
            println!("{}", hash_admin_password(&password)?);
            Ok(())
        }
        Command::RotateKey => {
            KeyStore::rotate()?;
            println!("Sealing key rotated; all admin sessions are now invalid");
            Ok(())
        }
    }
}

fn sealing_key(config: &Config) -> Result<[u8; 32]> {
    match config.session_key.as_deref() {
        Some(encoded) => decode_key(encoded).context("Invalid session_key"),
        None => KeyStore::load_or_create(),
    }
}

fn open_gate(config: &Config) -> Result<SessionGate> {
    let sealer = SessionSealer::new(&sealing_key(config)?);
    Ok(SessionGate::new(
        FileCookieJar::new(config.cookie_path()?),
        FileStore::new(config.store_path()?),
        sealer,
        config.gate_config(),
    ))
}

fn functions_client(config: &Config) -> Result<FunctionsClient> {
    let url = config
        .functions_url
        .as_deref()
        .context("functions_url is not configured (set BOUTIQUE_FUNCTIONS_URL)")?;
    let anon_key = config
        .anon_key
        .as_deref()
        .context("anon_key is not configured (set BOUTIQUE_ANON_KEY)")?;
    FunctionsClient::new(url, anon_key)
}

fn print_verdict(verdict: &SessionVerdict) {
    match (verdict.is_authenticated(), verdict.source, verdict.expiry) {
        (true, Some(source), Some(expiry)) => {
            let remaining = (expiry - chrono::Utc::now()).num_minutes().max(0);
            println!("authenticated via {:?} (expires {}, {}m left)", source, expiry, remaining);
        }
        (true, _, _) => println!("authenticated"),
        (false, _, _) => println!("unauthenticated"),
    }
}

fn login(config: &Config) -> Result<()> {
    let hash = config
        .admin_password_hash
        .as_deref()
        .context("admin_password_hash is not configured (run `boutique-admin hash-password`)")?;
    let password = rpassword::prompt_password("Admin password: ")?;
    if !verify_admin_password(hash, &password)? {
        warn!("Rejected admin login attempt");
        bail!("Incorrect password");
    }

    let verdict = open_gate(config)?.establish()?;
    print_verdict(&verdict);
    Ok(())
}

async fn watch(config: &Config, seconds: u64) -> Result<()> {
    let gate = Arc::new(open_gate(config)?);
    let handle = SessionMonitor::new(gate)
        .with_interval(config.check_interval())
        .spawn();
    let mut verdicts = handle.subscribe();
    handle.notify(GateEvent::VisibilityChanged);

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = verdicts.changed() => {
                if changed.is_err() {
                    break;
                }
                let verdict = verdicts.borrow_and_update().clone();
                print_verdict(&verdict);
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

/// Reports invocation progress on stderr.
struct ConsoleHooks;

impl InvokeHooks for ConsoleHooks {
    fn on_start(&self, function: &str) {
        eprintln!("Invoking {}...", function);
    }

    fn on_retry(&self, attempt: u32, delay: Duration, last_error: &RemoteError) {
        eprintln!(
            "  attempt {} failed ({}); retrying in {:.1}s",
            attempt,
            last_error,
            delay.as_secs_f64()
        );
    }

    fn on_final_error(&self, error: &RemoteError) {
        eprintln!("  giving up: {}", error);
    }
}

async fn invoke(
    config: &Config,
    function: &str,
    payload: &str,
    retries: Option<u32>,
) -> Result<()> {
    let payload: Value = serde_json::from_str(payload).context("--payload is not valid JSON")?;
    let mut options = config.invoke_options().with_hooks(Arc::new(ConsoleHooks));
    if let Some(retries) = retries {
        options.retries = retries;
    }

    let invoker = Invoker::new(functions_client(config)?);
    let result = invoker.invoke(function, &payload, &options).await;
    let failed = result.is_err();
    println!("{}", serde_json::to_string_pretty(&Envelope::from(result))?);
    if failed {
        bail!("{} failed", function);
    }
    Ok(())
}

async fn send(
    config: &Config,
    order: String,
    to: String,
    name: Option<String>,
    pdf: Option<PathBuf>,
) -> Result<()> {
    let mut email = InvoiceEmail::new(order, to);
    if let Some(name) = name {
        email = email.with_customer_name(name);
    }
    if let Some(path) = pdf {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read invoice PDF {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("invoice-{}.pdf", email.order_ref));
        email = email.with_attachment(Attachment::pdf(filename, &bytes));
    }

    let invoker = Invoker::new(functions_client(config)?);
    let options = config.invoke_options().with_hooks(Arc::new(ConsoleHooks));
    let receipt = send_invoice(&invoker, &email, &options).await?;
    println!("Invoice for {} sent (email id {})", email.order_ref, receipt.id);
    Ok(())
}
