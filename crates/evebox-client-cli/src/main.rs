//! evebox-client - command line access to an EveBox server.
//!
//! Every subcommand maps onto one `ApiClient` call. The session obtained by
//! `login` is kept in the configured session store and reused until the
//! server answers 401.

mod cli;

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{AlertGroupAction, Cli, Command};
use evebox_client_core::models::AlertGroupSpec;
use evebox_client_core::{ApiClient, Config};

/// Initialize the tracing subscriber for logging.
/// Returns the file writer guard, which must live until exit.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_ndjson(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut events = Vec::new();
    for (n, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), n + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not valid JSON", path.display()))
}

async fn alert_group(
    client: &ApiClient,
    action: AlertGroupAction,
    path: &Path,
    comment: Option<String>,
) -> Result<()> {
    let group = read_json(path)?;
    let group_spec = AlertGroupSpec::from_alert_group(&group).with_context(|| {
        format!(
            "{} is not an alert group (needs event._source, minTs and maxTs)",
            path.display()
        )
    })?;
    debug!(signature_id = group_spec.signature_id, action = ?action, "Alert group action");

    match action {
        AlertGroupAction::Archive => {
            client.archive_alert_group(&group_spec).await?;
            eprintln!("Archived alert group {}", group_spec.signature_id);
        }
        AlertGroupAction::Escalate => {
            client.escalate_alert_group(&group_spec).await?;
            eprintln!("Escalated alert group {}", group_spec.signature_id);
        }
        AlertGroupAction::Deescalate => {
            client.deescalate_alert_group(&group_spec).await?;
            eprintln!("De-escalated alert group {}", group_spec.signature_id);
        }
        AlertGroupAction::Comment => {
            let comment = comment.context("A comment is required")?;
            client.comment_on_alert_group(&group_spec, &comment).await?;
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env();
    if let Some(ref server) = cli.server {
        config.server_url = Some(server.clone());
    }
    if let Some(backend) = cli.session_backend {
        config.session_backend = backend.into();
    }
    if cli.insecure {
        config.accept_invalid_certs = true;
    }
    Ok(config)
}

async fn login(
    client: &ApiClient,
    config: &mut Config,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| config.username.clone()) {
        Some(username) => username,
        None => {
            eprint!("Username: ");
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    client
        .login(&username, &password)
        .await
        .context("Login failed")?;

    config.username = Some(username.clone());
    config.save()?;
    eprintln!("Logged in to {} as {}", config.server_url(), username);
    Ok(())
}

/// Check the session and fetch the version concurrently.
async fn status(client: &ApiClient, config: &Config) -> Result<()> {
    let (authenticated, version) = futures::join!(client.check_auth(), client.version());
    println!("server:        {}", config.server_url());
    println!("authenticated: {}", authenticated);
    match version {
        Ok(version) => println!(
            "version:       {} ({})",
            version.version.as_deref().unwrap_or("unknown"),
            version.revision.as_deref().unwrap_or("unknown")
        ),
        Err(e) => println!("version:       unavailable ({})", e),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli)?;
    debug!(server = config.server_url(), backend = ?config.session_backend, "Loaded configuration");

    // Configure only touches the config file, no client needed.
    if let Command::Configure { username, timeout } = &cli.command {
        if username.is_some() {
            config.username = username.clone();
        }
        if timeout.is_some() {
            config.request_timeout_secs = *timeout;
        }
        config.save()?;
        eprintln!("Saved configuration to {}", Config::config_path()?.display());
        return Ok(());
    }

    let pipeline = config.pipeline()?.with_navigator(Arc::new(|| {
        eprintln!("Login required: run `evebox-client login`");
    }));
    let client = ApiClient::new(pipeline);

    match cli.command {
        Command::Configure { .. } => {}
        Command::Login { username, password } => {
            login(&client, &mut config, username, password).await?;
        }
        Command::Logout => {
            client.logout().await.context("Logout failed")?;
            eprintln!("Logged out");
        }
        Command::Status => status(&client, &config).await?,
        Command::Version => {
            let version = client.version().await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        Command::ServerConfig => print_json(&client.update_config().await?)?,
        Command::Get { path, params } => {
            print_json(&client.get_with_params(&path, &params).await?)?
        }
        Command::Post { path, body } => {
            let body: Value = serde_json::from_str(&body).context("Body is not valid JSON")?;
            print_json(&client.post(&path, &body).await?)?
        }
        Command::Options { path } => println!("{}", client.options(&path).await?.text()),
        Command::Alerts(args) => print_json(&client.alert_query(&args.into()).await?)?,
        Command::Events(args) => print_json(&client.event_query(&args.into()).await?)?,
        Command::Histogram(args) => print_json(&client.report_histogram(&args.into()).await?)?,
        Command::Agg(args) => print_json(&client.report_agg(&args.agg, &args.options()).await?)?,
        Command::FlowHistogram(args) => print_json(&client.flow_histogram(&args.into()).await?)?,
        Command::Event { id } => print_json(&client.event(&id).await?)?,
        Command::Archive { id } => {
            client.archive_event(&id).await?;
            eprintln!("Archived {}", id);
        }
        Command::Escalate { id } => {
            client.escalate_event(&id).await?;
            eprintln!("Escalated {}", id);
        }
        Command::Deescalate { id } => {
            client.deescalate_event(&id).await?;
            eprintln!("De-escalated {}", id);
        }
        Command::Comment { id, comment } => {
            client.comment_on_event(&id, &comment).await?;
        }
        Command::AlertGroup {
            action,
            group,
            comment,
        } => alert_group(&client, action, &group, comment).await?,
        Command::Submit { file } => {
            let events = read_ndjson(&file)?;
            let response = client.submit_events(&events).await?;
            eprintln!("Submitted {} events, {} committed", events.len(), response.count);
        }
        Command::Pcap { what, event, output } => {
            let event = read_json(&event)?;
            let pcap = client.event_to_pcap(what.into(), &event).await?;
            std::fs::write(&output, &pcap)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            eprintln!("Wrote {} bytes to {}", pcap.len(), output.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;
    info!("evebox-client starting");

    run(cli).await
}
