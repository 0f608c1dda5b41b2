// Filestore probe binary entry point
// Logs in to the configured filestore, proves it is reachable, then prints a
// tree or a link verification report as JSON

use anyhow::{bail, Context, Result};
use clap::Parser;
use filestore::auth::{strategy_for, LoginRequest, StaticKeyPairStore};
use filestore::config::{ProbeConfig, Settings};
use filestore::export_plan::{check_found_links, ExportPlan, FoundFilesystem, FoundLink};
use filestore::models::{AuthKind, FilestoreConfig, UserKeyPair};
use filestore::{process, telemetry, ClientFactory, RemoteClient};
use serde::Serialize;
use std::fs;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "filestore-probe", about = "Check access to a network filestore")]
struct Cli {
    /// Directory holding default.toml and local.toml
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Folder to list, overriding probe.target
    #[arg(long)]
    target: Option<String>,

    /// `byname` or `bydate`, overriding probe.order
    #[arg(long)]
    order: Option<String>,

    /// Verify these paths as export links instead of printing a tree; a trailing `/` marks a folder
    #[arg(long = "verify", num_args = 1..)]
    verify: Vec<String>,
}

#[derive(Serialize)]
struct VerificationReport<'a> {
    plan: &'a ExportPlan,
    summary: filestore::export_plan::VerificationSummary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from_path(&cli.config_dir)
        .with_context(|| format!("Failed to load configuration from {}", cli.config_dir))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;
    telemetry::describe_metrics();
    process::init_process_properties(&settings.filestores.extra_system_properties)?;

    let Some(probe) = settings.probe.clone() else {
        bail!("No [probe] section configured");
    };
    let config = FilestoreConfig::try_from(probe.filestore.clone())
        .context("Probe filestore definition is invalid")?;
    info!(filestore_id = config.id, kind = %config.kind, address = %config.address, "Probing filestore");

    let factory = ClientFactory::new(&settings);
    let mut client = login(&factory, &config, &probe)?;

    let target = cli.target.unwrap_or_else(|| probe.target.clone());
    if let Err(e) = client.try_connect_and_read_target(&target) {
        error!(error = %e, target = %target, "Filestore not reachable");
        client.close_session();
        return Err(e).context("Reachability check failed");
    }

    let output = if cli.verify.is_empty() {
        let order = cli.order.unwrap_or_else(|| probe.order.clone());
        let tree = client
            .create_file_tree(&target, &order, None)
            .context("Failed to build file tree")?;
        serde_json::to_string_pretty(&tree)?
    } else {
        let mut plan = ExportPlan::from_config(&settings.export);
        plan.add_found_filesystem(FoundFilesystem::from_config(&config));
        plan.set_logged_as(config.id, client.username());
        for raw in &cli.verify {
            let link = match raw.strip_suffix('/') {
                Some(folder) if !folder.is_empty() => FoundLink::folder(config.id, folder),
                _ => FoundLink::file(config.id, raw.as_str()),
            };
            let path = link.path.clone();
            plan.add_found_link(config.id, &path, link);
        }
        let summary = check_found_links(&mut plan, config.id, client.as_mut());
        serde_json::to_string_pretty(&VerificationReport {
            plan: &plan,
            summary,
        })?
    };

    client.close_session();
    println!("{}", output);
    Ok(())
}

fn login(
    factory: &ClientFactory,
    config: &FilestoreConfig,
    probe: &ProbeConfig,
) -> Result<Box<dyn RemoteClient>> {
    let store = Arc::new(StaticKeyPairStore::new());
    if config.auth_kind == AuthKind::PublicKey {
        let private_path = probe
            .private_key_path
            .as_deref()
            .context("probe.private_key_path is required for key pair logins")?;
        let private_key = fs::read_to_string(private_path)
            .with_context(|| format!("Failed to read private key {}", private_path))?;
        let public_key = match probe.public_key_path.as_deref() {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read public key {}", path))?,
            None => String::new(),
        };
        store.register(
            probe.username.clone(),
            UserKeyPair {
                public_key: public_key.trim().to_string(),
                private_key,
            },
            probe.passphrase.clone(),
        );
    }

    let mut request = LoginRequest::new(probe.username.clone(), probe.username.clone());
    if let Some(password) = &probe.password {
        request = request.with_password(password.clone());
    }

    let strategy = strategy_for(config.auth_kind, store);
    match strategy.login(factory, config, &request) {
        Ok(client) => Ok(client),
        Err(e) => {
            let code = e.message_code(strategy.as_ref(), config.kind);
            error!(error = %e, code = %code, "Login failed");
            Err(anyhow::Error::new(e).context(format!("Login failed ({})", code)))
        }
    }
}
