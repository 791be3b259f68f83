use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use herald_core::config::Config;
use herald_core::core_event::{EventTemplate, KIND_NOTE};
use herald_core::core_group::{init_group, GroupMetadata, GroupVisibility};
use herald_core::core_identity::Keypair;
use herald_core::core_publish::PublishOptions;
use herald_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use herald_core::test_utils::{MockSigner, StaticRelaySelector, TestNetwork};
use herald_core::Herald;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides `[logging]`
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging; overrides `[logging]`
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a keypair and print it as JSON
    Keygen,

    /// Generate keys and an address for a new group
    InitGroup {
        #[arg(value_enum, default_value_t = Visibility::Private)]
        visibility: Visibility,

        /// Relays to advertise for the group
        #[arg(long = "relay")]
        relays: Vec<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Create a group and publish to it against in-memory relays
    Demo {
        /// Note content
        #[arg(default_value = "Hello from Herald!")]
        message: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the default configuration as TOML
    Default,

    /// Validate a configuration file
    Check { path: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Visibility {
    Public,
    Private,
}

impl From<Visibility> for GroupVisibility {
    fn from(v: Visibility) -> Self {
        match v {
            Visibility::Public => GroupVisibility::Public,
            Visibility::Private => GroupVisibility::Private,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::from_env().context("reading configuration from environment")?,
    };
    init_logging_with_config(log_config(&args, &config)?)?;
    info!(config = ?args.config, "Configuration loaded");

    match args.command {
        Some(Command::Keygen) => {
            let keypair = Keypair::generate();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "public_key": &keypair.public_key,
                    "secret_key": keypair.secret_hex(),
                }))?
            );
        }
        Some(Command::InitGroup { visibility, relays }) => {
            let group = init_group(visibility.into(), relays)?;
            let mut out = json!({
                "address": group.address.to_string(),
                "admin_public_key": &group.admin.keypair.public_key,
                "admin_secret_key": group.admin.keypair.secret_hex(),
                "relays": &group.admin.relays,
            });
            if let Some(shared) = &group.shared {
                out["shared_public_key"] = json!(&shared.keypair.public_key);
                out["shared_secret_key"] = json!(shared.keypair.secret_hex());
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Some(Command::Config { action: ConfigAction::Default }) => {
            print!("{}", Config::default().to_toml_string()?);
        }
        Some(Command::Config { action: ConfigAction::Check { path } }) => {
            load_config(&path)?;
            println!("{}: ok", path.display());
        }
        Some(Command::Demo { message }) => demo(config, &message).await?,
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_file(path).with_context(|| format!("loading {}", path.display()))?;
    config.validate().with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

/// Subscriber settings: the `[logging]` section, then command-line overrides
fn log_config(args: &Args, config: &Config) -> Result<LogConfig> {
    let mut log = LogConfig::try_from(&config.logging).context("reading [logging]")?;
    if let Some(level) = &args.log_level {
        log.level = level.parse::<LogLevel>().context("parsing --log-level")?;
    }
    if args.json_logs {
        log = log.json_format(true);
    }
    Ok(log)
}

async fn demo(config: Config, message: &str) -> Result<()> {
    let net = TestNetwork::new(MockSigner::new(), StaticRelaySelector::new().with_write(&["wss://demo.write"]));
    let herald = Herald::new(config, net.collaborators());

    let metadata = GroupMetadata { name: "demo".to_string(), ..Default::default() };
    let created = herald
        .groups()
        .create_group(GroupVisibility::Private, metadata, vec!["wss://demo.group".to_string()])
        .await?;
    info!(address = %created.address, "Group created");

    let result = herald
        .publisher()
        .publish_to_zero_or_more_groups(
            &[created.address.clone()],
            EventTemplate::new(KIND_NOTE, message, vec![]),
            PublishOptions::default(),
        )
        .await?;

    for rejection in &result.rejections {
        warn!(error = %rejection.error, "Branch rejected");
    }
    if result.events.is_empty() {
        bail!("nothing was published");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "group": created.address.to_string(),
            "events": result.events.len(),
            "relay_acks": result.accepted_count(),
            "published_kinds": net
                .publisher
                .published_kinds()
                .iter()
                .map(|k| k.as_u16())
                .collect::<Vec<_>>(),
        }))?
    );
    Ok(())
}
