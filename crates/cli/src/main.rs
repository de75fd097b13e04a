mod config_commands;
mod login_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    hostex_config::BridgeConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hostex-bridge", about = "Hostex guest messaging bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, global = true, env = "HOSTEX_BRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured login until Ctrl-C (default).
    Run,
    /// Run one sync cycle and print the resulting events as JSON lines.
    Sync {
        /// Only this login (default: all configured logins).
        #[arg(long)]
        login: Option<String>,
    },
    /// Run a manual trigger (sync, refresh, cleanup-rooms) for all logins.
    Trigger {
        /// Trigger name.
        command: String,
    },
    /// Validate an access token against the Hostex API.
    CheckToken {
        #[arg(long, env = "HOSTEX_ACCESS_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(long, default_value = hostex_connector::client::DEFAULT_API_URL)]
        api_url: String,
    },
    /// Send a message into a conversation.
    ///
    /// The echo of this message is only suppressed inside this process, so a
    /// separately running `run` bridge will deliver the reflection when it
    /// shows up on its next poll.
    Send {
        #[arg(long)]
        login: String,
        #[arg(long)]
        conversation: String,
        #[arg(short, long, default_value = "")]
        message: String,
        /// JPEG image to attach.
        #[arg(long)]
        jpeg: Option<PathBuf>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Initialise tracing. `RUST_LOG` wins over the command line, which wins
/// over the config file.
fn init_telemetry(cli: &Cli, config: &BridgeConfig) {
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs || config.logging.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    match &cli.config {
        Some(path) => Ok(hostex_config::load_config(path)?),
        None => Ok(hostex_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_telemetry(&cli, &config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        network = %config.bridge.network_name,
        "hostex-bridge starting"
    );

    match cli.command {
        None | Some(Commands::Run) => login_commands::run(&config).await,
        Some(Commands::Sync { login }) => login_commands::sync(&config, login.as_deref()).await,
        Some(Commands::Trigger { command }) => login_commands::trigger(&config, &command).await,
        Some(Commands::CheckToken { token, api_url }) => {
            login_commands::check_token(token, &api_url).await
        },
        Some(Commands::Send {
            login,
            conversation,
            message,
            jpeg,
        }) => login_commands::send(&config, &login, &conversation, &message, jpeg.as_deref()).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, &config),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn send_help_mentions_echo_scope() {
        let cmd = Cli::command();
        let send = cmd.find_subcommand("send").unwrap();
        assert!(
            send.get_about()
                .unwrap()
                .to_string()
                .starts_with("Send a message into a conversation")
        );
        let long = send.get_long_about().unwrap().to_string();
        assert!(long.contains("only suppressed inside this process"));
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["hostex-bridge"]).unwrap();
        assert!(cli.command.is_none());
    }
}
