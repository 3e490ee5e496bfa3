use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use jump_executive::{Executive, ExecutiveConfig, ExecutiveError, Result, StoreConfig};
use jump_isolate::{Application, ContainerKind};
use jump_push_registry::{ConnectionInfo, SuiteId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JUMP executive - application lifecycle and push registry
#[derive(Parser, Debug)]
#[command(name = "jump-executive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "JUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Content store directory, overriding the configuration
    #[arg(long, env = "JUMP_STORE_DIR")]
    store_dir: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, env = "JUMP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log as JSON
    #[arg(long, env = "JUMP_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an application and drive it through its lifecycle
    Run {
        /// Entry class of the application
        #[arg(long, default_value = "demo.Hello")]
        class: String,

        #[arg(long, default_value_t = 1)]
        suite: u32,

        /// single or multi
        #[arg(long)]
        container: Option<ContainerKind>,

        /// Start arguments
        args: Vec<String>,
    },

    /// Manage push registrations
    Push {
        #[command(subcommand)]
        command: PushCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PushCommand {
    /// Register a push connection
    Register {
        #[arg(long)]
        suite: u32,
        #[arg(long)]
        connection: String,
        #[arg(long)]
        midlet: String,
        #[arg(long, default_value = "*")]
        filter: String,
    },

    /// Remove a push connection
    Unregister {
        #[arg(long)]
        suite: u32,
        #[arg(long)]
        connection: String,
    },

    /// List a suite's push connections
    List {
        #[arg(long)]
        suite: u32,
        /// Only connections with data waiting
        #[arg(long)]
        available: bool,
    },

    /// Schedule a launch
    Alarm {
        #[arg(long)]
        suite: u32,
        #[arg(long)]
        midlet: String,
        /// Seconds from now
        #[arg(long)]
        in_secs: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ExecutiveConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.store_dir {
        config.store = StoreConfig::Local { path };
    }
    let executive = Executive::boot(config)?;

    let outcome = match cli.command {
        Command::Run {
            class,
            suite,
            container,
            args,
        } => run_app(&executive, Application::new(suite, class), args, container).await,
        Command::Push { command } => push(&executive, command),
    };
    executive.shutdown().await;
    outcome
}

async fn run_app(
    executive: &Executive,
    app: Application,
    args: Vec<String>,
    container: Option<ContainerKind>,
) -> Result<()> {
    let (isolate, app_id) = executive.launch(app.clone(), args, container).await?;
    println!("started {app} as app {app_id} in isolate {isolate}");
    println!(
        "windows: {:?}",
        executive
            .get_app_windows(isolate, app_id)
            .iter()
            .map(|w| w.as_u64())
            .collect::<Vec<_>>()
    );

    let client = executive.lifecycle().client();
    println!("pause   -> {}", client.pause_app(isolate, app_id).await?);
    println!("resume  -> {}", client.resume_app(isolate, app_id).await?);
    println!("destroy -> {}", client.destroy_app(isolate, app_id, false).await?);

    if let Some(state) = executive.lifecycle().isolate_state(isolate) {
        println!("isolate {isolate} is {state}");
    }
    Ok(())
}

fn push(executive: &Executive, command: PushCommand) -> Result<()> {
    let connections = executive.push().connections()?;
    match command {
        PushCommand::Register {
            suite,
            connection,
            midlet,
            filter,
        } => {
            let info = ConnectionInfo::new(connection.clone(), midlet, filter);
            if connections.register_connection(SuiteId::new(suite), info)? {
                println!("registered {connection}");
            } else {
                println!("could not persist {connection}");
            }
        }
        PushCommand::Unregister { suite, connection } => {
            if connections.unregister_connection(SuiteId::new(suite), &connection) {
                println!("unregistered {connection}");
            } else {
                println!("{connection} was not registered");
            }
        }
        PushCommand::List { suite, available } => {
            let suite = SuiteId::new(suite);
            for connection in connections.list_connections(suite, available) {
                let midlet = connections.get_midlet(suite, &connection).unwrap_or_default();
                let filter = connections.get_filter(suite, &connection).unwrap_or_default();
                println!("{connection}\t{midlet}\t{filter}");
            }
        }
        PushCommand::Alarm {
            suite,
            midlet,
            in_secs,
        } => {
            let time = TimeDelta::try_seconds(in_secs)
                .and_then(|delta| Utc::now().checked_add_signed(delta))
                .ok_or_else(|| ExecutiveError::Config(format!("{in_secs}s is out of range")))?;
            let previous = executive
                .push()
                .alarms()?
                .register_alarm(SuiteId::new(suite), &midlet, time)?;
            match previous {
                Some(previous) => println!("alarm for {midlet} moved from {previous} to {time}"),
                None => println!("alarm for {midlet} set for {time}"),
            }
        }
    }
    Ok(())
}
