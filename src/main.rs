use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use staticlease::{
    Config, DhcpPacket, Family, HardwareAddr, LookupKey, MessageType, Plugin, ReloadEvent,
    Result, StaticFile, loader,
};

#[derive(Parser)]
#[command(name = "staticlease")]
#[command(author, version, about = "Static DHCP leases from a text file", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a lease file and report how many leases it holds
    Check {
        file: PathBuf,
        #[arg(long)]
        v6: bool,
    },
    /// Look up one identity in a lease file
    Lookup {
        file: PathBuf,
        #[arg(long)]
        v6: bool,
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Serve a lease file with automatic reload and log reload events
    Watch {
        file: PathBuf,
        #[arg(long)]
        v6: bool,
        #[arg(long, default_value_t = 100)]
        settle_ms: u64,
        #[arg(long, default_value_t = 250)]
        poll_ms: u64,
    },
    /// Run a raw DHCPv4 request through the plugin and show the binding
    Bind { file: PathBuf, packet: PathBuf },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct KeyArgs {
    #[arg(long)]
    mac: Option<HardwareAddr>,
    #[arg(long)]
    subscriber_id: Option<String>,
    #[arg(long)]
    circuit_id: Option<String>,
    #[arg(long)]
    remote_id: Option<String>,
}

impl KeyArgs {
    fn into_key(self) -> Option<LookupKey> {
        self.mac
            .map(LookupKey::Mac)
            .or_else(|| self.subscriber_id.map(LookupKey::SubscriberId))
            .or_else(|| self.circuit_id.map(|id| LookupKey::CircuitId(id.into_bytes())))
            .or_else(|| self.remote_id.map(|id| LookupKey::RemoteId(id.into_bytes())))
    }
}

fn family(v6: bool) -> Family {
    if v6 { Family::V6 } else { Family::V4 }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {}", error);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Check { file, v6 } => {
            let snapshot = loader::load(&file, family(v6)).await?;
            println!(
                "{}: {} {} lease(s), checked {}",
                file.display(),
                snapshot.len(),
                snapshot.family(),
                snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
            Ok(())
        }
        Commands::Lookup { file, v6, key } => {
            let snapshot = loader::load(&file, family(v6)).await?;
            let Some(key) = key.into_key() else {
                return Ok(());
            };
            match snapshot.get(&key) {
                Some(lease) => println!("{} -> {}", key, lease),
                None => println!("{}: no lease", key),
            }
            Ok(())
        }
        Commands::Watch {
            file,
            v6,
            settle_ms,
            poll_ms,
        } => {
            let config = Config {
                path: file,
                autorefresh: true,
                settle_delay_ms: settle_ms,
                poll_interval_ms: poll_ms,
            };
            let plugin = StaticFile::from_config(family(v6), &config).await?;
            let Some(mut events) = plugin.subscribe() else {
                return Ok(());
            };

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(ReloadEvent::Installed { version, records }) => {
                            println!("installed version {}: {} lease(s)", version, records);
                        }
                        Ok(ReloadEvent::Rejected { error }) => {
                            println!("rejected: {}", error);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Missed {} reload event(s)", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal, stopping...");
                        break;
                    }
                }
            }
            Ok(())
        }
        Commands::Bind { file, packet } => {
            let config = Config {
                path: file,
                ..Config::default()
            };
            let plugin = StaticFile::from_config(Family::V4, &config).await?;
            let data = tokio::fs::read(&packet).await?;
            let request = DhcpPacket::parse(&data)?;

            let reply_type = match request.message_type() {
                Some(MessageType::Request) => MessageType::Ack,
                _ => MessageType::Offer,
            };
            let mut response = DhcpPacket::create_reply(
                &request,
                reply_type,
                std::net::Ipv4Addr::UNSPECIFIED,
                std::net::Ipv4Addr::UNSPECIFIED,
                vec![],
            );
            let flow = plugin.handle4(&request, &mut response);

            println!("client:  {}", request.format_mac());
            println!("yiaddr:  {}", response.yiaddr);
            if let Some(netmask) = response.subnet_mask() {
                println!("netmask: {}", netmask);
            }
            if let Some(routers) = response.routers() {
                for router in routers {
                    println!("router:  {}", router);
                }
            }
            println!("flow:    {:?}", flow);
            Ok(())
        }
    }
}
