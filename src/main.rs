use clap::{Parser, Subcommand};
use gbgate::config::Config;
use gbgate::domain::device::LoggingObserver;
use gbgate::{probe_register, Gateway};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "GB28181 signaling gateway", args_conflicts_with_subcommands = true)]
struct Args {
    /// Also append log output to the configured log file
    #[arg(long)]
    log_file: bool,

    /// TOML configuration file
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one REGISTER to a GB28181 server and print its answer
    Probe {
        server_id: String,
        server_addr: SocketAddr,
        device_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Command::Probe {
        server_id,
        server_addr,
        device_id,
    }) = args.command
    {
        return run_probe(&server_id, server_addr, &device_id).await;
    }

    let config = Config::load(args.config.as_deref())?;
    let handle = Gateway::start(config, Arc::new(LoggingObserver), args.log_file).await?;
    info!("Gateway listening on {}", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    handle.stop();
    handle.join().await?;

    info!("Gateway stopped");
    Ok(())
}

async fn run_probe(server_id: &str, server_addr: SocketAddr, device_id: &str) -> anyhow::Result<()> {
    let _guard = gbgate::infrastructure::logging::init(&Default::default(), false)?;

    let response = probe_register(
        server_id,
        server_addr,
        device_id,
        gbgate::application::PROBE_TIMEOUT,
    )
    .await?;

    println!(
        "{} answered {} (Call-ID {})",
        server_addr,
        response.status().unwrap_or_default(),
        response.call_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_run_with_config_and_log_file() {
        let args = Args::try_parse_from(["gbgate", "--log-file", "gbgate.toml"]).unwrap();
        assert!(args.log_file);
        assert_eq!(args.config, Some(PathBuf::from("gbgate.toml")));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Args::try_parse_from(["gbgate", "--log-fille"]).is_err());
        assert!(Args::try_parse_from(["gbgate", "a.toml", "b.toml"]).is_err());
    }

    #[test]
    fn test_probe_subcommand() {
        let args = Args::try_parse_from([
            "gbgate",
            "probe",
            "31011500002000000001",
            "192.168.1.10:5060",
            "34020000001320000001",
        ])
        .unwrap();

        match args.command {
            Some(Command::Probe {
                server_id,
                server_addr,
                device_id,
            }) => {
                assert_eq!(server_id, "31011500002000000001");
                assert_eq!(server_addr, "192.168.1.10:5060".parse().unwrap());
                assert_eq!(device_id, "34020000001320000001");
            }
            None => panic!("probe subcommand not parsed"),
        }
    }
}
