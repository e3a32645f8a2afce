//! The Finder daemon.
//!
//! Every other daemon in the suite connects here to register itself,
//! advertise its commands and resolve its peers. Exit status: 0 on clean
//! shutdown, 1 on argument error, 2 on internal error.

use std::net::IpAddr;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use switchyard::config::FabricConfig;
use switchyard::context::ProcessContext;
use switchyard::finder::Finder;

/// Process-to-process directory and event bus for the routing suite.
#[derive(Parser, Debug)]
#[command(name = "switchyard-finder", version, about)]
struct Args {
    /// Bind address as host[:port]; defaults to 127.0.0.1:19999.
    #[arg(short = 'F', long = "finder", value_name = "HOST[:PORT]")]
    finder: Option<String>,

    /// Additional permitted client hosts.
    #[arg(long = "permit-host", value_name = "ADDR")]
    permit_hosts: Vec<IpAddr>,

    /// Additional permitted client prefixes (e.g. 10.0.0.0/8).
    #[arg(long = "permit-net", value_name = "PREFIX")]
    permit_nets: Vec<switchyard::net::AnyNet>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchyard=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match configure(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    match serve(config, &args).await {
        Ok(()) => {
            info!("finder shut down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn configure(args: &Args) -> anyhow::Result<FabricConfig> {
    let endpoint = match &args.finder {
        Some(flag) => FabricConfig::parse_finder_flag(flag).context("bad -F argument")?,
        None => FabricConfig::default().finder_endpoint,
    };
    FabricConfig::builder()
        .finder_endpoint(endpoint)
        .build()
        .context("bad configuration")
}

async fn serve(config: FabricConfig, args: &Args) -> anyhow::Result<()> {
    let context = ProcessContext::new(config.finder_endpoint.ip());
    context.with_permits(|permits| {
        for host in &args.permit_hosts {
            permits.add_host(*host);
        }
        for net in &args.permit_nets {
            permits.add_net(*net);
        }
    });

    let finder = Finder::bind(config, context)
        .await
        .context("failed to bind finder listener")?;
    info!(addr = %finder.local_addr(), "finder up");
    finder.run().await;
    Ok(())
}
