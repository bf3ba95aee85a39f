use std::process::ExitCode;

use clap::{Parser, Subcommand};

pub mod config;
use config::{app_config::load_config, model::{Config, ProbeMode}};
pub mod http_probe;
use http_probe::{ProbeRequest, build_prober, probe::DirectProber};
pub mod report;
pub mod server;
use server::ProxyServer;
pub mod tally;
pub mod target;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy endpoint (POST /tally/api).
    Serve {
        /// Bind address, overrides `listen` from the config file.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Test the connection to a Tally server once.
    Test {
        /// Host or IP where Tally is running, e.g. localhost
        #[arg(long)]
        host: String,

        /// Port of Tally's HTTP interface (default from config, usually 9000)
        #[arg(long)]
        port: Option<String>,

        /// Company name as it appears in Tally. Forwarded, not checked.
        #[arg(long)]
        company: Option<String>,

        /// Where to run the probe from, overrides `probe.mode`.
        #[arg(long, value_enum)]
        mode: Option<ProbeMode>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Command::Serve { listen } => serve(config, listen).await,
        Command::Test {
            host,
            port,
            company,
            mode,
        } => test_connection(config, &host, port.as_deref(), company, mode).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", http_probe::report(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config, listen: Option<String>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let listen = listen.unwrap_or(config.listen);
    // The endpoint always talks to Tally itself, whatever `probe.mode` says.
    let prober = DirectProber::from_settings(&config.probe)?;
    let server = ProxyServer::bind(&listen, std::sync::Arc::new(prober)).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn test_connection(
    mut config: Config,
    host: &str,
    port: Option<&str>,
    company: Option<String>,
    mode: Option<ProbeMode>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Some(mode) = mode {
        config.probe.mode = mode;
    }

    let result = match target::normalize(host, port) {
        Ok(target) => {
            let prober = build_prober(&config.probe)?;
            let request = ProbeRequest::new(target).with_company_name(company);
            prober.probe(&request).await
        }
        Err(e) => e.into(),
    };

    println!("{}", report::render(&result));

    Ok(match result.is_connected() {
        true => ExitCode::SUCCESS,
        false => ExitCode::FAILURE,
    })
}
