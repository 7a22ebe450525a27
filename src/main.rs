//! API Banking SOAP diagnostic tool.
//!
//! Run with: `apibanking-soap --config environment.yaml endpoint IMTService`

use anyhow::{Context, Result};
use apibanking_soap::fault::{ErrorResponse, Fault, TransportError};
use apibanking_soap::parser::parse_soap_fault;
use apibanking_soap::environment::CLIENT_ID_HEADER;
use apibanking_soap::{Environment, EnvironmentConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Inspect how an API Banking environment is resolved.
///
/// Prints endpoint addresses and headers, checks the client certificate and
/// translates captured error responses into faults.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "environment.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the endpoint address of a service
    Endpoint {
        /// Service name, e.g. "fundsTransferByCustomerService2"
        service: String,
    },

    /// Print the headers sent with every request (secrets masked)
    Headers,

    /// Load the configured client certificate
    CheckCertificate,

    /// Translate a captured error response body into a fault
    TranslateFault {
        /// File holding the response body
        body: PathBuf,

        /// Response content type
        #[arg(long, default_value = "application/soap+xml")]
        content_type: String,

        /// Treat the response as an HTTP 401 from the gateway
        #[arg(long)]
        unauthorized: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match args.command {
        Command::Endpoint { service } => {
            let environment = load_environment(&args.config).await?;
            println!("{}", environment.endpoint_address(&service));
        }
        Command::Headers => {
            let environment = load_environment(&args.config).await?;
            for (name, value) in environment.headers().iter() {
                let shown = if name == CLIENT_ID_HEADER { value } else { "***" };
                println!("{}: {}", name, shown);
            }
        }
        Command::CheckCertificate => {
            let environment = load_environment(&args.config).await?;
            if !environment.needs_client_certificate() {
                warn!("No client certificate configured");
                return Ok(());
            }
            environment
                .client_certificate()
                .context("Client certificate could not be loaded")?;
            info!("Client certificate loaded successfully");
        }
        Command::TranslateFault {
            body,
            content_type,
            unauthorized,
        } => {
            let content = tokio::fs::read(&body)
                .await
                .with_context(|| format!("Failed to read {}", body.display()))?;
            println!("{}", translate(content, &content_type, unauthorized));
        }
    }

    Ok(())
}

async fn load_environment(path: &Path) -> Result<Environment> {
    info!("Config file: {}", path.display());
    let content = tokio::fs::read_to_string(path)
        .await
        .context("Failed to read config file")?;
    let config = EnvironmentConfig::from_yaml(&content).context("Failed to parse config file")?;

    info!(
        tier = ?config.tier,
        client_certificate = config.certificate.is_some(),
        proxy = config.proxy.is_some(),
        "Configuration loaded"
    );

    Environment::try_from(config).context("Invalid environment configuration")
}

fn translate(body: Vec<u8>, content_type: &str, unauthorized: bool) -> Fault {
    if unauthorized {
        return Fault::translate(TransportError::Unauthorized {
            message: "The HTTP request was unauthorized".to_string(),
            response: ErrorResponse::from_bytes(content_type, body),
        });
    }

    let text = String::from_utf8_lossy(&body);
    match parse_soap_fault(&text) {
        Ok(soap_fault) => Fault::translate(TransportError::Remote(soap_fault)),
        Err(e) => {
            warn!(error = %e, "Response is not a SOAP fault");
            Fault::translate(TransportError::Other(e.to_string()))
        }
    }
}
