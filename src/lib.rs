//! Client layer for YES BANK API Banking SOAP services.
//!
//! Resolves per-tier endpoints and credentials for the bank's payment and
//! remittance services, and normalizes failed calls into [`Fault`]s.
//!
//! # Features
//!
//! - Endpoint resolution for UAT and production, with or without mutual TLS
//! - Client id/secret headers, basic auth and PKCS#12 client certificates
//! - `reqwest` client construction (proxy, TLS floor, identity)
//! - Translation of gateway rejections, SOAP faults and transport errors
//!
//! # Example
//!
//! ```ignore
//! use apibanking_soap::{build_http_client, classify_response, Environment, Fault};
//!
//! let env = Environment::uat(user, password, client_id, client_secret);
//! let client = build_http_client(&env)?;
//! let response = client
//!     .post(env.endpoint_address("IMTService").to_url()?)
//!     .body(envelope)
//!     .send()
//!     .await?;
//! if !response.status().is_success() {
//!     let fault = Fault::translate(classify_response(response).await);
//!     tracing::error!(%fault, "IMT call failed");
//! }
//! ```

pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod fault;
pub mod parser;

pub use client::{build_http_client, classify_error, classify_response};
pub use config::EnvironmentConfig;
pub use environment::{EndpointAddress, Environment, HeaderSet, SecurityProtocol, Tier};
pub use error::Error;
pub use fault::{Fault, FaultDetail, FaultKind, TransportError};
