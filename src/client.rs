//! HTTP client configuration and failure classification.
//!
//! Builds the `reqwest` client a SOAP stack uses to reach the gateway, and
//! turns what that client reports on failure into a [`TransportError`] ready
//! for [`Fault::translate`](crate::fault::Fault::translate).

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::fault::{ErrorResponse, TransportError};
use crate::parser;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Create an HTTP client carrying the environment's headers, TLS floor,
/// proxy and client certificate.
pub fn build_http_client(environment: &Environment) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .default_headers(environment.headers().to_header_map()?)
        .min_tls_version(environment.security_protocol().tls_version());

    if let Some(proxy) = environment.proxy_address() {
        debug!(proxy = %proxy, "Routing gateway traffic through proxy");
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| Error::Config(format!("invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    if environment.needs_client_certificate() {
        debug!(tier = %environment.tier(), "Creating HTTP client with client certificate");
        builder = builder.identity(environment.client_certificate()?);
    } else {
        debug!(tier = %environment.tier(), "Creating HTTP client without client certificate");
    }

    Ok(builder.build()?)
}

/// Classify an error raised by `reqwest` before any response was received.
pub fn classify_error(error: &reqwest::Error) -> TransportError {
    let message = error.to_string();
    if error.is_timeout() {
        TransportError::Timeout(message)
    } else if error.is_connect() || error.is_request() || error.is_body() {
        TransportError::Communication(message)
    } else {
        TransportError::Other(message)
    }
}

/// Classify a non-success response.
///
/// The body is buffered; a body that cannot be read is a transport failure.
pub async fn classify_response(response: reqwest::Response) -> TransportError {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            warn!(status = %status, error = %e, "Failed to read error response body");
            return classify_error(&e);
        }
    };

    if status == StatusCode::UNAUTHORIZED {
        return TransportError::Unauthorized {
            message: format!("The HTTP request was unauthorized ({})", status),
            response: ErrorResponse::from_bytes(content_type, body.to_vec()),
        };
    }

    let text = String::from_utf8_lossy(&body);
    if let Ok(soap_fault) = parser::parse_soap_fault(&text) {
        return TransportError::Remote(soap_fault);
    }

    let message = format!("Gateway returned {}", status);
    match status {
        StatusCode::GATEWAY_TIMEOUT => TransportError::Timeout(message),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            TransportError::Communication(message)
        }
        _ => TransportError::Other(message),
    }
}
