//! Deployment environments and endpoint resolution.
//!
//! An [`Environment`] holds the credentials issued for one deployment tier and
//! derives everything a SOAP call needs from them: the endpoint address of a
//! service, the authentication headers, the client certificate and the TLS
//! protocol floor.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CLIENT_ID_HEADER: &str = "X-IBM-Client-Id";
pub const CLIENT_SECRET_HEADER: &str = "X-IBM-Client-Secret";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Port used by the mutual-TLS gateway.
const CERTIFICATE_PORT: &str = ":444";

/// Deployment tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Pre-production
    Uat,
    /// Production
    Prd,
}

impl Tier {
    /// Base URL of the API gateway for this tier.
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Uat => "https://uatsky.yesbank.in",
            Self::Prd => "https://sky.yesbank.in",
        }
    }

    /// Path segment that follows `/app/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Uat => "uat",
            Self::Prd => "live",
        }
    }

    fn routes(&self) -> &'static [Route] {
        match self {
            Self::Uat => UAT_ROUTES,
            Self::Prd => PRD_ROUTES,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uat => f.write_str("UAT"),
            Self::Prd => f.write_str("PRD"),
        }
    }
}

/// Path suffix of a known service, relative to `/app/<segment>/`.
struct Route {
    service: &'static str,
    path: &'static str,
    /// Replaces `path` when a client certificate is configured.
    certificate_path: Option<&'static str>,
}

impl Route {
    const fn new(service: &'static str, path: &'static str) -> Self {
        Self {
            service,
            path,
            certificate_path: None,
        }
    }

    const fn with_certificate_path(self, path: &'static str) -> Self {
        Self {
            certificate_path: Some(path),
            ..self
        }
    }

    fn path(&self, with_certificate: bool) -> &'static str {
        match self.certificate_path {
            Some(path) if with_certificate => path,
            _ => self.path,
        }
    }
}

// "Sevice2" is how the UAT mTLS gateway publishes the service.
const UAT_ROUTES: &[Route] = &[
    Route::new(
        "fundsTransferByCustomerService",
        "fundsTransferByCustomerServiceHttpService",
    ),
    Route::new(
        "fundsTransferByCustomerService2",
        "fundsTransferByCustomerService2",
    )
    .with_certificate_path("ssl/fundsTransferByCustomerSevice2"),
    Route::new(
        "InwardRemittanceByPartnerService",
        "InwardRemittanceByPartnerServiceHttpService",
    ),
    Route::new("DomesticRemittanceByPartnerService", "DomesticRemittanceService"),
    Route::new("IMTService", "IMTService"),
];

const PRD_ROUTES: &[Route] = &[
    Route::new(
        "fundsTransferByCustomerService",
        "fundsTransferByCustomerServiceHttpService",
    ),
    Route::new(
        "fundsTransferByCustomerService2",
        "fundsTransferByCustomerService2",
    ),
    Route::new(
        "InwardRemittanceByPartnerService",
        "InwardRemittanceByPartnerServiceHttpService",
    ),
    Route::new("DomesticRemittanceByPartnerService", "DomesticRemittanceService"),
    Route::new("IMTService", "IMTService"),
];

/// Minimum TLS protocol version negotiated with the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityProtocol {
    /// TLS 1.0 (what the gateway was originally certified against)
    #[default]
    #[serde(rename = "1.0")]
    Tls1_0,
    #[serde(rename = "1.1")]
    Tls1_1,
    #[serde(rename = "1.2")]
    Tls1_2,
    #[serde(rename = "1.3")]
    Tls1_3,
}

impl SecurityProtocol {
    pub fn tls_version(&self) -> reqwest::tls::Version {
        match self {
            Self::Tls1_0 => reqwest::tls::Version::TLS_1_0,
            Self::Tls1_1 => reqwest::tls::Version::TLS_1_1,
            Self::Tls1_2 => reqwest::tls::Version::TLS_1_2,
            Self::Tls1_3 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

/// PKCS#12 archive used for mutual TLS.
#[derive(Clone)]
pub struct ClientCertificate {
    path: PathBuf,
    password: String,
}

impl ClientCertificate {
    pub fn new(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            password: password.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the archive. Blocking; no caching.
    pub fn load(&self) -> Result<reqwest::Identity> {
        let der = std::fs::read(&self.path).map_err(|e| Error::certificate(&self.path, e))?;
        reqwest::Identity::from_pkcs12_der(&der, &self.password)
            .map_err(|e| Error::certificate(&self.path, e))
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("path", &self.path)
            .field("password", &"***")
            .finish()
    }
}

/// Fully-qualified address of a service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress(String);

impl EndpointAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into a [`Url`] for use with an HTTP client.
    pub fn to_url(&self) -> Result<Url> {
        Url::parse(&self.0)
            .map_err(|e| Error::Config(format!("invalid endpoint address {}: {}", self.0, e)))
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EndpointAddress> for String {
    fn from(address: EndpointAddress) -> Self {
        address.0
    }
}

/// HTTP headers attached to every request, keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet(BTreeMap<String, String>);

impl HeaderSet {
    fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Convert into a [`HeaderMap`], marking credentials as sensitive.
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let mut header_value =
                HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            if name != CLIENT_ID_HEADER {
                header_value.set_sensitive(true);
            }
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// Credentials and connection settings for one deployment tier.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct Environment {
    tier: Tier,
    user: String,
    password: String,
    client_id: String,
    client_secret: String,
    certificate: Option<ClientCertificate>,
    proxy: Option<Url>,
    security_protocol: SecurityProtocol,
}

impl Environment {
    /// Create an environment without client certificate or proxy.
    pub fn new(
        tier: Tier,
        user: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tier,
            user: user.into(),
            password: password.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            certificate: None,
            proxy: None,
            security_protocol: SecurityProtocol::default(),
        }
    }

    /// Create a UAT environment.
    pub fn uat(
        user: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::new(Tier::Uat, user, password, client_id, client_secret)
    }

    /// Create a production environment.
    pub fn prd(
        user: impl Into<String>,
        password: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::new(Tier::Prd, user, password, client_id, client_secret)
    }

    /// Present a PKCS#12 client certificate (mutual TLS on port 444).
    pub fn with_client_certificate(
        mut self,
        path: impl Into<PathBuf>,
        password: impl Into<String>,
    ) -> Self {
        self.certificate = Some(ClientCertificate::new(path, password));
        self
    }

    pub fn with_proxy(mut self, proxy: Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_security_protocol(mut self, protocol: SecurityProtocol) -> Self {
        self.security_protocol = protocol;
        self
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn needs_http_basic_auth(&self) -> bool {
        true
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn needs_client_certificate(&self) -> bool {
        self.certificate.is_some()
    }

    pub fn certificate(&self) -> Option<&ClientCertificate> {
        self.certificate.as_ref()
    }

    /// Load the configured client certificate from disk.
    pub fn client_certificate(&self) -> Result<reqwest::Identity> {
        match &self.certificate {
            Some(certificate) => certificate.load(),
            None => Err(Error::certificate(
                PathBuf::new(),
                "no client certificate configured",
            )),
        }
    }

    pub fn proxy_address(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    pub fn security_protocol(&self) -> SecurityProtocol {
        self.security_protocol
    }

    /// Resolve the endpoint address of a service.
    ///
    /// Known services map to their published path; anything else is routed
    /// through the generic `ssl/<service>` path.
    pub fn endpoint_address(&self, service_name: &str) -> EndpointAddress {
        let with_certificate = self.needs_client_certificate();

        let mut address = String::from(self.tier.base_url());
        if with_certificate {
            address.push_str(CERTIFICATE_PORT);
        }
        address.push_str("/app/");
        address.push_str(self.tier.path_segment());
        address.push('/');

        match self
            .tier
            .routes()
            .iter()
            .find(|route| route.service == service_name)
        {
            Some(route) => address.push_str(route.path(with_certificate)),
            None => {
                address.push_str("ssl/");
                address.push_str(service_name);
            }
        }

        debug!(
            tier = %self.tier,
            service = service_name,
            endpoint = %address,
            "Resolved endpoint address"
        );

        EndpointAddress(address)
    }

    /// Headers required by the gateway.
    ///
    /// Basic auth is sent only alongside a client certificate.
    pub fn headers(&self) -> HeaderSet {
        let mut headers = HeaderSet::default();
        headers.insert(CLIENT_ID_HEADER, self.client_id.as_str());
        headers.insert(CLIENT_SECRET_HEADER, self.client_secret.as_str());
        if self.needs_client_certificate() {
            let credentials = STANDARD.encode(format!("{}:{}", self.user, self.password));
            headers.insert(AUTHORIZATION_HEADER, format!("Basic {credentials}"));
        }
        headers
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("tier", &self.tier)
            .field("user", &self.user)
            .field("password", &"***")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("certificate", &self.certificate)
            .field("proxy", &self.proxy)
            .field("security_protocol", &self.security_protocol)
            .finish()
    }
}
