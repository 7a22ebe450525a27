//! Configuration types for an API Banking environment.

use crate::environment::{Environment, SecurityProtocol, Tier};
use crate::error::Error;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Credentials and connection settings for one deployment tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Deployment tier: "uat" or "prd"
    pub tier: Tier,

    /// Gateway user (sent as basic auth alongside a client certificate)
    pub user: String,

    /// Gateway password
    pub password: String,

    /// API client id
    pub client_id: String,

    /// API client secret
    pub client_secret: String,

    /// PKCS#12 client certificate for mutual TLS
    pub certificate: Option<CertificateConfig>,

    /// Outbound proxy URL
    pub proxy: Option<String>,

    /// Minimum TLS version: "1.0", "1.1", "1.2" or "1.3"
    pub security_protocol: SecurityProtocol,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Uat,
            user: String::new(),
            password: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            certificate: None,
            proxy: None,
            security_protocol: SecurityProtocol::default(),
        }
    }
}

/// Client certificate location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Path to the PKCS#12 archive
    pub path: PathBuf,

    /// Archive password
    #[serde(default)]
    pub password: String,
}

impl EnvironmentConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }
}

impl TryFrom<EnvironmentConfig> for Environment {
    type Error = Error;

    fn try_from(config: EnvironmentConfig) -> Result<Self, Self::Error> {
        if config.client_id.is_empty() {
            return Err(Error::Config("client_id must be set".to_string()));
        }

        let mut environment = Environment::new(
            config.tier,
            config.user,
            config.password,
            config.client_id,
            config.client_secret,
        )
        .with_security_protocol(config.security_protocol);

        if let Some(certificate) = config.certificate {
            environment = environment.with_client_certificate(certificate.path, certificate.password);
        }

        if let Some(proxy) = config.proxy {
            let url = Url::parse(&proxy)
                .map_err(|e| Error::Config(format!("invalid proxy URL {}: {}", proxy, e)))?;
            environment = environment.with_proxy(url);
        }

        Ok(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.tier, Tier::Uat);
        assert!(config.certificate.is_none());
        assert_eq!(config.security_protocol, SecurityProtocol::Tls1_0);
    }

    #[test]
    fn test_config_serialization() {
        let config = EnvironmentConfig {
            tier: Tier::Prd,
            client_id: "id".to_string(),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = EnvironmentConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.tier, Tier::Prd);
        assert_eq!(parsed.client_id, "id");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
tier: prd
user: testuser
password: passw0rd
client_id: 3a5c-client
client_secret: s3cr3t
certificate:
  path: /etc/apibanking/client.p12
  password: certpass
proxy: "http://proxy.internal:3128"
security_protocol: "1.2"
"#;
        let config = EnvironmentConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.tier, Tier::Prd);
        assert_eq!(config.security_protocol, SecurityProtocol::Tls1_2);

        let env = Environment::try_from(config).unwrap();
        assert!(env.needs_client_certificate());
        assert_eq!(
            env.proxy_address().map(|u| u.as_str()),
            Some("http://proxy.internal:3128/")
        );
        assert_eq!(
            env.endpoint_address("IMTService").as_str(),
            "https://sky.yesbank.in:444/app/live/IMTService"
        );
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = EnvironmentConfig {
            client_id: "id".to_string(),
            proxy: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(Environment::try_from(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_client_id_is_config_error() {
        assert!(matches!(
            Environment::try_from(EnvironmentConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unrecognized_keys_are_ignored() {
        let config = EnvironmentConfig::from_yaml("version: \"1\"\nclient_id: id").unwrap();
        assert_eq!(config.client_id, "id");
        assert!(Environment::try_from(config).is_ok());
    }

    #[test]
    fn test_unknown_tier_rejected() {
        assert!(EnvironmentConfig::from_yaml("tier: staging").is_err());
    }
}
