//! Configuration for Dirgate
//!
//! Loaded once at startup, either from the environment (the `LDAP_*` and
//! `PORT` variables) or from a TOML file, then shared read-only with every
//! request handler.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PORT, USERS_OU};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirgateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ldap: LdapSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DirgateConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| crate::Error::ConfigRead {
            path: path.to_string(),
            source,
        })?;

        Ok(toml::from_str(&content)?)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("DIRGATE_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(p) => config.server.port = p,
                Err(_) => warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(level) = lookup("DIRGATE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(url) = lookup("LDAP_URL") {
            config.ldap.url = url;
        }
        if let Some(base_dn) = lookup("LDAP_BASE_DN") {
            config.ldap.base_dn = base_dn;
        }
        if let Some(user) = lookup("LDAP_ADMIN_USER") {
            config.ldap.admin_user = user;
        }
        if let Some(password) = lookup("LDAP_ADMIN_PASSWORD") {
            config.ldap.admin_password = password;
        }
        if let Some(timeout) = lookup("LDAP_CONNECT_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => config.ldap.connect_timeout_ms = ms,
                Err(_) => warn!("Ignoring invalid LDAP_CONNECT_TIMEOUT_MS value: {}", timeout),
            }
        }

        config
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.ldap.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Directory server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapSettings {
    /// LDAP server URL (ldap:// or ldaps://)
    #[serde(default = "default_ldap_url")]
    pub url: String,

    /// Base DN under which the users container lives
    /// Example: "dc=example,dc=com"
    #[serde(default)]
    pub base_dn: String,

    /// Admin CN, combined with the base DN into the admin bind DN
    #[serde(default)]
    pub admin_user: String,

    /// Admin password
    #[serde(default)]
    pub admin_password: String,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_ldap_url() -> String {
    "ldap://localhost:389".to_string()
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            url: default_ldap_url(),
            base_dn: String::new(),
            admin_user: String::new(),
            admin_password: String::new(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl LdapSettings {
    /// `cn=<admin_user>,<base_dn>`
    pub fn admin_dn(&self) -> String {
        format!("cn={},{}", self.admin_user, self.base_dn)
    }

    /// `ou=users,<base_dn>`
    pub fn users_ou_dn(&self) -> String {
        format!("ou={},{}", USERS_OU, self.base_dn)
    }

    /// DN of a provisioned user. `uid` must already be DN-escaped.
    pub fn user_dn(&self, uid: &str) -> String {
        format!("uid={},{}", uid, self.users_ou_dn())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.url.is_empty() {
            return Err(crate::Error::InvalidConfig("LDAP_URL is required".into()));
        }
        if !self.url.starts_with("ldap://") && !self.url.starts_with("ldaps://") {
            return Err(crate::Error::InvalidConfig(
                "LDAP_URL must start with ldap:// or ldaps://".into(),
            ));
        }
        if self.base_dn.is_empty() {
            return Err(crate::Error::InvalidConfig("LDAP_BASE_DN is required".into()));
        }
        if self.admin_user.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "LDAP_ADMIN_USER is required".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "Connect timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_loading() {
        let config = DirgateConfig::from_lookup(lookup(&[
            ("LDAP_URL", "ldap://directory:389"),
            ("LDAP_BASE_DN", "dc=example,dc=com"),
            ("LDAP_ADMIN_USER", "admin"),
            ("LDAP_ADMIN_PASSWORD", "secret"),
            ("PORT", "8080"),
        ]));

        assert_eq!(config.ldap.url, "ldap://directory:389");
        assert_eq!(config.ldap.admin_password, "secret");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ldap.connect_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_keeps_default() {
        let config = DirgateConfig::from_lookup(lookup(&[("PORT", "eighty")]));
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_derived_dns() {
        let ldap = LdapSettings {
            base_dn: "dc=example,dc=com".to_string(),
            admin_user: "admin".to_string(),
            ..Default::default()
        };

        assert_eq!(ldap.admin_dn(), "cn=admin,dc=example,dc=com");
        assert_eq!(ldap.users_ou_dn(), "ou=users,dc=example,dc=com");
        assert_eq!(ldap.user_dn("jdoe"), "uid=jdoe,ou=users,dc=example,dc=com");
    }

    #[test]
    fn test_config_validation() {
        let mut ldap = LdapSettings::default();

        // Missing base DN
        assert!(ldap.validate().is_err());

        ldap.base_dn = "dc=example,dc=com".to_string();
        ldap.admin_user = "admin".to_string();
        assert!(ldap.validate().is_ok());

        ldap.url = "http://localhost".to_string();
        assert!(ldap.validate().is_err());

        ldap.url = "ldaps://localhost:636".to_string();
        ldap.connect_timeout_ms = 0;
        assert!(ldap.validate().is_err());
    }

    #[test]
    fn test_toml_parsing() {
        let config: DirgateConfig = toml::from_str(
            r#"
            [server]
            port = 9090

            [ldap]
            url = "ldap://ldap.internal:389"
            base_dn = "dc=corp,dc=local"
            admin_user = "manager"
            admin_password = "pw"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.ldap.admin_dn(), "cn=manager,dc=corp,dc=local");
        assert_eq!(config.ldap.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(config.logging.level, "info");
    }
}
