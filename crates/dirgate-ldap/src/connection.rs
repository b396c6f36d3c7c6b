//! Directory connections
//!
//! Every request gets its own session from a [`DirectoryConnector`]. Nothing
//! is pooled; the caller owns the session and must hand it to [`release`]
//! on every exit path.

use async_trait::async_trait;
use dirgate_core::config::LdapSettings;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchResult};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DirectoryError;

/// Metric counting directory operations by kind and outcome
pub const DIRECTORY_OPERATIONS_TOTAL: &str = "dirgate_directory_operations_total";

/// Attribute list for an add operation
pub type Attributes = Vec<(String, HashSet<String>)>;

/// Factory for fresh directory sessions
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Open a new, unauthenticated session
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// One open connection to the directory server
#[async_trait]
pub trait DirectorySession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Run a search and collect every returned entry. A non-zero result code,
    /// including `noSuchObject` for a missing base, is an error.
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>, DirectoryError>;

    async fn add(&mut self, dn: &str, attrs: Attributes) -> Result<(), DirectoryError>;

    async fn unbind(&mut self) -> Result<(), DirectoryError>;
}

/// Unbind a session, logging instead of failing if the server is already gone
pub async fn release(mut session: Box<dyn DirectorySession>) {
    if let Err(e) = session.unbind().await {
        warn!("LDAP unbind failed: {}", e);
    }
}

fn record(operation: &'static str, success: bool) {
    metrics::counter!(
        DIRECTORY_OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Connector backed by a real LDAP server
#[derive(Debug, Clone)]
pub struct LdapConnector {
    url: String,
    timeout: Duration,
}

impl LdapConnector {
    pub fn new(settings: &LdapSettings) -> Self {
        Self {
            url: settings.url.clone(),
            timeout: Duration::from_millis(settings.connect_timeout_ms),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);

        debug!("Connecting to LDAP server: {}", self.url);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(|e| {
                record("connect", false);
                DirectoryError::Connection(format!("Failed to connect to LDAP server: {}", e))
            })?;

        ldap3::drive!(conn);
        record("connect", true);

        Ok(Box::new(LdapSession { ldap }))
    }
}

struct LdapSession {
    ldap: Ldap,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        debug!("LDAP bind as {}", dn);

        let result = match self.ldap.simple_bind(dn, password).await {
            Ok(res) => res.success().map(|_| ()).map_err(DirectoryError::from),
            Err(e) => Err(e.into()),
        };

        record("bind", result.is_ok());
        result
    }

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>, DirectoryError> {
        debug!("LDAP search base={} filter={}", base, filter);

        let result = match self.ldap.search(base, scope, filter, attrs.to_vec()).await {
            Ok(SearchResult(rs, res)) if res.rc == 0 => {
                Ok(rs.into_iter().map(SearchEntry::construct).collect())
            }
            Ok(SearchResult(_, res)) => Err(res.into()),
            Err(e) => Err(e.into()),
        };

        record("search", result.is_ok());
        result
    }

    async fn add(&mut self, dn: &str, attrs: Attributes) -> Result<(), DirectoryError> {
        debug!("LDAP add {}", dn);

        let result = match self.ldap.add(dn, attrs).await {
            Ok(res) => res.success().map(|_| ()).map_err(DirectoryError::from),
            Err(e) => Err(e.into()),
        };

        record("add", result.is_ok());
        result
    }

    async fn unbind(&mut self) -> Result<(), DirectoryError> {
        self.ldap.unbind().await.map_err(DirectoryError::from)
    }
}
