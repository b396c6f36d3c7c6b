//! Users container check-then-create

use ldap3::Scope;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::connection::{Attributes, DirectorySession};
use crate::error::EnsureOuError;

const OU_FILTER: &str = "(objectClass=organizationalUnit)";

/// What [`ensure_users_ou`] found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The container was already there (or a concurrent request created it)
    Existing,
    /// This call created the container
    Created,
}

/// Make sure the organizational unit at `ou_dn` exists, creating it if the
/// base-scope lookup finds nothing.
///
/// `session` must already be bound with rights to add entries. The session is
/// never released here; the caller owns it on every path.
pub async fn ensure_users_ou(
    session: &mut dyn DirectorySession,
    ou_dn: &str,
) -> Result<EnsureOutcome, EnsureOuError> {
    let found = match session.search(ou_dn, Scope::Base, OU_FILTER, &["1.1"]).await {
        Ok(entries) => !entries.is_empty(),
        Err(e) if e.is_no_such_object() => false,
        Err(e) => return Err(EnsureOuError::Search(e)),
    };

    if found {
        debug!("Users OU present: {}", ou_dn);
        return Ok(EnsureOutcome::Existing);
    }

    match session.add(ou_dn, ou_attributes(ou_dn)).await {
        Ok(()) => {
            info!("Created users OU: {}", ou_dn);
            Ok(EnsureOutcome::Created)
        }
        Err(e) if e.is_already_exists() => {
            debug!("Users OU created concurrently: {}", ou_dn);
            Ok(EnsureOutcome::Existing)
        }
        Err(e) => Err(EnsureOuError::Create(e)),
    }
}

/// `ou` takes the value of the container's own RDN
fn ou_attributes(ou_dn: &str) -> Attributes {
    let rdn = ou_dn.split(',').next().unwrap_or_default();
    let ou = rdn
        .split_once('=')
        .map(|(_, value)| value)
        .unwrap_or(dirgate_core::USERS_OU);

    vec![
        (
            "objectClass".to_string(),
            HashSet::from(["organizationalUnit".to_string()]),
        ),
        ("ou".to_string(), HashSet::from([ou.to_string()])),
    ]
}
