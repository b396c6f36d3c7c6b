//! Directory entries built and read by the bridge

use dirgate_core::config::LdapSettings;
use ldap3::{dn_escape, ldap_escape};
use std::collections::HashSet;

use crate::connection::Attributes;

/// Object classes of a provisioned user
pub const USER_OBJECT_CLASSES: [&str; 4] = ["inetOrgPerson", "organizationalPerson", "person", "top"];

/// Attributes returned by user searches
pub const USER_SEARCH_ATTRIBUTES: [&str; 4] = ["uid", "cn", "sn", "mail"];

/// A person entry under the users container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub uid: String,
    pub cn: String,
    pub sn: String,
    pub mail: String,
    pub user_password: String,
}

impl UserEntry {
    pub fn new(
        username: &str,
        password: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Self {
        Self {
            uid: username.to_string(),
            cn: format!("{} {}", first_name, last_name),
            sn: last_name.to_string(),
            mail: email.to_string(),
            user_password: password.to_string(),
        }
    }

    pub fn dn(&self, settings: &LdapSettings) -> String {
        user_dn(settings, &self.uid)
    }

    pub fn attributes(&self) -> Attributes {
        let single = |name: &str, value: &str| (name.to_string(), HashSet::from([value.to_string()]));

        vec![
            (
                "objectClass".to_string(),
                USER_OBJECT_CLASSES.iter().map(|c| c.to_string()).collect(),
            ),
            single("uid", &self.uid),
            single("cn", &self.cn),
            single("sn", &self.sn),
            single("mail", &self.mail),
            single("userPassword", &self.user_password),
        ]
    }
}

/// `uid=<username>,ou=users,<base>` with the username DN-escaped
pub fn user_dn(settings: &LdapSettings, username: &str) -> String {
    settings.user_dn(&dn_escape(username))
}

/// Prefix match on uid, cn or mail. An empty term matches every user.
pub fn user_search_filter(term: &str) -> String {
    let term = ldap_escape(term);
    format!("(|(uid={0}*)(cn={0}*)(mail={0}*))", term)
}
