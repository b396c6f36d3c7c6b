//! In-memory directory
//!
//! Implements the connector/session traits over a map of entries so the
//! request flows can run without an LDAP server. It enforces the parts of LDAP
//! the bridge depends on: admin and `userPassword` binds, parent-must-exist
//! and duplicate-DN checks on add, base/subtree search with a small filter
//! subset (`&`, `|`, `!`, equality, presence, prefix substring). Every
//! connect, bind, search, add and unbind is counted, and single operations can
//! be made to fail.

use async_trait::async_trait;
use ldap3::{Scope, SearchEntry};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::connection::{Attributes, DirectoryConnector, DirectorySession};
use crate::error::{rc, DirectoryError};

/// Operation kinds that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Bind,
    Search,
    Add,
    Unbind,
}

/// Stored entry
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl MemoryEntry {
    fn values(&self, attr: &str) -> Option<&Vec<String>> {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .map(|(_, values)| values)
    }
}

/// Operation counters
#[derive(Debug, Clone, Default)]
pub struct DirectoryStats {
    pub connects: usize,
    pub unbinds: usize,
    pub binds: usize,
    pub searches: usize,
    /// DN of every add attempt, in order
    pub adds: Vec<String>,
}

impl DirectoryStats {
    pub fn add_attempts(&self, dn: &str) -> usize {
        self.adds.iter().filter(|d| d.eq_ignore_ascii_case(dn)).count()
    }

    /// Sessions opened but never unbound
    pub fn open_sessions(&self) -> usize {
        self.connects.saturating_sub(self.unbinds)
    }
}

struct State {
    entries: BTreeMap<String, MemoryEntry>,
    admin_dn: String,
    admin_password: String,
    stats: DirectoryStats,
    failures: HashMap<Operation, DirectoryError>,
}

impl State {
    fn take_failure(&mut self, op: Operation) -> Result<(), DirectoryError> {
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct MemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl MemoryDirectory {
    /// Directory holding only the base entry
    pub fn new(base_dn: &str, admin_dn: &str, admin_password: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            normalize(base_dn),
            MemoryEntry {
                dn: base_dn.to_string(),
                attrs: HashMap::from([(
                    "objectClass".to_string(),
                    vec!["top".to_string(), "domain".to_string()],
                )]),
            },
        );

        Self {
            state: Arc::new(Mutex::new(State {
                entries,
                admin_dn: admin_dn.to_string(),
                admin_password: admin_password.to_string(),
                stats: DirectoryStats::default(),
                failures: HashMap::new(),
            })),
        }
    }

    /// Store an entry directly, bypassing the add checks and counters
    pub fn insert_entry(&self, dn: &str, attrs: &[(&str, &[&str])]) {
        let attrs = attrs
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect();

        self.state.lock().entries.insert(
            normalize(dn),
            MemoryEntry {
                dn: dn.to_string(),
                attrs,
            },
        );
    }

    pub fn seed_users_ou(&self, ou_dn: &str) {
        let ou = ou_dn
            .split(',')
            .next()
            .and_then(|rdn| rdn.split_once('='))
            .map(|(_, v)| v)
            .unwrap_or(dirgate_core::USERS_OU);
        self.insert_entry(ou_dn, &[("objectClass", &["organizationalUnit"]), ("ou", &[ou])]);
    }

    /// Make the next `op` fail with `err`
    pub fn fail_next(&self, op: Operation, err: DirectoryError) {
        self.state.lock().failures.insert(op, err);
    }

    pub fn entry(&self, dn: &str) -> Option<MemoryEntry> {
        self.state.lock().entries.get(&normalize(dn)).cloned()
    }

    pub fn stats(&self) -> DirectoryStats {
        self.state.lock().stats.clone()
    }
}

#[async_trait]
impl DirectoryConnector for MemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let mut state = self.state.lock();
        state.take_failure(Operation::Connect)?;
        state.stats.connects += 1;

        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            bound_dn: None,
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
    bound_dn: Option<String>,
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        state.stats.binds += 1;
        state.take_failure(Operation::Bind)?;

        // Empty password is an unauthenticated (anonymous) bind
        if password.is_empty() {
            self.bound_dn = None;
            return Ok(());
        }

        let authenticated = if dn.eq_ignore_ascii_case(&state.admin_dn) {
            password == state.admin_password
        } else {
            state
                .entries
                .get(&normalize(dn))
                .and_then(|entry| entry.values("userPassword"))
                .is_some_and(|values| values.iter().any(|v| v == password))
        };

        if !authenticated {
            return Err(DirectoryError::rejected(rc::INVALID_CREDENTIALS, "", ""));
        }

        self.bound_dn = Some(dn.to_string());
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[&str],
    ) -> Result<Vec<SearchEntry>, DirectoryError> {
        let mut state = self.state.lock();
        state.stats.searches += 1;
        state.take_failure(Operation::Search)?;

        let filter = Filter::parse(filter)
            .ok_or_else(|| DirectoryError::Transport(format!("invalid filter: {}", filter)))?;

        let base_key = normalize(base);
        if !state.entries.contains_key(&base_key) {
            return Err(DirectoryError::rejected(rc::NO_SUCH_OBJECT, "", ""));
        }

        let suffix = format!(",{}", base_key);
        let entries = state
            .entries
            .iter()
            .filter(|(key, _)| match scope {
                Scope::Base => **key == base_key,
                Scope::OneLevel => {
                    key.strip_suffix(&suffix)
                        .is_some_and(|rdn| parent_dn(rdn).is_none())
                }
                Scope::Subtree => **key == base_key || key.ends_with(&suffix),
            })
            .map(|(_, entry)| entry)
            .filter(|entry| filter.matches(entry))
            .map(|entry| project(entry, attrs))
            .collect();

        Ok(entries)
    }

    async fn add(&mut self, dn: &str, attrs: Attributes) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        state.stats.adds.push(dn.to_string());
        state.take_failure(Operation::Add)?;

        if self.bound_dn.as_deref().map(|b| b.eq_ignore_ascii_case(&state.admin_dn)) != Some(true)
        {
            return Err(DirectoryError::rejected(
                rc::INSUFFICIENT_ACCESS_RIGHTS,
                "no write access to parent",
                "",
            ));
        }

        if dn.is_empty() || !dn.contains('=') {
            return Err(DirectoryError::rejected(rc::INVALID_DN_SYNTAX, "invalid DN", ""));
        }

        let key = normalize(dn);
        if state.entries.contains_key(&key) {
            return Err(DirectoryError::rejected(rc::ENTRY_ALREADY_EXISTS, "", ""));
        }

        if let Some(parent) = parent_dn(&key) {
            if !state.entries.contains_key(parent) {
                return Err(DirectoryError::rejected(
                    rc::NO_SUCH_OBJECT,
                    "parent does not exist",
                    "",
                ));
            }
        }

        let attrs = attrs
            .into_iter()
            .map(|(name, values)| {
                let mut values: Vec<String> = values.into_iter().collect();
                values.sort();
                (name, values)
            })
            .collect();

        state.entries.insert(
            key,
            MemoryEntry {
                dn: dn.to_string(),
                attrs,
            },
        );
        Ok(())
    }

    async fn unbind(&mut self) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        state.stats.unbinds += 1;
        self.bound_dn = None;
        state.take_failure(Operation::Unbind)
    }
}

fn normalize(dn: &str) -> String {
    dn.to_ascii_lowercase()
}

/// Everything after the first unescaped comma
fn parent_dn(dn: &str) -> Option<&str> {
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return Some(&dn[i + 1..]),
            _ => escaped = false,
        }
    }
    None
}

fn project(entry: &MemoryEntry, attrs: &[&str]) -> SearchEntry {
    let all = attrs.is_empty() || attrs.contains(&"*");
    let none = attrs == ["1.1"];

    let attrs = entry
        .attrs
        .iter()
        .filter(|_| !none)
        .filter(|(name, _)| all || attrs.iter().any(|a| a.eq_ignore_ascii_case(name)))
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect();

    SearchEntry {
        dn: entry.dn.clone(),
        attrs,
        bin_attrs: HashMap::new(),
    }
}

/// Search filter subset
#[derive(Debug, Clone, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
    Prefix(String, String),
}

impl Filter {
    fn parse(input: &str) -> Option<Filter> {
        let mut pos = 0;
        let filter = Self::parse_at(input.trim().as_bytes(), &mut pos)?;
        (pos == input.trim().len()).then_some(filter)
    }

    fn parse_at(input: &[u8], pos: &mut usize) -> Option<Filter> {
        if input.get(*pos) != Some(&b'(') {
            return None;
        }
        *pos += 1;

        let filter = match *input.get(*pos)? {
            op @ (b'&' | b'|') => {
                let is_and = op == b'&';
                *pos += 1;
                let mut parts = Vec::new();
                while input.get(*pos) == Some(&b'(') {
                    parts.push(Self::parse_at(input, pos)?);
                }
                if is_and {
                    Filter::And(parts)
                } else {
                    Filter::Or(parts)
                }
            }
            b'!' => {
                *pos += 1;
                Filter::Not(Box::new(Self::parse_at(input, pos)?))
            }
            _ => {
                let start = *pos;
                while input.get(*pos).is_some_and(|&b| b != b')') {
                    *pos += 1;
                }
                let item = std::str::from_utf8(&input[start..*pos]).ok()?;
                Self::parse_item(item)?
            }
        };

        if input.get(*pos) != Some(&b')') {
            return None;
        }
        *pos += 1;
        Some(filter)
    }

    fn parse_item(item: &str) -> Option<Filter> {
        let (attr, value) = item.split_once('=')?;
        if attr.is_empty() {
            return None;
        }
        let attr = attr.to_string();

        if value == "*" {
            return Some(Filter::Present(attr));
        }
        match value.strip_suffix('*') {
            Some(prefix) if !prefix.contains('*') => Some(Filter::Prefix(attr, unescape(prefix)?)),
            Some(_) => None,
            None if value.contains('*') => None,
            None => Some(Filter::Equal(attr, unescape(value)?)),
        }
    }

    fn matches(&self, entry: &MemoryEntry) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|f| f.matches(entry)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass") || entry.values(attr).is_some()
            }
            Filter::Equal(attr, expected) => entry
                .values(attr)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(expected))),
            Filter::Prefix(attr, prefix) => entry.values(attr).is_some_and(|values| {
                values
                    .iter()
                    .any(|v| v.to_lowercase().starts_with(&prefix.to_lowercase()))
            }),
        }
    }
}

/// Decode RFC 4515 `\xx` escapes
fn unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
