//! In-memory directory
//!
//! A small directory that understands simple binds and equality,
//! presence, `&`, `|` and `!` filters. Used for local development
//! (`--directory-ldif`) and by the test suites.

use crate::directory::{
    Directory, DirectoryEntry, DirectoryError, DirectorySession, RC_INSUFFICIENT_ACCESS,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const PASSWORD_ATTRIBUTE: &str = "userPassword";

struct StoredEntry {
    entry: DirectoryEntry,
    password: Option<SecretString>,
}

struct Inner {
    entries: RwLock<Vec<StoredEntry>>,
    anonymous_search: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
}

/// Shared handle to an in-memory directory
#[derive(Clone)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(Vec::new()),
                anonymous_search: AtomicBool::new(true),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Load entries from LDIF content
    ///
    /// `userPassword` values become bind passwords. Base64 (`::`) values
    /// and folded lines are supported; change records are not.
    pub fn from_ldif(content: &str) -> Result<Self, DirectoryError> {
        let directory = Self::new();
        for record in parse_ldif(content)? {
            let password = record
                .attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE))
                .and_then(|(_, v)| v.first().cloned());

            let mut entry = DirectoryEntry::new(record.dn);
            entry.attributes = record
                .attributes
                .into_iter()
                .filter(|(k, _)| !k.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE))
                .collect();

            directory.insert(entry, password.map(SecretString::from));
        }

        debug!("Loaded {} entries from LDIF", directory.len());
        Ok(directory)
    }

    /// Add an entry with attributes and an optional bind password
    pub fn add_entry<'a>(
        &self,
        dn: &str,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
        password: Option<&str>,
    ) {
        let mut entry = DirectoryEntry::new(dn);
        for (name, value) in attributes {
            entry
                .attributes
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        self.insert(entry, password.map(|p| SecretString::from(p.to_string())));
    }

    /// Add a person entry `uid=<uid>,<parent_dn>`
    pub fn add_user(&self, parent_dn: &str, uid: &str, password: &str) -> String {
        let dn = format!("uid={},{}", uid, parent_dn);
        self.add_entry(
            &dn,
            [
                ("objectClass", "inetOrgPerson"),
                ("uid", uid),
                ("cn", uid),
                ("sn", uid),
            ],
            Some(password),
        );
        dn
    }

    /// Whether searches are allowed before any successful bind
    pub fn set_anonymous_search(&self, allowed: bool) {
        self.inner.anonymous_search.store(allowed, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sessions ever opened
    pub fn opened_sessions(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    /// Sessions explicitly closed
    pub fn closed_sessions(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Sessions currently alive (not yet dropped)
    pub fn active_sessions(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    fn insert(&self, entry: DirectoryEntry, password: Option<SecretString>) {
        self.inner
            .entries
            .write()
            .push(StoredEntry { entry, password });
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.active.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            bound: None,
            closed: false,
        }))
    }
}

struct MemorySession {
    inner: Arc<Inner>,
    bound: Option<String>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), DirectoryError> {
        if self.closed {
            return Err(DirectoryError::Protocol("Session is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.ensure_open()?;

        // Unauthenticated bind
        if dn.is_empty() && password.is_empty() {
            self.bound = None;
            return Ok(());
        }

        let entries = self.inner.entries.read();
        let matches = entries.iter().any(|stored| {
            stored.entry.dn.eq_ignore_ascii_case(dn)
                && stored
                    .password
                    .as_ref()
                    .is_some_and(|p| !password.is_empty() && p.expose_secret() == password)
        });

        if !matches {
            return Err(DirectoryError::invalid_credentials());
        }

        self.bound = Some(dn.to_string());
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.ensure_open()?;

        if self.bound.is_none() && !self.inner.anonymous_search.load(Ordering::SeqCst) {
            return Err(DirectoryError::Rejected {
                rc: RC_INSUFFICIENT_ACCESS,
                message: "Anonymous search is not allowed".to_string(),
            });
        }

        let filter = Filter::parse(filter)?;
        let entries = self.inner.entries.read();

        Ok(entries
            .iter()
            .filter(|stored| in_subtree(&stored.entry.dn, base_dn))
            .filter(|stored| filter.matches(&stored.entry))
            .map(|stored| stored.entry.clone())
            .collect())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.bound = None;
            self.inner.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn in_subtree(dn: &str, base_dn: &str) -> bool {
    let dn = dn.to_ascii_lowercase();
    let base = base_dn.to_ascii_lowercase();
    base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base))
}

// ============================================================================
// Filters
// ============================================================================

/// Search filter subset understood by the in-memory directory
///
/// Substring, ordering and approximate matches are not supported; a value
/// with an unescaped `*` other than a bare presence test is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Present(String),
}

impl Filter {
    fn parse(input: &str) -> Result<Self, DirectoryError> {
        let (filter, rest) = parse_component(input.trim())?;
        if !rest.trim().is_empty() {
            return Err(invalid_filter(input));
        }
        Ok(filter)
    }

    fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(entry)),
            Filter::Or(items) => items.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => {
                attr.eq_ignore_ascii_case("objectClass") || values(entry, attr).next().is_some()
            }
            Filter::Equal(attr, value) => {
                values(entry, attr).any(|v| v.eq_ignore_ascii_case(value))
            }
        }
    }
}

fn values<'a>(entry: &'a DirectoryEntry, attr: &'a str) -> impl Iterator<Item = &'a String> {
    entry
        .attributes
        .iter()
        .filter(move |(k, _)| k.eq_ignore_ascii_case(attr))
        .flat_map(|(_, v)| v.iter())
}

fn invalid_filter(input: &str) -> DirectoryError {
    DirectoryError::Protocol(format!("Invalid search filter: {}", input))
}

fn parse_component(input: &str) -> Result<(Filter, &str), DirectoryError> {
    let inner = input.strip_prefix('(').ok_or_else(|| invalid_filter(input))?;

    if let Some(rest) = inner.strip_prefix('&') {
        let (items, rest) = parse_list(rest)?;
        return Ok((Filter::And(items), rest));
    }
    if let Some(rest) = inner.strip_prefix('|') {
        let (items, rest) = parse_list(rest)?;
        return Ok((Filter::Or(items), rest));
    }
    if let Some(rest) = inner.strip_prefix('!') {
        let (item, rest) = parse_component(rest)?;
        let rest = rest.strip_prefix(')').ok_or_else(|| invalid_filter(input))?;
        return Ok((Filter::Not(Box::new(item)), rest));
    }

    // Escaped values never contain a raw ')'
    let end = inner.find(')').ok_or_else(|| invalid_filter(input))?;
    let (attr, value) = inner[..end]
        .split_once('=')
        .ok_or_else(|| invalid_filter(input))?;

    if attr.is_empty() {
        return Err(invalid_filter(input));
    }

    let filter = if value == "*" {
        Filter::Present(attr.to_string())
    } else if value.contains('*') {
        return Err(DirectoryError::Protocol(format!(
            "Substring filters are not supported: {}",
            input
        )));
    } else {
        Filter::Equal(attr.to_string(), unescape(value)?)
    };

    Ok((filter, &inner[end + 1..]))
}

fn parse_list(mut input: &str) -> Result<(Vec<Filter>, &str), DirectoryError> {
    let mut items = Vec::new();
    loop {
        if let Some(rest) = input.strip_prefix(')') {
            return Ok((items, rest));
        }
        if input.is_empty() {
            return Err(invalid_filter("unterminated filter list"));
        }
        let (item, rest) = parse_component(input)?;
        items.push(item);
        input = rest;
    }
}

/// Decode RFC 4515 `\XX` escapes
fn unescape(value: &str) -> Result<String, DirectoryError> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let byte = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| invalid_filter(value))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).map_err(|_| invalid_filter(value))
}

// ============================================================================
// LDIF
// ============================================================================

struct LdifRecord {
    dn: String,
    attributes: HashMap<String, Vec<String>>,
}

fn parse_ldif(content: &str) -> Result<Vec<LdifRecord>, DirectoryError> {
    // Unfold continuation lines (leading single space)
    let mut lines: Vec<String> = Vec::new();
    for line in content.lines() {
        if let Some(continued) = line.strip_prefix(' ') {
            match lines.last_mut() {
                Some(last) if !last.is_empty() => last.push_str(continued),
                _ => return Err(ldif_error("continuation line without a preceding line")),
            }
        } else {
            lines.push(line.trim_end().to_string());
        }
    }

    let mut records = Vec::new();
    let mut current: Option<LdifRecord> = None;

    for line in lines {
        if line.starts_with('#') {
            continue;
        }
        if line.is_empty() {
            if let Some(record) = current.take() {
                records.push(record);
            }
            continue;
        }

        let (name, value) = parse_ldif_line(&line)?;

        if name.eq_ignore_ascii_case("version") && current.is_none() {
            continue;
        }

        if name.eq_ignore_ascii_case("dn") {
            if let Some(record) = current.take() {
                records.push(record);
            }
            current = Some(LdifRecord {
                dn: value,
                attributes: HashMap::new(),
            });
            continue;
        }

        if name.eq_ignore_ascii_case("changetype") {
            return Err(ldif_error("change records are not supported"));
        }

        let record = current
            .as_mut()
            .ok_or_else(|| ldif_error(&format!("attribute '{}' before dn", name)))?;
        record.attributes.entry(name).or_default().push(value);
    }

    if let Some(record) = current.take() {
        records.push(record);
    }

    Ok(records)
}

fn parse_ldif_line(line: &str) -> Result<(String, String), DirectoryError> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| ldif_error(&format!("malformed line '{}'", line)))?;

    let value = if let Some(encoded) = rest.strip_prefix(':') {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| ldif_error(&format!("invalid base64 value for '{}'", name)))?;
        String::from_utf8(decoded)
            .map_err(|_| ldif_error(&format!("non UTF-8 value for '{}'", name)))?
    } else {
        rest.trim_start().to_string()
    };

    Ok((name.trim().to_string(), value))
}

fn ldif_error(message: &str) -> DirectoryError {
    DirectoryError::Protocol(format!("Invalid LDIF: {}", message))
}
