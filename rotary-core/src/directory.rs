//! Contact directory: spoken name → phone number.
//!
//! The on-disk format is a flat properties file:
//!
//! ```text
//! # family
//! alice = +15551234
//! Bob: 555 0100
//! ```
//!
//! Keys are matched case-insensitively after trimming. The directory is read
//! once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{PhoneError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: HashMap<String, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.into()))
            .collect();
        Self { entries }
    }

    /// Parse properties text. Later duplicates override earlier ones.
    ///
    /// # Errors
    /// `PhoneError::Directory` for a line with no `=`/`:` separator or an
    /// empty name or number. Line numbers are 1-based.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some(split) = line.find(['=', ':']) else {
                return Err(PhoneError::Directory {
                    line: idx + 1,
                    reason: "expected `name = number`".into(),
                });
            };
            let key = normalize_key(&line[..split]);
            let value = line[split + 1..].trim();
            if key.is_empty() || value.is_empty() {
                return Err(PhoneError::Directory {
                    line: idx + 1,
                    reason: "empty name or number".into(),
                });
            }
            entries.insert(key, value.to_string());
        }
        Ok(Self { entries })
    }

    /// Read and parse a directory file.
    ///
    /// # Errors
    /// I/O failures and parse errors from [`Directory::parse`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let directory = Self::parse(&text)?;
        debug!(path = %path.display(), contacts = directory.len(), "directory loaded");
        Ok(directory)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_key(name))
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.entries.get(&normalize_key(name)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Contact names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}
