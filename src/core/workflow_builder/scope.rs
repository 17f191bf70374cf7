//! Named declaration registries.
//!
//! Every namespace in a workflow (workflow parameters, template names, template
//! inputs and outputs, step and task names, container env vars) is a [`Scope`].
//! Scopes only grow; a name that collides case-insensitively with an existing one
//! is rejected at the call that tried to declare it.

use crate::core::error::{BuildError, BuildResult};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("name pattern is valid")
    })
}

/// Reject names the engine cannot address inside `{{...}}` tokens.
pub fn validate_name(namespace: &str, name: &str) -> BuildResult<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(BuildError::declaration(
            "WFB-DECL-004",
            format!(
                "invalid {} name '{}': use letters, digits, '_', '-' or '.'",
                namespace, name
            ),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope<T> {
    namespace: &'static str,
    entries: IndexMap<String, T>,
}

impl<T> Scope<T> {
    pub fn new(namespace: &'static str) -> Self {
        Scope {
            namespace,
            entries: IndexMap::new(),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The existing name that `name` would collide with, if any.
    pub fn find_conflict(&self, name: &str) -> Option<&str> {
        self.entries
            .keys()
            .find(|existing| existing.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Look up a declared name, listing what is available when it is missing.
    pub fn require(&self, name: &str) -> BuildResult<&T> {
        self.entries.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.names().collect();
            BuildError::declaration(
                "WFB-DECL-002",
                format!(
                    "unknown {} '{}'; declared: [{}]",
                    self.namespace,
                    name,
                    available.join(", ")
                ),
            )
        })
    }

    /// Fail if `name` is malformed or would collide with an existing entry.
    pub fn check_available(&self, name: &str) -> BuildResult<()> {
        validate_name(self.namespace, name)?;
        match self.find_conflict(name) {
            Some(existing) => Err(BuildError::declaration(
                "WFB-DECL-001",
                format!(
                    "duplicate {} name '{}' (already declared as '{}')",
                    self.namespace, name, existing
                ),
            )),
            None => Ok(()),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: T) -> BuildResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.entries.insert(name, value);
        Ok(())
    }

    /// Persistent-style insert: consumes the scope and returns the extended one.
    pub fn with(mut self, name: impl Into<String>, value: T) -> BuildResult<Self> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `base ∪ delta`, failing on the first delta key that already exists in `base`.
pub fn extend_scope<T: Clone>(base: &Scope<T>, delta: &Scope<T>) -> BuildResult<Scope<T>> {
    let mut merged = base.clone();
    for (name, value) in delta.iter() {
        merged.insert(name, value.clone())?;
    }
    Ok(merged)
}
