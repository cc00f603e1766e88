//! Variable scopes.
//!
//! Global variables are declared by the experiment and are read-only inside
//! phases. Every name a phase assigns to is a local variable of that phase,
//! owned by each subject's phase instance.

use indexmap::IndexMap;

use crate::expr::{Environment, Value};

/// Words that cannot be used as variable, stimulus element or behavior names.
pub const KEYWORDS: &[&str] = &[
    "and",
    "or",
    "not",
    "True",
    "False",
    "true",
    "false",
    "count",
    "count_line",
    "count_reset",
    "rand",
    "stop",
];

/// Returns `true` if `name` is a bare identifier: a letter or `_` followed by
/// letters, digits or `_`.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Returns `true` if `name` is reserved by the expression language.
#[must_use]
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// An ordered name → value scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    values: IndexMap<String, Value>,
}

impl Variables {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope binding every name to integer zero.
    #[must_use]
    pub fn zeroed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: names
                .into_iter()
                .map(|name| (name.into(), Value::Int(0)))
                .collect(),
        }
    }

    /// Value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    /// Binds `name` to `value`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read-only view of `global` and `local` together, `local` shadowing
    /// `global`.
    #[must_use]
    pub const fn join<'a>(global: &'a Self, local: &'a Self) -> Scope<'a> {
        Scope { global, local }
    }
}

impl Environment for Variables {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

/// Joined global and local variables. See [`Variables::join`].
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    global: &'a Variables,
    local: &'a Variables,
}

impl Scope<'_> {
    /// Value of `name`, looking in the local scope first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.local.get(name).or_else(|| self.global.get(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.local.contains(name) || self.global.contains(name)
    }
}

impl Environment for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}
