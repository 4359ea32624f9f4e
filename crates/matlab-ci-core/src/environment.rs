//! Environment variable maps handed to the MATLAB process.
//!
//! Variable references follow the CI host's macro syntax: `$NAME`, `${NAME}`
//! and `${a.b}` are references, `$$` is an escaped dollar sign.

use std::collections::BTreeMap;
use std::env;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::installation::OsFamily;

/// Matches a variable reference or an escaped dollar.
static VARIABLE: LazyLock<Regex> =
    LazyLock::new(
        || match Regex::new(r"\$([A-Za-z0-9_]+|\{[A-Za-z0-9_.]+\}|\$)") {
            Ok(regex) => regex,
            Err(err) => panic!("Variable regex is invalid: {err}"),
        },
    );

const PATH_KEY: &str = "PATH";

/// Returns true when `text` still references a variable that has not been substituted.
pub fn has_placeholder(text: &str) -> bool {
    VARIABLE
        .captures_iter(text)
        .any(|captures| &captures[1] != "$")
}

/// Ordered environment map for a single invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the environment of the current process.
    ///
    /// Names and values that are not valid Unicode are converted lossily.
    pub fn from_process() -> Self {
        env::vars_os()
            .map(|(key, value)| {
                (
                    key.to_string_lossy().into_owned(),
                    value.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    /// Returns the value of a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Sets a variable, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`Environment::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Iterates over all variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Expands variable references in `text`.
    ///
    /// Unknown variables are left untouched so the result can still be checked
    /// with [`has_placeholder`].
    pub fn expand(&self, text: &str) -> String {
        VARIABLE
            .replace_all(text, |captures: &Captures<'_>| {
                let name = &captures[1];
                if name == "$" {
                    return "$".to_owned();
                }
                let key = name.trim_start_matches('{').trim_end_matches('}');
                self.vars
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| captures[0].to_owned())
            })
            .into_owned()
    }

    /// Puts `dir` in front of the search path.
    pub fn prepend_path(&mut self, dir: &str, os: OsFamily) {
        let key = self.path_key();
        self.prepend_to(key, dir, os);
    }

    /// Puts `dir` in front of the path list stored under `key`.
    pub fn prepend_to(&mut self, key: impl Into<String>, dir: &str, os: OsFamily) {
        let key = key.into();
        let value = match self.vars.get(&key) {
            Some(existing) if !existing.is_empty() => {
                format!("{dir}{sep}{existing}", sep = os.path_list_separator())
            }
            _ => dir.to_owned(),
        };
        self.vars.insert(key, value);
    }

    /// Windows keeps the search path under `Path`, so reuse whatever spelling exists.
    fn path_key(&self) -> String {
        self.vars
            .keys()
            .find(|key| key.eq_ignore_ascii_case(PATH_KEY))
            .cloned()
            .unwrap_or_else(|| PATH_KEY.to_owned())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
