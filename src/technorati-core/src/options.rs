//! Caller-supplied query options and whitelist validation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered, duplicate-free mapping of option name to value.
///
/// Order follows the caller's insertion order. Inserting a name that is
/// already present replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSet {
    entries: Vec<(String, String)>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Option names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Append every entry of `other`, replacing values for names already present.
    pub fn extend_from(&mut self, other: &OptionSet) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for OptionSet
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

/// What to do with an option the query does not accept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionPolicy {
    /// Fail the call with [`Error::UnsupportedOption`] before any I/O.
    #[default]
    Strict,
    /// Drop the option, log a warning and carry on with the rest.
    Lenient,
}

/// Filter `options` against `whitelist`.
///
/// `None` means the caller gave no options; validation is skipped and the
/// result is empty. Accepted options keep their relative order.
pub fn validate(
    query: &str,
    options: Option<&OptionSet>,
    whitelist: &[&str],
    policy: OptionPolicy,
) -> Result<OptionSet> {
    let Some(options) = options else {
        return Ok(OptionSet::new());
    };

    let mut accepted = OptionSet::new();
    for (name, value) in options.iter() {
        if whitelist.contains(&name) {
            accepted.insert(name, value);
            continue;
        }
        match policy {
            OptionPolicy::Strict => {
                return Err(Error::UnsupportedOption {
                    query: query.to_string(),
                    option: name.to_string(),
                });
            }
            OptionPolicy::Lenient => {
                tracing::warn!(query, option = name, "Dropping unsupported option");
            }
        }
    }

    Ok(accepted)
}
