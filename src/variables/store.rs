// ABOUTME: Case-insensitive, thread-safe variable store with read-only protection
// ABOUTME: Expands %NAME% references in text against the current values

use indexmap::IndexMap;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::ReadOnlyVariableError;

pub(crate) fn fold_case(value: &str) -> String {
    value.to_uppercase()
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"%([^%\s](?:[^%\r\n]*[^%\s])?)%").expect("valid reference pattern")
    })
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: IndexMap<String, Entry>,
    read_only: HashSet<String>,
}

/// Name lookups ignore case; the first spelling a variable was stored under is the one
/// reported by [`VariableStore::snapshot`].
#[derive(Debug, Default)]
pub struct VariableStore {
    state: RwLock<StoreState>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value, or an empty string when the variable is not set.
    pub fn get(&self, name: &str) -> String {
        self.read()
            .entries
            .get(&fold_case(name))
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, name: &str, value: impl Into<String>) -> Result<(), ReadOnlyVariableError> {
        let key = fold_case(name);
        let mut state = self.write();
        if state.read_only.contains(&key) {
            return Err(ReadOnlyVariableError {
                name: name.to_string(),
            });
        }
        Self::insert(&mut state, key, name, value.into());
        Ok(())
    }

    /// Stores the value and protects the name from later writes. Re-marking an already
    /// protected name replaces its value.
    pub fn set_read_only(&self, name: &str, value: impl Into<String>) {
        let key = fold_case(name);
        let mut state = self.write();
        Self::insert(&mut state, key.clone(), name, value.into());
        state.read_only.insert(key);
    }

    fn insert(state: &mut StoreState, key: String, name: &str, value: String) {
        match state.entries.get_mut(&key) {
            Some(entry) => entry.value = value,
            None => {
                state.entries.insert(
                    key,
                    Entry {
                        name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.read().entries.contains_key(&fold_case(name))
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.read().read_only.contains(&fold_case(name))
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Copy of every variable, keyed by the spelling it was first stored under.
    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.read()
            .entries
            .values()
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .collect()
    }

    /// Drops all variables and all read-only marks.
    pub fn clear(&self) {
        let mut state = self.write();
        state.entries.clear();
        state.read_only.clear();
    }

    /// Replaces each well-formed `%NAME%` with the variable's value, or with nothing when
    /// the variable is unset. A name is any text without `%` or line breaks that neither
    /// starts nor ends with whitespace. Substituted values are not expanded again.
    pub fn expand(&self, text: &str) -> String {
        if !text.contains('%') {
            return text.to_string();
        }

        let state = self.read();
        reference_pattern()
            .replace_all(text, |caps: &Captures<'_>| {
                state
                    .entries
                    .get(&fold_case(&caps[1]))
                    .map(|entry| entry.value.clone())
                    .unwrap_or_default()
            })
            .into_owned()
    }
}
