//! The read side of the environment store.
//!
//! The engine only ever reads variables; mutation, scoping and export belong to the embedding
//! shell. An implementation of [`Environment`] is expected to be safe to read from any thread.

use crate::wchar::prelude::*;
use crate::wcstringutil::join_strings;
use std::sync::Arc;

/// EnvVar is an immutable value-type data structure representing the value of an environment
/// variable: an ordered sequence of strings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvVar {
    /// The list of values in this variable.
    /// Arc allows for cheap copying.
    values: Arc<[WString]>,
}

impl Default for EnvVar {
    fn default() -> Self {
        use std::sync::OnceLock;
        /// A shared read-only empty list.
        static EMPTY_LIST: OnceLock<Arc<[WString]>> = OnceLock::new();
        let empty_list = EMPTY_LIST.get_or_init(|| Arc::new([]));

        EnvVar {
            values: Arc::clone(empty_list),
        }
    }
}

impl EnvVar {
    /// Creates a new `EnvVar` with a single value.
    pub fn new(value: WString) -> Self {
        Self::new_vec(vec![value])
    }

    /// Creates a new `EnvVar` from a list of values.
    pub fn new_vec(values: Vec<WString>) -> Self {
        EnvVar {
            values: values.into(),
        }
    }

    /// Returns whether the variable has no values or a single empty value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() || (self.values.len() == 1 && self.values[0].is_empty())
    }

    /// Returns the list of values.
    pub fn as_list(&self) -> &[WString] {
        &self.values
    }

    /// Returns the value list joined with single spaces, the "single expansion" form.
    pub fn as_string(&self) -> WString {
        join_strings(&self.values, ' ')
    }
}

/// A read-only environment: a mapping from variable names to value sequences.
pub trait Environment {
    /// Get a variable by name.
    fn get(&self, name: &wstr) -> Option<EnvVar>;

    /// Get a variable by name, unless it is empty.
    fn get_unless_empty(&self, name: &wstr) -> Option<EnvVar> {
        let var = self.get(name)?;
        if !var.is_empty() {
            return Some(var);
        }
        None
    }

    /// Returns $PWD with a terminating slash, or "/" if PWD is unset.
    fn get_pwd_slash(&self) -> WString {
        let Some(var) = self.get_unless_empty(L!("PWD")) else {
            return WString::from("/");
        };
        let mut pwd = var.as_string();
        if !pwd.ends_with('/') {
            pwd.push('/');
        }
        pwd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var() {
        let var = EnvVar::new_vec(vec![L!("a").to_owned(), L!("b c").to_owned()]);
        assert_eq!(var.as_string(), "a b c");
        assert!(!var.is_empty());
        assert!(EnvVar::default().is_empty());
        assert!(EnvVar::new(WString::new()).is_empty());
    }
}
