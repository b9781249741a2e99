//! The process-wide abbreviation map.
//!
//! Abbreviations arrive through specially named variables: a variable `_fish_abbr_<key>` holds
//! the expansion for `<key>`, where `<key>` is var-style encoded. The cache is updated whenever
//! such a variable changes and is consulted directly, outside the expansion pipeline.

use crate::common::{unescape_string, UnescapeStringStyle};
use crate::env::Environment;
use crate::wchar::prelude::*;
use crate::FLOG;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

/// The prefix of variables which carry abbreviations.
pub const ABBR_VAR_PREFIX: &wstr = L!("_fish_abbr_");

static ABBREVIATIONS: Lazy<Mutex<HashMap<WString, WString>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Run a callback over the abbreviation map.
pub fn with_abbrs<R>(cb: impl FnOnce(&HashMap<WString, WString>) -> R) -> R {
    let abbrs = ABBREVIATIONS.lock().unwrap();
    cb(&abbrs)
}

/// Update the cache for the abbreviation behind `varname`, which must begin with
/// [`ABBR_VAR_PREFIX`]. An op of "ERASE" removes the entry; any other op re-reads the variable
/// from `vars`. A missing or empty variable also removes the entry.
pub fn update_abbr_cache(op: &wstr, varname: &wstr, vars: &dyn Environment) {
    let Some(encoded_key) = varname.as_char_slice().strip_prefix(ABBR_VAR_PREFIX.as_char_slice())
    else {
        return;
    };
    let Some(abbr) = unescape_string(wstr::from_char_slice(encoded_key), UnescapeStringStyle::Var)
    else {
        FLOG!(
            abbrs,
            format!("Abbreviation var '{varname}' is not correctly encoded, ignoring it.")
        );
        return;
    };

    let mut abbrs = ABBREVIATIONS.lock().unwrap();
    abbrs.remove(&abbr);
    if op != "ERASE" {
        if let Some(expansion) = vars.get_unless_empty(varname) {
            abbrs.insert(abbr, expansion.as_string());
        }
    }
}

/// If `src` names an abbreviation, store its expansion in `output` and return true.
pub fn expand_abbreviation(src: &wstr, output: Option<&mut WString>) -> bool {
    if src.is_empty() {
        return false;
    }

    let abbrs = ABBREVIATIONS.lock().unwrap();
    let Some(expansion) = abbrs.get(src) else {
        return false;
    };
    if let Some(output) = output {
        *output = expansion.clone();
    }
    true
}
