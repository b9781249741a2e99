//! An argument expansion engine for an interactive shell.
//!
//! Given a single raw argument token, the engine produces zero or more fully
//! expanded argument strings by composing command substitution, variable
//! expansion with slicing, brace alternation, tilde expansion, job/process
//! (`%`) expansion and wildcard matching. The tokenizer, the environment, the
//! subshell executor, the job table and the filesystem matcher are
//! collaborators owned by the embedding shell; this crate defines their
//! contracts and everything in between.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::comparison_chain)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::uninlined_format_args)]

#[macro_use]
pub mod wchar;
#[macro_use]
pub mod wutil;
#[macro_use]
pub mod flog;

pub mod abbrs;
pub mod common;
pub mod complete;
pub mod env;
pub mod exec;
pub mod expand;
pub mod history;
pub mod operation_context;
pub mod parse_constants;
pub mod path;
pub mod proc;
pub mod process_iterator;
pub mod threads;
pub mod tokenizer;
pub mod util;
pub mod wchar_ext;
pub mod wcstringutil;
pub mod wildcard;

#[cfg(test)]
mod tests;
