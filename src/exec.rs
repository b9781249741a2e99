//! The subshell executor contract.
//!
//! Command substitution hands the text between parentheses to the embedding shell, which runs it
//! and reports one list element per output line. The engine never spawns processes itself.

use crate::wchar::prelude::*;
use libc::c_int;

/// The status code used for normal exit in a command.
pub const STATUS_CMD_OK: c_int = 0;
/// The status code used for failure exit in a command.
pub const STATUS_CMD_ERROR: c_int = 1;
/// The status code used when a command was not found.
pub const STATUS_CMD_UNKNOWN: c_int = 127;
/// The status code used when a command substitution emitted more output than the cap allows.
pub const STATUS_READ_TOO_MUCH: c_int = 122;
/// The status code used when expansion fails.
pub const STATUS_EXPAND_ERROR: c_int = 121;

/// Executes command substitutions on behalf of the expansion engine.
pub trait SubshellExecutor {
    /// Run `cmd` in a subshell, appending one element per line of its output to `outputs` with
    /// the trailing newline stripped. If `apply_exit_status` is set, the subshell's exit status
    /// becomes the shell's `$status`. `is_subcmd` marks the invocation as a nested command so
    /// the output cap applies. Returns -1 on failure to run the substitution at all.
    fn exec_subshell(
        &self,
        cmd: &wstr,
        outputs: &mut Vec<WString>,
        apply_exit_status: bool,
        is_subcmd: bool,
    ) -> c_int;

    /// The status of the most recent subshell. A value of [`STATUS_READ_TOO_MUCH`] means the
    /// output exceeded the size cap and was discarded.
    fn last_status(&self) -> c_int;
}
