//! String expansion functions. These functions perform several kinds of parameter expansion:
//! command substitution, variable expansion with slicing, brace alternation, tilde expansion,
//! job/process (`%`) expansion and wildcard matching, composed as a pipeline of stages over a
//! list of candidate strings.

use crate::common::{
    char_offset, charptr2wcstring, escape, escape_string, unescape_string, valid_var_name_char,
    wcs2zstring, EscapeFlags, EscapeStringStyle, UnescapeFlags, UnescapeStringStyle,
    EXPAND_RESERVED_BASE, EXPAND_RESERVED_END,
};
use crate::complete::{CompleteFlags, Completion, CompletionList, CompletionReceiver};
use crate::env::{EnvVar, Environment};
use crate::exec::STATUS_READ_TOO_MUCH;
use crate::operation_context::OperationContext;
use crate::parse_constants::{ParseError, ParseErrorCode, ParseErrorList, SOURCE_LOCATION_UNKNOWN};
use crate::path::path_apply_working_directory;
use crate::proc::{getpid, job_get, proc_last_bg_pid, with_jobs};
use crate::process_iterator::ProcessIterator;
use crate::threads::{is_main_thread, perform_on_main};
use crate::tokenizer::{locate_cmdsubst_range, MaybeParentheses};
use crate::util::wcsfilecmp_glob;
use crate::wchar::prelude::*;
use crate::wcstringutil::join_strings;
use crate::wildcard::{wildcard_has_internal, ANY_CHAR, ANY_STRING, ANY_STRING_RECURSIVE};
use crate::wutil::{wbasename, wcstoi_partial, wrealpath, Options};
use bitflags::bitflags;
use std::mem::MaybeUninit;

bitflags! {
    /// Set of flags controlling expansions.
    #[derive(Copy, Clone, Default)]
    pub struct ExpandFlags : u16 {
        /// Disallow command substitution; detecting one is an error.
        const SKIP_CMDSUBST = 1 << 0;
        /// Skip variable expansion.
        const SKIP_VARIABLES = 1 << 1;
        /// Skip wildcard expansion: wildcard markers become literal '?' and '*'.
        const SKIP_WILDCARDS = 1 << 2;
        /// The expansion is being done for tab or auto completions. Returned completions may
        /// have the wildcard as a prefix instead of a match.
        const FOR_COMPLETIONS = 1 << 3;
        /// Only match files that are executable by the current user.
        const EXECUTABLES_ONLY = 1 << 4;
        /// Skip tilde expansion, and tilde re-insertion afterwards.
        const SKIP_HOME_DIRECTORIES = 1 << 5;
        /// Skip the job-table portion of process expansion.
        const SKIP_JOBS = 1 << 6;
        /// Do expansions specifically to support cd. This means using CDPATH as a list of
        /// potential working directories.
        const SPECIAL_FOR_CD = 1 << 7;
        /// Do expansions specifically to support external command completions. This means using
        /// PATH as a list of potential working directories, for paths without a slash.
        const SPECIAL_FOR_COMMAND = 1 << 8;
        /// Emit completions without descriptive text.
        const NO_DESCRIPTIONS = 1 << 9;
    }
}

/// Character representing a home directory.
pub const HOME_DIRECTORY: char = char_offset(EXPAND_RESERVED_BASE, 0);
/// Character representing process expansion.
pub const PROCESS_EXPAND: char = char_offset(EXPAND_RESERVED_BASE, 1);
/// Character representing variable expansion.
pub const VARIABLE_EXPAND: char = char_offset(EXPAND_RESERVED_BASE, 2);
/// Character representing variable expansion into a single element.
pub const VARIABLE_EXPAND_SINGLE: char = char_offset(EXPAND_RESERVED_BASE, 3);
/// Character representing the start of a bracket expansion.
pub const BRACKET_BEGIN: char = char_offset(EXPAND_RESERVED_BASE, 4);
/// Character representing the end of a bracket expansion.
pub const BRACKET_END: char = char_offset(EXPAND_RESERVED_BASE, 5);
/// Character representing separation between two bracket elements.
pub const BRACKET_SEP: char = char_offset(EXPAND_RESERVED_BASE, 6);
/// Separate subtokens in a token with this character.
pub const INTERNAL_SEPARATOR: char = char_offset(EXPAND_RESERVED_BASE, 7);
/// Character representing an empty variable expansion. Only used transitively while expanding
/// variables.
pub const VARIABLE_EXPAND_EMPTY: char = char_offset(EXPAND_RESERVED_BASE, 8);

const _: () = assert!(
    EXPAND_RESERVED_END as u32 > VARIABLE_EXPAND_EMPTY as u32,
    "Characters used in expansions must stay within the reserved range"
);

/// These are the possible return values for expand_string.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExpandResult {
    /// There was an error, for example, unmatched brackets.
    error,
    /// Expansion succeeded.
    ok,
    /// Expansion succeeded, and a wildcard in the string matched some files.
    wildcard_match,
    /// Expansion succeeded, but a wildcard in the string matched no files, so the output is
    /// empty.
    wildcard_no_match,
}

/// String in process expansion denoting ourself.
const SELF_STR: &wstr = L!("self");

/// String in process expansion denoting the last backgrounded job.
const LAST_STR: &wstr = L!("last");

/// Perform various forms of expansion on `input`, such as tilde expansion (`~USER` becomes the
/// user's home directory), variable expansion (`$VAR_NAME` becomes the value of the environment
/// variable `VAR_NAME`), cmdsubst expansion and wildcard expansion. The results are inserted
/// into the list `out_completions`.
///
/// If the parameter does not need expansion, it is copied into the list unchanged.
///
/// `wildcard_no_match` and `wildcard_match` are normal exit conditions used only on strings
/// containing wildcards, to tell if the wildcard produced any matches.
pub fn expand_string(
    input: WString,
    out_completions: &mut CompletionList,
    flags: ExpandFlags,
    ctx: &OperationContext,
    errors: Option<&mut ParseErrorList>,
) -> ExpandResult {
    let mut completions = vec![];
    std::mem::swap(&mut completions, out_completions);
    let mut recv = CompletionReceiver::from_list(completions, ctx.expansion_limit);
    let result = Expander::expand_string(input, &mut recv, flags, ctx, errors);
    *out_completions = recv.take();
    result
}

/// expand_one is identical to expand_string, except it will fail if `s` expands to more than one
/// string. This is used for expanding command names.
///
/// Return whether expansion succeeded.
pub fn expand_one(
    s: &mut WString,
    flags: ExpandFlags,
    ctx: &OperationContext,
    errors: Option<&mut ParseErrorList>,
) -> bool {
    let mut completions = CompletionList::new();

    if !flags.contains(ExpandFlags::FOR_COMPLETIONS) && expand_is_clean(s) {
        return true;
    }

    let mut tmp = WString::new();
    std::mem::swap(s, &mut tmp);
    let res = expand_string(
        tmp,
        &mut completions,
        flags | ExpandFlags::NO_DESCRIPTIONS,
        ctx,
        errors,
    );
    if res != ExpandResult::error && completions.len() == 1 {
        std::mem::swap(s, &mut completions[0].completion);
        return true;
    }

    false
}

/// Expand a command string like $HOME/bin/cmd into a command and list of arguments. The command
/// and arguments are returned by reference. If the expansion resulted in no or an empty command,
/// the command will be an empty string. Note that this API does not distinguish between
/// expansion resulting in an empty command (''), and expansion resulting in no command (e.g.
/// unset variable).
///
/// If `skip_wildcards` is true, then do not do wildcard expansion.
pub fn expand_to_command_and_args(
    instr: &wstr,
    ctx: &OperationContext<'_>,
    out_cmd: &mut WString,
    mut out_args: Option<&mut Vec<WString>>,
    errors: Option<&mut ParseErrorList>,
    skip_wildcards: bool,
) -> ExpandResult {
    // Fast path.
    if expand_is_clean(instr) {
        *out_cmd = instr.to_owned();
        return ExpandResult::ok;
    }

    let mut eflags = ExpandFlags::SKIP_CMDSUBST;
    if skip_wildcards {
        eflags |= ExpandFlags::SKIP_WILDCARDS;
    }

    let mut completions = CompletionList::new();
    let expand_err = expand_string(instr.to_owned(), &mut completions, eflags, ctx, errors);
    if matches!(expand_err, ExpandResult::ok | ExpandResult::wildcard_match) {
        // The first completion is the command, any remaining are arguments.
        let mut completions = completions.into_iter();
        if let Some(comp) = completions.next() {
            *out_cmd = comp.completion;
        }
        if let Some(ref mut out_args) = out_args {
            for comp in completions {
                out_args.push(comp.completion);
            }
        }
    }

    expand_err
}

/// Convert the variable value to a human readable form, i.e. escape things, handle arrays, etc.
/// Suitable for pretty-printing.
pub fn expand_escape_variable(var: &EnvVar) -> WString {
    let mut buff = WString::new();

    let lst = var.as_list();
    for el in lst {
        if !buff.is_empty() {
            buff.push_str("  ");
        }

        // We want to use quotes if we have more than one string, or the string contains a space.
        let prefer_quotes = lst.len() > 1 || el.contains(' ');
        if prefer_quotes && is_quotable(el) {
            buff.push('\'');
            buff.push_utfstr(el);
            buff.push('\'');
        } else {
            buff.push_utfstr(&escape(el));
        }
    }
    buff
}

/// Convert a string value to a human readable form, i.e. escape things, handle arrays, etc.
/// Suitable for pretty-printing.
pub fn expand_escape_string(el: &wstr) -> WString {
    let mut buff = WString::new();
    let prefer_quotes = el.contains(' ');
    if prefer_quotes && is_quotable(el) {
        buff.push('\'');
        buff.push_utfstr(el);
        buff.push('\'');
    } else {
        buff.push_utfstr(&escape(el));
    }
    buff
}

/// Perform tilde expansion and nothing else on the specified string, which is modified in place.
pub fn expand_tilde(input: &mut WString, vars: &dyn Environment) {
    if input.chars().next() == Some('~') {
        input.replace_range(0..1, wstr::from_char_slice(&[HOME_DIRECTORY]));
        expand_home_directory(input, vars);
    }
}

/// Perform the opposite of tilde expansion on the string, for display purposes.
pub fn replace_home_directory_with_tilde(s: &wstr, vars: &dyn Environment) -> WString {
    let mut result = s.to_owned();
    // Only absolute paths get this treatment.
    if result.starts_with("/") {
        let mut home_directory = L!("~").to_owned();
        expand_tilde(&mut home_directory, vars);
        // If we can't get a home directory, don't replace anything.
        if home_directory.is_empty() {
            return result;
        }
        if !home_directory.ends_with('/') {
            home_directory.push('/');
        }

        // Now check if the home_directory prefixes the string.
        if result.starts_with(&home_directory) {
            // Success
            result.replace_range(0..home_directory.len(), L!("~/"));
        }
    }
    result
}

/// Characters which make a string unclean if they are the first character of the string. See
/// [`expand_is_clean()`].
const UNCLEAN_FIRST: &wstr = L!("~%");
/// Unclean characters. See [`expand_is_clean()`].
const UNCLEAN: &wstr = L!("$*?\\\"'({})");

/// Test if the specified argument is clean, i.e. it does not contain any tokens which need to be
/// expanded or otherwise altered. Clean strings can be passed through expand_string and
/// expand_one without changing them. About two thirds of all strings are clean, so skipping
/// expansion on them actually does save a small amount of time, since it avoids multiple memory
/// allocations during the expansion process.
fn expand_is_clean(input: &wstr) -> bool {
    if input.is_empty() {
        return true;
    }

    // Test characters that have a special meaning in the first character position.
    if UNCLEAN_FIRST.contains(input.as_char_slice()[0]) {
        return false;
    }

    // Test characters that have a special meaning in any character position.
    !input.chars().any(|c| UNCLEAN.contains(c))
}

/// Append a syntax error to the given error list.
macro_rules! append_syntax_error {
    (
        $errors:expr, $source_start:expr,
        $fmt:expr $(, $arg:expr )* $(,)?
    ) => {
        if let Some(ref mut errors) = $errors {
            let mut error = ParseError::default();
            error.source_start = $source_start;
            error.source_length = 0;
            error.code = ParseErrorCode::syntax;
            error.text = wgettext_fmt!($fmt $(, $arg)*);
            errors.push(error);
        }
    }
}

/// Append a cmdsub error to the given error list. But only do so if the error hasn't already
/// been recorded. This is needed because command substitution is a recursive process and some
/// errors could consequently be recorded more than once.
macro_rules! append_cmdsub_error {
    (
        $errors:expr, $source_start:expr,
        $fmt:expr $(, $arg:expr )* $(,)?
    ) => {
        if let Some(ref mut errors) = $errors {
            let mut error = ParseError::default();
            error.source_start = $source_start;
            error.source_length = 0;
            error.code = ParseErrorCode::cmdsubst;
            error.text = wgettext_fmt!($fmt $(, $arg)*);
            if !errors.iter().any(|e| e.text == error.text) {
                errors.push(error);
            }
        }
    }
}

/// Append an overflow error, when expansion produces too much data.
fn append_overflow_error(
    errors: &mut Option<&mut ParseErrorList>,
    source_start: Option<usize>,
) -> ExpandResult {
    if let Some(ref mut errors) = errors {
        let mut error = ParseError::default();
        error.source_start = source_start.unwrap_or(SOURCE_LOCATION_UNKNOWN);
        error.source_length = 0;
        error.code = ParseErrorCode::generic;
        error.text = wgettext!("Expansion produced too many results").to_owned();
        errors.push(error);
    }
    ExpandResult::error
}

/// Test if the specified string does not contain character which can not be used inside a quoted
/// string.
fn is_quotable(s: &wstr) -> bool {
    !s.chars().any(|c| "\n\t\r\x08\x1B".contains(c))
}

/// Parse an array slicing specification.
///
/// Indices are 1-based; a negative index means size + index + 1, so -1 names the last element.
/// A range `a..b` is inclusive on both ends and runs in whichever direction its endpoints
/// suggest; a range whose endpoints both exceed the size is skipped entirely, otherwise each
/// endpoint is clamped to the size. Parsed indices are appended to `idx`, with the source
/// position of each appended to `source_positions` for diagnostics.
///
/// Returns the offset just past the closing bracket, or Err with the offset of the bad token.
fn parse_slice(
    input: &wstr,
    idx: &mut Vec<i64>,
    source_positions: &mut Vec<usize>,
    array_size: usize,
) -> Result<usize, usize> {
    let size = i64::try_from(array_size).unwrap();
    let mut pos = 1; // skip past the opening square bracket

    loop {
        while input.char_at(pos).is_whitespace() || input.char_at(pos) == INTERNAL_SEPARATOR {
            pos += 1;
        }
        if input.char_at(pos) == ']' {
            pos += 1;
            break;
        }

        let i1_src_pos = pos;
        let mut consumed = 0;
        let options = Options { mradix: Some(10) };
        let tmp = match wcstoi_partial(input.slice_from(pos), options, &mut consumed) {
            Ok(tmp) => {
                pos += consumed;
                tmp
            }
            Err(_error) => {
                return Err(pos);
            }
        };

        let i1 = if tmp > -1 { tmp } else { size + tmp + 1 };
        while input.char_at(pos) == INTERNAL_SEPARATOR {
            pos += 1;
        }
        if input.char_at(pos) == '.' && input.char_at(pos + 1) == '.' {
            pos += 2;
            while input.char_at(pos) == INTERNAL_SEPARATOR {
                pos += 1;
            }

            let number_start = pos;
            let mut consumed = 0;
            let tmp1 = match wcstoi_partial(input.slice_from(pos), options, &mut consumed) {
                Ok(tmp1) => {
                    pos += consumed;
                    tmp1
                }
                Err(_error) => {
                    return Err(pos);
                }
            };

            let i2 = if tmp1 > -1 { tmp1 } else { size + tmp1 + 1 };
            // Skip sequences that are entirely outside.
            // This means "17..18" expands to nothing if there are less than 17 elements.
            if i1 > size && i2 > size {
                continue;
            }
            let i1 = i1.min(size);
            let i2 = i2.min(size);
            let direction = if i2 < i1 { -1 } else { 1 };
            let mut jjj = i1;
            while jjj * direction <= i2 * direction {
                idx.push(jjj);
                source_positions.push(number_start);
                jjj += direction;
            }
            continue;
        }

        idx.push(i1);
        source_positions.push(i1_src_pos);
    }

    Ok(pos)
}

/// Expand all environment variables in the string `instr`.
///
/// This function operates on strings backwards, starting at last_idx. It is quite tricky: $$foo
/// should do a double expansion, $foo$bar should not double expand bar, missing variables
/// collapse the current branch for normal expansion but leave a VARIABLE_EXPAND_EMPTY
/// placeholder for quoted expansion, and so on.
///
/// Note: last_idx is considered to be where it previously finished processing. This means it
/// actually starts operating on last_idx-1. As such, to process a string fully, pass
/// string.len() as last_idx instead of string.len()-1.
fn expand_variables(
    instr: WString,
    out: &mut CompletionReceiver,
    last_idx: usize,
    ctx: &OperationContext,
    errors: &mut Option<&mut ParseErrorList>,
) -> ExpandResult {
    // last_idx may be 1 past the end of the string, but no further.
    assert!(last_idx <= instr.len(), "Invalid last_idx");
    if last_idx == 0 {
        if !out.add(instr) {
            return append_overflow_error(errors, None);
        }
        return ExpandResult::ok;
    }

    // Locate the last VARIABLE_EXPAND or VARIABLE_EXPAND_SINGLE.
    let mut is_single = false;
    let mut varexp_char_idx = last_idx;
    loop {
        let done = varexp_char_idx == 0;
        varexp_char_idx = varexp_char_idx.wrapping_sub(1);
        if done {
            break;
        }
        let c = instr.as_char_slice()[varexp_char_idx];
        if [VARIABLE_EXPAND, VARIABLE_EXPAND_SINGLE].contains(&c) {
            is_single = c == VARIABLE_EXPAND_SINGLE;
            break;
        }
    }
    if varexp_char_idx == usize::MAX {
        // No variable expand char, we're done.
        if !out.add(instr) {
            return append_overflow_error(errors, None);
        }
        return ExpandResult::ok;
    }

    // Get the variable name.
    let var_name_start = varexp_char_idx + 1;
    let mut var_name_stop = var_name_start;
    while var_name_stop < instr.len() {
        let nc = instr.as_char_slice()[var_name_stop];
        if nc == VARIABLE_EXPAND_EMPTY {
            var_name_stop += 1;
            break;
        }
        if !valid_var_name_char(nc) {
            break;
        }
        var_name_stop += 1;
    }
    assert!(
        var_name_stop >= var_name_start,
        "Bogus variable name indexes"
    );

    // Get the variable name as a string, then try to get the variable from env.
    let var_name = &instr[var_name_start..var_name_stop];

    // It's an error if the name is empty.
    if var_name.is_empty() {
        append_syntax_error!(
            errors,
            varexp_char_idx,
            "Expected a variable name after this $."
        );
        return ExpandResult::error;
    }

    // The "history" name is special: it resolves against the history store rather than the
    // environment, and only on the main thread, because history is owned by the main thread.
    let mut history = None;
    let mut var = None;
    if var_name == "history" {
        if is_main_thread() {
            history = ctx.history();
        }
    } else if var_name.as_char_slice() != [VARIABLE_EXPAND_EMPTY] {
        var = ctx.vars().get(var_name);
    }

    // Parse out any following slice.
    // Record the end of the variable name and any following slice.
    let mut var_name_and_slice_stop = var_name_stop;
    let mut all_values = true;
    let slice_start = var_name_stop;
    let mut var_idx_list = vec![];
    let mut var_pos_list = vec![];

    if instr.as_char_slice().get(slice_start) == Some(&'[') {
        all_values = false;
        // If a variable is missing, behave as though we have one value, so that $var[1] always
        // works.
        let mut effective_val_count = 1;
        if let Some(ref var) = var {
            effective_val_count = var.as_list().len();
        } else if let Some(history) = history {
            effective_val_count = history.size();
        }
        match parse_slice(
            &instr[slice_start..],
            &mut var_idx_list,
            &mut var_pos_list,
            effective_val_count,
        ) {
            Ok(offset) => {
                var_name_and_slice_stop = slice_start + offset;
            }
            Err(bad_pos) => {
                append_syntax_error!(errors, slice_start + bad_pos, "Invalid index value");
                return ExpandResult::error;
            }
        }
    }
    // Negative indices have been converted to positive ones relative to the end; anything still
    // non-positive can never select an element.
    let var_idx_list: Vec<usize> = var_idx_list
        .iter()
        .filter_map(|&n| usize::try_from(n).ok())
        .collect();

    if var.is_none() && history.is_none() {
        // Expanding a non-existent variable.
        if !is_single {
            // Normal expansions of missing variables successfully expand to nothing.
            return ExpandResult::ok;
        } else {
            // Expansion to single argument.
            // Replace the variable name and slice with VARIABLE_EXPAND_EMPTY.
            let mut res = instr[..varexp_char_idx].to_owned();
            if res.as_char_slice().last() == Some(&VARIABLE_EXPAND_SINGLE) {
                res.push(VARIABLE_EXPAND_EMPTY);
            }
            res.push_utfstr(&instr[var_name_and_slice_stop..]);
            return expand_variables(res, out, varexp_char_idx, ctx, errors);
        }
    }

    // Ok, we have a variable or history. Let's expand it.
    // Start by respecting the sliced elements.
    let mut var_item_list = vec![];
    if all_values {
        var_item_list = if let Some(history) = history {
            history.get_history()
        } else {
            var.as_ref().unwrap().as_list().to_vec()
        };
    } else {
        // We have to respect the slice.
        if let Some(history) = history {
            // Ask history to map indexes to item strings.
            // Note this may have missing entries for out-of-bounds.
            let item_map = history.items_at_indexes(var_idx_list.iter().copied());
            for item_index in &var_idx_list {
                if let Some(item) = item_map.get(item_index) {
                    var_item_list.push(item.clone());
                }
            }
        } else {
            let all_var_items = var.as_ref().unwrap().as_list();
            for item_index in var_idx_list {
                // Check that we are within array bounds. If not, skip the element. Note we are
                // 1-based.
                if item_index >= 1 && item_index <= all_var_items.len() {
                    var_item_list.push(all_var_items[item_index - 1].to_owned());
                }
            }
        }
    }

    if is_single {
        // Quoted expansion. The values are joined with single spaces into one element.
        let mut res = instr[..varexp_char_idx].to_owned();
        if !res.is_empty() {
            if res.as_char_slice().last() != Some(&VARIABLE_EXPAND_SINGLE) {
                res.push(INTERNAL_SEPARATOR);
            } else if var_item_list.is_empty() || var_item_list[0].is_empty() {
                // First expansion is empty, but we need to recursively expand.
                res.push(VARIABLE_EXPAND_EMPTY);
            }
        }

        res.push_utfstr(&join_strings(&var_item_list, ' '));
        res.push_utfstr(&instr[var_name_and_slice_stop..]);
        expand_variables(res, out, varexp_char_idx, ctx, errors)
    } else {
        // Normal cartesian-product expansion.
        for item in var_item_list {
            if varexp_char_idx == 0 && var_name_and_slice_stop == instr.len() {
                if !out.add(item) {
                    return append_overflow_error(errors, None);
                }
            } else {
                let mut new_in = instr[..varexp_char_idx].to_owned();
                if !new_in.is_empty() {
                    if new_in.as_char_slice().last() != Some(&VARIABLE_EXPAND) {
                        new_in.push(INTERNAL_SEPARATOR);
                    } else if item.is_empty() {
                        new_in.push(VARIABLE_EXPAND_EMPTY);
                    }
                }
                new_in.push_utfstr(&item);
                new_in.push_utfstr(&instr[var_name_and_slice_stop..]);
                let res = expand_variables(new_in, out, varexp_char_idx, ctx, errors);
                if res != ExpandResult::ok {
                    return res;
                }
            }
        }
        ExpandResult::ok
    }
}

/// Perform bracket expansion, placing the expanded strings into `out`.
fn expand_brackets(
    input: WString,
    flags: ExpandFlags,
    out: &mut CompletionReceiver,
    errors: &mut Option<&mut ParseErrorList>,
) -> ExpandResult {
    let mut syntax_error = false;
    let mut bracket_count = 0;

    let mut bracket_begin = None;
    let mut bracket_end = None;
    let mut last_sep = None;

    // Locate the first non-nested bracket pair.
    for (pos, c) in input.chars().enumerate() {
        match c {
            BRACKET_BEGIN => {
                if bracket_count == 0 {
                    bracket_begin = Some(pos);
                }
                bracket_count += 1;
            }
            BRACKET_END => {
                bracket_count -= 1;
                if bracket_count < 0 {
                    syntax_error = true;
                } else if bracket_count == 0 {
                    bracket_end = Some(pos);
                }
            }
            BRACKET_SEP => {
                if bracket_count == 1 {
                    last_sep = Some(pos);
                }
            }
            _ => {
                // we ignore all other characters here
            }
        }
    }

    if bracket_count > 0 {
        if !flags.contains(ExpandFlags::FOR_COMPLETIONS) {
            syntax_error = true;
        } else {
            // The user hasn't typed an end bracket yet; make one up and append it, then expand
            // that.
            let mut synth = WString::new();
            if let Some(last_sep) = last_sep {
                synth.push_utfstr(&input[..bracket_begin.unwrap() + 1]);
                synth.push_utfstr(&input[last_sep + 1..]);
                synth.push(BRACKET_END);
            } else {
                synth.push_utfstr(&input);
                synth.push(BRACKET_END);
            }

            // Note: this code looks very fishy, apparently it has never worked.
            return expand_brackets(synth, ExpandFlags::SKIP_CMDSUBST, out, errors);
        }
    }

    // Expand a literal "{}" to itself because it is useless otherwise, and this eases e.g.
    // `find -exec {}`. See issue #1109.
    if let (Some(begin), Some(end)) = (bracket_begin, bracket_end) {
        if begin + 1 == end {
            let mut newstr = input;
            newstr.as_char_slice_mut()[begin] = '{';
            newstr.as_char_slice_mut()[end] = '}';
            return expand_brackets(newstr, flags, out, errors);
        }
    }

    if syntax_error {
        append_syntax_error!(errors, SOURCE_LOCATION_UNKNOWN, "Mismatched brackets");
        return ExpandResult::error;
    }

    let Some(bracket_begin) = bracket_begin else {
        // No more bracket expansions left; we can return the value as-is.
        if !out.add(input) {
            return append_overflow_error(errors, None);
        }
        return ExpandResult::ok;
    };
    let bracket_end = bracket_end.unwrap();

    // For each item between the brackets, substitute it into the surrounding text and recurse.
    let length_preceding_brackets = bracket_begin;
    let mut item_begin = bracket_begin + 1;
    let mut depth = 0;
    for (pos, c) in input.chars().enumerate().skip(bracket_begin + 1) {
        if depth == 0 && (c == BRACKET_SEP || pos == bracket_end) {
            assert!(pos >= item_begin);
            let mut whole_item = WString::new();
            whole_item.reserve(input.len() + pos - item_begin);
            whole_item.push_utfstr(&input[..length_preceding_brackets]);
            whole_item.push_utfstr(&input[item_begin..pos]);
            whole_item.push_utfstr(&input[bracket_end + 1..]);
            let _ = expand_brackets(whole_item, flags, out, errors);

            item_begin = pos + 1;
            if pos == bracket_end {
                break;
            }
        }

        if c == BRACKET_BEGIN {
            depth += 1;
        }

        if c == BRACKET_END {
            depth -= 1;
        }
    }

    ExpandResult::ok
}

/// Perform cmdsubst expansion.
fn expand_cmdsubst(
    input: WString,
    ctx: &OperationContext,
    out: &mut CompletionReceiver,
    errors: &mut Option<&mut ParseErrorList>,
) -> ExpandResult {
    let mut cursor = 0;
    let parens = match locate_cmdsubst_range(&input, &mut cursor, false) {
        MaybeParentheses::Error => {
            append_syntax_error!(errors, SOURCE_LOCATION_UNKNOWN, "Mismatched parenthesis");
            return ExpandResult::error;
        }
        MaybeParentheses::None => {
            if !out.add(input) {
                return append_overflow_error(errors, None);
            }
            return ExpandResult::ok;
        }
        MaybeParentheses::CommandSubstitution(parens) => parens,
    };

    let mut sub_res = vec![];
    let executor = ctx.executor();
    if executor.exec_subshell(
        &input[parens.command()],
        &mut sub_res,
        true, /* apply_exit_status */
        true, /* is_subcmd */
    ) == -1
    {
        append_cmdsub_error!(
            errors,
            parens.start(),
            "Unknown error while evaluating command substitution"
        );
        return ExpandResult::error;
    }

    if executor.last_status() == STATUS_READ_TOO_MUCH {
        append_cmdsub_error!(
            errors,
            parens.start(),
            "Too much data emitted by command substitution so it was discarded"
        );
        return ExpandResult::error;
    }

    // Expand slices like (cat /var/words)[1]
    let mut tail_begin = parens.end();
    if input.as_char_slice().get(tail_begin) == Some(&'[') {
        let mut slice_idx = vec![];
        let mut slice_pos = vec![];
        let slice_begin = tail_begin;
        let slice_end = match parse_slice(
            &input[slice_begin..],
            &mut slice_idx,
            &mut slice_pos,
            sub_res.len(),
        ) {
            Ok(offset) => slice_begin + offset,
            Err(bad_pos) => {
                append_syntax_error!(errors, slice_begin + bad_pos, "Invalid index value");
                return ExpandResult::error;
            }
        };

        let mut sub_res2 = vec![];
        tail_begin = slice_end;
        for idx in slice_idx {
            if idx < 1 || idx as usize > sub_res.len() {
                continue;
            }
            // -1 to convert from 1-based slice index to 0-based vector index.
            sub_res2.push(sub_res[idx as usize - 1].to_owned());
        }
        sub_res = sub_res2;
    }

    // Recursively call ourselves to expand any remaining command substitutions. The result of
    // this recursive call using the tail of the string is inserted into the tail_expand array
    // list.
    let mut tail_expand_recv = out.subreceiver();
    let tail = input[tail_begin..].to_owned();
    let _ = expand_cmdsubst(tail, ctx, &mut tail_expand_recv, errors);
    let tail_expand = tail_expand_recv.take();

    // Combine the result of the current command substitution with the result of the recursive
    // tail expansion. Each substituted line is escaped so that its contents are not
    // re-interpreted by later stages.
    for sub_item in sub_res {
        let sub_item2 = escape_string(&sub_item, EscapeStringStyle::Script(EscapeFlags::COMMA));
        for tail_item in &tail_expand {
            let mut whole_item = WString::new();
            whole_item
                .reserve(parens.start() + 1 + sub_item2.len() + 1 + tail_item.completion.len());
            whole_item.push_utfstr(&input[..parens.start()]);
            whole_item.push(INTERNAL_SEPARATOR);
            whole_item.push_utfstr(&sub_item2);
            whole_item.push(INTERNAL_SEPARATOR);
            whole_item.push_utfstr(&tail_item.completion);
            if !out.add(whole_item) {
                return append_overflow_error(errors, None);
            }
        }
    }

    ExpandResult::ok
}

// Given that input[0] is HOME_DIRECTORY or tilde (ugh), return the user's name. Return the empty
// string if it is just a tilde. Also return by reference the index of the first character of the
// remaining part of the string (e.g. the subsequent slash).
fn get_home_directory_name<'a>(input: &'a wstr, out_tail_idx: &mut usize) -> &'a wstr {
    assert!([HOME_DIRECTORY, '~'].contains(&input.as_char_slice()[0]));
    if let Some(pos) = input.chars().position(|c| c == '/') {
        *out_tail_idx = pos;
        &input[1..pos]
    } else {
        *out_tail_idx = input.len();
        &input[1..]
    }
}

/// Attempts tilde expansion of the string specified, modifying it in place.
fn expand_home_directory(input: &mut WString, vars: &dyn Environment) {
    if input.as_char_slice().first() != Some(&HOME_DIRECTORY) {
        return;
    }

    let mut tail_idx = usize::MAX;
    let username = get_home_directory_name(input, &mut tail_idx).to_owned();
    let mut home = None;
    if username.is_empty() {
        // Current user's home directory.
        match vars.get_unless_empty(L!("HOME")) {
            None => {
                input.clear();
                return;
            }
            Some(home_var) => {
                home = Some(home_var.as_string());
                tail_idx = 1;
            }
        };
    } else {
        // Some other user's home directory.
        let name_cstr = wcs2zstring(&username);
        let mut userinfo = MaybeUninit::uninit();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let mut buf = [0 as libc::c_char; 8192];
        let retval = unsafe {
            libc::getpwnam_r(
                name_cstr.as_ptr(),
                userinfo.as_mut_ptr(),
                &mut buf[0],
                std::mem::size_of_val(&buf),
                &mut result,
            )
        };
        if retval == 0 && !result.is_null() {
            let userinfo = unsafe { userinfo.assume_init() };
            home = Some(charptr2wcstring(userinfo.pw_dir));
        }
    }

    // Resolve the home directory to its canonical path, then substitute it in.
    let realhome = home.and_then(|home| wrealpath(&home));
    if let Some(realhome) = realhome {
        input.replace_range(..tail_idx, &realhome);
    } else {
        // Unknown user or unresolvable home; restore a literal tilde.
        input.as_char_slice_mut()[0] = '~';
    }
}

/// Tests if all characters in the string are numeric. An empty string counts as numeric, which
/// preserves the behavior of completing against `%` alone.
fn iswnumeric(s: &wstr) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

/// See if the process described by `cmd` matches the commandline `proc_pat`. On a match, return
/// the offset within `cmd` at which the match begins.
fn match_pid(cmd: &wstr, proc_pat: &wstr) -> Option<usize> {
    // Test for a direct match. If the proc string is empty (e.g. the user tries to complete
    // against %), then return an offset pointing at the base command. That ensures that you
    // don't see a bunch of dumb paths when completing against all processes.
    if !proc_pat.is_empty() && cmd.starts_with(proc_pat) {
        return Some(0);
    }

    // Get the command to match against. We're only interested in the last path component.
    let base_cmd = wbasename(cmd);
    if base_cmd.starts_with(proc_pat) {
        // It's a match. Return the offset within the full command.
        Some(cmd.len() - base_cmd.len())
    } else {
        None
    }
}

/// Helper for descriptions which are suppressed by NO_DESCRIPTIONS.
fn completion_description(flags: ExpandFlags, desc: WString) -> WString {
    if flags.contains(ExpandFlags::NO_DESCRIPTIONS) {
        WString::new()
    } else {
        desc
    }
}

/// Searches the job table for something matching the given proc pattern: the last backgrounded
/// job for a bare `%`, a job id for a numeric pattern, then a prefix of each job's command line
/// or of any process's actual command. Returns whether the search concluded (in which case OS
/// process enumeration must not run) along with any produced completions.
///
/// This runs on the main thread, because the job table is not thread safe.
fn find_job(proc_pat: &wstr, flags: ExpandFlags) -> (bool, CompletionList) {
    let mut completions = CompletionList::new();
    let found = with_jobs(|jobs| {
        let mut found = false;
        // If we are not doing tab completion, we first check for the single '%' character,
        // because an empty string will pass the numeric check below. But if we are doing tab
        // completion, we want all of the job IDs as completion options, not just the last job
        // backgrounded, so we pass this first block in favor of the second.
        if proc_pat.is_empty() && !flags.contains(ExpandFlags::FOR_COMPLETIONS) {
            // This is an empty job expansion: '%'. It expands to the last job backgrounded.
            if let Some(j) = jobs.iter().find(|j| !j.command_is_empty()) {
                completions.push(Completion::from_completion(j.pgid().to_wstring()));
            }
            // With the solo '%' syntax the job table is authoritative; don't try other match
            // methods.
            found = true;
        } else if iswnumeric(proc_pat) {
            // This is a numeric job string, like '%2'.
            if flags.contains(ExpandFlags::FOR_COMPLETIONS) {
                for j in jobs {
                    if j.command_is_empty() {
                        continue;
                    }
                    let jid = j.job_id().to_wstring();
                    if jid.starts_with(proc_pat) {
                        completions.push(Completion::with_desc(
                            jid[proc_pat.len()..].to_owned(),
                            completion_description(flags, wgettext_fmt!("Job: {}", j.command())),
                        ));
                    }
                }
            } else {
                use crate::wutil::fish_wcstoi;
                if let Ok(jid) = fish_wcstoi(proc_pat) {
                    if jid > 0 {
                        if let Some(j) = job_get(jid) {
                            if !j.command_is_empty() {
                                completions
                                    .push(Completion::from_completion(j.pgid().to_wstring()));
                            }
                        }
                    }
                }
            }
            // Stop here so you can't match a random process name when you're just trying to use
            // job control.
            found = true;
        }

        if found {
            return found;
        }

        for j in jobs {
            if j.command_is_empty() {
                continue;
            }
            if let Some(offset) = match_pid(j.command(), proc_pat) {
                if flags.contains(ExpandFlags::FOR_COMPLETIONS) {
                    completions.push(Completion::with_desc(
                        j.command()[offset + proc_pat.len()..].to_owned(),
                        completion_description(flags, wgettext!("Job").to_owned()),
                    ));
                } else {
                    completions.push(Completion::from_completion(j.pgid().to_wstring()));
                    found = true;
                }
            }
        }

        if found {
            return found;
        }

        for j in jobs {
            if j.command_is_empty() {
                continue;
            }
            for p in &j.processes {
                if p.actual_cmd.is_empty() {
                    continue;
                }
                if let Some(offset) = match_pid(&p.actual_cmd, proc_pat) {
                    if flags.contains(ExpandFlags::FOR_COMPLETIONS) {
                        completions.push(Completion::with_desc(
                            p.actual_cmd[offset + proc_pat.len()..].to_owned(),
                            completion_description(flags, wgettext!("Child process").to_owned()),
                        ));
                    } else {
                        completions.push(Completion::from_completion(p.pid.to_wstring()));
                        found = true;
                    }
                }
            }
        }

        found
    });
    (found, completions)
}

/// Process id expansion.
fn expand_pid(
    instr_with_sep: WString,
    flags: ExpandFlags,
    out: &mut CompletionReceiver,
    errors: &mut Option<&mut ParseErrorList>,
) -> ExpandResult {
    // If there's no INTERNAL_SEPARATOR and no PROCESS_EXPAND, then there's nothing to do.
    if !instr_with_sep
        .chars()
        .any(|c| c == INTERNAL_SEPARATOR || c == PROCESS_EXPAND)
    {
        if !out.add(instr_with_sep) {
            return append_overflow_error(errors, None);
        }
        return ExpandResult::ok;
    }

    // expand_string calls us with internal separators in the string.
    let mut instr = instr_with_sep;
    remove_internal_separator(&mut instr, false);

    if instr.as_char_slice().first() != Some(&PROCESS_EXPAND) {
        // Not a process expansion.
        if !out.add(instr) {
            return append_overflow_error(errors, None);
        }
        return ExpandResult::ok;
    }

    let pattern = instr[1..].to_owned();
    let prev_count = out.size();
    let mut job_search_concluded = false;

    // Jobs are tried first. The job table lives on the main thread, so hop over there to read
    // it.
    if !flags.contains(ExpandFlags::SKIP_JOBS) {
        let pat = pattern.clone();
        let (found, job_comps) = perform_on_main(move || find_job(&pat, flags));
        job_search_concluded = found;
        if !out.extend(job_comps) {
            return append_overflow_error(errors, None);
        }
    }

    if !job_search_concluded {
        // The symbolic names %self and %last.
        if flags.contains(ExpandFlags::FOR_COMPLETIONS) {
            if SELF_STR.starts_with(&pattern) {
                let comp = Completion::with_desc(
                    SELF_STR[pattern.len()..].to_owned(),
                    completion_description(flags, wgettext!("Shell process").to_owned()),
                );
                if !out.add(comp) {
                    return append_overflow_error(errors, None);
                }
            } else if LAST_STR.starts_with(&pattern) {
                let comp = Completion::with_desc(
                    LAST_STR[pattern.len()..].to_owned(),
                    completion_description(flags, wgettext!("Last background job").to_owned()),
                );
                if !out.add(comp) {
                    return append_overflow_error(errors, None);
                }
            }
        } else {
            if pattern == SELF_STR {
                if !out.add(getpid().to_wstring()) {
                    return append_overflow_error(errors, None);
                }
                return ExpandResult::ok;
            }
            if pattern == LAST_STR {
                let last_bg_pid = proc_last_bg_pid();
                if last_bg_pid > 0 {
                    if !out.add(last_bg_pid.to_wstring()) {
                        return append_overflow_error(errors, None);
                    }
                }
                return ExpandResult::ok;
            }
        }

        // Iterate over all processes.
        for (process_name, process_pid) in ProcessIterator::new() {
            if let Some(offset) = match_pid(&process_name, &pattern) {
                let comp = if flags.contains(ExpandFlags::FOR_COMPLETIONS) {
                    Completion::with_desc(
                        process_name[offset + pattern.len()..].to_owned(),
                        completion_description(flags, wgettext!("Process").to_owned()),
                    )
                } else {
                    Completion::from_completion(process_pid.to_wstring())
                };
                if !out.add(comp) {
                    return append_overflow_error(errors, None);
                }
            }
        }
    }

    if out.size() == prev_count && !flags.contains(ExpandFlags::FOR_COMPLETIONS) {
        // We failed to find anything.
        append_syntax_error!(
            errors,
            1,
            "Unknown command '{}'",
            escape_string(&pattern, EscapeStringStyle::Script(EscapeFlags::NO_QUOTED))
        );
        return ExpandResult::error;
    }

    ExpandResult::ok
}

/// Remove any internal separators. Also optionally convert wildcard characters to regular
/// equivalents. This is done to support skip_wildcards.
fn remove_internal_separator(s: &mut WString, conv: bool) {
    // Remove all instances of INTERNAL_SEPARATOR.
    s.retain(|c| c != INTERNAL_SEPARATOR);

    // If conv is true, replace all instances of ANY_CHAR with '?', ANY_STRING and
    // ANY_STRING_RECURSIVE with '*'.
    if conv {
        for idx in s.as_char_slice_mut() {
            match *idx {
                ANY_CHAR => {
                    *idx = '?';
                }
                ANY_STRING | ANY_STRING_RECURSIVE => {
                    *idx = '*';
                }
                _ => {
                    // we ignore all other characters
                }
            }
        }
    }
}

/// A type that knows how to perform expansions.
struct Expander<'a, 'b, 'c> {
    /// Operation context for this expansion.
    ctx: &'c OperationContext<'b>,

    /// Flags to use during expansion.
    flags: ExpandFlags,

    /// List to receive any errors generated during expansion, or null to ignore errors.
    errors: &'c mut Option<&'a mut ParseErrorList>,
}

impl<'a, 'b, 'c> Expander<'a, 'b, 'c> {
    fn new(
        ctx: &'c OperationContext<'b>,
        flags: ExpandFlags,
        errors: &'c mut Option<&'a mut ParseErrorList>,
    ) -> Self {
        Self { ctx, flags, errors }
    }

    fn expand_string(
        input: WString,
        out_completions: &mut CompletionReceiver,
        flags: ExpandFlags,
        ctx: &OperationContext,
        mut errors: Option<&mut ParseErrorList>,
    ) -> ExpandResult {
        assert!(
            flags.contains(ExpandFlags::SKIP_CMDSUBST) || ctx.has_executor(),
            "Must have an executor if not skipping command substitutions"
        );
        // Early out. If we're not completing, and there's no magic in the input, we're done.
        if !flags.contains(ExpandFlags::FOR_COMPLETIONS) && expand_is_clean(&input) {
            if !out_completions.add(input) {
                return append_overflow_error(&mut errors, None);
            }
            return ExpandResult::ok;
        }

        let mut expand = Expander::new(ctx, flags, &mut errors);

        // Our expansion stages.
        // An expansion stage accepts the input string (transferring ownership) and returns the
        // list of output completions by reference. It may return an error, which halts
        // expansion.
        let stages = [
            Expander::stage_cmdsubst,
            Expander::stage_variables,
            Expander::stage_brackets,
            Expander::stage_home_and_pid,
            Expander::stage_wildcards,
        ];

        // Load up our single initial completion.
        let mut completions = vec![Completion::from_completion(input.clone())];

        let mut total_result = ExpandResult::ok;
        let mut output_storage = out_completions.subreceiver();
        for stage in stages {
            for comp in completions {
                if expand.ctx.check_cancel() {
                    total_result = ExpandResult::error;
                    break;
                }
                let this_result = (stage)(&mut expand, comp.completion, &mut output_storage);
                // If the result was no-match, but we already have a match, then don't change
                // it.
                if !(this_result == ExpandResult::wildcard_no_match
                    && total_result == ExpandResult::wildcard_match)
                {
                    total_result = this_result;
                }
                if total_result == ExpandResult::error {
                    break;
                }
            }

            // Output becomes our next stage's input.
            completions = output_storage.take();
            if total_result == ExpandResult::error {
                break;
            }
        }

        if total_result != ExpandResult::error {
            // Hack to un-expand tildes (see issue #647).
            if !flags.contains(ExpandFlags::SKIP_HOME_DIRECTORIES) {
                expand.unexpand_tildes(&input, &mut completions);
            }
            if !out_completions.extend(completions) {
                total_result = append_overflow_error(expand.errors, None);
            }
        }

        total_result
    }

    fn stage_cmdsubst(&mut self, input: WString, out: &mut CompletionReceiver) -> ExpandResult {
        if self.flags.contains(ExpandFlags::SKIP_CMDSUBST) {
            let mut cursor = 0;
            match locate_cmdsubst_range(&input, &mut cursor, true) {
                MaybeParentheses::None => {
                    if !out.add(input) {
                        return append_overflow_error(self.errors, None);
                    }
                    ExpandResult::ok
                }
                MaybeParentheses::Error | MaybeParentheses::CommandSubstitution(_) => {
                    append_cmdsub_error!(
                        self.errors,
                        SOURCE_LOCATION_UNKNOWN,
                        "Command substitutions not allowed"
                    );
                    ExpandResult::error
                }
            }
        } else {
            expand_cmdsubst(input, self.ctx, out, self.errors)
        }
    }

    fn stage_variables(&mut self, input: WString, out: &mut CompletionReceiver) -> ExpandResult {
        // We accept incomplete strings here, since complete uses expand_string to expand
        // incomplete strings from the commandline.
        let mut next = unescape_string(
            &input,
            UnescapeStringStyle::Script(UnescapeFlags::SPECIAL | UnescapeFlags::INCOMPLETE),
        )
        .unwrap_or_default();

        if self.flags.contains(ExpandFlags::SKIP_VARIABLES) {
            for i in next.as_char_slice_mut() {
                if [VARIABLE_EXPAND, VARIABLE_EXPAND_SINGLE].contains(i) {
                    *i = '$';
                }
            }
            if !out.add(next) {
                return append_overflow_error(self.errors, None);
            }
            ExpandResult::ok
        } else {
            let size = next.len();
            expand_variables(next, out, size, self.ctx, self.errors)
        }
    }

    fn stage_brackets(&mut self, input: WString, out: &mut CompletionReceiver) -> ExpandResult {
        expand_brackets(input, self.flags, out, self.errors)
    }

    fn stage_home_and_pid(
        &mut self,
        mut input: WString,
        out: &mut CompletionReceiver,
    ) -> ExpandResult {
        if !self.flags.contains(ExpandFlags::SKIP_HOME_DIRECTORIES) {
            expand_home_directory(&mut input, self.ctx.vars());
        } else if input.as_char_slice().first() == Some(&HOME_DIRECTORY) {
            // Leave the token as the user typed it.
            input.as_char_slice_mut()[0] = '~';
        }

        if self.flags.contains(ExpandFlags::FOR_COMPLETIONS) {
            // When completing, process expansion is a completion source of its own; errors are
            // not reported.
            if input.as_char_slice().first() == Some(&PROCESS_EXPAND) {
                return expand_pid(input, self.flags, out, &mut None);
            }
            if !out.add(input) {
                return append_overflow_error(self.errors, None);
            }
            ExpandResult::ok
        } else {
            expand_pid(input, self.flags, out, self.errors)
        }
    }

    fn stage_wildcards(
        &mut self,
        mut path_to_expand: WString,
        out: &mut CompletionReceiver,
    ) -> ExpandResult {
        let mut result = ExpandResult::ok;

        remove_internal_separator(
            &mut path_to_expand,
            self.flags.contains(ExpandFlags::SKIP_WILDCARDS),
        );
        let has_wildcard = wildcard_has_internal(&path_to_expand); // e.g. ANY_STRING
        let for_completions = self.flags.contains(ExpandFlags::FOR_COMPLETIONS);
        let skip_wildcards = self.flags.contains(ExpandFlags::SKIP_WILDCARDS);

        if has_wildcard && self.flags.contains(ExpandFlags::EXECUTABLES_ONLY) {
            // don't do wildcard expansion for executables, see issue #785
        } else if (for_completions && !skip_wildcards) || has_wildcard {
            // We either have a wildcard, or we don't have a wildcard but we're doing completion
            // expansion (so we want to get the completion of a file path). Note that if
            // skip_wildcards is set, we stomped wildcards in remove_internal_separator above,
            // so there actually aren't any.
            //
            // So we're going to treat this input as a file path. Compute the "working
            // directories", which may be CDPATH if the special flag is set.
            let working_dir = self.ctx.vars().get_pwd_slash();
            let mut effective_working_dirs = vec![];
            let for_cd = self.flags.contains(ExpandFlags::SPECIAL_FOR_CD);
            let for_command = self.flags.contains(ExpandFlags::SPECIAL_FOR_COMMAND);
            if !for_cd && !for_command {
                // Common case.
                effective_working_dirs.push(working_dir);
            } else {
                // Either special_for_command or special_for_cd. We can handle these mostly the
                // same. There's the following differences:
                //
                // 1. An empty CDPATH should be treated as '.', but an empty PATH should be left
                // empty (no commands can be found).
                //
                // 2. PATH is only "one level," while CDPATH is multiple levels. That is, input
                // like 'foo/bar' should resolve against CDPATH, but not PATH.
                //
                // In either case, we ignore the path if we start with ./ or /. Also ignore it
                // if we are doing command completion and we contain a slash, per IEEE 1003.1,
                // chapter 8 under PATH.
                if path_to_expand.starts_with("/")
                    || path_to_expand.starts_with("./")
                    || path_to_expand.starts_with("../")
                    || (for_command && path_to_expand.contains('/'))
                {
                    effective_working_dirs.push(working_dir);
                } else {
                    let mut paths = self
                        .ctx
                        .vars()
                        .get(if for_cd { L!("CDPATH") } else { L!("PATH") })
                        .map(|var| var.as_list().to_owned())
                        .unwrap_or_default();
                    if paths.is_empty() && for_cd {
                        paths.push(L!(".").to_owned());
                    }
                    for next_path in paths {
                        effective_working_dirs
                            .push(path_apply_working_directory(&next_path, &working_dir));
                    }
                }
            }

            result = ExpandResult::wildcard_no_match;
            let mut expanded = CompletionList::new();
            for effective_working_dir in effective_working_dirs {
                let count = match self.ctx.matcher() {
                    Some(matcher) => matcher.expand(
                        &path_to_expand,
                        &effective_working_dir,
                        self.flags,
                        &mut expanded,
                    ),
                    None => 0,
                };
                if count > 0 {
                    // Something matched, so overall we matched.
                    result = ExpandResult::wildcard_match;
                } else if count < 0 {
                    // Cancellation is surfaced as a plain error, with no error-list entry.
                    result = ExpandResult::error;
                    break;
                }
            }

            expanded.sort_by(|a, b| wcsfilecmp_glob(&a.completion, &b.completion));
            if !out.extend(expanded) {
                return append_overflow_error(self.errors, None);
            }
        } else {
            // SKIP_WILDCARDS is used when completing to mean don't do file expansions, so if
            // we're not doing file expansions, just drop this completion on the floor.
            if !for_completions {
                if !out.add(path_to_expand) {
                    return append_overflow_error(self.errors, None);
                }
            }
        }
        result
    }

    // Given an original input string, if it starts with a tilde, "unexpand" the expanded home
    // directory. Note this may be just a tilde or a user name like ~foo/.
    fn unexpand_tildes(&self, input: &wstr, completions: &mut CompletionList) {
        // If input begins with tilde, then try to replace the corresponding string in each
        // completion with the tilde. If it does not, there's nothing to do.
        if input.as_char_slice().first() != Some(&'~') {
            return;
        }

        // We only operate on completions that replace their tokens; those are the ones whose
        // text holds a fully expanded path. In particular, empty lists are common.
        if !completions.iter().any(|c| c.replaces_token()) {
            return;
        }

        // Get the username_with_tilde (like ~bert) and expand it into a home directory.
        let mut tail_idx = usize::MAX;
        let username_with_tilde =
            WString::from_str("~") + get_home_directory_name(input, &mut tail_idx);
        let mut home = username_with_tilde.clone();
        expand_tilde(&mut home, self.ctx.vars());

        // Now for each completion that starts with home, replace it with the
        // username_with_tilde.
        for comp in completions {
            if comp.replaces_token() && comp.completion.starts_with(&home) {
                comp.completion
                    .replace_range(..home.len(), &username_with_tilde);

                // And mark that our tilde is literal, so it doesn't try to escape it.
                comp.flags |= CompleteFlags::DONT_ESCAPE_TILDES;
            }
        }
    }
}

fn escape_single_quoted(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('\'');
    for c in s.chars() {
        // Escape backslashes and single quotes only.
        if c == '\\' || c == '\'' {
            result.push('\\');
        }
        result.push(c);
    }
    result.push('\'');
    result
}

/// A startup-time compatibility shim for login managers which pass `exec "$@"`: when the command
/// list is exactly that, replace it with `exec` followed by each additional argument singly
/// quoted. `args` is the full argument vector including the program name; returns whether the
/// replacement happened.
pub fn fish_xdm_login_hack(cmds: &mut Vec<String>, args: &[String]) -> bool {
    if cmds.len() != 1 {
        return false;
    }

    let cmd = &cmds[0];
    if cmd == "exec \"${@}\"" || cmd == "exec \"$@\"" {
        // We're going to construct a new command that starts with exec, and then has the
        // remaining arguments escaped.
        let mut new_cmd = String::from("exec");
        for arg in args.iter().skip(1) {
            new_cmd.push(' ');
            new_cmd.push_str(&escape_single_quoted(arg));
        }

        cmds[0] = new_cmd;
        true
    } else {
        false
    }
}
