use crate::common::str2wcstring;
use crate::complete::{CompleteFlags, CompletionList};
use crate::env::Environment;
use crate::exec::STATUS_READ_TOO_MUCH;
use crate::expand::{
    expand_one, expand_string, expand_tilde, expand_to_command_and_args, fish_xdm_login_hack,
    replace_home_directory_with_tilde, ExpandFlags, ExpandResult,
};
use crate::history::History;
use crate::operation_context::{no_cancel, OperationContext, EXPANSION_LIMIT_DEFAULT};
use crate::parse_constants::{ParseErrorCode, ParseErrorList};
use crate::proc::{
    add_job, clear_jobs, set_proc_last_bg_pid, Job, Process,
};
use crate::tests::prelude::*;
use crate::wchar::prelude::*;
use crate::wildcard::ANY_STRING;
use crate::wutil::wrealpath;
use std::os::unix::ffi::OsStrExt;

/// Run expansion with the given environment and collaborators, returning the result code, the
/// produced completions and any errors.
fn expand_full(
    input: &wstr,
    flags: ExpandFlags,
    env: &dyn Environment,
    executor: &TestExecutor,
    matcher: Option<&TestMatcher>,
    history: Option<&History>,
) -> (ExpandResult, CompletionList, ParseErrorList) {
    let mut output = CompletionList::new();
    let mut errors = ParseErrorList::new();
    let mut ctx = OperationContext::foreground(
        env,
        executor,
        Box::new(no_cancel),
        EXPANSION_LIMIT_DEFAULT,
    );
    if let Some(matcher) = matcher {
        ctx = ctx.with_matcher(matcher);
    }
    if let Some(history) = history {
        ctx = ctx.with_history(history);
    }
    let res = expand_string(
        input.to_owned(),
        &mut output,
        flags,
        &ctx,
        Some(&mut errors),
    );
    (res, output, errors)
}

fn expand_test_impl(
    input: &wstr,
    flags: ExpandFlags,
    env: &dyn Environment,
    expected: Vec<WString>,
    error_message: Option<&str>,
) {
    let executor = TestExecutor::new();
    let (res, output, errors) = expand_full(input, flags, env, &executor, None, None);
    if res == ExpandResult::error {
        assert_ne!(
            errors,
            vec![],
            "Bug: Parse error reported but no error text found."
        );
        panic!("{}", errors[0].describe(input, false));
    }

    let actual: Vec<WString> = output.into_iter().map(|c| c.completion).collect();
    assert_eq!(
        actual,
        expected,
        "{}",
        error_message.unwrap_or("expand mismatch")
    );
}

/// Expect expansion to fail, with the first error containing `expected_text`.
fn expand_test_error(input: &wstr, flags: ExpandFlags, env: &dyn Environment, expected_text: &str) {
    let executor = TestExecutor::new();
    let (res, _output, errors) = expand_full(input, flags, env, &executor, None, None);
    assert_eq!(res, ExpandResult::error, "expected an error for {input}");
    assert_ne!(errors, vec![], "no error text recorded for {input}");
    let text = errors[0].text.to_string();
    assert!(
        text.contains(expected_text),
        "error for {input} was {text:?}, expected it to contain {expected_text:?}"
    );
}

/// Perform parameter expansion and test if the output equals the parameter list supplied.
///
/// The first argument is the string to expand, the second the flags, the third the expected
/// results, and optionally a message to print if the test fails.
macro_rules! expand_test {
    ($input:expr, $flags:expr, ( $($expected:expr),* $(,)? ) $(, $error:literal)?) => {
        expand_test_impl(
            L!($input),
            $flags,
            &PwdEnvironment::default(),
            vec![$( $expected.into(), )*],
            expand_test_message!($($error)?),
        )
    };
    ($input:expr, $flags:expr, $expected:expr $(, $error:literal)?) => {
        expand_test_impl(
            L!($input),
            $flags,
            &PwdEnvironment::default(),
            vec![$expected.into()],
            expand_test_message!($($error)?),
        )
    };
}

macro_rules! expand_test_message {
    () => {
        None
    };
    ($error:literal) => {
        Some($error)
    };
}

/// Like expand_test! but with an explicit environment.
macro_rules! expand_test_env {
    ($input:expr, $flags:expr, $env:expr, ( $($expected:expr),* $(,)? ) $(, $error:literal)?) => {
        expand_test_impl(
            L!($input),
            $flags,
            &$env,
            vec![$( $expected.into(), )*],
            expand_test_message!($($error)?),
        )
    };
    ($input:expr, $flags:expr, $env:expr, $expected:expr $(, $error:literal)?) => {
        expand_test_impl(
            L!($input),
            $flags,
            &$env,
            vec![$expected.into()],
            expand_test_message!($($error)?),
        )
    };
}

/// An environment with the variables the shared expansion tests expect: foo=(x y z), bar=(1 2),
/// empty=() and e=('').
fn vars_environment() -> PwdEnvironment {
    let mut env = PwdEnvironment::default();
    env.parent.set(L!("foo"), &[L!("x"), L!("y"), L!("z")]);
    env.parent.set(L!("bar"), &[L!("1"), L!("2")]);
    env.parent.set(L!("empty"), &[]);
    env.parent.set(L!("e"), &[L!("")]);
    env.parent.set(L!("name"), &[L!("foo")]);
    env
}

// Testing parameter expansion.
#[test]
fn test_expand() {
    test_init();
    let noflags = ExpandFlags::default();

    expand_test!("foo", noflags, "foo", "Strings do not expand to themselves");
    expand_test!(
        "a{b,c,d}e",
        noflags,
        ("abe", "ace", "ade"),
        "Bracket expansion is broken"
    );
    expand_test!(
        "a*",
        ExpandFlags::SKIP_WILDCARDS,
        "a*",
        "Cannot skip wildcard expansion"
    );
    expand_test!(
        "foo\\$bar",
        ExpandFlags::SKIP_VARIABLES,
        "foo$bar",
        "Failed to handle dollar sign in variable-skipping expansion"
    );
    expand_test!(
        "$foo",
        ExpandFlags::SKIP_VARIABLES,
        "$foo",
        "Failed to restore the dollar sign when skipping variables"
    );

    // A literal empty brace pair stays literal, everything else alternates.
    expand_test!("{}", noflags, "{}", "Empty braces lost their literal value");
    expand_test!(
        "pre{a,b{1,2}}post",
        noflags,
        ("preapost", "preb1post", "preb2post"),
        "Nested bracket expansion is broken"
    );
    expand_test!(
        "{a,{b,c},d}",
        noflags,
        ("a", "b", "c", "d"),
        "Nested bracket flattening is broken"
    );
}

#[test]
fn test_expand_variables() {
    test_init();
    let noflags = ExpandFlags::default();
    let env = vars_environment();

    expand_test_env!("$foo", noflags, env, ("x", "y", "z"));
    expand_test_env!(
        "a$foo b",
        noflags,
        env,
        ("ax b", "ay b", "az b"),
        "Cartesian product against fixed text is broken"
    );
    expand_test_env!("$nosuchvariable", noflags, env, ());
    expand_test_env!("a$nosuchvariable", noflags, env, ());
    expand_test_env!(
        "$foo$bar",
        noflags,
        env,
        ("x1", "y1", "z1", "x2", "y2", "z2"),
        "Cartesian product of two variables is broken"
    );
    expand_test_env!(
        "$$name",
        noflags,
        env,
        ("x", "y", "z"),
        "Double expansion is broken"
    );
    expand_test_env!("a$e", noflags, env, "a", "Empty value should vanish into its neighbor");

    // Quoted (single-element) expansion.
    expand_test_env!("\"$foo\"", noflags, env, "x y z", "Single expansion is broken");
    expand_test_env!(
        "\"$nosuchvariable\"",
        noflags,
        env,
        "",
        "Single expansion of a missing variable should yield an empty string"
    );
    expand_test_env!("a\"$empty\"b", noflags, env, "ab");
}

#[test]
fn test_expand_slices() {
    test_init();
    let noflags = ExpandFlags::default();
    let env = vars_environment();

    expand_test_env!("$foo[1]", noflags, env, "x");
    expand_test_env!("$foo[-1]", noflags, env, "z", "Negative indexing is broken");
    expand_test_env!("$foo[2..3]", noflags, env, ("y", "z"));
    expand_test_env!("$foo[1..3]", noflags, env, ("x", "y", "z"), "Slice identity is broken");
    expand_test_env!(
        "$foo[2..1]",
        noflags,
        env,
        ("y", "x"),
        "Descending ranges are broken"
    );
    expand_test_env!(
        "$foo[-1..1]",
        noflags,
        env,
        ("z", "y", "x"),
        "Negative-to-positive ranges are broken"
    );
    expand_test_env!(
        "$foo[1..10]",
        noflags,
        env,
        ("x", "y", "z"),
        "Out-of-range endpoints should clamp"
    );
    expand_test_env!(
        "$foo[9..10]",
        noflags,
        env,
        (),
        "Fully out-of-range ranges should be skipped"
    );
    expand_test_env!("$foo[4]", noflags, env, (), "Out-of-range indices should be dropped");
    expand_test_env!("$foo[0]", noflags, env, (), "A zero index can never select");
    expand_test_env!("$empty[1]", noflags, env, (), "Slicing an empty variable should be quiet");
    expand_test_env!("$nosuchvariable[1]", noflags, env, ());
    expand_test_env!("$foo[1 3]", noflags, env, ("x", "z"));

    expand_test_error(
        L!("$foo[x]"),
        noflags,
        &env,
        "Invalid index value",
    );
    let (_res, _out, errors) = {
        let executor = TestExecutor::new();
        expand_full(L!("$foo[x]"), noflags, &env, &executor, None, None)
    };
    assert_eq!(errors[0].code, ParseErrorCode::syntax);
    assert_eq!(errors[0].source_start, 5, "error should point at the bad token");
}

#[test]
fn test_expand_empty_name_is_an_error() {
    test_init();
    let env = vars_environment();
    expand_test_error(
        L!("$"),
        ExpandFlags::default(),
        &env,
        "Expected a variable name",
    );
}

#[test]
fn test_expand_brackets_mismatch() {
    test_init();
    let env = vars_environment();
    expand_test_error(
        L!("{a,b"),
        ExpandFlags::default(),
        &env,
        "Mismatched brackets",
    );
    expand_test_error(L!("}"), ExpandFlags::default(), &env, "Mismatched brackets");

    // When completing, a missing closing bracket is synthesized after the last separator
    // instead; the surviving alternative reaches the wildcard stage.
    let executor = TestExecutor::new();
    let matcher = TestMatcher::new();
    let (res, _out, _errors) = expand_full(
        L!("pre{a,b"),
        ExpandFlags::FOR_COMPLETIONS,
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_ne!(res, ExpandResult::error);
    let calls = matcher.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "preb");
}

#[test]
fn test_expand_cmdsubst() {
    test_init();
    let env = vars_environment();
    let executor = TestExecutor::new();
    executor.set_output(L!("echo hi"), &[L!("hi")]);
    executor.set_output(L!("lines"), &[L!("a"), L!("b")]);
    executor.set_output(L!("one"), &[L!("1")]);
    executor.set_output(L!("two"), &[L!("2")]);
    executor.set_output(L!("spacey"), &[L!("a b"), L!("*")]);
    executor.set_output(L!("nothing"), &[]);

    let run = |input: &wstr| -> (ExpandResult, Vec<WString>, ParseErrorList) {
        let (res, out, errors) =
            expand_full(input, ExpandFlags::default(), &env, &executor, None, None);
        (
            res,
            out.into_iter().map(|c| c.completion).collect(),
            errors,
        )
    };

    let (res, out, _) = run(L!("(echo hi)"));
    assert_eq!(res, ExpandResult::ok);
    assert_eq!(out, vec![WString::from_str("hi")]);

    let (_, out, _) = run(L!("x(echo hi)y"));
    assert_eq!(out, vec![WString::from_str("xhiy")]);

    // One output line per element, cartesian against the surrounding text.
    let (_, out, _) = run(L!("x(lines)"));
    assert_eq!(out, vec![WString::from_str("xa"), WString::from_str("xb")]);

    // Tail substitutions expand too, and combine with the head.
    let (_, out, _) = run(L!("(one)x(two)"));
    assert_eq!(out, vec![WString::from_str("1x2")]);

    // Slices apply to the line list.
    let (_, out, _) = run(L!("(lines)[2]"));
    assert_eq!(out, vec![WString::from_str("b")]);
    let (_, out, _) = run(L!("(lines)[2..1]"));
    assert_eq!(out, vec![WString::from_str("b"), WString::from_str("a")]);
    let (_, out, _) = run(L!("(lines)[3]"));
    assert_eq!(out, Vec::<WString>::new());

    // Substituted output is not re-split or re-globbed by later stages.
    let (res, out, _) = run(L!("(spacey)"));
    assert_eq!(res, ExpandResult::ok);
    assert_eq!(out, vec![WString::from_str("a b"), WString::from_str("*")]);

    // A substitution producing nothing collapses the argument.
    let (res, out, _) = run(L!("a(nothing)b"));
    assert_eq!(res, ExpandResult::ok);
    assert_eq!(out, Vec::<WString>::new());
}

#[test]
fn test_expand_cmdsubst_errors() {
    test_init();
    let env = vars_environment();

    let executor = TestExecutor::new();
    expand_test_error(L!("(echo"), ExpandFlags::default(), &env, "Mismatched parenthesis");

    // The executor failing is a cmdsubst error.
    executor.set_fail(true);
    let (res, _out, errors) = expand_full(
        L!("(boom)"),
        ExpandFlags::default(),
        &env,
        &executor,
        None,
        None,
    );
    assert_eq!(res, ExpandResult::error);
    assert_eq!(errors[0].code, ParseErrorCode::cmdsubst);
    executor.set_fail(false);

    // Exceeding the output cap is reported at the paren position.
    executor.set_output(L!("big"), &[L!("data")]);
    executor.set_last_status(STATUS_READ_TOO_MUCH);
    let (res, _out, errors) = expand_full(
        L!("a(big)"),
        ExpandFlags::default(),
        &env,
        &executor,
        None,
        None,
    );
    assert_eq!(res, ExpandResult::error);
    assert_eq!(errors[0].code, ParseErrorCode::cmdsubst);
    assert!(errors[0].text.to_string().contains("Too much data"));
    assert_eq!(errors[0].source_start, 1);
    executor.set_last_status(0);

    // Identical cmdsubst errors are recorded only once per error list.
    executor.set_fail(true);
    let mut errors = ParseErrorList::new();
    let ctx = OperationContext::foreground(
        &env,
        &executor,
        Box::new(no_cancel),
        EXPANSION_LIMIT_DEFAULT,
    );
    for _ in 0..2 {
        let mut output = CompletionList::new();
        let _ = expand_string(
            L!("(boom)").to_owned(),
            &mut output,
            ExpandFlags::default(),
            &ctx,
            Some(&mut errors),
        );
    }
    assert_eq!(errors.len(), 1, "duplicate cmdsubst errors should be suppressed");
}

#[test]
fn test_expand_skip_cmdsubst() {
    test_init();
    let env = vars_environment();
    expand_test_error(
        L!("(echo hi)"),
        ExpandFlags::SKIP_CMDSUBST,
        &env,
        "Command substitutions not allowed",
    );
    expand_test_env!("h'i'", ExpandFlags::SKIP_CMDSUBST, env, ("hi"));
}

/// Build an environment whose HOME is the canonicalized temp dir, returning both.
fn home_environment() -> (PwdEnvironment, WString) {
    let tmp = str2wcstring(std::env::temp_dir().as_os_str().as_bytes());
    let realhome = wrealpath(&tmp).expect("temp dir should resolve");
    let mut env = PwdEnvironment::default();
    env.parent.set(L!("HOME"), &[&tmp]);
    (env, realhome)
}

#[test]
fn test_expand_tilde() {
    test_init();
    let noflags = ExpandFlags::default();
    let (env, realhome) = home_environment();

    expand_test_impl(L!("~"), noflags, &env, vec![realhome.clone()], None);
    let mut expected = realhome.clone();
    expected.push_str("/x");
    expand_test_impl(L!("~/x"), noflags, &env, vec![expected], None);

    // An unknown user leaves a literal tilde.
    expand_test_impl(
        L!("~no_such_user_blah9xz/f"),
        noflags,
        &env,
        vec![L!("~no_such_user_blah9xz/f").to_owned()],
        None,
    );

    // A missing HOME collapses the token entirely.
    let empty_env = PwdEnvironment::default();
    expand_test_impl(L!("~/x"), noflags, &empty_env, vec![WString::new()], None);

    // Skipping home directories leaves the tilde alone.
    expand_test_impl(
        L!("~/x"),
        ExpandFlags::SKIP_HOME_DIRECTORIES,
        &env,
        vec![L!("~/x").to_owned()],
        None,
    );

    // expand_tilde operates in place.
    let mut input = L!("~/abc").to_owned();
    expand_tilde(&mut input, &env);
    let mut expected = realhome.clone();
    expected.push_str("/abc");
    assert_eq!(input, expected);

    // And replace_home_directory_with_tilde inverts it.
    assert_eq!(replace_home_directory_with_tilde(&expected, &env), "~/abc");
    assert_eq!(
        replace_home_directory_with_tilde(L!("/no/home/here"), &env),
        "/no/home/here"
    );
}

#[test]
fn test_unexpand_tildes_in_completions() {
    test_init();
    let (env, realhome) = home_environment();

    // A replacing completion which starts with the expanded home gets its tilde back.
    let matcher = TestMatcher::new();
    matcher.set_replaces_token(true);
    let mut completion = realhome.clone();
    completion.push_str("/xfile");
    let mut wd = realhome.clone();
    wd.push('/');
    matcher.set_matches(&wd, &[&completion]);

    let executor = TestExecutor::new();
    let mut pwd_env = env.clone();
    pwd_env.parent.set(L!("PWD"), &[&realhome]);
    let (res, out, _errors) = expand_full(
        L!("~/x*"),
        ExpandFlags::FOR_COMPLETIONS,
        &pwd_env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(res, ExpandResult::wildcard_match);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].completion, "~/xfile");
    assert!(out[0].flags.contains(CompleteFlags::DONT_ESCAPE_TILDES));
}

#[test]
#[serial]
fn test_expand_jobs() {
    test_init();
    let env = vars_environment();
    let noflags = ExpandFlags::default();
    clear_jobs();
    add_job(Job::new(
        4001,
        1,
        L!("sleep 100").to_owned(),
        vec![Process::new(4001, L!("/bin/sleep").to_owned())],
    ));
    add_job(Job::new(
        4002,
        12,
        L!("cat file").to_owned(),
        vec![Process::new(
            4002,
            L!("/usr/bin/rgrep").to_owned(),
        )],
    ));

    // Bare % picks the most recently backgrounded job.
    expand_test_env!("%", noflags, env, ("4002"));
    // Numeric job ids.
    expand_test_env!("%1", noflags, env, ("4001"));
    expand_test_env!("%12", noflags, env, ("4002"));
    expand_test_error(L!("%100"), noflags, &env, "Unknown command");
    // Command prefixes.
    expand_test_env!("%sle", noflags, env, ("4001"));
    // Prefixes of a process's actual command, including by basename.
    expand_test_env!("%rg", noflags, env, ("4002"));

    // Job id completions carry the remainder of the id.
    let executor = TestExecutor::new();
    let (res, out, _) = expand_full(
        L!("%1"),
        ExpandFlags::FOR_COMPLETIONS,
        &env,
        &executor,
        None,
        None,
    );
    assert_eq!(res, ExpandResult::ok);
    let comps: Vec<WString> = out.iter().map(|c| c.completion.clone()).collect();
    assert_eq!(comps, vec![WString::from_str("2"), WString::new()]);
    assert!(out[0].description.to_string().contains("cat file"));

    clear_jobs();
}

#[test]
#[serial]
fn test_expand_percent_self_and_last() {
    test_init();
    let env = vars_environment();
    let noflags = ExpandFlags::default();
    clear_jobs();

    let pid = crate::proc::getpid().to_wstring();
    expand_test_impl(L!("%self"), noflags, &env, vec![pid], None);

    set_proc_last_bg_pid(777);
    expand_test_env!("%last", noflags, env, ("777"));
    set_proc_last_bg_pid(0);
    expand_test_env!("%last", noflags, env, ());

    // The job-table portion can be skipped without losing the symbolic names.
    let pid = crate::proc::getpid().to_wstring();
    expand_test_impl(L!("%self"), ExpandFlags::SKIP_JOBS, &env, vec![pid], None);

    // Completing %self offers the remainder.
    let executor = TestExecutor::new();
    let (_res, out, _) = expand_full(
        L!("%self"),
        ExpandFlags::FOR_COMPLETIONS,
        &env,
        &executor,
        None,
        None,
    );
    assert!(out.iter().any(|c| c.completion.is_empty()
        && c.description.to_string().contains("Shell process")));
}

#[test]
#[serial]
fn test_expand_unknown_process() {
    test_init();
    let env = vars_environment();
    clear_jobs();
    expand_test_error(
        L!("%qqzz_no_such_process"),
        ExpandFlags::default(),
        &env,
        "Unknown command",
    );
}

#[test]
fn test_expand_wildcard_working_dirs() {
    test_init();
    let executor = TestExecutor::new();

    let mut env = PwdEnvironment::default();
    env.parent.set(L!("PWD"), &[L!("/cwd")]);
    env.parent.set(L!("PATH"), &[L!("/bin"), L!("/usr/bin")]);
    env.parent.set(L!("CDPATH"), &[L!("dirs")]);

    // PATH entries become the working directories for commands without a slash.
    let matcher = TestMatcher::new();
    let (res, _out, _) = expand_full(
        L!("xyz*"),
        ExpandFlags::SPECIAL_FOR_COMMAND,
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(res, ExpandResult::wildcard_no_match);
    {
        let calls = matcher.calls.borrow();
        let dirs: Vec<&wstr> = calls.iter().map(|(_wc, dir)| dir.as_utfstr()).collect();
        assert_eq!(dirs, vec![L!("/bin"), L!("/usr/bin")]);
        let mut expected_wc = L!("xyz").to_owned();
        expected_wc.push(ANY_STRING);
        assert_eq!(calls[0].0, expected_wc);
    }

    // A slash forces the current working directory.
    let matcher = TestMatcher::new();
    let _ = expand_full(
        L!("a/b*"),
        ExpandFlags::SPECIAL_FOR_COMMAND,
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    {
        let calls = matcher.calls.borrow();
        let dirs: Vec<&wstr> = calls.iter().map(|(_wc, dir)| dir.as_utfstr()).collect();
        assert_eq!(dirs, vec![L!("/cwd/")]);
    }

    // CDPATH entries resolve relative to the working directory.
    let matcher = TestMatcher::new();
    let _ = expand_full(
        L!("sub*"),
        ExpandFlags::SPECIAL_FOR_CD,
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    {
        let calls = matcher.calls.borrow();
        let dirs: Vec<&wstr> = calls.iter().map(|(_wc, dir)| dir.as_utfstr()).collect();
        assert_eq!(dirs, vec![L!("/cwd/dirs")]);
    }

    // An empty CDPATH means the current directory; an empty PATH means nothing at all.
    let mut env = PwdEnvironment::default();
    env.parent.set(L!("PWD"), &[L!("/cwd")]);
    let matcher = TestMatcher::new();
    let _ = expand_full(
        L!("sub*"),
        ExpandFlags::SPECIAL_FOR_CD,
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(matcher.calls.borrow().len(), 1);
    let matcher = TestMatcher::new();
    let (res, out, _) = expand_full(
        L!("xyz*"),
        ExpandFlags::SPECIAL_FOR_COMMAND,
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(matcher.calls.borrow().len(), 0);
    assert_eq!(res, ExpandResult::wildcard_no_match);
    assert!(out.is_empty());
}

#[test]
fn test_expand_wildcard_results() {
    test_init();
    let executor = TestExecutor::new();
    let mut env = PwdEnvironment::default();
    env.parent.set(L!("PWD"), &[L!("/cwd")]);

    // Matches are sorted in natural order and reported as a match.
    let matcher = TestMatcher::new();
    matcher.set_matches(L!("/cwd/"), &[L!("file10"), L!("file2")]);
    let (res, out, _) = expand_full(
        L!("file*"),
        ExpandFlags::default(),
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(res, ExpandResult::wildcard_match);
    let comps: Vec<WString> = out.into_iter().map(|c| c.completion).collect();
    assert_eq!(comps, vec![WString::from_str("file2"), WString::from_str("file10")]);

    // No matches anywhere is wildcard_no_match with no error recorded.
    let matcher = TestMatcher::new();
    let (res, out, errors) = expand_full(
        L!("file*"),
        ExpandFlags::default(),
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(res, ExpandResult::wildcard_no_match);
    assert!(out.is_empty());
    assert_eq!(errors, vec![]);

    // Cancellation surfaces as a plain error with no error-list entry.
    let matcher = TestMatcher::new();
    matcher.set_cancel(true);
    let (res, _out, errors) = expand_full(
        L!("file*"),
        ExpandFlags::default(),
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(res, ExpandResult::error);
    assert_eq!(errors, vec![]);

    // Without a wildcard nothing is matched, and the string passes through.
    let matcher = TestMatcher::new();
    let (res, out, _) = expand_full(
        L!("fi'le'"),
        ExpandFlags::default(),
        &env,
        &executor,
        Some(&matcher),
        None,
    );
    assert_eq!(res, ExpandResult::ok);
    let comps: Vec<WString> = out.into_iter().map(|c| c.completion).collect();
    assert_eq!(comps, vec![WString::from_str("file")]);
    assert_eq!(matcher.calls.borrow().len(), 0);
}

#[test]
fn test_expand_history() {
    test_init();
    let env = vars_environment();
    let executor = TestExecutor::new();
    let history = History::from_items(vec![
        L!("newest").to_owned(),
        L!("middle").to_owned(),
        L!("oldest").to_owned(),
    ]);

    let run = |input: &wstr| -> Vec<WString> {
        let (res, out, _) = expand_full(
            input,
            ExpandFlags::default(),
            &env,
            &executor,
            None,
            Some(&history),
        );
        assert_ne!(res, ExpandResult::error);
        out.into_iter().map(|c| c.completion).collect()
    };

    assert_eq!(
        run(L!("$history")),
        vec![
            WString::from_str("newest"),
            WString::from_str("middle"),
            WString::from_str("oldest")
        ]
    );
    assert_eq!(run(L!("$history[1]")), vec![WString::from_str("newest")]);
    assert_eq!(run(L!("$history[2..3]")), vec![
        WString::from_str("middle"),
        WString::from_str("oldest")
    ]);
    assert_eq!(run(L!("$history[9]")), Vec::<WString>::new());

    // Without a history store the name expands like a missing variable.
    let (res, out, _) = expand_full(
        L!("$history"),
        ExpandFlags::default(),
        &env,
        &executor,
        None,
        None,
    );
    assert_ne!(res, ExpandResult::error);
    assert!(out.is_empty());
}

#[test]
fn test_expand_overflow() {
    test_init();
    // Make a list of 64 elements, then expand it cartesian-style several times over. This is
    // far too large to expand.
    let vals: Vec<WString> = (1..=64).map(|i| i.to_wstring()).collect();
    let mut env = PwdEnvironment::default();
    let val_refs: Vec<&wstr> = vals.iter().map(|v| v.as_utfstr()).collect();
    env.parent.set(L!("bigvar"), &val_refs);

    let executor = TestExecutor::new();
    let mut output = CompletionList::new();
    let mut errors = ParseErrorList::new();
    // We accept only 1024 completions.
    let ctx = OperationContext::foreground(&env, &executor, Box::new(no_cancel), 1024);
    let expansion = WString::from_str(&str::repeat("$bigvar", 8));
    let res = expand_string(
        expansion,
        &mut output,
        ExpandFlags::default(),
        &ctx,
        Some(&mut errors),
    );
    assert_eq!(res, ExpandResult::error);
    assert_ne!(errors, vec![]);
    assert!(errors[0].text.to_string().contains("too many results"));
}

#[test]
fn test_expand_one() {
    test_init();
    let env = vars_environment();
    let executor = TestExecutor::new();
    let ctx = OperationContext::foreground(
        &env,
        &executor,
        Box::new(no_cancel),
        EXPANSION_LIMIT_DEFAULT,
    );

    let mut s = L!("abc").to_owned();
    assert!(expand_one(&mut s, ExpandFlags::default(), &ctx, None));
    assert_eq!(s, "abc");

    let mut s = L!("$foo[2]").to_owned();
    assert!(expand_one(&mut s, ExpandFlags::default(), &ctx, None));
    assert_eq!(s, "y");

    // More than one result is a failure.
    let mut s = L!("$foo").to_owned();
    assert!(!expand_one(&mut s, ExpandFlags::default(), &ctx, None));
}

#[test]
fn test_expand_to_command_and_args() {
    test_init();
    let mut env = PwdEnvironment::default();
    env.parent.set(L!("cmdvar"), &[L!("/bin/ls"), L!("-l")]);
    let executor = TestExecutor::new();
    let ctx = OperationContext::foreground(
        &env,
        &executor,
        Box::new(no_cancel),
        EXPANSION_LIMIT_DEFAULT,
    );

    let mut cmd = WString::new();
    let mut args = vec![];
    let res = expand_to_command_and_args(
        L!("$cmdvar"),
        &ctx,
        &mut cmd,
        Some(&mut args),
        None,
        false,
    );
    assert_eq!(res, ExpandResult::ok);
    assert_eq!(cmd, "/bin/ls");
    assert_eq!(args, vec![L!("-l").to_owned()]);

    // Command substitutions are disallowed in command position.
    let mut cmd = WString::new();
    let res = expand_to_command_and_args(L!("(echo ls)"), &ctx, &mut cmd, None, None, false);
    assert_eq!(res, ExpandResult::error);
}

#[test]
fn test_xdm_login_hack() {
    let args: Vec<String> = vec!["fish".into(), "a b".into(), "c'd".into()];

    let mut cmds = vec!["exec \"${@}\"".to_string()];
    assert!(fish_xdm_login_hack(&mut cmds, &args));
    assert_eq!(cmds[0], "exec 'a b' 'c\\'d'");

    let mut cmds = vec!["exec \"$@\"".to_string()];
    assert!(fish_xdm_login_hack(&mut cmds, &args));
    assert_eq!(cmds[0], "exec 'a b' 'c\\'d'");

    let mut cmds = vec!["echo hi".to_string()];
    assert!(!fish_xdm_login_hack(&mut cmds, &args));
    assert_eq!(cmds[0], "echo hi");

    let mut cmds = vec!["exec \"$@\"".to_string(), "second".to_string()];
    assert!(!fish_xdm_login_hack(&mut cmds, &args));
}
