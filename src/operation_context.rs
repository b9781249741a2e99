//! A property bag carrying everything one expansion call needs: the variables, the optional
//! collaborators, a cancellation checker and the expansion limit.

use crate::common::CancelChecker;
use crate::env::Environment;
use crate::exec::SubshellExecutor;
use crate::history::History;
use crate::wildcard::WildcardMatcher;

/// A common helper which always returns false.
pub fn no_cancel() -> bool {
    false
}

// Default limits for expansion.
/// The default maximum number of items from expansion.
pub const EXPANSION_LIMIT_DEFAULT: usize = 512 * 1024;
/// A smaller limit for background operations like syntax highlighting.
pub const EXPANSION_LIMIT_BACKGROUND: usize = 512;

/// An OperationContext is a simple property bag which wraps up the data needed for expansion
/// and completion.
pub struct OperationContext<'a> {
    vars: &'a dyn Environment,

    /// The subshell executor, if command substitutions may run.
    executor: Option<&'a dyn SubshellExecutor>,

    /// The history store, read by `$history` on the main thread.
    history: Option<&'a History>,

    /// The filesystem matcher driven by the wildcard stage.
    matcher: Option<&'a dyn WildcardMatcher>,

    /// The limit on the number of expansions which should be produced.
    pub expansion_limit: usize,

    /// A function which may be used to poll for cancellation.
    pub cancel_checker: CancelChecker,
}

impl<'a> OperationContext<'a> {
    /// Construct a context for a foreground operation, which may run command substitutions.
    pub fn foreground(
        vars: &'a dyn Environment,
        executor: &'a dyn SubshellExecutor,
        cancel_checker: CancelChecker,
        expansion_limit: usize,
    ) -> OperationContext<'a> {
        OperationContext {
            vars,
            executor: Some(executor),
            history: None,
            matcher: None,
            expansion_limit,
            cancel_checker,
        }
    }

    /// Construct a context from vars alone. Command substitutions cannot run.
    pub fn background(vars: &'a dyn Environment, expansion_limit: usize) -> OperationContext<'a> {
        OperationContext {
            vars,
            executor: None,
            history: None,
            matcher: None,
            expansion_limit,
            cancel_checker: Box::new(no_cancel),
        }
    }

    pub fn background_with_cancel_checker(
        vars: &'a dyn Environment,
        cancel_checker: CancelChecker,
        expansion_limit: usize,
    ) -> OperationContext<'a> {
        OperationContext {
            cancel_checker,
            ..OperationContext::background(vars, expansion_limit)
        }
    }

    /// Attach a history store.
    pub fn with_history(mut self, history: &'a History) -> Self {
        self.history = Some(history);
        self
    }

    /// Attach a filesystem matcher.
    pub fn with_matcher(mut self, matcher: &'a dyn WildcardMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn vars(&self) -> &dyn Environment {
        self.vars
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    pub fn executor(&self) -> &dyn SubshellExecutor {
        self.executor.expect("Context has no subshell executor")
    }

    pub fn history(&self) -> Option<&History> {
        self.history
    }

    pub fn matcher(&self) -> Option<&dyn WildcardMatcher> {
        self.matcher
    }

    // Invoke the cancel checker. Return if we should cancel.
    pub fn check_cancel(&self) -> bool {
        (self.cancel_checker)()
    }
}
