//! Category-based diagnostic logging.
//!
//! Every message belongs to a category which can be switched on or off by name at runtime.
//! Output goes to a configurable file descriptor, stderr by default.

use crate::wchar::prelude::*;
use crate::wutil::write_to_fd;
use libc::c_int;
use std::sync::atomic::{AtomicI32, Ordering};

#[rustfmt::skip::macros(category)]
pub mod categories {
    use super::wstr;
    use crate::wchar::L;
    use std::sync::atomic::AtomicBool;

    pub struct category_t {
        pub name: &'static wstr,
        pub description: &'static wstr,
        pub enabled: AtomicBool,
    }

    /// Macro to declare a static variable identified by $var,
    /// with the given name and description, and optionally enabled by default.
    macro_rules! declare_category {
        (
            ($var:ident, $name:literal, $description:literal, $enabled:expr)
        ) => {
            pub static $var: category_t = category_t {
                name: L!($name),
                description: L!($description),
                enabled: AtomicBool::new($enabled),
            };
        };
        (
            ($var:ident, $name:expr, $description:expr)
        ) => {
            declare_category!(($var, $name, $description, false));
        };
    }

    /// Macro to extract the variable name for a category.
    macro_rules! category_name {
        (($var:ident, $name:literal, $description:literal, $enabled:expr)) => {
            $var
        };
        (($var:ident, $name:literal, $description:literal)) => {
            $var
        };
    }

    macro_rules! categories {
        (
            // A repetition of categories, separated by semicolons.
            $($cats:tt);*

            // Allow trailing semicolon.
            $(;)?
        ) => {
            // Declare each category.
            $(
                declare_category!($cats);
            )*

            // Define a function which gives you a Vector of all categories.
            pub fn all_categories() -> Vec<&'static category_t> {
                vec![
                    $(
                        & category_name!($cats),
                    )*
                ]
            }
        };
    }

    categories!(
        (error, "error", "Serious unexpected errors (on by default)", true);

        (debug, "debug", "Debugging aid (on by default)", true);

        (warning, "warning", "Warnings (on by default)", true);

        (expand, "expand", "Argument expansion stages");

        (abbrs, "abbrs", "Abbreviation cache updates");

        (iothread, "iothread", "Main-thread request dispatch");

        (proc, "proc", "Job table access");
    );
}

/// FLOG formats values. By default we would like to use Display, and fall back to Debug.
/// However that would require specialization. So instead we make two "separate" traits, bring them
/// both in scope, and let Rust figure it out.
/// Clients can opt a Debug type into Floggable by implementing FloggableDebug:
///    impl FloggableDebug for MyType {}
pub trait FloggableDisplay {
    /// Return a string representation of this thing.
    fn to_flog_str(&self) -> String;
}

impl<T: std::fmt::Display> FloggableDisplay for T {
    fn to_flog_str(&self) -> String {
        self.to_string()
    }
}

pub trait FloggableDebug: std::fmt::Debug {
    fn to_flog_str(&self) -> String {
        format!("{:?}", self)
    }
}

impl FloggableDebug for std::thread::ThreadId {}

/// Write to our FLOG file.
pub fn flog_impl(s: &str) {
    let fd = get_flog_file_fd();
    if fd < 0 {
        return;
    }
    let _ = write_to_fd(s.as_bytes(), fd);
}

/// The entry point for flogging.
#[macro_export]
macro_rules! FLOG {
    ($category:ident, $($elem:expr),+ $(,)*) => {
        if $crate::flog::categories::$category.enabled.load(std::sync::atomic::Ordering::Relaxed) {
            #[allow(unused_imports)]
            use $crate::flog::{FloggableDisplay, FloggableDebug};
            let mut vs = vec![format!("{}:", $crate::flog::categories::$category.name)];
            $(
                {
                   vs.push($elem.to_flog_str())
                }
            )+
            // We don't use locking here so we have to append our own newline to avoid multiple
            // writes.
            let mut v = vs.join(" ");
            v.push('\n');
            $crate::flog::flog_impl(&v);
        }
    };
}

#[macro_export]
macro_rules! FLOGF {
    ($category:ident, $fmt: expr, $($elem:expr),+ $(,)*) => {
        $crate::flog::FLOG!($category, format!($fmt, $($elem),*))
    }
}

pub use {FLOG, FLOGF};

/// For each category whose name matches the given name, set its enabled state.
/// Returns false if no category matched.
fn apply_one_category(name: &wstr, sense: bool) -> bool {
    let mut match_found = false;
    for cat in categories::all_categories() {
        if cat.name == name {
            cat.enabled.store(sense, Ordering::Relaxed);
            match_found = true;
        }
    }
    match_found
}

/// Set the active flog categories according to the given comma-separated list of names.
/// A name prefixed with '-' disables the category.
pub fn activate_flog_categories_by_pattern(names: &wstr) {
    let mut names: WString = names.into();
    // Normalize underscores to dashes, allowing the user to be sloppy.
    for c in names.as_char_slice_mut() {
        if *c == '_' {
            *c = '-';
        }
    }
    for s in names.split(',') {
        let matched = if s.starts_with('-') {
            apply_one_category(s.slice_from(1), false)
        } else {
            apply_one_category(s, true)
        };
        if !matched {
            eprintln!("Failed to match debug category: {s}");
        }
    }
}

/// The flog output fd. Defaults to stderr. A value < 0 disables flog.
static FLOG_FD: AtomicI32 = AtomicI32::new(libc::STDERR_FILENO);

pub fn set_flog_file_fd(fd: c_int) {
    FLOG_FD.store(fd, Ordering::Relaxed);
}

#[inline]
pub fn get_flog_file_fd() -> c_int {
    FLOG_FD.load(Ordering::Relaxed)
}
