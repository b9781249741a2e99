//! Message catalog shims.
//!
//! The engine is host-localized: messages pass through unchanged, but every user-facing string
//! goes through these macros so a catalog can be hooked in at one place.

/// Return a static message as a wide string slice.
#[macro_export]
macro_rules! wgettext {
    ($string:expr) => {
        widestring::utf32str!($string)
    };
}

/// Format a message into an owned wide string. Arguments are formatted with std::fmt; wide
/// strings implement Display so they may be passed directly.
#[macro_export]
macro_rules! wgettext_fmt {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        $crate::wchar::WString::from_str(&format!($fmt $(, $arg)*))
    };
}

pub use {wgettext, wgettext_fmt};
