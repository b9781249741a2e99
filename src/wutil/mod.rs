//! Wide-string wrappers around various system facilities and small parsing helpers.

pub mod errors;
pub mod gettext;
pub mod wcstoi;

pub use wcstoi::*;

use crate::common::{str2wcstring, wcs2string};
use crate::wchar::prelude::*;
use crate::wcstringutil::join_strings;
use crate::FLOG;
use std::ffi::OsStr;
use std::fs::canonicalize;
use std::io::Write;
use std::os::fd::{BorrowedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};

/// Wide character version of getcwd(). Returns the empty string on failure.
pub fn wgetcwd() -> WString {
    match std::env::current_dir() {
        Ok(cwd) => str2wcstring(cwd.as_os_str().as_bytes()),
        Err(err) => {
            FLOG!(
                error,
                "getcwd() failed with errno",
                err.raw_os_error().unwrap_or(0)
            );
            WString::new()
        }
    }
}

/// Wide character realpath. The last path component does not need to be valid. If an error
/// occurs, `wrealpath()` returns `None`.
pub fn wrealpath(pathname: &wstr) -> Option<WString> {
    if pathname.is_empty() {
        return None;
    }

    let mut narrow_path: Vec<u8> = wcs2string(pathname);

    // Strip trailing slashes. This treats "/a//" as equivalent to "/a" if /a is a non-directory.
    while narrow_path.len() > 1 && narrow_path[narrow_path.len() - 1] == b'/' {
        narrow_path.pop();
    }

    let narrow_res = canonicalize(OsStr::from_bytes(&narrow_path));

    let real_path = if let Ok(result) = narrow_res {
        result.into_os_string().into_vec()
    } else {
        // Check if everything up to the last path component is valid.
        let pathsep_idx = narrow_path.iter().rposition(|&c| c == b'/');

        if pathsep_idx == Some(0) {
            // If the only pathsep is the first character then it's an absolute path with a
            // single path component and thus doesn't need conversion.
            narrow_path
        } else {
            // Only call realpath() on the portion up to the last component.
            let narrow_res = if let Some(pathsep_idx) = pathsep_idx {
                canonicalize(OsStr::from_bytes(&narrow_path[0..pathsep_idx]))
            } else {
                // If there is no "/", this is a file in $PWD, so give the realpath to that.
                canonicalize(".")
            };

            let Ok(narrow_result) = narrow_res else {
                return None;
            };

            let pathsep_idx = pathsep_idx.map_or(0, |idx| idx + 1);

            let mut real_path = narrow_result.into_os_string().into_vec();

            // This test is to deal with cases such as /../../x => //x.
            if real_path.len() > 1 {
                real_path.push(b'/');
            }

            real_path.extend_from_slice(&narrow_path[pathsep_idx..]);

            real_path
        }
    };

    Some(str2wcstring(&real_path))
}

/// Given an input path, "normalize" it:
/// 1. Collapse multiple /s into a single /, except maybe at the beginning.
/// 2. .. goes up a level.
/// 3. Remove /./ in the middle.
pub fn normalize_path(path: &wstr, allow_leading_double_slashes: bool) -> WString {
    // Count the leading slashes.
    let sep = '/';
    let mut leading_slashes: usize = 0;
    for c in path.chars() {
        if c != sep {
            break;
        }
        leading_slashes += 1;
    }

    let comps: Vec<&wstr> = path.split(sep).collect();
    let mut new_comps = Vec::new();
    for comp in comps {
        if comp.is_empty() || comp == "." {
            continue;
        } else if comp != ".." {
            new_comps.push(comp);
        } else if !new_comps.is_empty() && new_comps.last().unwrap() != ".." {
            // '..' with a real path component, drop that path component.
            new_comps.pop();
        } else if leading_slashes == 0 {
            // We underflowed the .. and are a relative (not absolute) path.
            new_comps.push(L!(".."));
        }
    }
    let mut result = join_strings(&new_comps, sep);
    // If we don't allow leading double slashes, collapse them to 1 if there are any.
    let mut numslashes = if leading_slashes > 0 { 1 } else { 0 };
    // If we do, prepend one or two leading slashes.
    // Yes, three+ slashes are collapsed to one. (!)
    if allow_leading_double_slashes && leading_slashes == 2 {
        numslashes = 2;
    }
    for _ in 0..numslashes {
        result.insert(0, sep);
    }
    // Ensure ./ normalizes to . and not empty.
    if result.is_empty() {
        result.push('.');
    }
    result
}

/// Returns the last path component, like basename(3): trailing slashes are ignored, the empty
/// string becomes ".", and a path of only slashes stays "/".
pub fn wbasename(mut path: &wstr) -> &wstr {
    if path.is_empty() {
        return L!(".");
    }
    while path.len() > 1 && path.char_at(path.len() - 1) == '/' {
        path = path.slice_to(path.len() - 1);
    }
    if path == "/" {
        return path;
    }
    match path.as_char_slice().iter().rposition(|&c| c == '/') {
        Some(idx) => path.slice_from(idx + 1),
        None => path,
    }
}

/// Write the given data to the fd, retrying on EINTR.
pub fn write_to_fd(input: &[u8], fd: RawFd) -> nix::Result<usize> {
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut total = 0;
    while total < input.len() {
        match nix::unistd::write(fd, &input[total..]) {
            Ok(written) => total += written,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// Print the given string, followed by a description of the current value of errno, to stderr.
pub fn perror(s: &str) {
    let e = errno::errno();
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{s}: {e}");
}

/// One if the code point may not appear in user input: our reserved marker ranges.
pub(crate) fn fish_reserved_codepoint(c: char) -> bool {
    use crate::common::{RESERVED_CHAR_BASE, RESERVED_CHAR_END};
    RESERVED_CHAR_BASE <= c && c < RESERVED_CHAR_END
}

const PUA1_START: char = '\u{E000}';
const PUA1_END: char = '\u{F900}';

/// Return one if the code point is in a Unicode private use area.
pub(crate) fn fish_is_pua(c: char) -> bool {
    PUA1_START <= c && c < PUA1_END
}

/// We need this because there are too many iswalnum implementations that don't return the proper
/// answer for some code points.
pub fn fish_iswalnum(c: char) -> bool {
    !fish_reserved_codepoint(c) && !fish_is_pua(c) && c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wchar::L;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(L!(""), true), ".");
        assert_eq!(normalize_path(L!("//"), true), "//");
        assert_eq!(normalize_path(L!("///"), true), "/");
        assert_eq!(normalize_path(L!("/a//b/"), true), "/a/b");
        assert_eq!(normalize_path(L!("a/./b/../c"), true), "a/c");
        assert_eq!(normalize_path(L!("../a"), true), "../a");
        assert_eq!(normalize_path(L!("/../a"), true), "/a");
    }

    #[test]
    fn test_wbasename() {
        assert_eq!(wbasename(L!("/usr/bin/sleep")), "sleep");
        assert_eq!(wbasename(L!("sleep")), "sleep");
        assert_eq!(wbasename(L!("/usr/bin/")), "bin");
        assert_eq!(wbasename(L!("/")), "/");
        assert_eq!(wbasename(L!("")), ".");
    }
}
