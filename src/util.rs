//! Generic utilities library.

use crate::wchar::prelude::*;
use std::cmp::Ordering;

/// Compares two wide character strings with an (arguably) intuitive ordering. This function
/// tries to order strings in a way which is intuitive to humans with regards to sorting strings
/// containing numbers: any sequence of digits is treated as a single entity, so "file5.txt"
/// sorts before "file12.txt". Comparison is case-folding; difference in case or in the number of
/// leading zeroes only has an effect if no other differences are found. Frozen in time for glob
/// ordering.
pub fn wcsfilecmp_glob(a: &wstr, b: &wstr) -> Ordering {
    let mut retval = Ordering::Equal;
    let mut ai = 0;
    let mut bi = 0;
    while ai < a.len() && bi < b.len() {
        let ac = a.as_char_slice()[ai];
        let bc = b.as_char_slice()[bi];
        if ac.is_ascii_digit() && bc.is_ascii_digit() {
            let (ad, bd);
            (retval, ad, bd) = wcsfilecmp_leading_digits(a.slice_from(ai), b.slice_from(bi));
            ai += ad;
            bi += bd;
            // If we know the strings aren't logically equal or we've reached the end of one or
            // both strings we can stop iterating over the chars in each string.
            if retval != Ordering::Equal || ai == a.len() || bi == b.len() {
                break;
            }
            continue;
        }

        // Fast path: skip the case fold.
        if ac == bc {
            ai += 1;
            bi += 1;
            continue;
        }

        let acl = ac.to_lowercase().next().unwrap();
        let bcl = bc.to_lowercase().next().unwrap();
        match acl.cmp(&bcl) {
            Ordering::Equal => {
                ai += 1;
                bi += 1;
            }
            unequal => {
                retval = unequal;
                break;
            }
        }
    }

    if retval != Ordering::Equal {
        return retval; // we already know the strings aren't logically equal
    }

    if ai == a.len() {
        if bi == b.len() {
            // The strings are logically equal. They may or may not be the same length depending
            // on whether numbers were present but that doesn't matter. Disambiguate strings that
            // differ by letter case or length.
            a.cmp(b)
        } else {
            Ordering::Less // string a is a prefix of b and b is longer
        }
    } else {
        assert!(bi == b.len());
        Ordering::Greater // string b is a prefix of a and a is longer
    }
}

// Compare the strings to see if they begin with an integer that can be compared and return the
// result of that comparison.
fn wcsfilecmp_leading_digits(a: &wstr, b: &wstr) -> (Ordering, usize, usize) {
    // Ignore leading 0s.
    let mut ai = a.as_char_slice().iter().take_while(|c| **c == '0').count();
    let mut bi = b.as_char_slice().iter().take_while(|c| **c == '0').count();

    let mut ret = Ordering::Equal;
    loop {
        let ac = a.as_char_slice().get(ai).unwrap_or(&'\0');
        let bc = b.as_char_slice().get(bi).unwrap_or(&'\0');
        if ac.is_ascii_digit() && bc.is_ascii_digit() {
            // We keep the cmp value for the first differing digit.
            // If the numbers have the same length, that's the value.
            if ret == Ordering::Equal {
                ret = ac.cmp(bc);
            }
        } else {
            // We don't have negative numbers and we only allow ints, and we have already
            // skipped leading zeroes, so the longer number is larger automatically.
            if ac.is_ascii_digit() {
                ret = Ordering::Greater;
            }
            if bc.is_ascii_digit() {
                ret = Ordering::Less;
            }
            break;
        }
        ai += 1;
        bi += 1;
    }

    // We skip trailing whitespace, for stability with how the integer parser reads numbers.
    ai += a
        .as_char_slice()
        .iter()
        .skip(ai)
        .take_while(|c| c.is_whitespace())
        .count();
    bi += b
        .as_char_slice()
        .iter()
        .skip(bi)
        .take_while(|c| c.is_whitespace())
        .count();
    (ret, ai, bi)
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! validate {
        ($str1:expr, $str2:expr, $expected:expr) => {
            assert_eq!(wcsfilecmp_glob(L!($str1), L!($str2)), $expected)
        };
    }

    #[test]
    fn test_wcsfilecmp_glob() {
        use Ordering::*;
        validate!("", "", Equal);
        validate!("", "def", Less);
        validate!("abc", "", Greater);
        validate!("abc", "def", Less);
        validate!("abc", "DEF", Less);
        validate!("abc", "abc", Equal);
        validate!("1ghi", "2ghi", Less);
        validate!("1ghi", "01ghi", Greater);
        validate!("abc12", "abc5", Greater);
        validate!("abc5", "abc12", Less);
        validate!("file1.txt", "file5.txt", Less);
        validate!("file5.txt", "file12.txt", Less);
        validate!("abc002.txt", "abc02.txt", Less);
    }
}
