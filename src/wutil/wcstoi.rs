//! Integer parsing in the spirit of wcstol(), over wide string slices.

pub use super::errors::Error;
use crate::wchar::prelude::*;

/// Options for [`wcstoi_partial()`].
#[derive(Copy, Clone, Debug, Default)]
pub struct Options {
    /// The radix, or None to infer it: leading 0x or 0X means 16, leading 0 means 8, else 10.
    pub mradix: Option<u32>,
}

/// Parse the given string as an i64.
/// Leading whitespace is skipped. A leading + or - is consumed. Parsing stops at the first
/// character that is not a digit in the radix; the number of characters consumed (including
/// leading whitespace and sign) is stored in `out_consumed`.
pub fn wcstoi_partial(src: &wstr, options: Options, out_consumed: &mut usize) -> Result<i64, Error> {
    if let Some(r) = options.mradix {
        assert!((2..=36).contains(&r), "invalid radix {r}");
    }

    let chars = src.as_char_slice();
    let mut pos = 0;

    // Skip leading whitespace.
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    if pos == chars.len() {
        return Err(Error::Empty);
    }

    // Consume a leading +/-.
    let negative = match chars[pos] {
        '-' | '+' => {
            let neg = chars[pos] == '-';
            pos += 1;
            neg
        }
        _ => false,
    };

    // We eagerly attempt to parse "0" as octal and "0x" as hex, but may backtrack to just
    // returning 0.
    let mut leading_zero_consumed = None;

    // Determine the radix.
    let radix = if let Some(radix) = options.mradix {
        radix
    } else if pos < chars.len() && chars[pos] == '0' {
        pos += 1;
        leading_zero_consumed = Some(pos);
        match chars.get(pos) {
            Some('x') | Some('X') => {
                pos += 1;
                16
            }
            Some(c) if c.is_ascii_digit() => 8,
            _ => {
                *out_consumed = pos;
                return Ok(0);
            }
        }
    } else {
        10
    };

    // Accumulate the digits.
    let digits_start = pos;
    let mut result: u64 = 0;
    while pos < chars.len() {
        let Some(digit) = chars[pos].to_digit(radix) else {
            break;
        };
        result = result
            .checked_mul(u64::from(radix))
            .and_then(|r| r.checked_add(u64::from(digit)))
            .ok_or(Error::Overflow)?;
        pos += 1;
    }

    // Did we consume at least one digit? If not, but we had a leading 0 (say 08 or 0x), then we
    // just parsed a zero.
    if pos == digits_start {
        if let Some(consumed) = leading_zero_consumed {
            *out_consumed = consumed;
            return Ok(0);
        }
        return Err(Error::InvalidChar);
    }
    *out_consumed = pos;

    if negative {
        // Careful of the most negative value.
        if result > (i64::MAX as u64) + 1 {
            return Err(Error::Overflow);
        }
        Ok((result as i64).wrapping_neg())
    } else {
        i64::try_from(result).map_err(|_| Error::Overflow)
    }
}

/// A historic "enhanced" version of wcstol: trailing whitespace is ignored, any other trailing
/// characters are an error. Always base 10.
pub fn fish_wcstol(mut src: &wstr) -> Result<i64, Error> {
    let options = Options {
        mradix: Some(10),
    };
    let mut consumed = 0;
    let result = wcstoi_partial(src, options, &mut consumed)?;
    src = src.slice_from(consumed);
    while !src.is_empty() && src.char_at(0).is_whitespace() {
        src = src.slice_from(1);
    }
    if !src.is_empty() {
        return Err(Error::InvalidChar);
    }
    Ok(result)
}

/// Variant of fish_wcstol for ints, erroring if it does not fit.
pub fn fish_wcstoi(src: &wstr) -> Result<i32, Error> {
    let res = fish_wcstol(src)?;
    res.try_into().map_err(|_| Error::Overflow)
}
