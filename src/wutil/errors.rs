/// Error type for the integer parsing functions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The input was empty or all whitespace.
    Empty,
    /// The input contained no parsable digits at the expected position.
    InvalidChar,
    /// The value did not fit in the requested type.
    Overflow,
}
