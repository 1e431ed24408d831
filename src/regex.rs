//! Regular-expression backend selection.
//!
//! The `regex` feature uses the full `regex` crate; `lite` swaps in `regex-lite`
//! for smaller binaries. Both expose the same subset used by this crate.

#[cfg(feature = "regex")]
pub(crate) use regex::{Regex, RegexBuilder, escape};

#[cfg(all(feature = "lite", not(feature = "regex")))]
pub(crate) use regex_lite::{Regex, RegexBuilder, escape};

#[cfg(not(any(feature = "regex", feature = "lite")))]
compile_error!("either the `regex` or the `lite` feature must be enabled");
