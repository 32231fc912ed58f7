use std::{ops::Deref, sync::OnceLock};

use regex::Regex;

/// A regular expression which is compiled the first time it is used,
/// so that patterns can live in `static` items.
pub(crate) struct LazyRegex {
    compiled: OnceLock<Regex>,
    pattern: &'static str,
}

impl LazyRegex {
    pub(crate) const fn new(pattern: &'static str) -> Self {
        LazyRegex {
            compiled: OnceLock::new(),
            pattern,
        }
    }
}

impl Deref for LazyRegex {
    type Target = Regex;

    fn deref(&self) -> &Regex {
        self.compiled
            .get_or_init(|| match Regex::new(self.pattern) {
                Ok(r) => r,
                Err(e) => {
                    // Patterns are compile-time constants, so this is a
                    // bug rather than a problem with the input.
                    panic!("'{}' is not a valid regular expression: {e}", self.pattern);
                }
            })
    }
}

#[test]
fn lazy_regex_compiles_on_first_use() {
    static DIGITS: LazyRegex = LazyRegex::new("^[0-9]+$");
    assert!(DIGITS.is_match("0123"));
    assert!(!DIGITS.is_match("12a"));
}
