//! Output framing for interactive shell clients.
//!
//! The client prints connection banners before the result and a prompt after it.
//! Their length varies with client version, but the line count is stable for a
//! given client and flag combination, so framing counts newline boundaries.

use serde::{Deserialize, Serialize};

/// Banner and connection-status lines `beeline --silent` prints before results.
pub const BEELINE_BANNER_LINES: usize = 3;

/// Prompt lines `beeline --silent` prints after results.
pub const BEELINE_FOOTER_LINES: usize = 1;

/// How many lines to strip from each end of raw client output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingPolicy {
    pub leading_lines: usize,
    pub trailing_lines: usize,
}

impl FramingPolicy {
    /// Framing for `beeline --silent --outputformat=csv2`.
    pub const BEELINE: Self = Self {
        leading_lines: BEELINE_BANNER_LINES,
        trailing_lines: BEELINE_FOOTER_LINES,
    };

    /// No framing, for clients that already emit bare tabular output.
    pub const NONE: Self = Self {
        leading_lines: 0,
        trailing_lines: 0,
    };

    pub fn new(leading_lines: usize, trailing_lines: usize) -> Self {
        Self {
            leading_lines,
            trailing_lines,
        }
    }

    /// Extracts the tabular region from raw client output.
    ///
    /// Surrounding whitespace is trimmed first. Input with fewer lines than the
    /// policy strips frames to an empty string.
    pub fn frame(&self, raw: &str) -> String {
        let mut rest = raw.trim();

        for _ in 0..self.leading_lines {
            match rest.find('\n') {
                Some(i) => rest = &rest[i + 1..],
                None => return String::new(),
            }
        }

        for _ in 0..self.trailing_lines {
            // No newline left: the remaining line is itself the footer.
            rest = match rest.rfind('\n') {
                Some(i) => &rest[..i],
                None => "",
            };
        }

        rest.trim_end_matches('\r').to_string()
    }
}

impl Default for FramingPolicy {
    fn default() -> Self {
        Self::BEELINE
    }
}
