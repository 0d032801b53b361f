//! Human-readable progress lines.
//!
//! Purely observational: nothing here can influence a transfer's outcome.
use std::fmt;

const MB: f64 = 1024.0 * 1024.0;

/// A snapshot emitted by the copier every few blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressSample {
    /// Bytes moved by the block that triggered this sample.
    pub block_bytes: u64,
    /// Cumulative bytes moved so far.
    pub transferred: u64,
    /// Bytes the plan expects in total, or zero if unknown.
    pub planned: u64,
}

impl ProgressSample {
    /// Completion percentage, undefined when nothing was planned.
    pub fn percent(&self) -> Option<f64> {
        (self.planned > 0).then(|| self.transferred as f64 * 100.0 / self.planned as f64)
    }
}

struct Percent(Option<f64>);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(p) => write!(f, "{p:.1}%"),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for ProgressSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "* [{}] [{:.1} MB] [{}]",
            self.block_bytes,
            self.transferred as f64 / MB,
            Percent(self.percent())
        )
    }
}

/// Formats a progress line from its raw parts.
pub fn format_line(block_bytes: u64, transferred: u64, planned: u64) -> String {
    ProgressSample {
        block_bytes,
        transferred,
        planned,
    }
    .to_string()
}

/// Formats the final line printed once a transfer completes.
pub fn summary_line(transferred: u64, planned: u64) -> String {
    let percent = ProgressSample {
        block_bytes: 0,
        transferred,
        planned,
    }
    .percent();
    format!(
        "Done! [{:.1} MB] ({} bytes) [{}]",
        transferred as f64 / MB,
        transferred,
        Percent(percent)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_shows_megabytes_and_percent() {
        assert_eq!(
            format_line(65_536, 1_638_400, 6_553_600),
            "* [65536] [1.6 MB] [25.0%]"
        );
    }

    #[test]
    fn unknown_total_shows_na() {
        assert_eq!(format_line(512, 512, 0), "* [512] [0.0 MB] [n/a]");
        assert_eq!(summary_line(0, 0), "Done! [0.0 MB] (0 bytes) [n/a]");
    }

    #[test]
    fn summary_of_full_transfer() {
        assert_eq!(
            summary_line(1_048_576, 1_048_576),
            "Done! [1.0 MB] (1048576 bytes) [100.0%]"
        );
    }
}
