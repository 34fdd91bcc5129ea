//! Terminal output helpers

/// ANSI colors, blanked out when stdout is not a terminal
#[derive(Debug, Clone, Copy)]
pub struct Colors {
    pub red: &'static str,
    pub green: &'static str,
    pub yellow: &'static str,
    pub blue: &'static str,
    pub cyan: &'static str,
    pub bold: &'static str,
    pub dim: &'static str,
    pub reset: &'static str,
}

impl Default for Colors {
    fn default() -> Self {
        Self::new()
    }
}

impl Colors {
    pub fn new() -> Self {
        if atty::is(atty::Stream::Stdout) {
            Self::ansi()
        } else {
            Self::plain()
        }
    }

    pub fn ansi() -> Self {
        Self {
            red: "\x1b[0;31m",
            green: "\x1b[0;32m",
            yellow: "\x1b[0;33m",
            blue: "\x1b[0;34m",
            cyan: "\x1b[0;36m",
            bold: "\x1b[1m",
            dim: "\x1b[2m",
            reset: "\x1b[0m",
        }
    }

    pub fn plain() -> Self {
        Self {
            red: "",
            green: "",
            yellow: "",
            blue: "",
            cyan: "",
            bold: "",
            dim: "",
            reset: "",
        }
    }
}

/// Shorten `s` to at most `max_len` characters, marking the cut with `...`
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
