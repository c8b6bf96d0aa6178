//! Per-execution capture of everything the program prints

use tracing::warn;

pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
    limit: usize,
    truncated: bool,
    /// While non-zero, writes are discarded (output of `__repr__` during tracing)
    muted: usize,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
            muted: 0,
        }
    }

    pub fn write(&mut self, s: &str) {
        if self.muted > 0 || self.truncated {
            return;
        }
        if self.text.len() + s.len() <= self.limit {
            self.text.push_str(s);
            return;
        }

        let mut room = self.limit.saturating_sub(self.text.len());
        while room > 0 && !s.is_char_boundary(room) {
            room -= 1;
        }
        self.text.push_str(&s[..room]);
        self.text.push_str(TRUNCATION_MARKER);
        self.truncated = true;
        warn!(limit = self.limit, "output limit reached, truncating");
    }

    pub fn mute(&mut self) {
        self.muted += 1;
    }

    pub fn unmute(&mut self) {
        self.muted = self.muted.saturating_sub(1);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_within_limit() {
        let mut out = OutputBuffer::new(16);
        out.write("hello ");
        out.write("world");
        assert_eq!(out.as_str(), "hello world");
        assert!(!out.is_truncated());
    }

    #[test]
    fn test_truncates_once_at_char_boundary() {
        let mut out = OutputBuffer::new(4);
        out.write("abé");
        out.write("cdef");
        out.write("more");
        assert_eq!(out.as_str(), format!("abé{}", TRUNCATION_MARKER));
        assert!(out.is_truncated());
    }

    #[test]
    fn test_muted_writes_are_dropped() {
        let mut out = OutputBuffer::new(100);
        out.mute();
        out.write("hidden");
        out.unmute();
        out.write("shown");
        assert_eq!(out.as_str(), "shown");
    }
}
