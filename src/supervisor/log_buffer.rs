use super::output::OutputStream;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_MAX_LINES: usize = 1_000;

/// One relayed line of backend output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stream, self.line)
    }
}

/// Ring buffer of the most recent backend output lines.
pub struct LogBuffer {
    max_lines: usize,
    lines: RwLock<VecDeque<OutputLine>>,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: RwLock::new(VecDeque::new()),
        }
    }

    /// Append a line, evicting the oldest when over capacity.
    pub fn push(&self, stream: OutputStream, line: String) {
        if self.max_lines == 0 {
            return;
        }
        let mut lines = self.lines.write().unwrap_or_else(PoisonError::into_inner);
        lines.push_back(OutputLine { stream, line });
        while lines.len() > self.max_lines {
            lines.pop_front();
        }
    }

    /// Last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<OutputLine> {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        let start = lines.len().saturating_sub(n);
        lines.iter().skip(start).cloned().collect()
    }

    pub fn clear(&self) {
        self.lines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[OutputLine]) -> Vec<&str> {
        lines.iter().map(|l| l.line.as_str()).collect()
    }

    #[test]
    fn tail_returns_last_n_lines() {
        let buf = LogBuffer::new(100);
        for i in 0..10 {
            buf.push(OutputStream::Stdout, format!("line {i}"));
        }
        assert_eq!(texts(&buf.tail(3)), vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let buf = LogBuffer::new(5);
        for i in 0..10 {
            buf.push(OutputStream::Stderr, format!("line {i}"));
        }
        assert_eq!(
            texts(&buf.tail(100)),
            vec!["line 5", "line 6", "line 7", "line 8", "line 9"]
        );
    }

    #[test]
    fn clear_empties_buffer() {
        let buf = LogBuffer::default();
        buf.push(OutputStream::Stdout, "hello".into());
        buf.clear();
        assert!(buf.tail(10).is_empty());
    }

    #[test]
    fn display_tags_the_stream() {
        let line = OutputLine {
            stream: OutputStream::Stderr,
            line: "Traceback".to_string(),
        };
        assert_eq!(line.to_string(), "[stderr] Traceback");
    }
}
