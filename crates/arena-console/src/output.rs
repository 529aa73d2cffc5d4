//! Operator-facing output.

use std::io::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Clone)]
enum Sink {
    Stdout,
    Capture(Arc<Mutex<Vec<String>>>),
}

/// Writes console lines to stdout, or captures them for inspection.
///
/// Cheap to clone; push handlers running on the channel's delivery task
/// hold their own copy.
#[derive(Clone)]
pub struct Printer {
    sink: Sink,
}

impl Printer {
    /// Print to stdout.
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// Collect lines in memory.
    pub fn capture() -> Self {
        Self {
            sink: Sink::Capture(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Emit one line.
    pub fn line(&self, text: impl AsRef<str>) {
        match &self.sink {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{}", text.as_ref());
            }
            Sink::Capture(lines) => lines.lock().push(text.as_ref().to_string()),
        }
    }

    /// Print the REPL prompt without a trailing newline.
    pub fn prompt(&self, prompt: &str) {
        if let Sink::Stdout = self.sink {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{prompt}");
            let _ = out.flush();
        }
    }

    /// Lines captured so far (always empty for stdout).
    pub fn captured(&self) -> Vec<String> {
        match &self.sink {
            Sink::Stdout => Vec::new(),
            Sink::Capture(lines) => lines.lock().clone(),
        }
    }

    /// Drain captured lines.
    pub fn take(&self) -> Vec<String> {
        match &self.sink {
            Sink::Stdout => Vec::new(),
            Sink::Capture(lines) => std::mem::take(&mut *lines.lock()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_lines() {
        let out = Printer::capture();
        out.line("one");
        out.line(String::from("two"));
        assert_eq!(out.captured(), vec!["one", "two"]);
    }

    #[test]
    fn clones_share_capture() {
        let out = Printer::capture();
        out.clone().line("from clone");
        assert_eq!(out.take(), vec!["from clone"]);
        assert!(out.captured().is_empty());
    }

    #[test]
    fn stdout_captures_nothing() {
        let out = Printer::stdout();
        assert!(out.captured().is_empty());
    }
}
