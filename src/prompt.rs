//! Confirm-launch prompt shown after a successful install.
use std::io::{BufRead, Write};

use crate::error::ProvisionError;

/// Asks the operator whether to start the app.
pub trait LaunchPrompt {
    /// Blocks until the operator answers. Returns `true` to launch.
    fn confirm_launch(&mut self, app_name: &str) -> Result<bool, ProvisionError>;
}

/// Answers every prompt with a fixed value.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAnswer(pub bool);

impl LaunchPrompt for FixedAnswer {
    fn confirm_launch(&mut self, app_name: &str) -> Result<bool, ProvisionError> {
        tracing::debug!(app_name, answer = self.0, "answering launch prompt");
        Ok(self.0)
    }
}

/// Plain line prompt: `Launch <app> now? [y/N]`.
///
/// Anything other than `y` or `yes` (any case), including end of input,
/// declines.
#[derive(Debug)]
pub struct LinePrompt<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    /// Creates a prompt over the given streams.
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl LinePrompt<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Creates a prompt over standard input and output.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> LaunchPrompt for LinePrompt<R, W> {
    fn confirm_launch(&mut self, app_name: &str) -> Result<bool, ProvisionError> {
        write!(self.writer, "Launch {app_name} now? [y/N] ")?;
        self.writer.flush()?;

        let mut line = String::new();
        self.reader.read_line(&mut line)?;

        Ok(is_yes(&line))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Returns the interactive prompt for this build: the terminal UI when the
/// `ui` feature is enabled, the line prompt otherwise.
pub fn interactive() -> Box<dyn LaunchPrompt> {
    #[cfg(feature = "ui")]
    {
        Box::new(crate::tui::TuiPrompt::new())
    }
    #[cfg(not(feature = "ui"))]
    {
        Box::new(LinePrompt::stdio())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_line_prompt() {
        let mut output = Vec::new();
        let mut prompt = LinePrompt::new(Cursor::new(b"Yes\n".to_vec()), &mut output);

        assert!(prompt.confirm_launch("SwiftShot").unwrap());
        assert_eq!(output, b"Launch SwiftShot now? [y/N] ");
    }

    #[test]
    fn test_line_prompt_declines() {
        for input in ["\n", "n\n", "later\n", ""] {
            let mut prompt = LinePrompt::new(Cursor::new(input.as_bytes()), Vec::new());
            assert!(!prompt.confirm_launch("SwiftShot").unwrap());
        }
    }
}
