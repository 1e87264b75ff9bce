use std::io::{self, BufRead, Write};

use altech_core::signals::{Confirm, Notifier, Reinitialize};
use tracing::info;

/// Toasts go to stderr so stdout stays clean for command output.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn toast(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// `y/N` prompt on stdin; `assume_yes` skips it.
pub struct StdinConfirm {
    pub assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{prompt} [y/N] ");
        let _ = io::stderr().flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Each CLI invocation rebuilds state from storage, so a reload is just a notice.
pub struct NextRunReload;

impl Reinitialize for NextRunReload {
    fn reinitialize(&self) {
        info!("restored slots take effect on the next command");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_explicit_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn assume_yes_skips_prompt() {
        assert!(StdinConfirm { assume_yes: true }.confirm("Restore?"));
    }
}
