//! Terminal output for CLI commands.
//!
//! Progress goes to stdout, warnings and errors to stderr. Colors are applied
//! only when the stream is a terminal.

use console::{Term, style};
use serde::Serialize;
use std::io;

/// Verbose/quiet aware printer.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Plain informational line.
    pub fn info(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Term::stdout().write_line(message)
    }

    /// Only printed with `--verbose`.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if !self.verbose {
            return Ok(());
        }
        Term::stdout().write_line(&style(message).dim().to_string())
    }

    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Term::stdout().write_line(&style(message).cyan().to_string())
    }

    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Term::stdout().write_line(&style(format!("✓ {}", message)).green().to_string())
    }

    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Term::stdout().write_line(&style(title).bold().to_string())
    }

    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Term::stdout().write_line(&format!("   {}", message))
    }

    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Term::stderr().write_line(&style(format!("⚠ {}", message)).yellow().to_string())
    }

    /// Always printed, even with `--quiet`.
    pub fn error(&self, message: &str) -> io::Result<()> {
        Term::stderr().write_line(&style(format!("✗ {}", message)).red().to_string())
    }

    /// Machine-readable result on stdout, always printed.
    pub fn json<T: Serialize>(&self, value: &T) -> crate::Result<()> {
        let text = serde_json::to_string_pretty(value)?;
        Term::stdout().write_line(&text)?;
        Ok(())
    }
}
