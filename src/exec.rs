// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Running external commands
//!
//! Every command `nh` runs on the user's behalf is echoed first, so dry-run
//! output is exactly the list of commands a real run would execute.

use anyhow::{bail, Context, Result};
use owo_colors::{OwoColorize, Stream};
use std::ffi::OsStr;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// An external command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    message: Option<String>,
    dry: bool,
}

impl CommandLine {
    /// Command running `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            message: None,
            dry: false,
        }
    }

    /// Split a configured command such as `nvd diff` on whitespace.
    ///
    /// Returns `None` for a blank string.
    #[must_use]
    pub fn from_words(words: &str) -> Option<Self> {
        let mut parts = words.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        self
    }

    /// Log line printed before the command
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Only print, do not execute
    #[must_use]
    pub fn dry(mut self, dry: bool) -> Self {
        self.dry = dry;
        self
    }

    /// Prefix the command with an elevation program such as `sudo`.
    ///
    /// A blank `elevate` leaves the command unchanged.
    #[must_use]
    pub fn elevated(self, elevate: &str) -> Self {
        match Self::from_words(elevate) {
            None => self,
            Some(wrapper) => {
                let Self {
                    program,
                    args,
                    message,
                    dry,
                } = self;
                let mut cmd = wrapper.arg(program).args(args);
                cmd.message = message;
                cmd.dry = dry;
                cmd
            }
        }
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Shell-like rendering, quoting arguments that need it
    #[must_use]
    pub fn render(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn announce(&self) {
        if let Some(message) = &self.message {
            info!("{}", message);
        }
        let line = format!("$ {}", self.render());
        println!(
            "{}",
            line.if_supports_color(Stream::Stdout, |t| t.bright_black())
        );
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Print and, unless dry, run with inherited stdio.
    ///
    /// # Errors
    ///
    /// The program could not be started or exited unsuccessfully.
    pub fn run(&self) -> Result<()> {
        self.announce();
        if self.dry {
            return Ok(());
        }

        let status = self
            .command()
            .status()
            .with_context(|| format!("Failed to start {}", self.program))?;

        if !status.success() {
            bail!("Command failed ({}): {}", status, self.render());
        }
        Ok(())
    }

    /// Run for its output. Read-only queries run even when dry.
    ///
    /// # Errors
    ///
    /// The program could not be started or exited unsuccessfully.
    pub fn run_capture(&self) -> Result<String> {
        if let Some(message) = &self.message {
            info!("{}", message);
        }
        debug!("Capturing: {}", self.render());

        let output = self
            .command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("Failed to start {}", self.program))?;

        if !output.status.success() {
            bail!("Command failed ({}): {}", output.status, self.render());
        }
        String::from_utf8(output.stdout)
            .with_context(|| format!("Non UTF-8 output from {}", self.render()))
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@#+,%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
