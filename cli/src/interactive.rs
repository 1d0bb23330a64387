//! Interactive terminal prompts
//!
//! Every question the CLI asks goes through the [`Interact`] trait so command
//! logic can be exercised in tests with a scripted implementation. The
//! terminal implementation reads answers from stdin and uses `rpassword` for
//! no-echo input.

use crate::error::{Result, SigilError};
use std::io::{self, BufRead, Write};

/// Normalized yes/no answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

pub trait Interact {
    /// Ask a free-form question and return the answer verbatim.
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Ask for a secret without echoing it. No confirmation pass.
    fn ask_secret(&mut self, prompt: &str) -> Result<String>;

    /// Ask for a new passphrase with a confirmation pass. A mismatch between
    /// entry and confirmation consumes one attempt; the call fails once
    /// `max_retries` attempts are exhausted.
    fn ask_passphrase(&mut self, prompt: &str, max_retries: u32) -> Result<String>;

    /// Ask a yes/no question. An empty answer selects `default`; anything
    /// unrecognized re-asks.
    fn ask_yes_no(&mut self, default: Answer, prompt: &str) -> Result<Answer>;
}

/// Prompt implementation bound to the controlling terminal.
pub struct Terminal;

impl Terminal {
    fn read_line(&self) -> Result<String> {
        let mut line = String::new();
        let n = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| SigilError::Input(e.to_string()))?;
        if n == 0 {
            return Err(SigilError::Input("input stream closed".into()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl Interact for Terminal {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        print!("{prompt}");
        io::stdout()
            .flush()
            .map_err(|e| SigilError::Input(e.to_string()))?;
        self.read_line()
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        rpassword::prompt_password(prompt).map_err(|e| SigilError::Input(e.to_string()))
    }

    fn ask_passphrase(&mut self, prompt: &str, max_retries: u32) -> Result<String> {
        for attempt in 0..max_retries {
            let first = self.ask_secret(prompt)?;
            let second = self.ask_secret("Retype your passphrase : ")?;
            if first == second {
                return Ok(first);
            }
            if attempt + 1 < max_retries {
                println!("Passphrases do not match, please try again.");
            }
        }
        Err(SigilError::Input(format!(
            "passphrases do not match after {max_retries} attempts"
        )))
    }

    fn ask_yes_no(&mut self, default: Answer, prompt: &str) -> Result<Answer> {
        loop {
            let answer = self.ask(prompt)?;
            match answer.trim().to_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(Answer::Yes),
                "n" | "no" => return Ok(Answer::No),
                _ => continue,
            }
        }
    }
}
