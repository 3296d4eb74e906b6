//! Managed command line, stored as an argument vector.
//!
//! The operator supplies the command as one string; it is split exactly once,
//! at configuration time, using POSIX shell word rules:
//!
//! - unquoted whitespace separates words
//! - `'…'` is taken literally
//! - `"…"` is literal except for `\"`, `\\`, `\$` and `` \` ``
//! - an unquoted `\` escapes the next character
//!
//! No variable expansion, globbing, or operators (`|`, `&&`, `>`) are
//! interpreted; wrap the command in `sh -c '…'` for that.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Program plus arguments for the managed process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedCommand {
    program: String,
    args: Vec<String>,
}

impl ManagedCommand {
    /// Split `line` into an argument vector.
    ///
    /// Fails with [`CoreError::Command`] when the line is empty or a quote is
    /// left open.
    pub fn parse(line: &str) -> Result<Self, CoreError> {
        let mut words = split_words(line)?;
        if words.is_empty() {
            return Err(CoreError::Command("command line is empty".to_string()));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// Build from an already-split vector. Returns `None` for an empty vector.
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next()?;
        Some(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ManagedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

fn split_words(line: &str) -> Result<Vec<String>, CoreError> {
    let mut words = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty word) from no word at all.
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                    Some('\n') => {}
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        return Err(CoreError::Command(
                            "unterminated double quote".to_string(),
                        ))
                    }
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => match chars.next() {
                    Some('\n') => {}
                    Some(next) => {
                        current.push(next);
                        in_word = true;
                    }
                    None => {
                        return Err(CoreError::Command(
                            "trailing backslash".to_string(),
                        ))
                    }
                },
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    match quote {
        Quote::Single => Err(CoreError::Command("unterminated single quote".to_string())),
        Quote::Double => Err(CoreError::Command("unterminated double quote".to_string())),
        Quote::None => {
            if in_word {
                words.push(current);
            }
            Ok(words)
        }
    }
}
