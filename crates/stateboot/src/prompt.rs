//! Interactive prompts
//!
//! With `assume_yes` every question is answered with its default and nothing
//! is read from the terminal. Confirmations that default to "no" stay "no".

use colored::Colorize;
use std::io::{self, BufRead, Write};

pub struct Prompter<R, W> {
    input: R,
    output: W,
    assume_yes: bool,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(assume_yes: bool) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), assume_yes)
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W, assume_yes: bool) -> Self {
        Self {
            input,
            output,
            assume_yes,
        }
    }

    pub fn is_interactive(&self) -> bool {
        !self.assume_yes
    }

    fn read_answer(&mut self) -> io::Result<String> {
        self.output.flush()?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            ));
        }
        Ok(answer.trim().to_string())
    }

    /// Ask for a value; an empty answer keeps `default`
    pub fn ask(&mut self, label: &str, default: &str) -> io::Result<String> {
        if self.assume_yes {
            return Ok(default.to_string());
        }
        if default.is_empty() {
            write!(self.output, "{}: ", label.bold())?;
        } else {
            write!(self.output, "{} [{}]: ", label.bold(), default.cyan())?;
        }
        let answer = self.read_answer()?;
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }

    /// Yes/no question
    pub fn confirm(&mut self, label: &str, default: bool) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(default);
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        write!(self.output, "{} {}: ", label.bold(), hint)?;
        let answer = self.read_answer()?;
        Ok(match answer.to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompter(input: &str) -> Prompter<&[u8], Vec<u8>> {
        Prompter::new(input.as_bytes(), Vec::new(), false)
    }

    #[test]
    fn test_ask_uses_default_on_empty_answer() {
        let mut p = prompter("\nnortheurope\n");
        assert_eq!(p.ask("Location", "westeurope").unwrap(), "westeurope");
        assert_eq!(p.ask("Location", "westeurope").unwrap(), "northeurope");
    }

    #[test]
    fn test_confirm() {
        let mut p = prompter("\nn\nYES\n");
        assert!(p.confirm("Proceed?", true).unwrap());
        assert!(!p.confirm("Proceed?", true).unwrap());
        assert!(p.confirm("Proceed?", false).unwrap());
    }

    #[test]
    fn test_closed_input_is_an_error() {
        let mut p = prompter("");
        let err = p.ask("Principal id", "").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_assume_yes_never_reads() {
        let mut p = Prompter::new("n\n".as_bytes(), Vec::new(), true);
        assert!(p.confirm("Proceed?", true).unwrap());
        assert!(!p.confirm("Switch subscription?", false).unwrap());
        assert_eq!(p.ask("Location", "westeurope").unwrap(), "westeurope");
        assert!(p.output.is_empty());
    }
}
