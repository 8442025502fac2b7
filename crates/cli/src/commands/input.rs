//! Line-oriented prompts on any reader/writer pair.

use std::io::{BufRead, Write};
use vecquery_core::AppResult;

/// Print `prompt` and read one trimmed line. `None` at end of input.
pub fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> AppResult<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask a yes/no question. Only "yes" (any case) confirms.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> AppResult<bool> {
    Ok(ask(input, output, prompt)?
        .map(|answer| answer.eq_ignore_ascii_case("yes"))
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ask_trims_and_echoes_prompt() {
        let mut input = Cursor::new("  article-index \n");
        let mut output = Vec::new();
        let answer = ask(&mut input, &mut output, "Name: ").unwrap();
        assert_eq!(answer.as_deref(), Some("article-index"));
        assert_eq!(String::from_utf8(output).unwrap(), "Name: ");
    }

    #[test]
    fn test_confirm_requires_yes() {
        let mut out = Vec::new();
        assert!(confirm(&mut Cursor::new("YES\n"), &mut out, "? ").unwrap());
        assert!(!confirm(&mut Cursor::new("y\n"), &mut out, "? ").unwrap());
        assert!(!confirm(&mut Cursor::new("no\n"), &mut out, "? ").unwrap());
        assert!(!confirm(&mut Cursor::new(""), &mut out, "? ").unwrap());
    }
}
