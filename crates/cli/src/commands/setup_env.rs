//! Setup-env command handler.
//!
//! Prompts for the service keys and writes them to the workspace `.env`.

use super::input::{ask, confirm};
use clap::Args;
use std::io::{self, BufRead, Write};
use std::path::Path;
use vecquery_core::config::{render_env_file, AppConfig};
use vecquery_core::AppResult;

/// Write API keys to the workspace .env file
#[derive(Args, Debug)]
pub struct SetupEnvCommand {
    /// Overwrite an existing .env file without asking
    #[arg(long)]
    pub force: bool,
}

/// What [`write_env_file`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupOutcome {
    Written,
    Cancelled,
    MissingKeys,
}

impl SetupEnvCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let path = config.env_file_path();
        tracing::info!("Executing setup-env command for {:?}", path);

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let outcome = write_env_file(&path, self.force, &mut stdin.lock(), &mut stdout)?;
        tracing::debug!("setup-env finished: {:?}", outcome);
        Ok(())
    }
}

fn write_env_file<R: BufRead, W: Write>(
    path: &Path,
    force: bool,
    input: &mut R,
    output: &mut W,
) -> AppResult<SetupOutcome> {
    if path.exists()
        && !force
        && !confirm(input, output, ".env file already exists. Overwrite? (yes/no): ")?
    {
        writeln!(output, "Setup cancelled.")?;
        return Ok(SetupOutcome::Cancelled);
    }

    writeln!(output, "\n{}", "=".repeat(60))?;
    writeln!(output, "vecquery - Environment Setup")?;
    writeln!(output, "{}", "=".repeat(60))?;
    writeln!(output, "\nPlease provide your API keys:")?;
    writeln!(
        output,
        "(You can get these from https://www.pinecone.io/ and https://platform.openai.com/)\n"
    )?;

    let pinecone_key = ask(input, output, "Enter your Pinecone API Key: ")?.unwrap_or_default();
    let openai_key = ask(input, output, "Enter your OpenAI API Key: ")?.unwrap_or_default();

    if pinecone_key.is_empty() || openai_key.is_empty() {
        writeln!(output, "\nError: Both API keys are required!")?;
        return Ok(SetupOutcome::MissingKeys);
    }

    std::fs::write(path, render_env_file(&pinecone_key, &openai_key))?;
    tracing::info!("Wrote {:?}", path);

    writeln!(
        output,
        "\nEnvironment file created successfully at {}",
        path.display()
    )?;
    writeln!(output, "You can now run 'vecquery run' or 'vecquery shell'.")?;
    Ok(SetupOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn setup(path: &Path, force: bool, answers: &str) -> (SetupOutcome, String) {
        let mut output = Vec::new();
        let outcome =
            write_env_file(path, force, &mut Cursor::new(answers.to_string()), &mut output)
                .unwrap();
        (outcome, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_writes_both_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");

        let (outcome, _) = setup(&path, false, "pc-123\nsk-456\n");
        assert_eq!(outcome, SetupOutcome::Written);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("PINECONE_API_KEY=pc-123\n"));
        assert!(contents.contains("OPENAI_API_KEY=sk-456\n"));
    }

    #[test]
    fn test_existing_file_needs_yes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "KEEP=me\n").unwrap();

        let (outcome, out) = setup(&path, false, "no\n");
        assert_eq!(outcome, SetupOutcome::Cancelled);
        assert!(out.contains("Setup cancelled."));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "KEEP=me\n");

        let (outcome, _) = setup(&path, false, "yes\npc\nsk\n");
        assert_eq!(outcome, SetupOutcome::Written);

        let (outcome, _) = setup(&path, true, "pc2\nsk2\n");
        assert_eq!(outcome, SetupOutcome::Written);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("PINECONE_API_KEY=pc2"));
    }

    #[test]
    fn test_empty_key_aborts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");

        let (outcome, out) = setup(&path, false, "pc-123\n\n");
        assert_eq!(outcome, SetupOutcome::MissingKeys);
        assert!(out.contains("Both API keys are required"));
        assert!(!path.exists());
    }
}
