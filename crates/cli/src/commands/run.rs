//! Run command handler.
//!
//! Batch workflow: index the articles, run one query, print the results
//! table and offer to delete the index.

use super::input::confirm;
use clap::Args;
use std::io::{self, BufRead, Write};
use vecquery_core::{config::AppConfig, AppResult};
use vecquery_workflow::{render, Session, TeardownOutcome, DEFAULT_QUERY, DEFAULT_TOP_K};

/// Index the articles, run one query and offer to delete the index
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Query text
    #[arg(short, long, default_value = DEFAULT_QUERY)]
    pub query: String,

    /// Number of results to retrieve
    #[arg(short = 'k', long = "top-k", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Delete the index afterwards without asking
    #[arg(long, conflicts_with = "keep")]
    pub delete: bool,

    /// Keep the index afterwards without asking
    #[arg(long)]
    pub keep: bool,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing run command");
        tracing::debug!("Run command options: {:?}", self);

        let mut session = Session::from_config(config)?;
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        self.run(&mut session, &mut stdin.lock(), &mut stdout).await
    }

    async fn run<R: BufRead, W: Write>(
        &self,
        session: &mut Session,
        input: &mut R,
        output: &mut W,
    ) -> AppResult<()> {
        let report = session.initialize().await?;
        writeln!(output, "{}", render::init_summary(&report))?;

        writeln!(output, "\nQuerying: '{}'", self.query)?;
        let hits = session.search(&self.query, self.top_k).await?;
        write!(output, "{}", render::results_table(&hits))?;

        let index_name = report.handle.name;
        let delete = if self.delete {
            true
        } else if self.keep {
            false
        } else {
            confirm(input, output, "\nDo you want to delete the index? (yes/no): ")?
        };

        if !delete {
            writeln!(
                output,
                "Index '{}' preserved. You can delete it later.",
                index_name
            )?;
            return Ok(());
        }

        match session.teardown().await? {
            TeardownOutcome::Deleted => {
                writeln!(output, "Index '{}' deleted successfully.", index_name)?
            }
            TeardownOutcome::AlreadyAbsent => {
                writeln!(output, "Index '{}' was already deleted.", index_name)?
            }
        }
        Ok(())
    }
}
