//! Shell command handler.
//!
//! Interactive session over stdin: initialize on demand, search repeatedly,
//! adjust the number of results, delete the index.

use clap::Args;
use std::io::{self, BufRead, Write};
use vecquery_core::{config::AppConfig, AppResult};
use vecquery_workflow::{render, Session, TeardownOutcome, DEFAULT_QUERY, DEFAULT_TOP_K};

const HELP: &str = "\
Commands:
  init             Create the index and insert the articles
  search [text]    Search (defaults to \"What is the future of AI?\")
  k <n>            Set the number of results
  articles         List the articles
  stats            Show index statistics
  delete           Delete the index
  help             Show this help
  quit             Leave the shell
";

/// Interactive search session
#[derive(Args, Debug)]
pub struct ShellCommand {
    /// Initial number of results
    #[arg(short = 'k', long = "top-k", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
}

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Empty,
    Init,
    Search(Option<String>),
    TopK(usize),
    Articles,
    Stats,
    Delete,
    Help,
    Quit,
}

impl Line {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "" => Ok(Self::Empty),
            "init" => Ok(Self::Init),
            "search" | "s" => Ok(Self::Search(
                (!rest.is_empty()).then(|| rest.to_string()),
            )),
            "k" => rest
                .parse()
                .map(Self::TopK)
                .map_err(|_| format!("Expected a number after 'k', got '{}'", rest)),
            "articles" => Ok(Self::Articles),
            "stats" => Ok(Self::Stats),
            "delete" => Ok(Self::Delete),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("Unknown command '{}'. Type 'help'.", other)),
        }
    }
}

struct Shell {
    session: Session,
    top_k: usize,
}

impl Shell {
    /// Read commands until `quit` or end of input.
    async fn run<R: BufRead, W: Write>(&mut self, input: R, output: &mut W) -> AppResult<()> {
        writeln!(
            output,
            "vecquery shell on index '{}' using {}",
            self.session.index_spec().name,
            self.session.backends()
        )?;
        write!(output, "{}", render::article_list(&self.session.corpus()))?;
        writeln!(output, "Type 'init' to index them, 'help' for commands.")?;

        let mut lines = input.lines();
        loop {
            write!(output, "vecquery> ")?;
            output.flush()?;

            let Some(line) = lines.next() else {
                writeln!(output)?;
                break;
            };

            match Line::parse(&line?) {
                Ok(Line::Quit) => break,
                Ok(command) => {
                    if let Err(e) = self.dispatch(command, output).await {
                        tracing::debug!("Shell command failed: {}", e);
                        writeln!(output, "Error: {}", e)?;
                    }
                }
                Err(message) => writeln!(output, "{}", message)?,
            }
        }

        Ok(())
    }

    async fn dispatch<W: Write>(&mut self, command: Line, output: &mut W) -> AppResult<()> {
        match command {
            Line::Empty | Line::Quit => {}
            Line::Help => write!(output, "{}", HELP)?,
            Line::Articles => write!(output, "{}", render::article_list(&self.session.corpus()))?,

            Line::Init => {
                writeln!(output, "Initializing index and inserting articles...")?;
                let report = self.session.initialize().await?;
                writeln!(output, "{}", render::init_summary(&report))?;
            }

            Line::Search(query) => {
                let query = query.unwrap_or_else(|| DEFAULT_QUERY.to_string());
                let hits = self.session.search(&query, self.top_k).await?;
                write!(output, "{}", render::result_cards(&hits))?;
            }

            Line::TopK(k) => {
                let max = self.session.max_top_k();
                if k == 0 || k > max {
                    writeln!(output, "Number of results must be between 1 and {}", max)?;
                } else {
                    self.top_k = k;
                    writeln!(output, "Returning {} result(s) per search", k)?;
                }
            }

            Line::Stats => {
                let stats = self.session.stats().await?;
                write!(
                    output,
                    "{}",
                    render::stats_summary(&self.session.index_spec().name, &stats)
                )?;
            }

            Line::Delete => {
                let name = self.session.index_spec().name.clone();
                match self.session.teardown().await? {
                    TeardownOutcome::Deleted => {
                        writeln!(output, "Index '{}' deleted successfully!", name)?
                    }
                    TeardownOutcome::AlreadyAbsent => {
                        writeln!(output, "Index '{}' does not exist.", name)?
                    }
                }
            }
        }

        Ok(())
    }
}

impl ShellCommand {
    /// Execute the shell command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing shell command");

        let session = Session::from_config(config)?;
        let top_k = self.top_k.clamp(1, session.max_top_k());
        let mut shell = Shell { session, top_k };

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        shell.run(stdin.lock(), &mut stdout).await
    }
}
