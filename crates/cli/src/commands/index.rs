//! One-shot index command handlers.
//!
//! Each builds a session, performs one action, prints and exits. `search`
//! indexes before querying, so it also works against the in-memory store;
//! `init`, `delete` and `stats` only make sense against a store that outlives
//! the process.

use super::input::confirm;
use clap::Args;
use std::io::{self, Write};
use vecquery_core::{config::AppConfig, AppError, AppResult};
use vecquery_workflow::{render, Session, TeardownOutcome, DEFAULT_TOP_K};

/// Session for a command whose effect must survive the process.
fn persistent_session(config: &AppConfig, command: &str) -> AppResult<Session> {
    if config.index.store == "memory" {
        return Err(AppError::Config(format!(
            "'{}' needs a persistent store; the in-memory store is discarded when the \
             process exits. Use 'vecquery run' or 'vecquery shell' for offline sessions",
            command
        )));
    }
    Session::from_config(config)
}

/// Create the index and insert the articles if it is empty
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl InitCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing init command for index '{}'", config.index.name);

        let mut session = persistent_session(config, "init")?;
        let report = session.initialize().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", render::init_summary(&report));
        }
        Ok(())
    }
}

/// Query the index
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of results to retrieve
    #[arg(short = 'k', long = "top-k", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");
        tracing::debug!("Search command options: {:?}", self);

        let mut session = Session::from_config(config)?;
        session.initialize().await?;
        let hits = session.search(&self.query, self.top_k).await?;

        if self.json {
            println!("{}", render::search_json(&self.query, self.top_k, &hits)?);
        } else {
            print!("{}", render::results_table(&hits));
        }
        Ok(())
    }
}

/// Delete the index
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let name = &config.index.name;
        tracing::info!("Executing delete command for index '{}'", name);

        let mut session = persistent_session(config, "delete")?;

        if !self.yes {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            let prompt = format!("Delete index '{}'? This cannot be undone. (yes/no): ", name);
            if !confirm(&mut stdin.lock(), &mut stdout, &prompt)? {
                println!("Index '{}' preserved.", name);
                return Ok(());
            }
        }

        match session.teardown().await? {
            TeardownOutcome::Deleted => println!("Index '{}' deleted successfully.", name),
            TeardownOutcome::AlreadyAbsent => println!("Index '{}' does not exist.", name),
        }
        io::stdout().flush()?;
        Ok(())
    }
}

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command for index '{}'", config.index.name);

        let session = persistent_session(config, "stats")?;
        let stats = session.stats().await?;

        if self.json {
            println!("{}", render::stats_json(&config.index.name, &stats)?);
        } else {
            print!("{}", render::stats_summary(&config.index.name, &stats));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecquery_core::ConfigOverrides;

    fn offline_config() -> AppConfig {
        AppConfig::default().with_overrides(ConfigOverrides {
            offline: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_offline_rejected_for_commands_that_need_persistence() {
        let config = offline_config();

        let err = InitCommand { json: false }.execute(&config).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("'init' needs a persistent store"));

        let err = StatsCommand { json: true }.execute(&config).await.unwrap_err();
        assert!(err.to_string().contains("'stats' needs a persistent store"));

        let err = DeleteCommand { yes: true }.execute(&config).await.unwrap_err();
        assert!(err.to_string().contains("'delete' needs a persistent store"));
    }

    #[tokio::test]
    async fn test_offline_search_indexes_within_the_process() {
        let search = SearchCommand {
            query: "quantum computers".to_string(),
            top_k: 1,
            json: true,
        };
        search.execute(&offline_config()).await.unwrap();
    }

    #[test]
    fn test_persistent_store_allowed() {
        let config = AppConfig::default();
        assert_eq!(config.index.store, "pinecone");
        // No key configured, so the failure comes from credentials, not the store check
        if let Err(err) = persistent_session(&config, "stats") {
            assert!(!err.to_string().contains("persistent store"));
        }
    }
}
