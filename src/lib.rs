pub mod agent;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod normalize;
pub mod providers;
pub mod retrieval;
pub mod session;
pub mod shell;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::io::{self, IsTerminal};
use std::time::Duration;
use tracing::info;

use agent::{Agent, RepoDocsTool};
use cli::{Cli, Command};
use config::Config;
use credentials::CredentialStore;
use model_gateway::ModelFactory;
use retrieval::{DuckDuckGoSearch, GithubClient, RepositoryFinder};
use shell::Shell;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = Config::from_env();
    info!(
        credential_store = cfg.credential_backend.as_str(),
        local_models_enabled = cfg.local_models_enabled,
        model_timeout_secs = cfg.model_timeout_secs,
        search_max_results = cfg.retrieval.search_max_results,
        github_token_set = cfg.retrieval.github_token.is_some(),
        max_history_messages = cfg.max_history_messages,
        "loaded runtime configuration"
    );

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.model_timeout_secs))
        .build()
        .context("Failed to initialize HTTP client")?;

    let credentials = CredentialStore::from_backend(cfg.credential_backend);
    let github = GithubClient::new(client.clone(), &cfg.retrieval, cfg.model_timeout_secs);
    let search = DuckDuckGoSearch::new(
        client.clone(),
        cfg.retrieval.search_base_url.clone(),
        cfg.model_timeout_secs,
    );
    let finder = RepositoryFinder::new(search, &github, cfg.retrieval.search_max_results);
    let tools = RepoDocsTool::new(finder, &github);
    let agent = Agent::new(&tools, cfg.system_prompt.clone());
    let factory = ModelFactory::new(&client, &cfg, &credentials);

    let stdin = io::stdin();
    let hidden_input = stdin.is_terminal();
    let mut shell = Shell::new(
        stdin.lock(),
        io::stdout(),
        &cfg,
        &credentials,
        &factory,
        &agent,
    )
    .with_hidden_secret_input(hidden_input);

    match cli.command() {
        Command::Chat => shell.chat().await,
        Command::Keys { set: true, .. } => shell.set_key(),
        Command::Keys { delete: true, .. } => shell.delete_key(),
        Command::Keys { .. } => shell.keys_status(),
        Command::Ask { model, query } => shell.ask(&query.join(" "), model.as_deref()).await,
    }
}
