use anyhow::{Context, Result};
use dialoguer::Password;
use std::io::{BufRead, Write};
use tracing::warn;

use crate::agent::Agent;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{CredentialError, ModelError};
use crate::model::{MODELS, Message, ModelDescriptor, Tier, cloud_models, find_model};
use crate::model_gateway::{BackendResolver, ChatBackend};
use crate::session::Session;

pub const NO_KEYS_MESSAGE: &str =
    "No API keys found. Please set at least one API key using the 'keys --set' command.";

/// Line-oriented front end. Reads commands from `input` and writes everything
/// the user sees to `output`.
pub struct Shell<'a, R, W> {
    input: R,
    output: W,
    cfg: &'a Config,
    credentials: &'a CredentialStore,
    resolver: &'a dyn BackendResolver,
    agent: &'a Agent<'a>,
    hidden_secret_input: bool,
}

impl<'a, R: BufRead, W: Write> Shell<'a, R, W> {
    pub fn new(
        input: R,
        output: W,
        cfg: &'a Config,
        credentials: &'a CredentialStore,
        resolver: &'a dyn BackendResolver,
        agent: &'a Agent<'a>,
    ) -> Self {
        Self {
            input,
            output,
            cfg,
            credentials,
            resolver,
            agent,
            hidden_secret_input: false,
        }
    }

    /// Reads secrets from the terminal without echo instead of from `input`.
    pub fn with_hidden_secret_input(mut self, hidden: bool) -> Self {
        self.hidden_secret_input = hidden;
        self
    }

    /// Cloud models with a stored key, plus the local model when enabled.
    pub fn available_models(&self) -> Result<Vec<&'static ModelDescriptor>, CredentialError> {
        let mut models = Vec::new();
        for descriptor in MODELS {
            let selectable = match descriptor.tier {
                Tier::Local => self.cfg.local_models_enabled,
                Tier::Cloud => self.credentials.contains(descriptor.identifier)?,
            };
            if selectable {
                models.push(descriptor);
            }
        }
        Ok(models)
    }

    pub async fn chat(&mut self) -> Result<()> {
        let Some(mut session) = self.open_session().await? else {
            return Ok(());
        };

        writeln!(self.output, "Using model: {}", session.model().identifier)?;
        writeln!(
            self.output,
            "Type 'exit' or 'quit' to leave. Type '--model' to switch models, \
             '/history' to show the conversation, '/reset' to clear it.\n"
        )?;

        loop {
            write!(self.output, "You: ")?;
            self.output.flush().context("Failed to flush output")?;

            let Some(line) = self.read_line()? else {
                writeln!(self.output, "\nShutting Down!")?;
                break;
            };
            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }
            if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
                writeln!(self.output, "Shutting Down!")?;
                break;
            }
            if prompt.eq_ignore_ascii_case("--model") {
                if let Some((model, backend)) = self.choose_backend().await? {
                    session.switch_model(model, backend);
                    writeln!(self.output, "Switched to model: {}", model.identifier)?;
                }
                continue;
            }
            if prompt.eq_ignore_ascii_case("/reset") {
                session.reset();
                writeln!(self.output, "conversation reset\n")?;
                continue;
            }
            if prompt.eq_ignore_ascii_case("/history") {
                self.print_history(session.transcript())?;
                continue;
            }

            let prompt = prompt.to_string();
            match session.exchange(self.agent, &prompt).await {
                Ok(turn) => {
                    for note in &turn.diagnostics {
                        writeln!(self.output, "[warning] {note}")?;
                    }
                    writeln!(self.output, "Bot: {}\n", turn.reply.content.trim())?;
                }
                Err(err) => writeln!(self.output, "Error: {err}\n")?,
            }
        }

        Ok(())
    }

    pub async fn ask(&mut self, query: &str, model: Option<&str>) -> Result<()> {
        let available = match self.available_models() {
            Ok(models) => models,
            Err(err) => return self.report(&err),
        };
        if available.is_empty() {
            writeln!(self.output, "{NO_KEYS_MESSAGE}")?;
            return Ok(());
        }

        let descriptor = match model {
            None => available[0],
            Some(identifier) => match find_model(identifier) {
                Some(descriptor) if available.contains(&descriptor) => descriptor,
                Some(descriptor) if descriptor.tier == Tier::Local => {
                    writeln!(
                        self.output,
                        "Local models are disabled. Set LOCAL_MODELS_ENABLED=true to use {}.",
                        descriptor.identifier
                    )?;
                    return Ok(());
                }
                Some(descriptor) => {
                    return self.report(&ModelError::CredentialMissing {
                        model: descriptor.identifier.to_string(),
                    });
                }
                None => {
                    return self.report(&ModelError::UnsupportedModel {
                        model: identifier.to_string(),
                    });
                }
            },
        };

        let backend = match self.resolver.resolve(descriptor.identifier) {
            Ok(backend) => backend,
            Err(err) => return self.report(&err),
        };
        let mut session = Session::new(descriptor, backend, self.cfg.max_history_messages);
        match session.exchange(self.agent, query).await {
            Ok(turn) => {
                for note in &turn.diagnostics {
                    writeln!(self.output, "[warning] {note}")?;
                }
                writeln!(self.output, "{}", turn.reply.content.trim())?;
            }
            Err(err) => self.report(&err)?,
        }
        Ok(())
    }

    pub fn keys_status(&mut self) -> Result<()> {
        writeln!(self.output, "{:<20} {:<6} {}", "Model", "Tier", "API key")?;
        for descriptor in MODELS {
            let status = match descriptor.tier {
                Tier::Local => "Not required",
                Tier::Cloud => match self.credentials.contains(descriptor.identifier) {
                    Ok(true) => "Available",
                    Ok(false) => "Missing",
                    Err(err) => {
                        warn!(model = descriptor.identifier, error = %err, "credential lookup failed");
                        "Unknown"
                    }
                },
            };
            writeln!(
                self.output,
                "{:<20} {:<6} {}",
                descriptor.identifier,
                descriptor.tier.as_str(),
                status
            )?;
        }
        Ok(())
    }

    pub fn set_key(&mut self) -> Result<()> {
        let models: Vec<_> = cloud_models().collect();
        let Some(descriptor) = self.pick_numbered("Select a model to set the API key:", &models)?
        else {
            return Ok(());
        };

        match self.credentials.contains(descriptor.identifier) {
            Ok(true) => {
                return self.report(&CredentialError::Conflict {
                    model: descriptor.identifier.to_string(),
                });
            }
            Ok(false) => {}
            Err(err) => return self.report(&err),
        }

        let prompt = format!("Enter API key for {}", descriptor.identifier);
        let Some(secret) = self.read_secret(&prompt)? else {
            return Ok(());
        };
        let secret = secret.trim();
        if secret.is_empty() {
            writeln!(self.output, "API key cannot be empty.")?;
            return Ok(());
        }

        match self.credentials.set(descriptor.identifier, secret) {
            Ok(()) => {
                writeln!(self.output, "Saved API key for {}", descriptor.identifier)?;
                Ok(())
            }
            Err(err) => self.report(&err),
        }
    }

    pub fn delete_key(&mut self) -> Result<()> {
        let models: Vec<_> = cloud_models().collect();
        let Some(descriptor) =
            self.pick_numbered("Select a model to delete the API key:", &models)?
        else {
            return Ok(());
        };

        match self.credentials.delete(descriptor.identifier) {
            Ok(()) => {
                writeln!(self.output, "Deleted API key for {}", descriptor.identifier)?;
                Ok(())
            }
            Err(err) => self.report(&err),
        }
    }

    async fn open_session(&mut self) -> Result<Option<Session>> {
        Ok(self.choose_backend().await?.map(|(model, backend)| {
            Session::new(model, backend, self.cfg.max_history_messages)
        }))
    }

    /// Menu, then resolve. A failed resolve is reported and the menu shown
    /// again; `None` when nothing is selectable or input ends.
    async fn choose_backend(
        &mut self,
    ) -> Result<Option<(&'static ModelDescriptor, Box<dyn ChatBackend>)>> {
        loop {
            let available = match self.available_models() {
                Ok(models) => models,
                Err(err) => {
                    self.report(&err)?;
                    return Ok(None);
                }
            };
            if available.is_empty() {
                writeln!(self.output, "{NO_KEYS_MESSAGE}")?;
                return Ok(None);
            }

            let Some(descriptor) = self.select_model(&available)? else {
                return Ok(None);
            };
            match self.resolver.resolve(descriptor.identifier) {
                Ok(backend) => return Ok(Some((descriptor, backend))),
                Err(err) => self.report(&err)?,
            }
        }
    }

    /// Empty input picks the first entry; otherwise a number or a name.
    fn select_model(
        &mut self,
        models: &[&'static ModelDescriptor],
    ) -> Result<Option<&'static ModelDescriptor>> {
        writeln!(self.output, "Available Models with API keys:")?;
        for (idx, descriptor) in models.iter().enumerate() {
            writeln!(
                self.output,
                "{}. {} ({})",
                idx + 1,
                descriptor.identifier,
                descriptor.tier.as_str()
            )?;
        }

        loop {
            write!(
                self.output,
                "Select a model [default: {}]: ",
                models[0].identifier
            )?;
            self.output.flush().context("Failed to flush output")?;
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };

            let choice = line.trim();
            if choice.is_empty() {
                return Ok(Some(models[0]));
            }
            if let Some(descriptor) = pick(models, choice) {
                return Ok(Some(descriptor));
            }
            writeln!(self.output, "Invalid choice, try again.")?;
        }
    }

    fn pick_numbered(
        &mut self,
        title: &str,
        models: &[&'static ModelDescriptor],
    ) -> Result<Option<&'static ModelDescriptor>> {
        writeln!(self.output, "{title}")?;
        for (idx, descriptor) in models.iter().enumerate() {
            writeln!(self.output, "{}. {}", idx + 1, descriptor.identifier)?;
        }

        loop {
            write!(self.output, "Enter the number of the model: ")?;
            self.output.flush().context("Failed to flush output")?;
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            if let Some(descriptor) = pick(models, line.trim()) {
                return Ok(Some(descriptor));
            }
            writeln!(self.output, "Invalid choice, please try again.")?;
        }
    }

    fn read_secret(&mut self, prompt: &str) -> Result<Option<String>> {
        if self.hidden_secret_input {
            let secret = Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
                .context("Failed to read API key")?;
            return Ok(Some(secret));
        }

        write!(self.output, "{prompt}: ")?;
        self.output.flush().context("Failed to flush output")?;
        self.read_line()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    fn print_history(&mut self, history: &[Message]) -> Result<()> {
        if history.is_empty() {
            writeln!(self.output, "(history is empty)\n")?;
            return Ok(());
        }

        for (idx, msg) in history.iter().enumerate() {
            writeln!(self.output, "[{}] {}: {}", idx, msg.role.as_str(), msg.content)?;
        }
        writeln!(self.output)?;
        Ok(())
    }

    fn report(&mut self, err: &dyn std::error::Error) -> Result<()> {
        writeln!(self.output, "Error: {err}")?;
        Ok(())
    }
}

fn pick(models: &[&'static ModelDescriptor], choice: &str) -> Option<&'static ModelDescriptor> {
    if let Ok(number) = choice.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|idx| models.get(idx))
            .copied();
    }
    models
        .iter()
        .find(|descriptor| descriptor.identifier.eq_ignore_ascii_case(choice))
        .copied()
}
