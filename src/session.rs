use tracing::{debug, info};

use crate::agent::{Agent, AgentTurn};
use crate::error::AgentError;
use crate::model::{Message, MessageRole, ModelDescriptor};
use crate::model_gateway::ChatBackend;

const MIN_HISTORY_MESSAGES: usize = 2;

/// Active model, its backend and the conversation so far. One per shell run.
pub struct Session {
    model: &'static ModelDescriptor,
    backend: Box<dyn ChatBackend>,
    transcript: Vec<Message>,
    max_history: usize,
}

impl Session {
    pub fn new(
        model: &'static ModelDescriptor,
        backend: Box<dyn ChatBackend>,
        max_history: usize,
    ) -> Self {
        Self {
            model,
            backend,
            transcript: Vec::new(),
            max_history,
        }
    }

    pub fn model(&self) -> &'static ModelDescriptor {
        self.model
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Replaces the backend; the transcript carries over to the new model.
    pub fn switch_model(&mut self, model: &'static ModelDescriptor, backend: Box<dyn ChatBackend>) {
        info!(
            from = self.model.identifier,
            to = model.identifier,
            kept_messages = self.transcript.len(),
            "switched model"
        );
        self.model = model;
        self.backend = backend;
    }

    pub fn reset(&mut self) {
        self.transcript.clear();
    }

    /// Runs one user turn. On failure the unanswered user turn is dropped so
    /// the transcript keeps alternating roles. History is trimmed only once a
    /// reply has been recorded.
    pub async fn exchange(
        &mut self,
        agent: &Agent<'_>,
        input: &str,
    ) -> Result<AgentTurn, AgentError> {
        self.transcript.push(Message::user(input));

        match agent.respond(self.backend.as_ref(), &self.transcript).await {
            Ok(turn) => {
                self.transcript.push(turn.reply.clone());
                self.trim_history();
                Ok(turn)
            }
            Err(err) => {
                self.transcript.pop();
                Err(err)
            }
        }
    }

    fn trim_history(&mut self) {
        // The newest user turn and its reply are always kept together.
        let limit = self.max_history.max(MIN_HISTORY_MESSAGES);
        if self.transcript.len() <= limit {
            return;
        }

        let mut start = self.transcript.len() - limit;
        while start < self.transcript.len() - 1
            && self.transcript[start].role != MessageRole::User
        {
            start += 1;
        }
        self.transcript.drain(..start);
        debug!(
            dropped = start,
            kept = self.transcript.len(),
            "trimmed conversation history"
        );
    }
}
