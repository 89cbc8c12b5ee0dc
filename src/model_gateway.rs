use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::ModelError;
use crate::model::{self, Message, ModelDescriptor, ProviderTarget, Tier, find_model};

pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<Message>> + 'a>>;

/// One model behind one endpoint. `generate` returns exactly one assistant
/// message with its content already normalized.
pub trait ChatBackend {
    fn model(&self) -> &str;
    fn generate<'a>(&'a self, messages: &'a [Message]) -> GenerateFuture<'a>;
}

pub struct ProviderBackend {
    client: Client,
    target: ProviderTarget,
}

impl ProviderBackend {
    pub fn new(client: Client, target: ProviderTarget) -> Self {
        Self { client, target }
    }
}

impl ChatBackend for ProviderBackend {
    fn model(&self) -> &str {
        &self.target.model
    }

    fn generate<'a>(&'a self, messages: &'a [Message]) -> GenerateFuture<'a> {
        Box::pin(async move {
            let reply = model::chat(&self.client, &self.target, messages).await?;
            Ok(Message::assistant(reply.normalize()))
        })
    }
}

pub trait BackendResolver {
    fn resolve(&self, identifier: &str) -> Result<Box<dyn ChatBackend>, ModelError>;
}

pub struct ModelFactory<'a> {
    client: &'a Client,
    cfg: &'a Config,
    credentials: &'a CredentialStore,
}

impl<'a> ModelFactory<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config, credentials: &'a CredentialStore) -> Self {
        Self {
            client,
            cfg,
            credentials,
        }
    }

    fn target_for(&self, descriptor: &ModelDescriptor) -> Result<ProviderTarget, ModelError> {
        let (model, api_key) = match descriptor.tier {
            Tier::Local => (self.cfg.local_model.clone(), None),
            Tier::Cloud => {
                let credential = self.credentials.get(descriptor.identifier)?.ok_or_else(|| {
                    warn!(model = descriptor.identifier, "missing API key for cloud model");
                    ModelError::CredentialMissing {
                        model: descriptor.identifier.to_string(),
                    }
                })?;
                (descriptor.identifier.to_string(), Some(credential.secret))
            }
        };

        Ok(ProviderTarget {
            provider: descriptor.provider,
            base_url: self.cfg.base_url_for(descriptor.provider).to_string(),
            model,
            api_key,
            timeout_secs: self.cfg.model_timeout_secs,
        })
    }
}

impl BackendResolver for ModelFactory<'_> {
    fn resolve(&self, identifier: &str) -> Result<Box<dyn ChatBackend>, ModelError> {
        let Some(descriptor) = find_model(identifier) else {
            warn!(model = %identifier, "unsupported model requested");
            return Err(ModelError::UnsupportedModel {
                model: identifier.to_string(),
            });
        };

        let target = self.target_for(descriptor)?;
        debug!(
            model = descriptor.identifier,
            tier = descriptor.tier.as_str(),
            provider = descriptor.provider.as_str(),
            "resolved chat backend"
        );
        Ok(Box::new(ProviderBackend::new(self.client.clone(), target)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::anyhow;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::{BackendResolver, ChatBackend, GenerateFuture, ModelFactory};
    use crate::config::tests::config_from_pairs;
    use crate::credentials::{CredentialStore, MemoryStore};
    use crate::error::ModelError;
    use crate::model::Message;
    use crate::test_support::{StubResponse, StubServer};

    /// Replays scripted replies in order and records every request.
    pub(crate) struct ScriptedBackend {
        name: String,
        replies: RefCell<VecDeque<Result<String, String>>>,
        pub calls: RefCell<Vec<Vec<Message>>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(name: &str, replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                name: name.to_string(),
                replies: RefCell::new(
                    replies
                        .into_iter()
                        .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn model(&self) -> &str {
            &self.name
        }

        fn generate<'a>(&'a self, messages: &'a [Message]) -> GenerateFuture<'a> {
            self.calls.borrow_mut().push(messages.to_vec());
            let next = self
                .replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("echo from {}", self.name)));
            Box::pin(async move {
                match next {
                    Ok(content) => Ok(Message::assistant(content)),
                    Err(message) => Err(anyhow!(message)),
                }
            })
        }
    }

    /// Lets a test keep a handle on a backend it hands to a session.
    impl<T: ChatBackend + ?Sized> ChatBackend for Rc<T> {
        fn model(&self) -> &str {
            self.as_ref().model()
        }

        fn generate<'a>(&'a self, messages: &'a [Message]) -> GenerateFuture<'a> {
            self.as_ref().generate(messages)
        }
    }

    fn memory_credentials() -> CredentialStore {
        CredentialStore::new(Box::new(MemoryStore::default()))
    }

    #[test]
    fn unknown_identifier_is_unsupported() {
        let cfg = config_from_pairs(&[]);
        let client = reqwest::Client::new();
        let credentials = memory_credentials();
        let factory = ModelFactory::new(&client, &cfg, &credentials);

        let err = factory.resolve("claude-9").err().expect("should fail");
        assert_eq!(
            err,
            ModelError::UnsupportedModel {
                model: "claude-9".to_string()
            }
        );
    }

    #[test]
    fn cloud_model_without_credential_is_rejected() {
        let cfg = config_from_pairs(&[]);
        let client = reqwest::Client::new();
        let credentials = memory_credentials();
        let factory = ModelFactory::new(&client, &cfg, &credentials);

        let err = factory.resolve("gpt-4o-mini").err().expect("should fail");
        assert_eq!(
            err,
            ModelError::CredentialMissing {
                model: "gpt-4o-mini".to_string()
            }
        );
    }

    #[test]
    fn local_model_always_resolves_to_configured_name() {
        let cfg = config_from_pairs(&[("LOCAL_MODEL", "llama3.2:1b")]);
        let client = reqwest::Client::new();
        let credentials = memory_credentials();
        let factory = ModelFactory::new(&client, &cfg, &credentials);

        let backend = factory.resolve("tinyllama").expect("local model resolves");
        assert_eq!(backend.model(), "llama3.2:1b");
    }

    #[tokio::test]
    async fn cloud_backend_uses_stored_key_and_normalizes_reply() {
        let server = StubServer::start(vec![(
            "/chat/completions",
            StubResponse::json(
                200,
                json!({"choices": [{"message": {"content": [{"text": "norm"}, {"text": "alized"}]}}]}),
            ),
        )]);
        let cfg = config_from_pairs(&[("OPENAI_BASE_URL", server.base_url.as_str())]);
        let client = reqwest::Client::new();
        let credentials = memory_credentials();
        credentials.set("gpt-4o-mini", "sk-stored").unwrap();
        let factory = ModelFactory::new(&client, &cfg, &credentials);

        let backend = factory.resolve("gpt-4o-mini").expect("cloud model resolves");
        let reply = backend
            .generate(&[Message::user("hi")])
            .await
            .expect("generate should succeed");

        assert_eq!(reply, Message::assistant("normalized"));
        assert_eq!(
            server.requests()[0]
                .headers
                .get("authorization")
                .map(String::as_str),
            Some("Bearer sk-stored")
        );
    }

    #[tokio::test]
    async fn scripted_backend_replays_replies_then_errors() {
        let backend = ScriptedBackend::new("stub", vec![Ok("one"), Err("boom")]);
        let first = backend.generate(&[Message::user("a")]).await.unwrap();
        assert_eq!(first.content, "one");
        let err = backend
            .generate(&[Message::user("b")])
            .await
            .expect_err("second reply is scripted to fail");
        assert!(format!("{err:#}").contains("boom"));
        assert_eq!(backend.calls.borrow().len(), 2);
    }
}
