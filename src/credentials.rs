use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::CredentialBackend;
use crate::error::CredentialError;

pub const CREDENTIAL_NAMESPACE_PREFIX: &str = "MAVI_COMPANION_MODEL_";

/// Raw platform secret storage keyed by `(service, account)`.
pub trait SecretStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, CredentialError>;
    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), CredentialError>;
    /// Returns `false` when nothing was stored under the pair.
    fn delete(&self, service: &str, account: &str) -> Result<bool, CredentialError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(service, account).map_err(store_error)
    }
}

fn store_error(err: keyring::Error) -> CredentialError {
    CredentialError::Store(err.to_string())
}

impl SecretStore for KeyringStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, CredentialError> {
        match Self::entry(service, account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(store_error(err)),
        }
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), CredentialError> {
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(store_error)
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, CredentialError> {
        match Self::entry(service, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(store_error(err)),
        }
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<(String, String), String>>,
}

impl SecretStore for MemoryStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, CredentialError> {
        Ok(self
            .entries
            .borrow()
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), CredentialError> {
        self.entries.borrow_mut().insert(
            (service.to_string(), account.to_string()),
            secret.to_string(),
        );
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, CredentialError> {
        Ok(self
            .entries
            .borrow_mut()
            .remove(&(service.to_string(), account.to_string()))
            .is_some())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub namespace: String,
    pub model_identifier: String,
    pub secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("namespace", &self.namespace)
            .field("model_identifier", &self.model_identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One API key per model, provisioned once: an existing key must be deleted
/// before a new one can be stored.
pub struct CredentialStore {
    prefix: String,
    backend: Box<dyn SecretStore>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn SecretStore>) -> Self {
        Self::with_prefix(CREDENTIAL_NAMESPACE_PREFIX, backend)
    }

    pub fn with_prefix(prefix: impl Into<String>, backend: Box<dyn SecretStore>) -> Self {
        Self {
            prefix: prefix.into(),
            backend,
        }
    }

    pub fn from_backend(kind: CredentialBackend) -> Self {
        match kind {
            CredentialBackend::Keyring => Self::new(Box::new(KeyringStore)),
            CredentialBackend::Memory => Self::new(Box::new(MemoryStore::default())),
        }
    }

    pub fn namespace(&self, model: &str) -> String {
        format!("{}{}", self.prefix, model)
    }

    pub fn get(&self, model: &str) -> Result<Option<Credential>, CredentialError> {
        let namespace = self.namespace(model);
        let secret = self.backend.get(&namespace, model)?;
        debug!(model = %model, present = secret.is_some(), "looked up credential");
        Ok(secret.map(|secret| Credential {
            namespace,
            model_identifier: model.to_string(),
            secret,
        }))
    }

    pub fn contains(&self, model: &str) -> Result<bool, CredentialError> {
        Ok(self.get(model)?.is_some())
    }

    pub fn set(&self, model: &str, secret: &str) -> Result<(), CredentialError> {
        let namespace = self.namespace(model);
        if self.backend.get(&namespace, model)?.is_some() {
            return Err(CredentialError::Conflict {
                model: model.to_string(),
            });
        }
        self.backend.set(&namespace, model, secret)?;
        info!(model = %model, "stored API key");
        Ok(())
    }

    pub fn delete(&self, model: &str) -> Result<(), CredentialError> {
        let namespace = self.namespace(model);
        if !self.backend.delete(&namespace, model)? {
            return Err(CredentialError::NotFound {
                model: model.to_string(),
            });
        }
        info!(model = %model, "deleted API key");
        Ok(())
    }
}
