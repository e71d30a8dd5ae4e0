//! A minimal idempotent consumer: the pipeline side of the idempotent repository.

use std::sync::Mutex;

use exchange_repository::{IdempotentRepository, RepositoryError};

/// Delivers a message only the first time its id is offered.
pub struct IdempotentConsumer<R> {
    repo: R,
    delivered: Mutex<Vec<String>>,
}

impl<R: IdempotentRepository> IdempotentConsumer<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Returns whether the body was delivered downstream.
    pub fn offer(&self, message_id: &str, body: &str) -> Result<bool, RepositoryError> {
        if !self.repo.add(message_id)? {
            return Ok(false);
        }
        self.delivered.lock().unwrap().push(body.to_string());
        self.repo.confirm(message_id)?;
        Ok(true)
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }
}
