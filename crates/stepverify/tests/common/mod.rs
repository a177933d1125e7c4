//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use stepverify::VerifierConfig;
use stepverify::sources::{self, Just};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
}

impl User {
    pub fn new(username: &str, firstname: &str, lastname: &str) -> Self {
        Self {
            username: username.to_string(),
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
        }
    }

    pub fn skyler() -> Self {
        Self::new("swhite", "Skyler", "White")
    }

    pub fn jesse() -> Self {
        Self::new("jpinkman", "Jesse", "Pinkman")
    }

    pub fn walter() -> Self {
        Self::new("wwhite", "Walter", "White")
    }

    pub fn saul() -> Self {
        Self::new("sgoodman", "Saul", "Goodman")
    }

    pub fn capitalized(&self) -> Self {
        Self {
            username: self.username.to_uppercase(),
            firstname: self.firstname.to_uppercase(),
            lastname: self.lastname.to_uppercase(),
        }
    }
}

/// Fixed in-memory user store.
#[derive(Debug, Clone)]
pub struct UserRepository {
    users: Vec<User>,
}

impl Default for UserRepository {
    fn default() -> Self {
        Self {
            users: vec![User::skyler(), User::jesse(), User::walter(), User::saul()],
        }
    }
}

impl UserRepository {
    pub fn find_first(&self) -> Just<User> {
        sources::just(self.users.first().cloned())
    }

    pub fn find_all(&self) -> Just<User> {
        sources::just(self.users.clone())
    }

    pub fn all(&self) -> &[User] {
        &self.users
    }
}

#[derive(Debug, Error)]
#[error("runtime failure")]
pub struct RuntimeError;

#[derive(Debug, Error)]
#[error("illegal state")]
pub struct IllegalStateError;

#[derive(Debug, Error)]
#[error("get out of here")]
pub struct GetOutOfHereError;

/// Configuration with a short default deadline so failing real-time runs
/// finish quickly.
pub fn test_config() -> VerifierConfig {
    let mut config = VerifierConfig::default();
    config.verify.default_timeout_ms = 5_000;
    config
}

pub const SHORT_DEADLINE: Duration = Duration::from_millis(100);
