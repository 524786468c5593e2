use std::collections::HashSet;
use std::sync::Arc;

use lendr_core::LendingRepository;

#[derive(Clone, Default)]
pub struct AuthConfig {
    pub api_keys: Arc<HashSet<String>>,
}

impl AuthConfig {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let api_keys = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.trim().is_empty())
            .collect();
        Self {
            api_keys: Arc::new(api_keys),
        }
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.api_keys.contains(key)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn LendingRepository>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(repo: Arc<dyn LendingRepository>, auth: AuthConfig) -> Self {
        Self { repo, auth }
    }
}
