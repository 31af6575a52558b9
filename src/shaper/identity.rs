// src/shaper/identity.rs
use std::sync::atomic::{AtomicUsize, Ordering};

/// Browser-like header set attached to one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub accept_language: String,
    pub referer: String,
}

impl Identity {
    pub fn new(user_agent: &str, accept_language: &str, referer: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            accept_language: accept_language.to_string(),
            referer: referer.to_string(),
        }
    }
}

/// Fixed pool rotated round-robin from a random starting point.
#[derive(Debug)]
pub struct IdentityPool {
    identities: Vec<Identity>,
    cursor: AtomicUsize,
}

impl IdentityPool {
    /// Empty input falls back to the built-in pool.
    pub fn new(identities: Vec<Identity>) -> Self {
        let identities = if identities.is_empty() {
            default_identities()
        } else {
            identities
        };
        let start = rand::random::<u32>() as usize % identities.len();
        Self {
            identities,
            cursor: AtomicUsize::new(start),
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn next_identity(&self) -> &Identity {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.identities[i % self.identities.len()]
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new(default_identities())
    }
}

fn default_identities() -> Vec<Identity> {
    vec![
        Identity::new(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
            "ja,en-US;q=0.9,en;q=0.8",
            "https://www.google.co.jp/",
        ),
        Identity::new(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
            "ja-JP,ja;q=0.9",
            "https://search.yahoo.co.jp/",
        ),
        Identity::new(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
            "en-US,en;q=0.9,ja;q=0.7",
            "https://www.google.com/",
        ),
        Identity::new(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
            "ja,en;q=0.7",
            "https://www.bing.com/",
        ),
    ]
}
