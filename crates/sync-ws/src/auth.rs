use std::sync::atomic::{AtomicBool, Ordering};

/// Black-box bearer-token accessor consumed by the engine.
///
/// Token acquisition and refresh live outside this workspace; the engine
/// only reads the current token and signals when the server rejects it.
pub trait TokenProvider: Send + Sync {
    /// Current bearer token, or `None` when signed out.
    fn bearer_token(&self) -> Option<String>;

    /// Called when a collaborator reports the token is no longer valid.
    fn force_logout(&self);
}

/// Fixed-token provider for headless runs and tests.
#[derive(Debug)]
pub struct StaticTokenProvider {
    token: Option<String>,
    logged_out: AtomicBool,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            logged_out: AtomicBool::new(false),
        }
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }
}

impl TokenProvider for StaticTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        if self.is_logged_out() {
            None
        } else {
            self.token.clone()
        }
    }

    fn force_logout(&self) {
        self.logged_out.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_token_until_forced_out() {
        let provider = StaticTokenProvider::new(Some("tok-1".into()));
        assert_eq!(provider.bearer_token().as_deref(), Some("tok-1"));

        provider.force_logout();
        assert_eq!(provider.bearer_token(), None);
        assert!(provider.is_logged_out());
    }

    #[test]
    fn tokenless_provider_is_anonymous() {
        let provider = StaticTokenProvider::new(None);
        assert_eq!(provider.bearer_token(), None);
        assert!(!provider.is_logged_out());
    }
}
