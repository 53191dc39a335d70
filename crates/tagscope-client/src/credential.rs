use parking_lot::Mutex;
use tracing::{debug, info};

/// Source of the opaque historian access token.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Result<String, String>;

    /// Forget the cached token after the historian rejected it.
    fn invalidate(&self);
}

/// Reads the token from an environment variable, caching it until invalidated.
pub struct EnvCredential {
    var: String,
    cached: Mutex<Option<String>>,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            cached: Mutex::new(None),
        }
    }
}

impl CredentialProvider for EnvCredential {
    fn token(&self) -> Result<String, String> {
        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = std::env::var(&self.var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| format!("environment variable {} is not set", self.var))?;
        debug!(var = %self.var, "Loaded historian credential");
        *cached = Some(token.clone());
        Ok(token)
    }

    fn invalidate(&self) {
        if self.cached.lock().take().is_some() {
            info!(var = %self.var, "Historian rejected credential, will re-read on next call");
        }
    }
}

/// A fixed token, for tests and tools that obtain the token elsewhere.
pub struct StaticCredential(pub String);

impl CredentialProvider for StaticCredential {
    fn token(&self) -> Result<String, String> {
        Ok(self.0.clone())
    }

    fn invalidate(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_an_error() {
        let credential = EnvCredential::new("TAGSCOPE_TEST_TOKEN_THAT_IS_NEVER_SET");
        let err = credential.token().unwrap_err();
        assert!(err.contains("TAGSCOPE_TEST_TOKEN_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn token_is_cached_until_invalidated() {
        let var = "TAGSCOPE_TEST_TOKEN_CACHED";
        std::env::set_var(var, "first");
        let credential = EnvCredential::new(var);
        assert_eq!(credential.token().unwrap(), "first");

        std::env::set_var(var, "second");
        assert_eq!(credential.token().unwrap(), "first");

        credential.invalidate();
        assert_eq!(credential.token().unwrap(), "second");
        std::env::remove_var(var);
    }
}
