//! Provider registry keyed by provider tag

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use kindred_domain::{CalendarError, ProviderTag, Result};

use super::ports::CalendarProvider;

/// Lookup table of configured provider adapters.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderTag, Arc<dyn CalendarProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own tag, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn CalendarProvider>) -> Self {
        self.providers.insert(provider.tag(), provider);
        self
    }

    pub fn get(&self, tag: ProviderTag) -> Result<Arc<dyn CalendarProvider>> {
        self.providers
            .get(&tag)
            .cloned()
            .ok_or_else(|| CalendarError::UnsupportedProvider(tag.to_string()).into())
    }

    /// Resolve a provider from its textual tag, as found in request paths.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn CalendarProvider>> {
        let tag = ProviderTag::from_str(name)
            .map_err(|_| CalendarError::UnsupportedProvider(name.to_string()))?;
        self.get(tag)
    }

    pub fn tags(&self) -> Vec<ProviderTag> {
        self.providers.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").field("providers", &self.tags()).finish()
    }
}

#[cfg(test)]
mod tests {
    use kindred_domain::KindredError;

    use super::*;

    #[test]
    fn unknown_name_is_unsupported() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("outlook").err().unwrap();
        assert_eq!(
            err,
            KindredError::Calendar(CalendarError::UnsupportedProvider("outlook".into()))
        );
    }

    #[test]
    fn known_tag_without_adapter_is_unsupported() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("google").err().unwrap();
        assert_eq!(err.kind(), "unsupported_provider");
    }
}
