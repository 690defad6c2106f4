//! Availability of external modules named in `DependentModules`.

use std::collections::BTreeSet;

use async_trait::async_trait;

/// Answers whether an external module is available to plugins.
#[async_trait]
pub trait ModuleResolver: Send + Sync + 'static {
    /// Returns true if `module` can be used.
    async fn check(&self, module: &str) -> bool;
}

/// A fixed set of available module names.
///
/// ```
/// use snowx_host::module::{ModuleResolver, StaticModules};
///
/// let modules = StaticModules::new().with("serde");
/// # tokio_test::block_on(async {
/// assert!(modules.check("serde").await);
/// assert!(!modules.check("numpy").await);
/// # });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticModules {
    available: BTreeSet<String>,
}

impl StaticModules {
    /// No modules available.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `module` as available.
    #[must_use]
    pub fn with(mut self, module: impl Into<String>) -> Self {
        self.available.insert(module.into());
        self
    }
}

impl<S: Into<String>> FromIterator<S> for StaticModules {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            available: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ModuleResolver for StaticModules {
    async fn check(&self, module: &str) -> bool {
        self.available.contains(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checks_membership() {
        let modules: StaticModules = ["serde", "regex"].into_iter().collect();
        assert!(modules.check("serde").await);
        assert!(!modules.check("numpy").await);
        assert!(StaticModules::new().with("numpy").check("numpy").await);
    }
}
