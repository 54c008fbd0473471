//! Configuration validation.
//!
//! Checks run in a fixed order and every failure is collected, so one error
//! reports all of them. Validation has no side effects. A draft either becomes a
//! [`CacheConfiguration`] or is handed back as a [`ConfigError`].

use super::{CacheConfig, CacheConfiguration, Capabilities, IsolationLevel, Mode};
use crate::error::{ConfigError, Violation};

/// Turns [`CacheConfig`] drafts into validated [`CacheConfiguration`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationValidator {
    capabilities: Capabilities,
}

impl ConfigurationValidator {
    /// Creates a validator for an implementation with the given capabilities.
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// Capabilities this validator checks against.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns every constraint `draft` violates, in check order.
    pub fn violations<K, V>(&self, draft: &CacheConfig<K, V>) -> Vec<Violation> {
        let mut violations = Vec::new();

        if draft.read_through && draft.loader.is_none() {
            violations.push(Violation::MissingLoader);
        }
        if draft.write_through && draft.writer.is_none() {
            violations.push(Violation::MissingWriter);
        }
        if let Some(tx) = draft.transactions {
            if tx.isolation_level == IsolationLevel::None {
                violations.push(Violation::IsolationLevelNone);
            }
            if !self.capabilities.transactions {
                violations.push(Violation::TransactionsUnsupported);
            } else if tx.mode == Mode::Xa && !self.capabilities.xa_transactions {
                violations.push(Violation::XaUnsupported);
            }
        }
        if !draft.store_by_value && !self.capabilities.store_by_reference {
            violations.push(Violation::StoreByReferenceUnsupported);
        }

        violations
    }

    /// Validates `draft`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every violated constraint.
    pub fn validate<K: 'static, V: 'static>(
        &self,
        draft: CacheConfig<K, V>,
    ) -> Result<CacheConfiguration<K, V>, ConfigError> {
        let violations = self.violations(&draft);
        if violations.is_empty() {
            Ok(CacheConfiguration::from_validated(draft))
        } else {
            Err(ConfigError::Invalid(violations))
        }
    }
}
