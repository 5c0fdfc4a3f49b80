//! Configuration errors.

/// Invalid payment policy configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An argument is outside its valid range.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Flag name without the `--payment.` prefix.
        name: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse payment config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) const fn invalid(name: &'static str, reason: &'static str) -> Self {
        Self::Invalid { name, reason }
    }
}
