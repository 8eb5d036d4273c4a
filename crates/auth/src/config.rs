//! Bouncer configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How matching allow and forbid grants are weighed against each other.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precedence {
    /// A forbid is lifted only by a strictly more specific allow; forbid wins
    /// ties. A forbid on everything is lifted only by an allow held by the
    /// same subject or role.
    ///
    /// Specificity orders the "everything" grant below abilities on a name or
    /// class, and those below abilities on a single instance; an exact name
    /// beats `*` at the same scope.
    #[default]
    MostSpecific,
    /// Any matching forbid denies, whatever allows exist.
    ForbidWins,
}

impl core::str::FromStr for Precedence {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "most-specific" | "most_specific" => Ok(Precedence::MostSpecific),
            "forbid-wins" | "forbid_wins" => Ok(Precedence::ForbidWins),
            other => Err(ConfigError::Invalid {
                key: "BOUNCER_PRECEDENCE",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration for a [`Bouncer`](crate::Bouncer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BouncerConfig {
    /// Memoize decisions per subject.
    pub caching: bool,
    pub precedence: Precedence,
    /// Create roles referenced by an unknown name in `allow`/`forbid`/`assign`.
    /// When off, such references fail with `NotFound`.
    pub create_missing_roles: bool,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            caching: true,
            precedence: Precedence::MostSpecific,
            create_missing_roles: true,
        }
    }
}

impl BouncerConfig {
    /// Read overrides from `BOUNCER_CACHE`, `BOUNCER_PRECEDENCE` and
    /// `BOUNCER_CREATE_ROLES`; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup("BOUNCER_CACHE") {
            config.caching = parse_flag("BOUNCER_CACHE", &value)?;
        }
        if let Some(value) = lookup("BOUNCER_PRECEDENCE") {
            config.precedence = value.parse()?;
        }
        if let Some(value) = lookup("BOUNCER_CREATE_ROLES") {
            config.create_missing_roles = parse_flag("BOUNCER_CREATE_ROLES", &value)?;
        }
        Ok(config)
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_create_missing_roles(mut self, create: bool) -> Self {
        self.create_missing_roles = create;
        self
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}
