//! Cluster configuration.

use pgas_finish::{FinishKind, ParseFinishKindError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`RuntimeConfig::places`].
pub const PLACES_ENV: &str = "PGAS_PLACES";
/// Environment variable overriding [`RuntimeConfig::finish`].
pub const FINISH_ENV: &str = "PGAS_FINISH";

/// Errors raised while loading or validating a [`RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The TOML document could not be parsed.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A place count override is not a number.
	#[error("invalid place count `{0}`")]
	InvalidPlaces(String),

	/// A finish kind override is unknown.
	#[error(transparent)]
	InvalidFinish(#[from] ParseFinishKindError),

	/// A cluster needs at least one place.
	#[error("a cluster needs at least one place")]
	NoPlaces,

	/// Task bodies need at least one blocking thread.
	#[error("max_blocking_threads must be at least 1")]
	NoBlockingThreads,
}

/// Settings of an in-process cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
	/// Number of places.
	pub places: usize,
	/// Retention policy of scopes opened on the cluster.
	pub finish: FinishKind,
	/// Blocking pool size. Task bodies run there and may block in nested scopes.
	pub max_blocking_threads: usize,
	/// Polls a scope owner performs before parking.
	pub spin_before_block: usize,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			places: 4,
			finish: FinishKind::Default,
			max_blocking_threads: 512,
			spin_before_block: 64,
		}
	}
}

impl RuntimeConfig {
	/// Parses and validates a TOML document. Missing keys keep their defaults.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Applies `PGAS_PLACES` and `PGAS_FINISH` from the process environment.
	pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
		self.with_overrides(|key| std::env::var(key).ok())
	}

	/// Applies overrides looked up by environment variable name.
	pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		if let Some(places) = lookup(PLACES_ENV) {
			self.places = places.trim().parse().map_err(|_| ConfigError::InvalidPlaces(places))?;
		}
		if let Some(finish) = lookup(FINISH_ENV) {
			self.finish = finish.parse()?;
		}
		self.validate()?;
		Ok(self)
	}

	/// Rejects settings no cluster can run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.places == 0 {
			return Err(ConfigError::NoPlaces);
		}
		if self.max_blocking_threads == 0 {
			return Err(ConfigError::NoBlockingThreads);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn missing_keys_keep_defaults() {
		let config = RuntimeConfig::from_toml_str("places = 2\nfinish = \"debug\"").unwrap();
		assert_eq!(
			config,
			RuntimeConfig {
				places: 2,
				finish: FinishKind::Debug,
				..RuntimeConfig::default()
			}
		);
	}

	#[test]
	fn invalid_documents_are_rejected() {
		assert!(matches!(RuntimeConfig::from_toml_str("places = 0"), Err(ConfigError::NoPlaces)));
		assert!(matches!(RuntimeConfig::from_toml_str("finish = \"loud\""), Err(ConfigError::Toml(_))));
		assert!(matches!(RuntimeConfig::from_toml_str("threads = 3"), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn overrides_replace_file_values() {
		let config = RuntimeConfig::default()
			.with_overrides(|key| match key {
				PLACES_ENV => Some("7".into()),
				FINISH_ENV => Some("debug".into()),
				_ => None,
			})
			.unwrap();
		assert_eq!(config.places, 7);
		assert_eq!(config.finish, FinishKind::Debug);
	}

	#[test]
	fn bad_overrides_are_rejected() {
		let err = RuntimeConfig::default()
			.with_overrides(|key| (key == PLACES_ENV).then(|| "many".into()))
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidPlaces(value) if value == "many"));

		let err = RuntimeConfig::default()
			.with_overrides(|key| (key == FINISH_ENV).then(|| "strict".into()))
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidFinish(_)));
	}
}
