use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{ConfigError, LogFormat, LoggingConfig};

/// Install the global tracing subscriber.
///
/// A set `RUST_LOG` overrides the configured filter and must parse.
/// Returns `Ok(false)` if a subscriber was already installed.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
	let env = match std::env::var(EnvFilter::DEFAULT_ENV) {
		Ok(directives) => Some(directives),
		Err(std::env::VarError::NotPresent) => None,
		Err(e) => return Err(ConfigError::Logging(format!("invalid {}: {e}", EnvFilter::DEFAULT_ENV))),
	};
	let filter = build_filter(env.as_deref(), config)?;

	let (plain, json) = match config.format {
		LogFormat::Plain => (Some(fmt::layer()), None),
		LogFormat::Json => (None, Some(fmt::layer().json())),
	};

	Ok(tracing_subscriber::registry()
		.with(filter)
		.with(plain)
		.with(json)
		.try_init()
		.is_ok())
}

fn build_filter(env: Option<&str>, config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
	match env {
		Some(directives) => EnvFilter::try_new(directives)
			.map_err(|e| ConfigError::Logging(format!("invalid {}: {e}", EnvFilter::DEFAULT_ENV))),
		None => EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::Logging(e.to_string())),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_invalid_configured_filter() {
		let config = LoggingConfig {
			filter: "jobhost=notalevel".to_string(),
			..Default::default()
		};
		assert_matches!(build_filter(None, &config), Err(ConfigError::Logging(_)));
	}

	#[test]
	fn test_invalid_env_filter_is_reported() {
		let err = build_filter(Some("jobhost=notalevel"), &LoggingConfig::default()).unwrap_err();
		assert_matches!(err, ConfigError::Logging(ref msg) if msg.contains("RUST_LOG"));
	}

	#[test]
	fn test_env_filter_overrides_config() {
		let config = LoggingConfig {
			filter: "jobhost=notalevel".to_string(),
			..Default::default()
		};
		let filter = build_filter(Some("job_index=debug"), &config).unwrap();
		assert!(filter.to_string().contains("job_index=debug"));
	}

	#[test]
	fn test_second_init_is_noop() {
		if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
			return;
		}
		let config = LoggingConfig::default();
		let _ = init(&config);
		assert!(!init(&config).unwrap());
	}
}
