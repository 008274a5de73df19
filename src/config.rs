use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::validation::validate_pointer_expression;

/// What to do with a request whose service account identity cannot be
/// produced, either because the pointer found nothing usable or because
/// the account could not be resolved in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotFoundBehavior {
    #[default]
    Deny,
    Allow,
}

impl FromStr for NotFoundBehavior {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(Self::Deny),
            "allow" => Ok(Self::Allow),
            other => Err(ConfigError::InvalidValue {
                key: "SA_NOT_FOUND_BEHAVIOR".to_string(),
                reason: format!("expected 'deny' or 'allow', got '{other}'"),
            }),
        }
    }
}

/// Settings consumed by the evaluation path itself.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub sa_not_found_behavior: NotFoundBehavior,
    pub service_account_pointer: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            sa_not_found_behavior: NotFoundBehavior::default(),
            service_account_pointer: "/spec/serviceAccountName".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub evaluator: EvaluatorConfig,
}

impl AppConfig {
    /// Load from the environment. Address settings fall back to defaults
    /// on parse failure; the evaluation settings are rejected outright
    /// when malformed since a typo there silently changes verdicts.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8443);

        let host: IpAddr = std::env::var("HOST")
            .ok()
            .and_then(|s| {
                s.parse()
                    .map_err(|e| {
                        tracing::warn!("Invalid HOST value '{}': {}", s, e);
                        e
                    })
                    .ok()
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let sa_not_found_behavior = match std::env::var("SA_NOT_FOUND_BEHAVIOR") {
            Ok(value) => value.parse()?,
            Err(_) => NotFoundBehavior::default(),
        };

        let service_account_pointer = match std::env::var("SA_JSON_POINTER") {
            Ok(value) => {
                validate_pointer_expression(&value)?;
                value
            }
            Err(_) => EvaluatorConfig::default().service_account_pointer,
        };

        tracing::info!(
            "Configuration loaded: {}:{}, not-found behavior {:?}, pointer {}",
            host,
            port,
            sa_not_found_behavior,
            service_account_pointer
        );

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            evaluator: EvaluatorConfig {
                sa_not_found_behavior,
                service_account_pointer,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behavior_parses_case_insensitively() {
        assert_eq!("deny".parse::<NotFoundBehavior>().unwrap(), NotFoundBehavior::Deny);
        assert_eq!("Allow".parse::<NotFoundBehavior>().unwrap(), NotFoundBehavior::Allow);
        assert_eq!(" DENY ".parse::<NotFoundBehavior>().unwrap(), NotFoundBehavior::Deny);
    }

    #[test]
    fn behavior_rejects_unknown_values() {
        let err = "block".parse::<NotFoundBehavior>().unwrap_err();
        assert!(err.to_string().contains("SA_NOT_FOUND_BEHAVIOR"));
    }

    #[test]
    fn evaluator_defaults_point_at_pod_spec() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.sa_not_found_behavior, NotFoundBehavior::Deny);
        assert_eq!(config.service_account_pointer, "/spec/serviceAccountName");
    }
}
