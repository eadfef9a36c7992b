// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::ContextError;

const CONTEXT_STORE_ENV_VAR: &str = "DD_TRACE_CONTEXT_STORE";

/// Which thread-affine storage backs the default ambient context store.
///
/// Exactly two values are recognized. `ThreadLocal` is the default: child
/// threads always start with no ambient context. `Inheritable` copies the
/// spawning thread's ambient context into threads started through the
/// store's `spawn` helper, a one-time snapshot rather than a live link.
///
/// The inheritable variant exists for callers that rely on implicit
/// propagation across thread creation. It is a known source of cross-request
/// leakage when threads are pooled or long-lived, so prefer `ThreadLocal`
/// unless inheritance is explicitly required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    ThreadLocal,
    Inheritable,
}

impl FromStr for StoreKind {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, ContextError> {
        match s {
            "thread-local" => Ok(StoreKind::ThreadLocal),
            "inheritable" => Ok(StoreKind::Inheritable),
            other => Err(ContextError::InvalidConfig(format!(
                "unrecognized context store '{other}', expected 'thread-local' or 'inheritable'"
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::ThreadLocal => write!(f, "thread-local"),
            StoreKind::Inheritable => write!(f, "inheritable"),
        }
    }
}

/// Construction-time configuration for the ambient context core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage variant backing the default ambient store.
    pub context_store: StoreKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_store: StoreKind::ThreadLocal,
        }
    }
}

impl Config {
    /// Create configuration from environment variables.
    ///
    /// `DD_TRACE_CONTEXT_STORE` selects the storage variant. An unset
    /// variable falls back to `thread-local`; a set-but-empty or
    /// unrecognized value is a fatal configuration error.
    pub fn from_env() -> Result<Self, ContextError> {
        let context_store = match env::var(CONTEXT_STORE_ENV_VAR) {
            Ok(raw) => {
                let value = raw.trim();
                if value.is_empty() {
                    return Err(ContextError::InvalidConfig(format!(
                        "{CONTEXT_STORE_ENV_VAR} is set but empty"
                    )));
                }
                value.parse()?
            }
            Err(_) => StoreKind::ThreadLocal,
        };

        debug!("using {} ambient context store", context_store);
        Ok(Self { context_store })
    }
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;
    use serial_test::serial;
    use std::env;

    use super::*;

    #[test]
    #[serial]
    fn test_default_store_when_unset() {
        env::remove_var(CONTEXT_STORE_ENV_VAR);
        let config = Config::from_env().unwrap();
        assert_eq!(config.context_store, StoreKind::ThreadLocal);
    }

    #[duplicate_item(
        test_name                       env_value           expected_kind;
        [test_thread_local_store]       ["thread-local"]    [StoreKind::ThreadLocal];
        [test_inheritable_store]        ["inheritable"]     [StoreKind::Inheritable];
    )]
    #[test]
    #[serial]
    fn test_name() {
        env::set_var(CONTEXT_STORE_ENV_VAR, env_value);
        let config = Config::from_env().unwrap();
        assert_eq!(config.context_store, expected_kind);
        env::remove_var(CONTEXT_STORE_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_error_if_store_empty() {
        env::set_var(CONTEXT_STORE_ENV_VAR, "");
        let config = Config::from_env();
        assert!(config.is_err());
        assert_eq!(
            config.unwrap_err().to_string(),
            "Invalid configuration: DD_TRACE_CONTEXT_STORE is set but empty"
        );
        env::remove_var(CONTEXT_STORE_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_error_if_store_unrecognized() {
        env::set_var(CONTEXT_STORE_ENV_VAR, "fiber-local");
        let config = Config::from_env();
        assert!(config.is_err());
        assert_eq!(
            config.unwrap_err().to_string(),
            "Invalid configuration: unrecognized context store 'fiber-local', \
             expected 'thread-local' or 'inheritable'"
        );
        env::remove_var(CONTEXT_STORE_ENV_VAR);
    }

    #[test]
    fn test_store_kind_round_trips_through_display() {
        for kind in [StoreKind::ThreadLocal, StoreKind::Inheritable] {
            assert_eq!(kind.to_string().parse::<StoreKind>().unwrap(), kind);
        }
    }
}
