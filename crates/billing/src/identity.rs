// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process identity used to disambiguate idempotency keys between hosts.

use rand::Rng;
use std::env;
use std::fmt;
use tracing::warn;

/// Hostname stamped into every default idempotency key.
///
/// Built once at startup and passed to [`crate::enrich`] explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostname(String);

impl Hostname {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self(hostname.into())
    }

    /// Resolves the hostname for this process.
    ///
    /// Order:
    /// 1. `BILLING_HOSTNAME` environment variable (if non-empty)
    /// 2. System hostname
    /// 3. `unknown-<n>` with a random `n`, so two unresolvable hosts are unlikely to collide
    #[must_use]
    pub fn from_system() -> Self {
        if let Ok(hostname) = env::var("BILLING_HOSTNAME") {
            if !hostname.is_empty() {
                return Self(hostname);
            }
        }

        match hostname::get() {
            Ok(os_hostname) => {
                if let Some(hostname) = os_hostname.to_str() {
                    if !hostname.is_empty() {
                        return Self(hostname.to_string());
                    }
                }
                warn!("System hostname is empty or not valid UTF-8");
            }
            Err(e) => warn!("Failed to get system hostname: {}", e),
        }

        let fallback = format!("unknown-{}", rand::thread_rng().gen_range(0..1000));
        warn!("Could not determine hostname, using '{}'", fallback);
        Self(fallback)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
