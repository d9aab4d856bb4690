// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration.
//!
//! Loaded from environment variables with the `MEMBERSHIP_LEDGER` prefix,
//! after an optional `.env` file:
//!
//! - `MEMBERSHIP_LEDGER__CASCADE_MODE=chained`
//! - `MEMBERSHIP_LEDGER__REFERENCE_BASE=5000`
//! - `MEMBERSHIP_LEDGER__EXPIRY_TEMPLATE=service_expiring`
//! - `MEMBERSHIP_LEDGER__LOG_FILTER=membership_ledger_rs=debug`

use config::ConfigBuilder;
use config::builder::DefaultState;
use serde::Deserialize;
use thiserror::Error;

/// Smallest base that still yields a valid reference number.
const MIN_REFERENCE_BASE: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expiry notification template name is empty")]
    EmptyTemplate,

    #[error("reference base must be at least 100, got {0}")]
    ReferenceBaseTooShort(u64),
}

/// How a payment to a service propagates to the service it also pays for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// Downstream `paid_until` becomes the transaction date plus the
    /// downstream period. One level only.
    #[default]
    TransactionDate,
    /// Downstream receives a virtual payment anchored at the start of the
    /// upstream's latest period, never shortening what is already paid.
    /// Follows the whole chain.
    Chained,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub cascade_mode: CascadeMode,

    /// Added to the store sequence when allocating reference numbers.
    #[serde(default = "default_reference_base")]
    pub reference_base: u64,

    /// Template used for "your service is about to expire" notifications.
    #[serde(default = "default_expiry_template")]
    pub expiry_template: String,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_reference_base() -> u64 {
    1000
}

fn default_expiry_template() -> String {
    "service_expiring".to_owned()
}

fn default_log_filter() -> String {
    "info".to_owned()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cascade_mode: CascadeMode::default(),
            reference_base: default_reference_base(),
            expiry_template: default_expiry_template(),
            log_filter: default_log_filter(),
        }
    }
}

impl LedgerConfig {
    /// Loads `.env` if present, then reads `MEMBERSHIP_LEDGER__*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LoadError`] if a value cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            config::Config::builder().add_source(
                config::Environment::with_prefix("MEMBERSHIP_LEDGER")
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        Ok(builder.build()?.try_deserialize()?)
    }

    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.expiry_template.trim().is_empty() {
            return Err(ValidationError::EmptyTemplate);
        }
        if self.reference_base < MIN_REFERENCE_BASE {
            return Err(ValidationError::ReferenceBaseTooShort(self.reference_base));
        }
        Ok(())
    }

    pub fn with_cascade_mode(mut self, mode: CascadeMode) -> Self {
        self.cascade_mode = mode;
        self
    }
}
