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

//! Feed processing engine.
//!
//! The [`Engine`] is the entry point for the bank feed. Each record is
//! stored, attributed by its reference number and applied:
//!
//! - **Subscription or invoice reference**: the member is reconciled right
//!   away through the [`BillingEngine`].
//! - **Reservation reference**: whole months are credited through the
//!   [`ReservationEngine`].
//! - **Anything else**: the transaction is kept unused for later
//!   recalculation.
//!
//! # Thread Safety
//!
//! All state lives behind the [`Stores`] ports. Records for different
//! members can be processed in parallel; consuming a transaction is atomic
//! in the store, so replays and races never apply money twice.

use crate::base::{TransactionId, UserId};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::ledger::{BillingEngine, Reconciliation, TransactionMatch};
use crate::reservations::{ReservationEngine, StorageOutcome, SweepReport};
use crate::store::{Notifier, StateObserver, Stores};
use crate::transaction::FeedRecord;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// What happened to one feed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Matched a subscription or invoice; the member was reconciled.
    Ledger {
        transaction: TransactionId,
        matched: TransactionMatch,
        reconciliation: Reconciliation,
    },
    /// Matched an open storage reservation.
    Storage {
        transaction: TransactionId,
        outcome: StorageOutcome,
    },
    /// No reference or no match. Kept for later recalculation.
    Unmatched { transaction: TransactionId },
}

/// Counts from one run of [`Engine::run_daily`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyReport {
    pub warnings_sent: usize,
    pub reconciliation: Reconciliation,
    pub sweep: SweepReport,
}

/// Bank feed processor tying the ledger and storage engines together.
pub struct Engine {
    stores: Stores,
    billing: BillingEngine,
    reservations: ReservationEngine,
}

impl Engine {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: LedgerConfig,
    ) -> Self {
        let reservations = ReservationEngine::new(stores.clone(), clock.clone(), &config);
        let billing = BillingEngine::new(stores.clone(), clock, notifier, config);
        Engine {
            stores,
            billing,
            reservations,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.billing = self.billing.with_observer(observer);
        self
    }

    /// Stores a feed record and applies it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Amount is zero or negative.
    /// - [`LedgerError::DuplicateTransaction`] - Archival reference already imported.
    pub fn process(&self, record: FeedRecord) -> Result<ProcessOutcome, LedgerError> {
        if record.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        // Store first so a duplicate import is rejected before any matching.
        let transaction = self.stores.transactions.insert(record)?;

        if let Some(matched) = self.billing.new_transaction(&transaction) {
            let reconciliation = self.billing.update_user(matched.user());
            return Ok(ProcessOutcome::Ledger {
                transaction: transaction.id,
                matched,
                reconciliation,
            });
        }

        if let Some(outcome) = self.reservations.apply_transaction(&transaction) {
            return Ok(ProcessOutcome::Storage {
                transaction: transaction.id,
                outcome,
            });
        }

        debug!(transaction = %transaction.id, "no matching reference");
        Ok(ProcessOutcome::Unmatched {
            transaction: transaction.id,
        })
    }

    /// Reconciles one member.
    pub fn reconcile(&self, user: UserId) -> Reconciliation {
        self.billing.update_user(user)
    }

    /// Daily job: expiry warnings, reconciliation of every member, then the
    /// reservation sweeps.
    pub fn run_daily(&self) -> DailyReport {
        DailyReport {
            warnings_sent: self.billing.notify_expiring_subscriptions(),
            reconciliation: self.billing.update_all_users(),
            sweep: self.reservations.run_daily_sweep(),
        }
    }

    pub fn billing(&self) -> &BillingEngine {
        &self.billing
    }

    pub fn reservations(&self) -> &ReservationEngine {
        &self.reservations
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }
}
