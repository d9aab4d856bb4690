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

//! # Membership Ledger
//!
//! Billing reconciliation and storage reservation engine for a hacklab
//! membership register.
//!
//! ## Core Components
//!
//! - [`Engine`]: Bank feed processor, the usual entry point
//! - [`BillingEngine`]: Matches payments to subscriptions and invoices and
//!   drives the subscription state machine
//! - [`ReservationEngine`]: Turns payments into rented storage months and
//!   runs the daily expiry sweeps
//! - [`Stores`]: Persistence ports, with [`MemoryStore`] as the in-memory
//!   implementation
//! - [`LedgerError`]: Error types for invalid operations
//!
//! ## Example
//!
//! ```
//! use membership_ledger_rs::{
//!     Engine, FeedRecord, FixedClock, LedgerConfig, Member, MemoryStore, Outbox, Service,
//!     ServiceId, Stores, SubscriptionState, UserId,
//! };
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
//! let store = Arc::new(MemoryStore::new());
//! store.add_member(Member { id: UserId(1), name: "Ada".into(), email: None });
//! store.add_service(Service::new(ServiceId(1), "Access", dec!(30), 30));
//!
//! let engine = Engine::new(
//!     Stores::from_shared(store.clone()),
//!     Arc::new(FixedClock::new(today)),
//!     Arc::new(Outbox::new()),
//!     LedgerConfig::default(),
//! );
//!
//! // Accepted members start overdue and pay by reference.
//! let subscription = engine.billing().subscribe(UserId(1), ServiceId(1)).unwrap();
//! engine.billing().accept_application(UserId(1)).unwrap();
//! let reference = subscription.reference_number.unwrap();
//!
//! engine
//!     .process(FeedRecord::new(today, dec!(30), Some(reference.as_str())))
//!     .unwrap();
//!
//! let subscription = engine.stores().subscriptions.get(subscription.id).unwrap();
//! assert_eq!(subscription.state, SubscriptionState::Active);
//! assert_eq!(subscription.days_left(today), 30);
//! ```

mod base;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
mod invoice;
pub mod ledger;
pub mod memory;
pub mod reference;
mod reservation;
pub mod reservations;
mod service;
pub mod store;
mod subscription;
mod transaction;

pub use base::{
    InvoiceId, PaymentId, ReferenceNumber, ReservationId, ServiceId, StorageServiceId,
    SubscriptionId, TransactionId, UnitId, UserId,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CascadeMode, LedgerConfig};
pub use engine::{DailyReport, Engine, ProcessOutcome};
pub use error::{LedgerError, ReferenceError};
pub use invoice::CustomInvoice;
pub use ledger::{BillingEngine, Reconciliation, TransactionMatch};
pub use memory::{MemoryStore, Outbox};
pub use reservation::{
    ReservationStatus, StoragePayment, StorageReservation, StorageService, StorageUnit,
    UnitStatus, add_months, months_between,
};
pub use reservations::{ReservationEngine, StorageOutcome, SweepReport};
pub use service::Service;
pub use store::{AuditEntry, Member, Notification, Notifier, StateObserver, Stores};
pub use subscription::{StateCheck, StateTransition, Subscription, SubscriptionState};
pub use transaction::{BankTransaction, FeedRecord};
