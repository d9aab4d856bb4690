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

//! Persistence and delivery ports used by the engines.
//!
//! Every list query returns rows ordered by ascending id (transactions by
//! date, then id), so "last match" is always the most recently created row.
//!
//! The `claim`, `mark_paid` and `modify` operations are conditional updates
//! that must be atomic per row. They are what keeps money from being applied
//! twice when two jobs reconcile the same member at once.

use crate::base::{
    InvoiceId, ReferenceNumber, ReservationId, ServiceId, StorageServiceId, SubscriptionId,
    TransactionId, UnitId, UserId,
};
use crate::error::LedgerError;
use crate::invoice::CustomInvoice;
use crate::reservation::{
    ReservationStatus, StoragePayment, StorageReservation, StorageService, StorageUnit,
};
use crate::service::Service;
use crate::subscription::{Subscription, SubscriptionState};
use crate::transaction::{BankTransaction, FeedRecord};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A member as far as billing is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
}

/// One line in a member's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user: UserId,
    pub at: DateTime<Utc>,
    pub message: String,
}

/// A message handed to the delivery layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    pub template: String,
    pub context: serde_json::Value,
}

/// Service catalogue, maintained by administrators.
pub trait ServiceRepository: Send + Sync {
    fn get(&self, id: ServiceId) -> Option<Service>;

    /// Services whose `pays_also_service` points at `id`.
    fn paying_for(&self, id: ServiceId) -> Vec<Service>;
}

pub trait SubscriptionRepository: Send + Sync {
    /// Stores a new subscription, assigning its id.
    fn insert(&self, user: UserId, service: ServiceId) -> Subscription;

    fn get(&self, id: SubscriptionId) -> Option<Subscription>;

    fn update(&self, subscription: &Subscription);

    fn delete(&self, id: SubscriptionId) -> bool;

    fn by_user(&self, user: UserId) -> Vec<Subscription>;

    fn by_reference(&self, reference: &ReferenceNumber) -> Vec<Subscription>;

    fn by_state(&self, state: SubscriptionState) -> Vec<Subscription>;
}

pub trait InvoiceRepository: Send + Sync {
    fn insert(
        &self,
        user: UserId,
        subscription: SubscriptionId,
        days: i64,
        amount: Decimal,
        created: DateTime<Utc>,
    ) -> CustomInvoice;

    fn get(&self, id: InvoiceId) -> Option<CustomInvoice>;

    fn set_reference(&self, id: InvoiceId, reference: ReferenceNumber);

    fn by_reference(&self, reference: &ReferenceNumber) -> Vec<CustomInvoice>;

    fn by_user(&self, user: UserId) -> Vec<CustomInvoice>;

    fn unpaid_for_user(&self, user: UserId) -> Vec<CustomInvoice>;

    /// Sets `payment_transaction` only if it is still empty.
    fn mark_paid(&self, id: InvoiceId, transaction: TransactionId) -> bool;

    fn clear_payment(&self, id: InvoiceId);
}

pub trait TransactionRepository: Send + Sync {
    /// Stores a feed record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateTransaction`] if the archival reference was
    /// already stored.
    fn insert(&self, record: FeedRecord) -> Result<BankTransaction, LedgerError>;

    fn get(&self, id: TransactionId) -> Option<BankTransaction>;

    /// Unused transactions carrying `reference`, oldest first.
    fn unused_by_reference(&self, reference: &ReferenceNumber) -> Vec<BankTransaction>;

    fn unused(&self) -> Vec<BankTransaction>;

    fn by_user(&self, user: UserId) -> Vec<BankTransaction>;

    /// Marks the transaction used and attributes it to `user`, only if it
    /// was still unused. Returns whether this call consumed it.
    fn claim(&self, id: TransactionId, user: UserId) -> bool;

    /// Returns a transaction to the unused pool.
    fn release(&self, id: TransactionId);

    fn assign_user(&self, id: TransactionId, user: Option<UserId>);

    fn annotate(&self, id: TransactionId, comment: &str);
}

/// Member register and per-member activity log.
pub trait MemberDirectory: Send + Sync {
    fn get(&self, id: UserId) -> Option<Member>;

    fn all(&self) -> Vec<Member>;

    fn log(&self, user: UserId, at: DateTime<Utc>, message: String);

    fn history(&self, user: UserId) -> Vec<AuditEntry>;

    fn clear_history(&self, user: UserId);
}

pub trait UnitRepository: Send + Sync {
    fn storage_service(&self, id: StorageServiceId) -> Option<StorageService>;

    fn get(&self, id: UnitId) -> Option<StorageUnit>;
}

/// Field values for a reservation before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub user: UserId,
    pub unit: UnitId,
    pub start_date: NaiveDate,
    pub max_duration_months: Option<u32>,
    pub reference_number: Option<ReferenceNumber>,
    pub pending_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

pub trait ReservationRepository: Send + Sync {
    fn insert(&self, reservation: NewReservation) -> StorageReservation;

    fn get(&self, id: ReservationId) -> Option<StorageReservation>;

    fn by_reference(&self, reference: &ReferenceNumber) -> Vec<StorageReservation>;

    fn by_status(&self, status: ReservationStatus) -> Vec<StorageReservation>;

    fn by_unit(&self, unit: UnitId) -> Vec<StorageReservation>;

    /// Applies `change` to the stored row while holding its lock and returns
    /// the updated row.
    fn modify(
        &self,
        id: ReservationId,
        change: &mut dyn FnMut(&mut StorageReservation),
    ) -> Option<StorageReservation>;
}

/// Append-only storage payment ledger.
pub trait PaymentRepository: Send + Sync {
    fn record(
        &self,
        reservation: &StorageReservation,
        amount: Decimal,
        months: u32,
        paid_at: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> StoragePayment;

    fn for_reservation(&self, reservation: ReservationId) -> Vec<StoragePayment>;
}

/// Shared counter for reference number bases.
pub trait ReferenceSequence: Send + Sync {
    fn next_reference_seq(&self) -> u64;
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification);
}

/// Explicit hook run after a subscription changes state, e.g. to update the
/// door access list.
pub trait StateObserver: Send + Sync {
    fn subscription_state_changed(
        &self,
        subscription: &Subscription,
        from: SubscriptionState,
        to: SubscriptionState,
    );
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StateObserver for NoopObserver {
    fn subscription_state_changed(&self, _: &Subscription, _: SubscriptionState, _: SubscriptionState) {}
}

/// Handles to every repository, shared by the engines.
#[derive(Clone)]
pub struct Stores {
    pub services: Arc<dyn ServiceRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub invoices: Arc<dyn InvoiceRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub members: Arc<dyn MemberDirectory>,
    pub units: Arc<dyn UnitRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub references: Arc<dyn ReferenceSequence>,
}

impl Stores {
    /// Uses one store for every port.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ServiceRepository
            + SubscriptionRepository
            + InvoiceRepository
            + TransactionRepository
            + MemberDirectory
            + UnitRepository
            + ReservationRepository
            + PaymentRepository
            + ReferenceSequence
            + 'static,
    {
        Self {
            services: store.clone(),
            subscriptions: store.clone(),
            invoices: store.clone(),
            transactions: store.clone(),
            members: store.clone(),
            units: store.clone(),
            reservations: store.clone(),
            payments: store.clone(),
            references: store,
        }
    }
}
