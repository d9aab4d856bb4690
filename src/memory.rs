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

//! In-memory implementation of every store port.
//!
//! Rows live in [`DashMap`]s keyed by id. Conditional updates (`claim`,
//! `mark_paid`, `modify`) run while holding the row's shard lock, so two
//! threads racing on the same row see exactly one winner.

use crate::base::{
    InvoiceId, PaymentId, ReferenceNumber, ReservationId, ServiceId, StorageServiceId,
    SubscriptionId, TransactionId, UnitId, UserId,
};
use crate::error::LedgerError;
use crate::invoice::CustomInvoice;
use crate::reservation::{
    ReservationStatus, StoragePayment, StorageReservation, StorageService, StorageUnit,
};
use crate::service::Service;
use crate::store::{
    AuditEntry, InvoiceRepository, Member, MemberDirectory, NewReservation, Notification, Notifier,
    PaymentRepository, ReferenceSequence, ReservationRepository, ServiceRepository,
    SubscriptionRepository, TransactionRepository, UnitRepository,
};
use crate::subscription::{Subscription, SubscriptionState};
use crate::transaction::{BankTransaction, FeedRecord};
use chrono::{DateTime, NaiveDate, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source starting at 1.
#[derive(Debug, Default)]
struct Sequence(AtomicU64);

impl Sequence {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Makes sure later ids do not collide with an explicitly chosen one.
    fn observe(&self, id: u64) {
        self.0.fetch_max(id, Ordering::Relaxed);
    }
}

fn sorted_by_id<K, V, F>(map: &DashMap<K, V>, keep: F) -> Vec<V>
where
    K: Eq + Hash + Ord + Copy,
    V: Clone,
    F: Fn(&V) -> bool,
{
    let mut rows: Vec<(K, V)> = map
        .iter()
        .filter(|row| keep(row.value()))
        .map(|row| (*row.key(), row.value().clone()))
        .collect();
    rows.sort_by_key(|(key, _)| *key);
    rows.into_iter().map(|(_, value)| value).collect()
}

/// Thread-safe store holding every entity in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    services: DashMap<ServiceId, Service>,
    subscriptions: DashMap<SubscriptionId, Subscription>,
    invoices: DashMap<InvoiceId, CustomInvoice>,
    transactions: DashMap<TransactionId, BankTransaction>,
    /// Archival reference → transaction, for duplicate detection.
    archive_index: DashMap<String, TransactionId>,
    members: DashMap<UserId, Member>,
    audit_log: Mutex<Vec<AuditEntry>>,
    storage_services: DashMap<StorageServiceId, StorageService>,
    units: DashMap<UnitId, StorageUnit>,
    reservations: DashMap<ReservationId, StorageReservation>,
    payments: DashMap<PaymentId, StoragePayment>,

    subscription_ids: Sequence,
    invoice_ids: Sequence,
    transaction_ids: Sequence,
    reservation_ids: Sequence,
    payment_ids: Sequence,
    reference_seq: Sequence,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn add_member(&self, member: Member) {
        self.members.insert(member.id, member);
    }

    pub fn add_storage_service(&self, service: StorageService) {
        self.storage_services.insert(service.id, service);
    }

    pub fn add_unit(&self, unit: StorageUnit) {
        self.units.insert(unit.id, unit);
    }

    pub fn set_unit_disabled(&self, id: UnitId, disabled: bool) -> bool {
        match self.units.get_mut(&id) {
            Some(mut unit) => {
                unit.is_disabled = disabled;
                true
            }
            None => false,
        }
    }

    /// Loads an existing subscription row as-is, e.g. from a snapshot.
    pub fn restore_subscription(&self, subscription: Subscription) {
        self.subscription_ids.observe(subscription.id.0);
        self.subscriptions.insert(subscription.id, subscription);
    }

    /// Loads an existing reservation row as-is.
    pub fn restore_reservation(&self, reservation: StorageReservation) {
        self.reservation_ids.observe(reservation.id.0);
        self.reservations.insert(reservation.id, reservation);
    }

    /// Every transaction, in arrival order.
    pub fn transactions(&self) -> Vec<BankTransaction> {
        sorted_by_id(&self.transactions, |_| true)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        sorted_by_id(&self.subscriptions, |_| true)
    }

    pub fn reservations(&self) -> Vec<StorageReservation> {
        sorted_by_id(&self.reservations, |_| true)
    }
}

impl ServiceRepository for MemoryStore {
    fn get(&self, id: ServiceId) -> Option<Service> {
        self.services.get(&id).map(|s| s.value().clone())
    }

    fn paying_for(&self, id: ServiceId) -> Vec<Service> {
        sorted_by_id(&self.services, |s| s.pays_also_service == Some(id))
    }
}

impl SubscriptionRepository for MemoryStore {
    fn insert(&self, user: UserId, service: ServiceId) -> Subscription {
        let id = SubscriptionId(self.subscription_ids.next());
        let subscription = Subscription::new(id, user, service);
        self.subscriptions.insert(id, subscription.clone());
        subscription
    }

    fn get(&self, id: SubscriptionId) -> Option<Subscription> {
        self.subscriptions.get(&id).map(|s| s.value().clone())
    }

    fn update(&self, subscription: &Subscription) {
        // Rows removed in the meantime stay removed.
        if let Some(mut row) = self.subscriptions.get_mut(&subscription.id) {
            *row = subscription.clone();
        }
    }

    fn delete(&self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    fn by_user(&self, user: UserId) -> Vec<Subscription> {
        sorted_by_id(&self.subscriptions, |s| s.user == user)
    }

    fn by_reference(&self, reference: &ReferenceNumber) -> Vec<Subscription> {
        sorted_by_id(&self.subscriptions, |s| {
            s.reference_number.as_ref() == Some(reference)
        })
    }

    fn by_state(&self, state: SubscriptionState) -> Vec<Subscription> {
        sorted_by_id(&self.subscriptions, |s| s.state == state)
    }
}

impl InvoiceRepository for MemoryStore {
    fn insert(
        &self,
        user: UserId,
        subscription: SubscriptionId,
        days: i64,
        amount: Decimal,
        created: DateTime<Utc>,
    ) -> CustomInvoice {
        let invoice = CustomInvoice {
            id: InvoiceId(self.invoice_ids.next()),
            user,
            subscription,
            days,
            amount,
            reference_number: None,
            created,
            payment_transaction: None,
        };
        self.invoices.insert(invoice.id, invoice.clone());
        invoice
    }

    fn get(&self, id: InvoiceId) -> Option<CustomInvoice> {
        self.invoices.get(&id).map(|i| i.value().clone())
    }

    fn set_reference(&self, id: InvoiceId, reference: ReferenceNumber) {
        if let Some(mut invoice) = self.invoices.get_mut(&id) {
            invoice.reference_number = Some(reference);
        }
    }

    fn by_reference(&self, reference: &ReferenceNumber) -> Vec<CustomInvoice> {
        sorted_by_id(&self.invoices, |i| i.reference_number.as_ref() == Some(reference))
    }

    fn by_user(&self, user: UserId) -> Vec<CustomInvoice> {
        sorted_by_id(&self.invoices, |i| i.user == user)
    }

    fn unpaid_for_user(&self, user: UserId) -> Vec<CustomInvoice> {
        sorted_by_id(&self.invoices, |i| i.user == user && !i.is_paid())
    }

    fn mark_paid(&self, id: InvoiceId, transaction: TransactionId) -> bool {
        match self.invoices.get_mut(&id) {
            Some(mut invoice) if invoice.payment_transaction.is_none() => {
                invoice.payment_transaction = Some(transaction);
                true
            }
            _ => false,
        }
    }

    fn clear_payment(&self, id: InvoiceId) {
        if let Some(mut invoice) = self.invoices.get_mut(&id) {
            invoice.payment_transaction = None;
        }
    }
}

impl TransactionRepository for MemoryStore {
    fn insert(&self, record: FeedRecord) -> Result<BankTransaction, LedgerError> {
        let Some(archival) = record.archival_reference.clone() else {
            let transaction =
                BankTransaction::from_record(TransactionId(self.transaction_ids.next()), record);
            self.transactions.insert(transaction.id, transaction.clone());
            return Ok(transaction);
        };

        // Entry API keeps check-and-insert atomic for concurrent imports.
        match self.archive_index.entry(archival) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateTransaction),
            Entry::Vacant(entry) => {
                let id = TransactionId(self.transaction_ids.next());
                let transaction = BankTransaction::from_record(id, record);
                self.transactions.insert(id, transaction.clone());
                entry.insert(id);
                Ok(transaction)
            }
        }
    }

    fn get(&self, id: TransactionId) -> Option<BankTransaction> {
        self.transactions.get(&id).map(|t| t.value().clone())
    }

    fn unused_by_reference(&self, reference: &ReferenceNumber) -> Vec<BankTransaction> {
        let mut rows = sorted_by_id(&self.transactions, |t| {
            !t.has_been_used && t.reference_number.as_ref() == Some(reference)
        });
        rows.sort_by_key(|t| (t.date, t.id));
        rows
    }

    fn unused(&self) -> Vec<BankTransaction> {
        let mut rows = sorted_by_id(&self.transactions, |t| !t.has_been_used);
        rows.sort_by_key(|t| (t.date, t.id));
        rows
    }

    fn by_user(&self, user: UserId) -> Vec<BankTransaction> {
        sorted_by_id(&self.transactions, |t| t.user == Some(user))
    }

    fn claim(&self, id: TransactionId, user: UserId) -> bool {
        match self.transactions.get_mut(&id) {
            Some(mut transaction) if !transaction.has_been_used => {
                transaction.has_been_used = true;
                transaction.user = Some(user);
                true
            }
            _ => false,
        }
    }

    fn release(&self, id: TransactionId) {
        if let Some(mut transaction) = self.transactions.get_mut(&id) {
            transaction.has_been_used = false;
        }
    }

    fn assign_user(&self, id: TransactionId, user: Option<UserId>) {
        if let Some(mut transaction) = self.transactions.get_mut(&id) {
            transaction.user = user;
        }
    }

    fn annotate(&self, id: TransactionId, comment: &str) {
        if let Some(mut transaction) = self.transactions.get_mut(&id) {
            if transaction.comment.as_deref() != Some(comment) {
                transaction.comment = Some(comment.to_owned());
            }
        }
    }
}

impl MemberDirectory for MemoryStore {
    fn get(&self, id: UserId) -> Option<Member> {
        self.members.get(&id).map(|m| m.value().clone())
    }

    fn all(&self) -> Vec<Member> {
        sorted_by_id(&self.members, |_| true)
    }

    fn log(&self, user: UserId, at: DateTime<Utc>, message: String) {
        self.audit_log.lock().push(AuditEntry { user, at, message });
    }

    fn history(&self, user: UserId) -> Vec<AuditEntry> {
        self.audit_log
            .lock()
            .iter()
            .filter(|entry| entry.user == user)
            .cloned()
            .collect()
    }

    fn clear_history(&self, user: UserId) {
        self.audit_log.lock().retain(|entry| entry.user != user);
    }
}

impl UnitRepository for MemoryStore {
    fn storage_service(&self, id: StorageServiceId) -> Option<StorageService> {
        self.storage_services.get(&id).map(|s| s.value().clone())
    }

    fn get(&self, id: UnitId) -> Option<StorageUnit> {
        self.units.get(&id).map(|u| u.value().clone())
    }
}

impl ReservationRepository for MemoryStore {
    fn insert(&self, new: NewReservation) -> StorageReservation {
        let reservation = StorageReservation {
            id: ReservationId(self.reservation_ids.next()),
            user: new.user,
            unit: new.unit,
            start_date: new.start_date,
            end_date: new.start_date,
            status: ReservationStatus::Pending,
            total_paid_months: 0,
            max_duration_months: new.max_duration_months,
            reference_number: new.reference_number,
            pending_until: new.pending_until,
            paid_at: None,
            created_at: new.created_at,
        };
        self.reservations.insert(reservation.id, reservation.clone());
        reservation
    }

    fn get(&self, id: ReservationId) -> Option<StorageReservation> {
        self.reservations.get(&id).map(|r| r.value().clone())
    }

    fn by_reference(&self, reference: &ReferenceNumber) -> Vec<StorageReservation> {
        sorted_by_id(&self.reservations, |r| {
            r.reference_number.as_ref() == Some(reference)
        })
    }

    fn by_status(&self, status: ReservationStatus) -> Vec<StorageReservation> {
        sorted_by_id(&self.reservations, |r| r.status == status)
    }

    fn by_unit(&self, unit: UnitId) -> Vec<StorageReservation> {
        sorted_by_id(&self.reservations, |r| r.unit == unit)
    }

    fn modify(
        &self,
        id: ReservationId,
        change: &mut dyn FnMut(&mut StorageReservation),
    ) -> Option<StorageReservation> {
        let mut row = self.reservations.get_mut(&id)?;
        change(&mut row);
        Some(row.clone())
    }
}

impl PaymentRepository for MemoryStore {
    fn record(
        &self,
        reservation: &StorageReservation,
        amount: Decimal,
        months: u32,
        paid_at: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> StoragePayment {
        let payment = StoragePayment {
            id: PaymentId(self.payment_ids.next()),
            reservation: reservation.id,
            reference_number: reservation.reference_number.clone(),
            amount,
            months,
            created_at,
            paid_at: Some(paid_at),
        };
        self.payments.insert(payment.id, payment.clone());
        payment
    }

    fn for_reservation(&self, reservation: ReservationId) -> Vec<StoragePayment> {
        sorted_by_id(&self.payments, |p| p.reservation == reservation)
    }
}

impl ReferenceSequence for MemoryStore {
    fn next_reference_seq(&self) -> u64 {
        self.reference_seq.next()
    }
}

/// Notification sink that keeps everything it was asked to send.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: SegQueue<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every queued notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        let mut sent = Vec::with_capacity(self.queue.len());
        while let Some(notification) = self.queue.pop() {
            sent.push(notification);
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Notifier for Outbox {
    fn send(&self, notification: Notification) {
        self.queue.push(notification);
    }
}
