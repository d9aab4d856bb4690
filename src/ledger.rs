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

//! Subscription billing and reconciliation.
//!
//! [`BillingEngine`] matches bank transactions to subscriptions and custom
//! invoices by reference number, advances `paid_until` and drives the
//! subscription state machine.
//!
//! # Reconciliation
//!
//! [`BillingEngine::update_user`] is the single entry point that moves
//! money. It can be called any number of times: a transaction is consumed
//! through [`TransactionRepository::claim`], so a second pass finds nothing
//! left to apply.
//!
//! 1. Unpaid invoices are paid by the oldest sufficient unused transaction
//!    carrying the invoice reference.
//! 2. Every non-suspended subscription consumes its unused transactions in
//!    date order, unless another service the member is subscribed to
//!    already pays for it.
//! 3. The state machine runs for every subscription of the member.
//!
//! A shared reference resolves the same way everywhere: subscriptions before
//! invoices, the newest row first. Only that row consumes the transactions.
//!
//! # Cascading
//!
//! A service may declare `pays_also_service`. How the payment propagates is
//! chosen by [`CascadeMode`].
//!
//! [`TransactionRepository::claim`]: crate::store::TransactionRepository::claim

use crate::base::{InvoiceId, ReferenceNumber, ServiceId, SubscriptionId, UserId};
use crate::clock::Clock;
use crate::config::{CascadeMode, LedgerConfig};
use crate::error::LedgerError;
use crate::invoice::CustomInvoice;
use crate::reference;
use crate::service::Service;
use crate::store::{NoopObserver, Notification, Notifier, StateObserver, Stores};
use crate::subscription::{StateCheck, Subscription, SubscriptionState};
use crate::transaction::BankTransaction;
use chrono::{NaiveDate, TimeDelta};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What an incoming transaction's reference pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMatch {
    Subscription {
        user: UserId,
        subscription: SubscriptionId,
    },
    Invoice {
        user: UserId,
        invoice: InvoiceId,
    },
}

impl TransactionMatch {
    pub fn user(&self) -> UserId {
        match self {
            Self::Subscription { user, .. } | Self::Invoice { user, .. } => *user,
        }
    }
}

/// Work done by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub invoices_paid: usize,
    pub payments_applied: usize,
    pub state_changes: usize,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn merge(&mut self, other: Reconciliation) {
        self.invoices_paid += other.invoices_paid;
        self.payments_applied += other.payments_applied;
        self.state_changes += other.state_changes;
    }
}

/// `date + days`, saturating at the calendar limits.
fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

pub struct BillingEngine {
    stores: Stores,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    observer: Arc<dyn StateObserver>,
    config: LedgerConfig,
}

impl BillingEngine {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            stores,
            clock,
            notifier,
            observer: Arc::new(NoopObserver),
            config,
        }
    }

    /// Registers the hook called after every subscription state change.
    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn log(&self, user: UserId, message: String) {
        self.stores.members.log(user, self.clock.now(), message);
    }

    /// Allocates a fresh reference number from the shared sequence.
    pub(crate) fn next_reference(&self) -> Result<ReferenceNumber, LedgerError> {
        Ok(reference::allocate(
            self.stores.references.as_ref(),
            self.config.reference_base,
        )?)
    }

    fn service(&self, id: ServiceId) -> Option<Service> {
        let service = self.stores.services.get(id);
        if service.is_none() {
            warn!(service = %id, "subscription points at a missing service");
        }
        service
    }

    /// Attributes a new transaction to a member by its reference.
    ///
    /// Subscriptions are searched first, then custom invoices. When several
    /// rows share the reference the most recently created one wins. The
    /// transaction is not consumed here.
    pub fn new_transaction(&self, transaction: &BankTransaction) -> Option<TransactionMatch> {
        let reference = transaction.reference_number.as_ref()?;

        let subscriptions = self.stores.subscriptions.by_reference(reference);
        let matched = if let Some(subscription) = subscriptions.last() {
            if subscriptions.len() > 1 {
                warn!(
                    reference = %reference,
                    count = subscriptions.len(),
                    "reference number shared by several subscriptions, using the newest"
                );
            }
            TransactionMatch::Subscription {
                user: subscription.user,
                subscription: subscription.id,
            }
        } else {
            let invoices = self.stores.invoices.by_reference(reference);
            let invoice = invoices.last()?;
            if invoices.len() > 1 {
                warn!(
                    reference = %reference,
                    count = invoices.len(),
                    "reference number shared by several invoices, using the newest"
                );
            }
            TransactionMatch::Invoice {
                user: invoice.user,
                invoice: invoice.id,
            }
        };

        let user = matched.user();
        self.stores.transactions.assign_user(transaction.id, Some(user));
        self.log(
            user,
            format!(
                "Bank transaction of {}€ dated {}",
                transaction.amount, transaction.date
            ),
        );
        debug!(transaction = %transaction.id, user = %user, "transaction attributed");
        Some(matched)
    }

    /// Runs [`update_user`](Self::update_user) for every member.
    pub fn update_all_users(&self) -> Reconciliation {
        let mut total = Reconciliation::default();
        for member in self.stores.members.all() {
            total.merge(self.update_user(member.id));
        }
        total
    }

    /// Applies every pending payment of `user` and refreshes their states.
    pub fn update_user(&self, user: UserId) -> Reconciliation {
        let mut result = Reconciliation::default();

        for invoice in self.stores.invoices.unpaid_for_user(user) {
            if self.pay_invoice_from_feed(&invoice, &mut result) {
                result.invoices_paid += 1;
            }
        }

        let subscriptions = self.stores.subscriptions.by_user(user);
        let subscribed: HashSet<ServiceId> = subscriptions.iter().map(|s| s.service).collect();
        for id in subscriptions.iter().map(|s| s.id) {
            // Earlier iterations may have cascaded into this row.
            let Some(mut subscription) = self.stores.subscriptions.get(id) else {
                continue;
            };
            result.payments_applied += self.update_subscription(&mut subscription, &subscribed);
        }

        for mut subscription in self.stores.subscriptions.by_user(user) {
            result.state_changes += self.check_subscription_state(&mut subscription).transitions.len();
        }

        if !result.is_empty() {
            info!(
                user = %user,
                invoices = result.invoices_paid,
                payments = result.payments_applied,
                state_changes = result.state_changes,
                "member reconciled"
            );
        }
        result
    }

    fn pay_invoice_from_feed(&self, invoice: &CustomInvoice, result: &mut Reconciliation) -> bool {
        let Some(reference) = &invoice.reference_number else {
            return false;
        };
        // Attribution prefers subscriptions, then the newest invoice.
        if !self.stores.subscriptions.by_reference(reference).is_empty()
            || self.stores.invoices.by_reference(reference).last().map(|i| i.id) != Some(invoice.id)
        {
            debug!(invoice = %invoice.id, "reference resolves elsewhere, skipping");
            return false;
        }
        for transaction in self.stores.transactions.unused_by_reference(reference) {
            if !invoice.is_paid_by(transaction.amount) {
                debug!(transaction = %transaction.id, invoice = %invoice.id, "insufficient for invoice");
                self.stores.transactions.annotate(
                    transaction.id,
                    &format!(
                        "Amount {}€ is less than the invoice amount {}€",
                        transaction.amount, invoice.amount
                    ),
                );
                continue;
            }
            if self.invoice_paid_by_transaction(invoice, &transaction, result) {
                return true;
            }
        }
        false
    }

    /// Pays `invoice` with `transaction` and extends its subscription.
    fn invoice_paid_by_transaction(
        &self,
        invoice: &CustomInvoice,
        transaction: &BankTransaction,
        result: &mut Reconciliation,
    ) -> bool {
        let Some(mut subscription) = self.stores.subscriptions.get(invoice.subscription) else {
            warn!(
                invoice = %invoice.id,
                subscription = %invoice.subscription,
                "transaction would pay invoice but the subscription is missing"
            );
            return false;
        };
        let service = self.service(subscription.service);
        let service_name = service
            .as_ref()
            .map_or_else(|| subscription.service.to_string(), |s| s.name.clone());

        if !self.stores.transactions.claim(transaction.id, invoice.user) {
            return false;
        }
        if !self.stores.invoices.mark_paid(invoice.id, transaction.id) {
            self.stores.transactions.release(transaction.id);
            return false;
        }

        let from = subscription.paid_until.unwrap_or(transaction.date);
        let paid_until = add_days(from, invoice.days);
        subscription.paid_until = Some(paid_until);
        subscription.last_payment = Some(transaction.id);
        subscription.disable_on_expiry = false;
        self.stores.subscriptions.update(&subscription);

        info!(invoice = %invoice.id, transaction = %transaction.id, %paid_until, "invoice paid");
        self.log(
            invoice.user,
            format!(
                "Paid {} days of {}, ending at {} with {}",
                invoice.days, service_name, paid_until, transaction
            ),
        );

        if self.config.cascade_mode == CascadeMode::Chained {
            if let Some(service) = &service {
                self.cascade_payment(&subscription, service, transaction);
            }
        }
        result.state_changes += self.check_subscription_state(&mut subscription).transitions.len();
        true
    }

    fn update_subscription(
        &self,
        subscription: &mut Subscription,
        subscribed: &HashSet<ServiceId>,
    ) -> usize {
        if subscription.state == SubscriptionState::Suspended {
            debug!(subscription = %subscription.id, "suspended, no action");
            return 0;
        }
        let Some(reference) = subscription.reference_number.clone() else {
            return 0;
        };
        let owner = self.stores.subscriptions.by_reference(&reference).last().map(|s| s.id);
        if owner != Some(subscription.id) {
            debug!(subscription = %subscription.id, "reference belongs to a newer subscription, skipping");
            return 0;
        }
        let Some(service) = self.service(subscription.service) else {
            return 0;
        };

        let paid_elsewhere = self
            .stores
            .services
            .paying_for(service.id)
            .into_iter()
            .find(|payer| payer.id != service.id && subscribed.contains(&payer.id));
        if let Some(payer) = paid_elsewhere {
            debug!(
                subscription = %subscription.id,
                payer = %payer.name,
                "paid by another subscribed service, skipping"
            );
            return 0;
        }

        let mut applied = 0;
        for transaction in self.stores.transactions.unused_by_reference(&reference) {
            if service.is_paid_by(transaction.amount) {
                if self.service_paid_by_transaction(subscription, &service, &transaction) {
                    applied += 1;
                }
            } else {
                debug!(transaction = %transaction.id, service = %service.name, "insufficient for service");
                self.stores.transactions.annotate(
                    transaction.id,
                    &format!(
                        "Amount {}€ is less than the minimum payment {}€ for {}",
                        transaction.amount,
                        service.payment_minimum(),
                        service.name
                    ),
                );
            }
        }
        applied
    }

    /// Credits one payment period of `service` to `subscription`.
    ///
    /// The first payment starts from the transaction date and includes the
    /// first-time bonus; later payments extend the previous `paid_until`.
    /// Returns `false` if the transaction had already been used.
    pub fn service_paid_by_transaction(
        &self,
        subscription: &mut Subscription,
        service: &Service,
        transaction: &BankTransaction,
    ) -> bool {
        if !self.stores.transactions.claim(transaction.id, subscription.user) {
            debug!(transaction = %transaction.id, "transaction already used");
            return false;
        }

        let (from, days) = match subscription.paid_until {
            Some(paid_until) => (paid_until, service.days_per_payment),
            None => {
                debug!(
                    subscription = %subscription.id,
                    bonus = service.days_bonus_for_first,
                    "first payment, adding bonus"
                );
                (
                    transaction.date,
                    service.days_per_payment + service.days_bonus_for_first,
                )
            }
        };
        let paid_until = add_days(from, days);
        subscription.paid_until = Some(paid_until);
        subscription.last_payment = Some(transaction.id);
        subscription.disable_on_expiry = false;
        self.stores.subscriptions.update(subscription);

        self.log(
            subscription.user,
            format!("{} is now paid until {} due to {}", service.name, paid_until, transaction),
        );
        self.cascade_payment(subscription, service, transaction);
        true
    }

    /// Services reached by following `pays_also_service` from `service`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::CascadeCycle`] if the chain loops.
    pub fn payment_chain(&self, service: &Service) -> Result<Vec<Service>, LedgerError> {
        let mut visited = HashSet::from([service.id]);
        let mut chain = Vec::new();
        let mut next = service.pays_also_service;
        while let Some(id) = next {
            if !visited.insert(id) {
                return Err(LedgerError::CascadeCycle(service.id));
            }
            let Some(downstream) = self.service(id) else {
                break;
            };
            next = downstream.pays_also_service;
            chain.push(downstream);
        }
        Ok(chain)
    }

    fn cascade_payment(
        &self,
        upstream: &Subscription,
        service: &Service,
        transaction: &BankTransaction,
    ) {
        if service.pays_also_service.is_none() {
            return;
        }
        let chain = match self.payment_chain(service) {
            Ok(chain) => chain,
            Err(err) => {
                error!(service = %service.name, %err, "refusing to cascade payment");
                return;
            }
        };

        match self.config.cascade_mode {
            CascadeMode::TransactionDate => {
                if let Some(downstream) = chain.first() {
                    for mut subscription in self.open_subscriptions(upstream.user, downstream.id) {
                        let paid_until = add_days(transaction.date, downstream.days_per_payment);
                        self.apply_cascade(&mut subscription, downstream, service, paid_until, transaction);
                    }
                }
            }
            CascadeMode::Chained => {
                let mut anchor_service = service.clone();
                let mut anchor_paid_until = upstream.paid_until;
                for downstream in chain {
                    let Some(paid_until) = anchor_paid_until else {
                        break;
                    };
                    let anchor = add_days(paid_until, -anchor_service.days_per_payment);
                    let mut next_anchor = None;
                    for mut subscription in self.open_subscriptions(upstream.user, downstream.id) {
                        let mut days = downstream.days_per_payment;
                        if subscription.paid_until.is_none() {
                            days += downstream.days_bonus_for_first;
                        }
                        let candidate = add_days(anchor, days);
                        let paid_until = subscription.paid_until.map_or(candidate, |p| p.max(candidate));
                        self.apply_cascade(&mut subscription, &downstream, &anchor_service, paid_until, transaction);
                        next_anchor = next_anchor.or(subscription.paid_until);
                    }
                    anchor_paid_until = next_anchor;
                    anchor_service = downstream;
                }
            }
        }
    }

    fn open_subscriptions(&self, user: UserId, service: ServiceId) -> Vec<Subscription> {
        self.stores
            .subscriptions
            .by_user(user)
            .into_iter()
            .filter(|s| s.service == service)
            .filter(|s| {
                let open = s.state != SubscriptionState::Suspended;
                if !open {
                    debug!(subscription = %s.id, "suspended, cascade skipped");
                }
                open
            })
            .collect()
    }

    fn apply_cascade(
        &self,
        subscription: &mut Subscription,
        service: &Service,
        payer: &Service,
        paid_until: NaiveDate,
        transaction: &BankTransaction,
    ) {
        subscription.paid_until = Some(paid_until);
        subscription.last_payment = Some(transaction.id);
        self.stores.subscriptions.update(subscription);
        debug!(subscription = %subscription.id, payer = %payer.name, %paid_until, "cascaded payment");
        self.log(
            subscription.user,
            format!(
                "{} is now paid until {} due to {} was paid",
                service.name, paid_until, payer.name
            ),
        );
        self.check_subscription_state(subscription);
    }

    /// Runs the automatic state transitions for today and persists them.
    ///
    /// A subscription flagged `disable_on_expiry` is deleted instead of going
    /// overdue.
    pub fn check_subscription_state(&self, subscription: &mut Subscription) -> StateCheck {
        let Some(service) = self.service(subscription.service) else {
            return StateCheck::default();
        };
        let check = subscription.check_state(&service, self.clock.today());

        if check.remove {
            self.stores.subscriptions.delete(subscription.id);
            info!(subscription = %subscription.id, service = %service.name, "expired subscription removed on request");
            self.log(
                subscription.user,
                format!("Service {} ended as requested", service.name),
            );
            return check;
        }

        for transition in &check.transitions {
            info!(
                subscription = %subscription.id,
                from = %transition.from,
                to = %transition.to,
                "subscription state changed"
            );
            self.log(
                subscription.user,
                format!(
                    "Service {} state changed from {} to {}",
                    service.name, transition.from, transition.to
                ),
            );
        }
        if !check.transitions.is_empty() {
            self.stores.subscriptions.update(subscription);
            for transition in &check.transitions {
                self.observer
                    .subscription_state_changed(subscription, transition.from, transition.to);
            }
        }
        check
    }

    /// Subscribes `user` to `service`. The subscription starts suspended.
    ///
    /// # Errors
    ///
    /// Unknown member or service, or reference allocation failure.
    pub fn subscribe(&self, user: UserId, service: ServiceId) -> Result<Subscription, LedgerError> {
        self.stores
            .members
            .get(user)
            .ok_or(LedgerError::MemberNotFound(user))?;
        let service = self
            .stores
            .services
            .get(service)
            .ok_or(LedgerError::ServiceNotFound(service))?;

        let reference = self.next_reference()?;
        let mut subscription = self.stores.subscriptions.insert(user, service.id);
        subscription.reference_number = Some(reference);
        self.stores.subscriptions.update(&subscription);

        self.log(user, format!("Subscribed to {}", service.name));
        info!(user = %user, service = %service.name, subscription = %subscription.id, "subscribed");
        Ok(subscription)
    }

    /// Bills `days` of a subscription for a fixed `amount`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] for a non-positive amount,
    /// [`LedgerError::SubscriptionNotFound`] for an unknown subscription.
    pub fn create_invoice(
        &self,
        subscription: SubscriptionId,
        days: i64,
        amount: Decimal,
    ) -> Result<CustomInvoice, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let target = self
            .stores
            .subscriptions
            .get(subscription)
            .ok_or(LedgerError::SubscriptionNotFound(subscription))?;

        let reference = self.next_reference()?;
        let mut invoice =
            self.stores
                .invoices
                .insert(target.user, subscription, days, amount, self.clock.now());
        self.stores.invoices.set_reference(invoice.id, reference.clone());
        invoice.reference_number = Some(reference);

        self.log(
            target.user,
            format!("Invoice of {}€ for {} days created", amount, days),
        );
        Ok(invoice)
    }

    /// Accepts a membership application: every subscription of the member
    /// becomes overdue, then pending payments are applied.
    ///
    /// # Errors
    ///
    /// [`LedgerError::MemberNotFound`].
    pub fn accept_application(&self, user: UserId) -> Result<Reconciliation, LedgerError> {
        self.stores
            .members
            .get(user)
            .ok_or(LedgerError::MemberNotFound(user))?;
        self.log(user, "Accepted as member".to_owned());

        for mut subscription in self.stores.subscriptions.by_user(user) {
            let from = subscription.state;
            if from == SubscriptionState::Overdue {
                continue;
            }
            subscription.state = SubscriptionState::Overdue;
            self.stores.subscriptions.update(&subscription);
            let name = self
                .stores
                .services
                .get(subscription.service)
                .map_or_else(|| subscription.service.to_string(), |s| s.name);
            self.log(
                user,
                format!("Service {} state changed from {} to {}", name, from, subscription.state),
            );
            self.observer
                .subscription_state_changed(&subscription, from, subscription.state);
        }

        info!(user = %user, "application accepted");
        Ok(self.update_user(user))
    }

    /// Re-attributes every unused transaction, then reconciles all members.
    /// Returns how many transactions matched a reference.
    pub fn recalculate_payments(&self) -> usize {
        let matched = self
            .stores
            .transactions
            .unused()
            .iter()
            .filter(|transaction| self.new_transaction(transaction).is_some())
            .count();
        let result = self.update_all_users();
        info!(matched, payments = result.payments_applied, "payments recalculated");
        matched
    }

    /// Forgets a member's payment history so it can be rebuilt from the feed.
    ///
    /// Subscription and invoice payments go back to the unattributed pool.
    /// Transactions that paid a storage reservation are left consumed.
    ///
    /// # Errors
    ///
    /// [`LedgerError::MemberNotFound`].
    pub fn reset_member(&self, user: UserId) -> Result<(), LedgerError> {
        self.stores
            .members
            .get(user)
            .ok_or(LedgerError::MemberNotFound(user))?;

        self.stores.members.clear_history(user);
        for mut subscription in self.stores.subscriptions.by_user(user) {
            subscription.state = SubscriptionState::Overdue;
            subscription.paid_until = None;
            subscription.last_payment = None;
            self.stores.subscriptions.update(&subscription);
        }
        for transaction in self.stores.transactions.by_user(user) {
            // Storage payments stay recorded against their reservation.
            let paid_storage = transaction
                .reference_number
                .as_ref()
                .is_some_and(|r| !self.stores.reservations.by_reference(r).is_empty());
            if paid_storage {
                continue;
            }
            self.stores.transactions.release(transaction.id);
            self.stores.transactions.assign_user(transaction.id, None);
        }
        for invoice in self.stores.invoices.by_user(user) {
            self.stores.invoices.clear_payment(invoice.id);
        }

        self.log(user, "Payment history begins".to_owned());
        warn!(user = %user, "member payment history reset");
        Ok(())
    }

    /// # Errors
    ///
    /// [`LedgerError::SubscriptionNotFound`].
    pub fn set_disable_on_expiry(
        &self,
        subscription: SubscriptionId,
        disable: bool,
    ) -> Result<Subscription, LedgerError> {
        let mut target = self
            .stores
            .subscriptions
            .get(subscription)
            .ok_or(LedgerError::SubscriptionNotFound(subscription))?;
        target.disable_on_expiry = disable;
        self.stores.subscriptions.update(&target);
        Ok(target)
    }

    /// Active subscriptions whose warning day is today.
    pub fn find_expiring_subscriptions(&self) -> Vec<(Subscription, Service)> {
        let today = self.clock.today();
        self.stores
            .subscriptions
            .by_state(SubscriptionState::Active)
            .into_iter()
            .filter_map(|subscription| {
                let service = self.stores.services.get(subscription.service)?;
                let warn_at = add_days(today, service.days_before_warning?);
                (subscription.paid_until == Some(warn_at)).then_some((subscription, service))
            })
            .collect()
    }

    /// Sends an expiry warning for each subscription found by
    /// [`find_expiring_subscriptions`](Self::find_expiring_subscriptions).
    pub fn notify_expiring_subscriptions(&self) -> usize {
        let today = self.clock.today();
        let expiring = self.find_expiring_subscriptions();
        for (subscription, service) in &expiring {
            self.notifier.send(Notification {
                recipient: subscription.user,
                template: self.config.expiry_template.clone(),
                context: json!({
                    "service": service.name,
                    "paid_until": subscription.paid_until,
                    "days_left": subscription.days_left(today),
                    "reference_number": subscription.reference_number,
                    "cost": service.cost_string(),
                    "period": service.period_string(),
                }),
            });
            self.log(
                subscription.user,
                format!("Sent expiry warning for {}", service.name),
            );
        }
        if !expiring.is_empty() {
            info!(count = expiring.len(), "expiry warnings sent");
        }
        expiring.len()
    }
}
