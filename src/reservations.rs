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

//! Storage reservation payments and daily sweeps.

use crate::base::{PaymentId, ReservationId, UnitId, UserId};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::reference;
use crate::reservation::{
    ReservationStatus, StoragePayment, StorageReservation, StorageUnit, UnitStatus,
};
use crate::store::{NewReservation, Stores};
use crate::transaction::BankTransaction;
use chrono::{NaiveDate, TimeDelta};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of matching a transaction to a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOutcome {
    /// Transaction consumed. `months` may be zero if the cap was already
    /// reached.
    Paid {
        reservation: ReservationId,
        payment: PaymentId,
        months: u32,
    },
    /// Amount does not cover one month. Transaction left unused.
    Insufficient { reservation: ReservationId },
}

/// Counts from one run of the daily sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub completed: usize,
}

pub struct ReservationEngine {
    stores: Stores,
    clock: Arc<dyn Clock>,
    reference_base: u64,
}

impl ReservationEngine {
    pub fn new(stores: Stores, clock: Arc<dyn Clock>, config: &LedgerConfig) -> Self {
        Self {
            stores,
            clock,
            reference_base: config.reference_base,
        }
    }

    fn log(&self, user: UserId, message: String) {
        self.stores.members.log(user, self.clock.now(), message);
    }

    fn unit(&self, id: UnitId) -> Result<StorageUnit, LedgerError> {
        self.stores.units.get(id).ok_or(LedgerError::UnitNotFound(id))
    }

    /// The pending or active reservation holding `unit`, if any.
    pub fn current_reservation(&self, unit: UnitId) -> Option<StorageReservation> {
        self.stores
            .reservations
            .by_unit(unit)
            .into_iter()
            .filter(|r| r.status.is_open())
            .last()
    }

    /// # Errors
    ///
    /// [`LedgerError::UnitNotFound`].
    pub fn unit_status(&self, unit: UnitId) -> Result<UnitStatus, LedgerError> {
        let unit = self.unit(unit)?;
        Ok(unit.status(self.current_reservation(unit.id).as_ref()))
    }

    /// Reserves `unit` for `user` starting at `start_date`.
    ///
    /// The reservation is pending until paid, and expires once the storage
    /// service's `pending_payment_days` have passed without payment.
    ///
    /// # Errors
    ///
    /// Unknown member or unit, a disabled unit, or a unit that already has a
    /// pending or active reservation.
    pub fn create_reservation(
        &self,
        user: UserId,
        unit: UnitId,
        start_date: NaiveDate,
    ) -> Result<StorageReservation, LedgerError> {
        self.stores
            .members
            .get(user)
            .ok_or(LedgerError::MemberNotFound(user))?;
        let unit = self.unit(unit)?;
        match unit.status(self.current_reservation(unit.id).as_ref()) {
            UnitStatus::Disabled => return Err(LedgerError::UnitDisabled(unit.id)),
            UnitStatus::Reserved => return Err(LedgerError::UnitReserved(unit.id)),
            UnitStatus::Available => {}
        }

        let today = self.clock.today();
        let pending_until = match self.stores.units.storage_service(unit.service) {
            Some(service) => TimeDelta::try_days(service.pending_payment_days)
                .and_then(|delta| today.checked_add_signed(delta)),
            None => {
                warn!(unit = %unit.id, "unit has no storage service, reservation never expires");
                None
            }
        };

        let reference = reference::allocate(self.stores.references.as_ref(), self.reference_base)?;
        let reservation = self.stores.reservations.insert(NewReservation {
            user,
            unit: unit.id,
            start_date,
            max_duration_months: unit.max_rental_months,
            reference_number: Some(reference),
            pending_until,
            created_at: self.clock.now(),
        });

        info!(reservation = %reservation.id, unit = %unit.name, user = %user, "reservation created");
        self.log(
            user,
            format!("Reserved storage unit {} from {}", unit.name, start_date),
        );
        Ok(reservation)
    }

    /// Applies a bank transaction to the open reservation carrying its
    /// reference.
    ///
    /// Returns `None` if no pending or active reservation matches or the
    /// transaction was already used.
    pub fn apply_transaction(&self, transaction: &BankTransaction) -> Option<StorageOutcome> {
        let reference = transaction.reference_number.as_ref()?;
        let open: Vec<StorageReservation> = self
            .stores
            .reservations
            .by_reference(reference)
            .into_iter()
            .filter(|r| r.status.is_open())
            .collect();
        let reservation = open.last()?;
        if open.len() > 1 {
            warn!(
                reference = %reference,
                count = open.len(),
                "reference number shared by several reservations, using the newest"
            );
        }
        if transaction.has_been_used {
            return None;
        }

        let unit = match self.unit(reservation.unit) {
            Ok(unit) => unit,
            Err(err) => {
                warn!(reservation = %reservation.id, %err, "reservation points at a missing unit");
                return None;
            }
        };

        let months = unit.months_paid_by(transaction.amount);
        if months == 0 {
            debug!(transaction = %transaction.id, reservation = %reservation.id, "amount below one month");
            self.stores.transactions.assign_user(transaction.id, Some(reservation.user));
            self.stores.transactions.annotate(
                transaction.id,
                &format!(
                    "Amount {}€ does not cover one month of {} ({}€)",
                    transaction.amount, unit.name, unit.price_per_month
                ),
            );
            return Some(StorageOutcome::Insufficient {
                reservation: reservation.id,
            });
        }

        if !self.stores.transactions.claim(transaction.id, reservation.user) {
            debug!(transaction = %transaction.id, "transaction already used");
            return None;
        }

        let now = self.clock.now();
        let mut credited = None;
        let updated = self.stores.reservations.modify(reservation.id, &mut |row: &mut StorageReservation| {
            // A sweep may have closed the reservation since it was looked up.
            if row.status.is_open() {
                credited = Some(row.mark_as_paid(months, &unit, now));
            }
        });
        let (Some(updated), Some(credited)) = (updated, credited) else {
            self.stores.transactions.release(transaction.id);
            return None;
        };

        if credited < months {
            warn!(
                reservation = %updated.id,
                paid = months,
                credited,
                "payment exceeds the rental cap, extra months not credited"
            );
        }
        let payment = self.stores.payments.record(
            &updated,
            transaction.amount,
            credited,
            transaction.date,
            now,
        );

        info!(reservation = %updated.id, months = credited, end_date = %updated.end_date, "storage payment applied");
        self.log(
            updated.user,
            format!(
                "Paid {} months of storage unit {}, reserved until {}",
                credited, unit.name, updated.end_date
            ),
        );
        Some(StorageOutcome::Paid {
            reservation: updated.id,
            payment: payment.id,
            months: credited,
        })
    }

    /// Adds months to a reservation without changing its status.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidMonths`] below one month,
    /// [`LedgerError::ReservationNotFound`] or [`LedgerError::UnitNotFound`].
    pub fn extend_reservation(
        &self,
        id: ReservationId,
        months: i64,
    ) -> Result<StorageReservation, LedgerError> {
        let reservation = self
            .stores
            .reservations
            .get(id)
            .ok_or(LedgerError::ReservationNotFound(id))?;
        let unit = self.unit(reservation.unit)?;

        let mut result = Ok(0);
        let updated = self
            .stores
            .reservations
            .modify(id, &mut |row: &mut StorageReservation| result = row.extend(months, &unit))
            .ok_or(LedgerError::ReservationNotFound(id))?;
        let credited = result?;

        info!(reservation = %id, months = credited, "reservation extended");
        self.log(
            updated.user,
            format!(
                "Storage unit {} extended by {} months, reserved until {}",
                unit.name, credited, updated.end_date
            ),
        );
        Ok(updated)
    }

    pub fn payments(&self, reservation: ReservationId) -> Vec<StoragePayment> {
        self.stores.payments.for_reservation(reservation)
    }

    /// PENDING reservations whose payment deadline has passed become EXPIRED.
    pub fn expire_pending_reservations(&self) -> usize {
        let today = self.clock.today();
        self.sweep(ReservationStatus::Pending, "expired unpaid", |row| {
            row.expire_if_unpaid(today)
        })
    }

    /// ACTIVE reservations whose paid time has run out become COMPLETED.
    pub fn complete_finished_reservations(&self) -> usize {
        let today = self.clock.today();
        self.sweep(ReservationStatus::Active, "completed", |row| row.complete(today))
    }

    fn sweep(
        &self,
        status: ReservationStatus,
        what: &str,
        transition: impl Fn(&mut StorageReservation) -> bool,
    ) -> usize {
        let mut count = 0;
        for reservation in self.stores.reservations.by_status(status) {
            let mut changed = false;
            let updated = self
                .stores
                .reservations
                .modify(reservation.id, &mut |row: &mut StorageReservation| changed = transition(row));
            if let (true, Some(updated)) = (changed, updated) {
                count += 1;
                debug!(reservation = %updated.id, status = %updated.status, "reservation {}", what);
                self.log(
                    updated.user,
                    format!("Storage reservation {} {}", updated.id, what),
                );
            }
        }
        count
    }

    /// Expires stale pending reservations, then completes finished ones.
    pub fn run_daily_sweep(&self) -> SweepReport {
        let report = SweepReport {
            expired: self.expire_pending_reservations(),
            completed: self.complete_finished_reservations(),
        };
        info!(expired = report.expired, completed = report.completed, "reservation sweep done");
        report
    }
}
