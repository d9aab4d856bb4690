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

//! Storage units and their reservations.
//!
//! ```text
//!  Pending ──first payment──► Active ──end_date passed──► Completed
//!     │
//!     └──pending_until passed──► Expired
//! ```
//!
//! Expired and Completed are terminal. Paid time is always counted in whole
//! months from `start_date`, so `end_date == start_date + total_paid_months`
//! once anything has been paid.

use crate::base::{PaymentId, ReferenceNumber, ReservationId, StorageServiceId, UnitId, UserId};
use crate::error::LedgerError;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A group of storage units sharing reservation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageService {
    pub id: StorageServiceId,
    pub name: String,
    /// Days a new reservation may stay unpaid before it expires.
    pub pending_payment_days: i64,
}

/// A single rentable shelf, locker or pallet spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUnit {
    pub id: UnitId,
    pub service: StorageServiceId,
    pub name: String,
    pub is_disabled: bool,
    pub price_per_month: Decimal,
    pub max_rental_months: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Disabled,
    Reserved,
    Available,
}

impl StorageUnit {
    pub fn calculate_price(&self, months: u32) -> Decimal {
        self.price_per_month * Decimal::from(months)
    }

    /// Whole months covered by `amount`. Fractions are dropped.
    pub fn months_paid_by(&self, amount: Decimal) -> u32 {
        if self.price_per_month <= Decimal::ZERO {
            return 0;
        }
        (amount / self.price_per_month).floor().to_u32().unwrap_or(0)
    }

    /// Availability given the unit's current pending or active reservation.
    pub fn status(&self, current: Option<&StorageReservation>) -> UnitStatus {
        if self.is_disabled {
            UnitStatus::Disabled
        } else if current.is_some() {
            UnitStatus::Reserved
        } else {
            UnitStatus::Available
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Active,
    Expired,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Completed => "COMPLETED",
        }
    }

    /// Pending and active reservations hold the unit and accept payments.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageReservation {
    pub id: ReservationId,
    pub user: UserId,
    pub unit: UnitId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ReservationStatus,
    pub total_paid_months: u32,
    /// Unit cap at creation time, kept in case the unit is edited later.
    pub max_duration_months: Option<u32>,
    pub reference_number: Option<ReferenceNumber>,
    /// Deadline for the first payment.
    pub pending_until: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StorageReservation {
    /// Month cap for this reservation: its own copy, else the unit's.
    pub fn month_limit(&self, unit: &StorageUnit) -> Option<u32> {
        match self.max_duration_months {
            Some(months) if months > 0 => Some(months),
            _ => unit.max_rental_months,
        }
    }

    fn credit_months(&mut self, months: u32, unit: &StorageUnit) -> u32 {
        let months_to_add = match self.month_limit(unit) {
            Some(limit) => months.min(limit.saturating_sub(self.total_paid_months)),
            None => months,
        };
        self.total_paid_months += months_to_add;
        self.end_date = add_months(self.start_date, self.total_paid_months);
        months_to_add
    }

    /// Activates the reservation and credits up to `months` paid months.
    ///
    /// Returns the months actually credited, which is less than `months`
    /// when the cap is reached.
    pub fn mark_as_paid(&mut self, months: u32, unit: &StorageUnit, now: DateTime<Utc>) -> u32 {
        self.status = ReservationStatus::Active;
        self.paid_at = Some(now);
        self.credit_months(months, unit)
    }

    /// Adds months without touching status or `paid_at`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidMonths`] if `months` is below one.
    pub fn extend(&mut self, months: i64, unit: &StorageUnit) -> Result<u32, LedgerError> {
        if months < 1 {
            return Err(LedgerError::InvalidMonths(months));
        }
        let months = u32::try_from(months).unwrap_or(u32::MAX);
        Ok(self.credit_months(months, unit))
    }

    /// PENDING → EXPIRED once `today` is past `pending_until`.
    pub fn expire_if_unpaid(&mut self, today: NaiveDate) -> bool {
        if self.status == ReservationStatus::Pending
            && self.pending_until.is_some_and(|deadline| today > deadline)
        {
            self.status = ReservationStatus::Expired;
            return true;
        }
        false
    }

    /// ACTIVE → COMPLETED once `end_date` is strictly in the past.
    pub fn complete(&mut self, today: NaiveDate) -> bool {
        if self.status == ReservationStatus::Active && self.end_date < today {
            self.status = ReservationStatus::Completed;
            return true;
        }
        false
    }

    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.status == ReservationStatus::Active && self.start_date <= today && today <= self.end_date
    }

    /// Months implied by the dates, with any partial month counted as whole.
    pub fn reserved_months(&self) -> u32 {
        let (months, partial) = months_between(self.start_date, self.end_date);
        months + u32::from(partial)
    }

    pub fn total_price(&self, unit: &StorageUnit) -> Decimal {
        let months = if self.total_paid_months > 0 {
            self.total_paid_months
        } else {
            self.reserved_months()
        };
        unit.calculate_price(months)
    }

    /// How many more months the unit cap allows. `None` if the unit has no cap.
    pub fn months_left(&self, unit: &StorageUnit) -> Option<u32> {
        let max_total = unit.max_rental_months.filter(|m| *m > 0)?;
        let paid = self.total_paid_months;
        let pending = self.reserved_months().saturating_sub(paid);
        Some(max_total.saturating_sub(paid + pending))
    }
}

impl fmt::Display for StorageReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {} reserved by {} ({})", self.unit, self.user, self.status)
    }
}

/// Append-only record of money accepted for a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePayment {
    pub id: PaymentId,
    pub reservation: ReservationId,
    pub reference_number: Option<ReferenceNumber>,
    pub amount: Decimal,
    /// Months actually credited, after the cap.
    pub months: u32,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<NaiveDate>,
}

/// `date + months` calendar months, clamped to the end of shorter months.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Whole calendar months from `start` to `end`, and whether days remain.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> (u32, bool) {
    if end <= start {
        return (0, false);
    }
    let span = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    let mut months = u32::try_from(span.max(0)).unwrap_or(u32::MAX);
    if add_months(start, months) > end {
        months -= 1;
    }
    (months, add_months(start, months) < end)
}
