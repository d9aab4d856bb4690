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

//! Subscribable services such as yearly membership or 24/7 access rights.

use crate::base::ServiceId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A paid service members can subscribe to.
///
/// `pays_also_service` links a more expensive service to a cheaper one, so
/// paying for the former also extends the latter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub cost: Decimal,
    /// Smallest accepted payment. `cost` is used when unset.
    pub cost_min: Option<Decimal>,
    /// Informational upper bound shown to members.
    pub cost_max: Option<Decimal>,
    pub days_per_payment: i64,
    pub days_bonus_for_first: i64,
    pub days_before_warning: Option<i64>,
    pub days_until_suspending: Option<i64>,
    pub pays_also_service: Option<ServiceId>,
}

impl Service {
    pub fn new(id: ServiceId, name: impl Into<String>, cost: Decimal, days_per_payment: i64) -> Self {
        Self {
            id,
            name: name.into(),
            cost,
            cost_min: None,
            cost_max: None,
            days_per_payment,
            days_bonus_for_first: 0,
            days_before_warning: None,
            days_until_suspending: None,
            pays_also_service: None,
        }
    }

    /// Minimum amount a single transaction must carry to pay this service.
    pub fn payment_minimum(&self) -> Decimal {
        match self.cost_min {
            Some(min) if !min.is_zero() => min,
            _ => self.cost,
        }
    }

    pub fn is_paid_by(&self, amount: Decimal) -> bool {
        amount >= self.payment_minimum()
    }

    /// Human readable cost, e.g. `"30€ (15€ - 60€)"`.
    pub fn cost_string(&self) -> String {
        let min = self.cost_min.filter(|m| !m.is_zero());
        let max = self.cost_max.filter(|m| !m.is_zero());
        match (min, max) {
            (Some(min), Some(max)) => format!("{}€ ({}€ - {}€)", self.cost, min, max),
            (Some(min), None) => format!("{}€ ({}€ min)", self.cost, min),
            (None, Some(max)) => format!("{}€ ({}€ max)", self.cost, max),
            (None, None) => format!("{}€", self.cost),
        }
    }

    /// Human readable payment period.
    pub fn period_string(&self) -> String {
        match self.days_per_payment {
            31 => "month".to_owned(),
            365 => "year".to_owned(),
            days => format!("{days} days"),
        }
    }
}
