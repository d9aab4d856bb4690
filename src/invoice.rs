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

//! One-off invoices paying a fixed number of days of a subscription.

use crate::base::{InvoiceId, ReferenceNumber, SubscriptionId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInvoice {
    pub id: InvoiceId,
    pub user: UserId,
    pub subscription: SubscriptionId,
    /// Days added to the subscription's `paid_until` once paid.
    pub days: i64,
    /// Minimum amount that satisfies the invoice.
    pub amount: Decimal,
    pub reference_number: Option<ReferenceNumber>,
    pub created: DateTime<Utc>,
    /// Set exactly once, by the transaction that paid the invoice.
    pub payment_transaction: Option<TransactionId>,
}

impl CustomInvoice {
    pub fn is_paid(&self) -> bool {
        self.payment_transaction.is_some()
    }

    pub fn is_paid_by(&self, amount: Decimal) -> bool {
        amount >= self.amount
    }
}
