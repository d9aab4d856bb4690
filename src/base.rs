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

//! Core identifier types and payment reference numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a member of the association.
    UserId
);
id_type!(
    /// Unique identifier for a subscribable service.
    ServiceId
);
id_type!(
    /// Unique identifier for a member's subscription to a service.
    SubscriptionId
);
id_type!(
    /// Unique identifier for a custom invoice.
    InvoiceId
);
id_type!(
    /// Unique identifier for a received bank transaction.
    ///
    /// Assigned by the store in arrival order, so it doubles as the
    /// tie-break when two transactions share a date.
    TransactionId
);
id_type!(
    /// Unique identifier for a storage service (a group of units).
    StorageServiceId
);
id_type!(
    /// Unique identifier for a storage unit.
    UnitId
);
id_type!(
    /// Unique identifier for a storage reservation.
    ReservationId
);
id_type!(
    /// Unique identifier for a storage payment record.
    PaymentId
);

/// Payment reference attached to a bank transfer.
///
/// References on incoming transactions are supplied by the sender and are
/// not validated; matching is exact after trimming surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ReferenceNumber(String);

impl ReferenceNumber {
    /// Parses a raw reference. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ReferenceNumber {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
