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

//! Error types for reconciliation and reservation handling.
//!
//! Insufficient payments are not errors: they are recorded as comments on
//! the transaction. Only invalid arguments and missing records surface here.

use crate::base::{ReservationId, ServiceId, SubscriptionId, UnitId, UserId};
use thiserror::Error;

/// Reference number generation and validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// Base must have at least three digits
    #[error("reference base must be at least three digits long")]
    BaseTooShort,

    /// Base does not fit into a reference number
    #[error("reference base is too long")]
    BaseTooLong,

    /// Reference contains something other than ASCII digits
    #[error("reference number must consist of digits only")]
    NotNumeric,

    /// Check digit does not match the base
    #[error("reference number checksum does not match")]
    ChecksumMismatch,
}

/// Ledger and reservation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Month count must be at least one
    #[error("invalid month count {0} (must be at least one)")]
    InvalidMonths(i64),

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Archival reference was already imported
    #[error("duplicate transaction")]
    DuplicateTransaction,

    #[error("member {0} not found")]
    MemberNotFound(UserId),

    #[error("service {0} not found")]
    ServiceNotFound(ServiceId),

    #[error("subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    #[error("storage unit {0} not found")]
    UnitNotFound(UnitId),

    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// Unit is disabled by an administrator
    #[error("storage unit {0} is disabled")]
    UnitDisabled(UnitId),

    /// Unit already has a pending or active reservation
    #[error("storage unit {0} is already reserved")]
    UnitReserved(UnitId),

    /// `pays_also_service` edges loop back on themselves
    #[error("service {0} is part of a payment cycle")]
    CascadeCycle(ServiceId),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}
