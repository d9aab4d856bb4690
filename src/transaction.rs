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

//! Incoming bank transactions.
//!
//! A transaction moves through two flags only:
//! - unassigned → assigned to a member (reference matched)
//! - unused → used (money applied to exactly one subscription, invoice or
//!   reservation)

use crate::base::{ReferenceNumber, TransactionId, UserId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A record from the bank feed, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub reference_number: Option<ReferenceNumber>,
    pub sender: Option<String>,
    /// Bank-assigned unique archive id, used to skip re-imported rows.
    pub archival_reference: Option<String>,
}

impl FeedRecord {
    pub fn new(date: NaiveDate, amount: Decimal, reference: Option<&str>) -> Self {
        Self {
            date,
            amount,
            reference_number: reference.and_then(ReferenceNumber::parse),
            sender: None,
            archival_reference: None,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_archival_reference(mut self, archival_reference: impl Into<String>) -> Self {
        self.archival_reference = Some(archival_reference.into());
        self
    }
}

/// Money received on the association's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub reference_number: Option<ReferenceNumber>,
    pub sender: Option<String>,
    pub archival_reference: Option<String>,
    pub has_been_used: bool,
    pub user: Option<UserId>,
    /// Free-form diagnostic note, e.g. why the amount was not accepted.
    pub comment: Option<String>,
}

impl BankTransaction {
    pub fn from_record(id: TransactionId, record: FeedRecord) -> Self {
        Self {
            id,
            date: record.date,
            amount: record.amount,
            reference_number: record.reference_number,
            sender: record.sender,
            archival_reference: record.archival_reference,
            has_been_used: false,
            user: None,
            comment: None,
        }
    }
}

impl fmt::Display for BankTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank transaction {} of {}€", self.id, self.amount)?;
        if let Some(sender) = &self.sender {
            write!(f, " from {sender}")?;
        }
        match &self.reference_number {
            Some(reference) => write!(f, ", reference {reference}")?,
            None => write!(f, ", no reference")?,
        }
        write!(f, " at {}", self.date)
    }
}
