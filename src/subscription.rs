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

//! Service subscriptions and their payment state machine.
//!
//! ```text
//!  Suspended (absorbing, admin action only)
//!      ▲
//!      │ overdue > days_until_suspending
//!      │
//!  Overdue ◄──paid_until < today── Active
//!      │                             ▲
//!      └───paid_until > today────────┘
//! ```
//!
//! The rules are evaluated once each, in the order OVERDUE→ACTIVE,
//! ACTIVE→OVERDUE, OVERDUE→SUSPENDED, against the state left by the previous
//! rule.

use crate::base::{ReferenceNumber, ServiceId, SubscriptionId, TransactionId, UserId};
use crate::service::Service;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    /// Paid and in use.
    Active,
    /// `paid_until` has passed; paying reactivates.
    Overdue,
    /// Paused or not yet approved. Never left automatically.
    Suspended,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Overdue => "OVERDUE",
            Self::Suspended => "SUSPENDED",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SubscriptionState,
    pub to: SubscriptionState,
}

/// Result of one pass of the state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateCheck {
    pub transitions: Vec<StateTransition>,
    /// The subscription ran out while flagged `disable_on_expiry` and must
    /// be removed instead of going overdue.
    pub remove: bool,
}

/// A member's subscription to a [`Service`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user: UserId,
    pub service: ServiceId,
    pub state: SubscriptionState,
    /// `None` until the first payment.
    pub paid_until: Option<NaiveDate>,
    pub reference_number: Option<ReferenceNumber>,
    pub last_payment: Option<TransactionId>,
    /// Member asked for the subscription to end once paid time runs out.
    pub disable_on_expiry: bool,
}

impl Subscription {
    pub fn new(id: SubscriptionId, user: UserId, service: ServiceId) -> Self {
        Self {
            id,
            user,
            service,
            state: SubscriptionState::Suspended,
            paid_until: None,
            reference_number: None,
            last_payment: None,
            disable_on_expiry: false,
        }
    }

    /// Days of paid time left, negative once overdue. Zero if never paid.
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        self.paid_until
            .map(|paid_until| (paid_until - today).num_days())
            .unwrap_or(0)
    }

    /// Runs the automatic transitions for `today`, mutating `state`.
    pub fn check_state(&mut self, service: &Service, today: NaiveDate) -> StateCheck {
        let mut check = StateCheck::default();
        if self.state == SubscriptionState::Suspended {
            return check;
        }

        if self.state == SubscriptionState::Overdue
            && self.paid_until.is_some_and(|paid_until| paid_until > today)
        {
            self.transition(SubscriptionState::Active, &mut check);
        }

        if self.state == SubscriptionState::Active
            && self.paid_until.is_some_and(|paid_until| paid_until < today)
        {
            if self.disable_on_expiry {
                check.remove = true;
                return check;
            }
            self.transition(SubscriptionState::Overdue, &mut check);
        }

        if let (SubscriptionState::Overdue, Some(paid_until), Some(grace)) =
            (self.state, self.paid_until, service.days_until_suspending)
        {
            if (today - paid_until).num_days() > grace {
                self.transition(SubscriptionState::Suspended, &mut check);
            }
        }

        check
    }

    fn transition(&mut self, to: SubscriptionState, check: &mut StateCheck) {
        check.transitions.push(StateTransition {
            from: self.state,
            to,
        });
        self.state = to;
    }
}
