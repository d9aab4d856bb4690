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

//! Finnish creditor reference numbers.
//!
//! A reference is the base number followed by a single check digit. The
//! check digit is computed by weighting the base digits 7, 3, 1, 7, 3, 1, ...
//! from right to left and taking the distance from the sum to the next
//! multiple of ten.
//!
//! # Example
//!
//! ```
//! use membership_ledger_rs::reference;
//!
//! assert_eq!(reference::generate(123).unwrap(), 1232);
//! assert!(reference::is_valid(1232));
//! assert_eq!(reference::format(11111111110), "1 11111 11110");
//! ```

use crate::base::ReferenceNumber;
use crate::error::ReferenceError;
use crate::store::ReferenceSequence;

const WEIGHTS: [u64; 3] = [7, 3, 1];
const MIN_BASE: u64 = 100;

/// Returns only the check digit for `base`.
///
/// # Errors
///
/// [`ReferenceError::BaseTooShort`] if `base` has fewer than three digits.
pub fn checksum(base: u64) -> Result<u64, ReferenceError> {
    if base < MIN_BASE {
        return Err(ReferenceError::BaseTooShort);
    }

    let mut remaining = base;
    let mut sum = 0;
    let mut position = 0;
    while remaining > 0 {
        sum += (remaining % 10) * WEIGHTS[position % WEIGHTS.len()];
        remaining /= 10;
        position += 1;
    }

    Ok((10 - sum % 10) % 10)
}

/// Appends the check digit to `base`.
pub fn generate(base: u64) -> Result<u64, ReferenceError> {
    let check = checksum(base)?;
    base.checked_mul(10)
        .and_then(|shifted| shifted.checked_add(check))
        .ok_or(ReferenceError::BaseTooLong)
}

/// Splits a reference into its base and check digit.
pub fn split(reference: u64) -> (u64, u64) {
    (reference / 10, reference % 10)
}

/// Checks that the last digit of `reference` matches its base.
pub fn validate(reference: u64) -> Result<(), ReferenceError> {
    let (base, _) = split(reference);
    if generate(base)? != reference {
        return Err(ReferenceError::ChecksumMismatch);
    }
    Ok(())
}

pub fn is_valid(reference: u64) -> bool {
    validate(reference).is_ok()
}

/// Parses a textual reference, ignoring the grouping spaces banks print.
pub fn parse(raw: &str) -> Result<u64, ReferenceError> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReferenceError::NotNumeric);
    }
    digits.parse().map_err(|_| ReferenceError::BaseTooLong)
}

/// Groups the digits of `reference` in fives, counting from the right.
pub fn format(reference: u64) -> String {
    let digits = reference.to_string();
    let len = digits.len();
    let mut formatted = String::with_capacity(len + len / 5);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 5 == 0 {
            formatted.push(' ');
        }
        formatted.push(digit);
    }
    formatted
}

/// Draws the next number from `sequence`, offsets it by `base` and appends
/// the check digit.
///
/// Every entity type shares the sequence, so references never collide.
pub fn allocate(
    sequence: &dyn ReferenceSequence,
    base: u64,
) -> Result<ReferenceNumber, ReferenceError> {
    let reference = generate(base.saturating_add(sequence.next_reference_seq()))?;
    Ok(ReferenceNumber::from(reference))
}
