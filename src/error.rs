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

//! Error types for contract violations.
//!
//! Expected operational outcomes (no free processor slot, insufficient
//! funds, non-positive amount) are reported as boolean results, never as
//! errors. The variants here mark programming-contract violations only.

use thiserror::Error;

/// Contract-violation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtmError {
    /// Account number is not exactly 10 ASCII digits
    #[error("account number '{0}' is not exactly 10 digits")]
    InvalidAccountNumber(String),

    /// Attempted to set a balance below zero
    #[error("balance cannot be negative")]
    NegativeBalance,
}

#[cfg(test)]
mod tests {
    use super::AtmError;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            AtmError::InvalidAccountNumber("12345".to_owned()).to_string(),
            "account number '12345' is not exactly 10 digits"
        );
        assert_eq!(
            AtmError::NegativeBalance.to_string(),
            "balance cannot be negative"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = AtmError::NegativeBalance;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
