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

//! Core identifier types for accounts and machines.

use crate::error::AtmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validated account number.
///
/// Wraps the canonical 10-digit form. Construction only goes through
/// [`AccountNumber::parse`], so a value of this type is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String")]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Returns `true` iff `s` is exactly 10 ASCII digits.
    pub fn is_valid(s: &str) -> bool {
        s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit())
    }

    /// Parses and validates an account number.
    ///
    /// # Errors
    ///
    /// Returns [`AtmError::InvalidAccountNumber`] unless the input is
    /// exactly 10 ASCII digits.
    pub fn parse(s: &str) -> Result<Self, AtmError> {
        if Self::is_valid(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(AtmError::InvalidAccountNumber(s.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = AtmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = AtmError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

/// Numeric label for a physical machine.
///
/// Wraps a `u32`. Machines carry no state beyond this label; all mutable
/// state lives in the accounts and the shared pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AtmId(pub u32);

impl fmt::Display for AtmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
