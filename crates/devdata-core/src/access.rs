//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Access permissions granted to device data elements."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A single capability an element may grant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    /// Value can be read.
    Read,
    /// Value can be written.
    Write,
    /// Value changes can be observed.
    Observe,
}

impl Access {
    /// Bit representing this capability inside an [`AccessMask`].
    pub const fn mask(self) -> AccessMask {
        match self {
            Access::Read => AccessMask::READ,
            Access::Write => AccessMask::WRITE,
            Access::Observe => AccessMask::OBSERVE,
        }
    }
}

/// Bitwise combination of [`Access`] capabilities, fixed when an element is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMask(u8);

impl AccessMask {
    /// No access at all.
    pub const NONE: AccessMask = AccessMask(0x00);
    /// Read access.
    pub const READ: AccessMask = AccessMask(0x01);
    /// Write access.
    pub const WRITE: AccessMask = AccessMask(0x02);
    /// Observe access.
    pub const OBSERVE: AccessMask = AccessMask(0x04);

    const KNOWN: u8 = 0x07;

    /// Build a mask from raw bits; unknown bits are dropped.
    pub const fn from_bits(bits: u8) -> Self {
        AccessMask(bits & Self::KNOWN)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: AccessMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mask grants `access`.
    pub const fn grants(self, access: Access) -> bool {
        self.contains(access.mask())
    }

    /// Whether no capability is granted.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AccessMask {
    type Output = AccessMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        AccessMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<Access> for AccessMask {
    fn from(access: Access) -> Self {
        access.mask()
    }
}

impl FromIterator<Access> for AccessMask {
    fn from_iter<I: IntoIterator<Item = Access>>(iter: I) -> Self {
        iter.into_iter()
            .fold(AccessMask::NONE, |mask, access| mask | access.mask())
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let granted: Vec<String> = Access::iter()
            .filter(|access| self.grants(*access))
            .map(|access| access.to_string())
            .collect();
        f.write_str(&granted.join("|"))
    }
}
