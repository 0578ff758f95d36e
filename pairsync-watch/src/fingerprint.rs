//! Masked fingerprints and their comparison.

use pairsync_core::types::{RawFingerprint, CUSTOMIZATION_LEN, EQUIPMENT_LEN};

/// Bit set in the visor/weapon byte while a weapon is being drawn or sheathed.
pub const WEAPON_DRAWING_BIT: u8 = 0b0000_0100;

/// Bits of the visor/weapon byte that describe a persistent visual state.
pub const VISOR_WEAPON_MASK: u8 = !WEAPON_DRAWING_BIT;

/// Fingerprint with transient bits removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    equipment: [u8; EQUIPMENT_LEN],
    customization: [u8; CUSTOMIZATION_LEN],
    headwear: Option<u8>,
    visor_weapon: Option<u8>,
}

impl From<RawFingerprint> for Fingerprint {
    fn from(raw: RawFingerprint) -> Self {
        Self {
            equipment: raw.equipment,
            customization: raw.customization,
            headwear: raw.headwear,
            visor_weapon: raw.visor_weapon.map(|byte| byte & VISOR_WEAPON_MASK),
        }
    }
}

/// Which parts of a fingerprint differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FingerprintDiff {
    /// Any equipment or customization byte.
    pub body: bool,
    pub headwear: bool,
    pub visor_weapon: bool,
}

impl FingerprintDiff {
    pub fn is_empty(&self) -> bool {
        !self.body && !self.headwear && !self.visor_weapon
    }
}

impl Fingerprint {
    pub fn diff(&self, newer: &Fingerprint) -> FingerprintDiff {
        FingerprintDiff {
            body: self.equipment != newer.equipment || self.customization != newer.customization,
            headwear: self.headwear != newer.headwear,
            visor_weapon: self.visor_weapon != newer.visor_weapon,
        }
    }

    /// Whether a change from `self` to `newer` is worth a resync.
    ///
    /// A toggle of only the headwear or visor/weapon sub-field is not, as long
    /// as the sub-field had a value before.
    pub fn is_significant_change(&self, newer: &Fingerprint) -> bool {
        let diff = self.diff(newer);
        if diff.body {
            return true;
        }
        (diff.headwear && self.headwear.is_none())
            || (diff.visor_weapon && self.visor_weapon.is_none())
    }
}
