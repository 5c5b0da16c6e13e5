use core::ops::{BitOr, BitOrAssign};

/// Bit-flag configuration applied when spawning a debuggee.
///
/// Bits not covered by a named constant are reserved and must be zero;
/// [`SpawnFlags::from_bits`] rejects them so that a binding layer
/// passing a raw integer cannot smuggle in unknown options.
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpawnFlags(u32);

impl SpawnFlags {
    /// Disable address-space-layout randomization for the child.
    pub const DISABLE_ASLR: Self = Self(1);

    const KNOWN: u32 = Self::DISABLE_ASLR.0;

    /// Returns the empty flag set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Validates a raw bit field, rejecting reserved bits.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::KNOWN != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Returns the raw bit field.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns whether all flags of `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SpawnFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SpawnFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
