//! Deterministic masternode scoring.
//!
//! Every node must rank masternodes identically for a given chain state, so
//! scores are plain 256-bit arithmetic over Blake2b hashes. Ranks compare
//! the compact (nBits-style) encoding of the score, which throws away all
//! but the top 23 bits; ties are broken by the full score, then outpoint.

use std::cmp::Ordering;
use std::fmt;

use mx_types::{ChainOracle, Hash256, Outpoint, Timestamp};

/// Unsigned 256-bit integer, little-endian limbs.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct U256([u64; 4]);

impl U256 {
    pub const ZERO: Self = Self([0; 4]);

    /// Interpret 32 bytes as a little-endian integer.
    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *limb = u64::from_le_bytes(word);
        }
        Self(limbs)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&limb.to_le_bytes());
        }
        out
    }

    pub fn from_hash(hash: &Hash256) -> Self {
        Self::from_le_bytes(hash.as_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    pub fn wrapping_add(self, other: Self) -> Self {
        let mut out = [0u64; 4];
        let mut carry = false;
        for (i, limb) in out.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *limb = sum;
            carry = c1 || c2;
        }
        Self(out)
    }

    pub fn wrapping_sub(self, other: Self) -> Self {
        let mut out = [0u64; 4];
        let mut borrow = false;
        for (i, limb) in out.iter_mut().enumerate() {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            *limb = diff;
            borrow = b1 || b2;
        }
        Self(out)
    }

    pub fn abs_diff(self, other: Self) -> Self {
        if self > other {
            self.wrapping_sub(other)
        } else {
            other.wrapping_sub(self)
        }
    }

    /// Position of the highest set bit plus one; 0 for zero.
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return i as u32 * 64 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    pub fn shr(self, shift: u32) -> Self {
        if shift >= 256 {
            return Self::ZERO;
        }
        let limb_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        let mut out = [0u64; 4];
        for i in 0..4 - limb_shift {
            let mut v = self.0[i + limb_shift] >> bit_shift;
            if bit_shift > 0 && i + limb_shift + 1 < 4 {
                v |= self.0[i + limb_shift + 1] << (64 - bit_shift);
            }
            out[i] = v;
        }
        Self(out)
    }

    /// Compact encoding: one size byte followed by a 23-bit mantissa.
    pub fn compact(&self) -> u32 {
        let mut size = (self.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            (self.low_u64() << (8 * (3 - size))) as u32
        } else {
            self.shr(8 * (size - 3)).low_u64() as u32
        };
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact | (size << 24)
    }
}

impl From<u64> for U256 {
    fn from(v: u64) -> Self {
        Self([v, 0, 0, 0])
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({:016x}{:016x}{:016x}{:016x})", self.0[3], self.0[2], self.0[1], self.0[0])
    }
}

/// Block hash used to score masternodes for `height`.
///
/// `0` means the tip. Any other height resolves to the hash of block
/// `height - 1`; heights beyond `tip + 1`, a chain that is only a genesis
/// block, and lookups that would land on genesis all fail.
pub fn anchor_hash(chain: &dyn ChainOracle, height: u64) -> Option<Hash256> {
    let tip = chain.tip()?;
    let height = if height == 0 { tip.height } else { height };
    if tip.height == 0 || height > tip.height + 1 {
        return None;
    }
    let target = height.checked_sub(1).filter(|h| *h > 0)?;
    chain.block_hash(target)
}

/// Distance between `H(anchor)` and `H(anchor || txid + index)`.
pub fn calculate_score(chain: &dyn ChainOracle, outpoint: &Outpoint, height: u64) -> Option<U256> {
    let anchor = anchor_hash(chain, height)?;
    Some(score_for_anchor(&anchor, outpoint))
}

pub fn score_for_anchor(anchor: &Hash256, outpoint: &Outpoint) -> U256 {
    let aux = U256::from_hash(&outpoint.txid).wrapping_add(U256::from(outpoint.index as u64));
    let h2 = U256::from_le_bytes(&mx_crypto::blake2b_256(anchor.as_bytes()));
    let h3 = U256::from_le_bytes(&mx_crypto::blake2b_256_multi(&[
        anchor.as_bytes(),
        &aux.to_le_bytes(),
    ]));
    h3.abs_diff(h2)
}

/// Per-entry pseudo-random value used to break payment-order ties.
pub fn tie_break(outpoint: &Outpoint, sig_time: Timestamp) -> u32 {
    let hash = mx_crypto::blake2b_256_multi(&[&outpoint.to_bytes(), &sig_time.as_secs().to_le_bytes()]);
    U256::from_le_bytes(&hash).compact()
}

/// Rank ordering: best first.
pub(crate) fn rank_order(a: &(U256, Outpoint), b: &(U256, Outpoint)) -> Ordering {
    b.0.compact()
        .cmp(&a.0.compact())
        .then_with(|| b.0.cmp(&a.0))
        .then_with(|| a.1.cmp(&b.1))
}
