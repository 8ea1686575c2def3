/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store numbers or bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Positive integer that uniquely names a participant for the lifetime of the protocol.
///
/// Identities start at 1. Identity 0 is never assigned, so that the value can be used as "no
/// identity" by callers that index dense tables with identities.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct ReplicaID(u32);

impl ReplicaID {
    /// Create a new `ReplicaID` with an `int` value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the `u32` value of this `ReplicaID`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for ReplicaID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ReplicaID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// View number. Starts at 0 and increases by 1 for every view that the consensus layer starts.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn init() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;
    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0 + rhs)
    }
}

/// The hash of a [block](crate::types::block::Block).
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Interpret the first eight bytes of the hash as a little-endian `u64`. Used to derive
    /// per-block randomness.
    pub fn prefix_u64(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[0..8]);
        u64::from_le_bytes(prefix)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One-way latency between two locations, in microseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Latency(u32);

impl Latency {
    pub const ZERO: Latency = Latency(0);

    pub const fn from_micros(micros: u32) -> Self {
        Self(micros)
    }

    pub const fn as_micros(&self) -> u32 {
        self.0
    }

    /// Latency in (fractional) milliseconds.
    pub fn as_millis_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl Add for Latency {
    type Output = Latency;
    fn add(self, rhs: Latency) -> Self::Output {
        Latency(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Latency {
    fn add_assign(&mut self, rhs: Latency) {
        self.0 = self.0.saturating_add(rhs.0)
    }
}

impl Sub for Latency {
    type Output = Latency;
    fn sub(self, rhs: Latency) -> Self::Output {
        Latency(self.0.saturating_sub(rhs.0))
    }
}

impl std::iter::Sum for Latency {
    fn sum<I: Iterator<Item = Latency>>(iter: I) -> Self {
        iter.fold(Latency::ZERO, Add::add)
    }
}

impl Display for Latency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}µs", self.0)
    }
}

impl Debug for Latency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Ed25519 signature represented in bytes.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({:02x?}..)", &self.0[0..4])
    }
}
