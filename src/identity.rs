//! Content identities.
//!
//! Resources and message kinds are addressed by a 64-bit hash of their name.
//! The hash is FNV-1a, which is stable across builds and platforms,
//! so identities can be computed at compile time and persisted.

use std::fmt;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A 64-bit identity hashed from a resource path or a message name.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(u64);

impl Identity {
    /// Hashes `name` verbatim.
    ///
    /// Use [`Identity::of_path`] for resource paths,
    /// which must be canonicalized before hashing.
    pub const fn of(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Hashes the canonical form of a resource path.
    pub fn of_path(path: &str) -> Self { Self::of(&canonical_path(path)) }

    /// Wraps a raw hash value.
    pub const fn from_raw(raw: u64) -> Self { Self(raw) }

    /// Returns the raw hash value.
    pub const fn raw(self) -> u64 { self.0 }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "Identity({:016x})", self.0) }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{:016x}", self.0) }
}

/// Converts a resource path to the form used for hashing and fetching.
///
/// Backslashes become forward slashes, repeated separators collapse,
/// and the result always starts with exactly one `/`.
/// `..` segments are kept as they are;
/// [`DirFetch`](crate::resource::DirFetch) refuses to read them.
pub fn canonical_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.trim().split(['/', '\\']).filter(|segment| !segment.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
