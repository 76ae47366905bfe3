use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// SHA-256 digest of a file's bytes, as 64 lowercase hex characters.
///
/// The identity key for deduplication: two files are the same file exactly
/// when their hashes are equal.
///
/// ```
/// use shelf_catalog::Hash;
/// let hash = Hash::of(b"");
/// assert_eq!(hash.as_str(), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
/// assert!("not-a-hash".parse::<Hash>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash(String);

impl Hash {
    /// Length of the hex representation.
    pub const LEN: usize = 64;

    /// Digest `bytes`.
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(Sha256::digest(bytes.as_ref())))
    }

    /// Whether `s` would be accepted by [`FromStr`], without allocating.
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl FromStr for Hash {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if !Self::is_valid(s) {
            exn::bail!(ErrorKind::InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}
impl TryFrom<String> for Hash {
    type Error = ErrorKind;
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match Self::is_valid(&s) {
            true => Ok(Self(s.to_ascii_lowercase())),
            false => Err(ErrorKind::InvalidHash(s)),
        }
    }
}
impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}
impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
