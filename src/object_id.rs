//! Dense, partition-prefixed object identifiers.
//!
//! An [`ObjectId`] is a 96-bit-of-payload identifier: a 32-bit partition id
//! followed by a 128-bit UUID. Its string form is a fixed 45-character,
//! lowercase-hex, dash-delimited layout — `PPPPPPPP-UUUUUUUU-UUUU-UUUU-UUUU-UUUUUUUUUUUU` —
//! so that every id round-trips through a fixed-width representation.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DASH_POSITIONS: [usize; 5] = [8, 17, 22, 27, 32];
const STRING_LEN: usize = 45;

/// A 96-bit identifier: a 32-bit partition id plus a 128-bit UUID.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
pub struct ObjectId {
    partition_id: u32,
    uuid: Uuid,
}

impl ObjectId {
    /// Generate a fresh, random `ObjectId` within `partition_id`.
    pub fn generate(partition_id: u32) -> Self {
        Self { partition_id, uuid: Uuid::new_v4() }
    }

    /// Construct an `ObjectId` from its parts.
    pub fn new(partition_id: u32, uuid: Uuid) -> Self {
        Self { partition_id, uuid }
    }

    /// The well-known zero id, used as the namespace root.
    pub fn nil(partition_id: u32) -> Self {
        Self { partition_id, uuid: Uuid::nil() }
    }

    /// The partition this id belongs to.
    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    /// The UUID component of this id.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Parse an `ObjectId` from its 45-character string form.
    ///
    /// Validates, in order: total length, dash positions, and that every
    /// remaining character is a lowercase hex digit.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        if s.len() != STRING_LEN {
            return None;
        }
        let bytes = s.as_bytes();
        for &pos in &DASH_POSITIONS {
            if bytes[pos] != b'-' {
                return None;
            }
        }
        for (i, b) in bytes.iter().enumerate() {
            if DASH_POSITIONS.contains(&i) {
                continue;
            }
            if !b.is_ascii_hexdigit() || b.is_ascii_uppercase() {
                return None;
            }
        }
        let partition_id = u32::from_str_radix(&s[0..8], 16).ok()?;
        let uuid_str = format!("{}-{}-{}-{}-{}", &s[9..17], &s[18..22], &s[23..27], &s[28..32], &s[33..45]);
        let uuid = Uuid::parse_str(&uuid_str).ok()?;
        Some(Self { partition_id, uuid })
    }

    /// Parse an `ObjectId`, panicking on malformed input.
    ///
    /// Use only where the caller has already validated `s` (e.g. it was
    /// produced by [`ObjectId::to_string`] and round-tripped through a
    /// store key).
    pub fn from_str_or_die(s: &str) -> Self {
        Self::from_str_opt(s).unwrap_or_else(|| panic!("invalid ObjectId string: {s}"))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = self.uuid.as_bytes();
        write!(
            f,
            "{:08x}-{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.partition_id,
            u[0], u[1], u[2], u[3],
            u[4], u[5],
            u[6], u[7],
            u[8], u[9],
            u[10], u[11], u[12], u[13], u[14], u[15],
        )
    }
}

impl FromStr for ObjectId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_opt(s).ok_or_else(|| crate::error::Error::invalid_argument(format!("malformed ObjectId: {s}")))
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.partition_id == other.partition_id && self.uuid == other.uuid
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partition_id.cmp(&other.partition_id).then_with(|| self.uuid.cmp(&other.uuid))
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // partition_id and uuid are hashed independently, then combined,
        // so the combination stays cheap.
        let mut ph = std::collections::hash_map::DefaultHasher::new();
        self.partition_id.hash(&mut ph);
        let mut uh = std::collections::hash_map::DefaultHasher::new();
        self.uuid.hash(&mut uh);
        (ph.finish() ^ uh.finish()).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string_form() {
        for pid in 0..8u32 {
            let id = ObjectId::generate(pid);
            let s = id.to_string();
            assert_eq!(s.len(), STRING_LEN);
            assert_eq!(ObjectId::from_str_opt(&s), Some(id));
        }
    }

    #[test]
    fn parses_documented_example() {
        let id = ObjectId::from_str_opt("00000000-73404092-a3c7-471c-8364-10e96c1dada1").unwrap();
        assert_eq!(id.partition_id(), 0);
        assert_eq!(id.uuid().to_string(), "73404092-a3c7-471c-8364-10e96c1dada1");
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(ObjectId::from_str_opt("00000000-73404092-a3c7-471c-8364-10e96c1dada"), None);
        assert_eq!(ObjectId::from_str_opt(""), None);
    }

    #[test]
    fn rejects_bad_dash_positions() {
        let mut s = ObjectId::generate(1).to_string();
        // shift the first dash by one character.
        unsafe {
            let bytes = s.as_bytes_mut();
            bytes.swap(7, 8);
        }
        assert_eq!(ObjectId::from_str_opt(&s), None);
    }

    #[test]
    fn rejects_uppercase_hex() {
        let s = ObjectId::generate(1).to_string().to_uppercase();
        assert_eq!(ObjectId::from_str_opt(&s), None);
    }

    #[test]
    fn orders_by_partition_then_uuid() {
        let a = ObjectId::new(1, Uuid::nil());
        let b = ObjectId::new(2, Uuid::nil());
        assert!(a < b);
        let c = ObjectId::new(1, Uuid::from_u128(1));
        assert!(a < c);
    }

    #[test]
    fn from_str_or_die_panics_on_garbage() {
        let result = std::panic::catch_unwind(|| ObjectId::from_str_or_die("not-an-id"));
        assert!(result.is_err());
    }
}
