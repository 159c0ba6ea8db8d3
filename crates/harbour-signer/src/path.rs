//! Storage path derivation
//!
//! Objects are laid out in a two-level shard tree keyed by the first four
//! characters of their oid, so no single directory grows without bound:
//!
//! ```text
//! deadbeef…  →  /de/ad/deadbeef…
//! ```

use crate::{Result, SignerError};

/// Minimum oid length that can be sharded
pub const MIN_OID_LEN: usize = 4;

/// Check that an oid is a lowercase hex content hash long enough to shard
pub fn is_valid_oid(oid: &str) -> bool {
    oid.len() >= MIN_OID_LEN && oid.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Derive the sharded storage path for an oid: `/{oid[0:2]}/{oid[2:4]}/{oid}`
pub fn oid_path(oid: &str) -> Result<String> {
    if !is_valid_oid(oid) {
        return Err(SignerError::InvalidOid(oid.to_string()));
    }

    Ok(format!("/{}/{}/{}", &oid[0..2], &oid[2..4], oid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_oid_path() {
        assert_eq!(oid_path("abcd1234").unwrap(), "/ab/cd/abcd1234");
        assert_eq!(oid_path("deadbeef").unwrap(), "/de/ad/deadbeef");
    }

    #[test]
    fn test_oid_path_is_three_segments_ending_in_oid() {
        let oid = "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";
        let path = oid_path(oid).unwrap();

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2], oid);
        assert_eq!(path, oid_path(oid).unwrap());
    }

    #[test]
    fn test_minimum_length_oid() {
        assert_eq!(oid_path("abcd").unwrap(), "/ab/cd/abcd");
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("ABCD1234")]
    #[case("ab/d1234")]
    #[case("zzzz")]
    #[case("éé12")]
    fn test_rejects_unshardable_oids(#[case] oid: &str) {
        assert!(!is_valid_oid(oid));
        assert_eq!(oid_path(oid), Err(SignerError::InvalidOid(oid.to_string())));
    }
}
