//! Deterministic, cross-language partition hashing (spec §4.2.1).
//!
//! Partition selection must be identical on the producer side (event log
//! append) and the consumer side (worker ownership), and must be
//! reproducible from any language, so it is defined purely over the
//! hexadecimal digits of the affinity key's string form rather than over a
//! language-specific hash trait.

use crate::ids::PartitionId;

/// `Σ digit · 16^(len−1−i) mod p`, computed via Horner's method so it never
/// needs `checked_pow`/overflow handling for long keys. Non-hex characters
/// in `key` are ignored entirely (not merely skipped-but-counted).
pub fn hash_hex_mod(key: &str, p: u32) -> u32 {
    assert!(p > 0, "partition count must be positive");

    let mut acc: u64 = 0;
    let modulus = p as u64;

    for c in key.chars() {
        if let Some(digit) = c.to_digit(16) {
            acc = (acc * 16 + digit as u64) % modulus;
        }
    }

    acc as u32
}

/// Convenience wrapper returning a validated [`PartitionId`].
pub fn partition_for_key(key: &str, p: u32) -> PartitionId {
    PartitionId::new_unchecked(hash_hex_mod(key, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_key() {
        assert_eq!(hash_hex_mod("deadbeef", 16), hash_hex_mod("deadbeef", 16));
    }

    #[test]
    fn ignores_non_hex_characters() {
        // "-" and "g" etc. are stripped; only hex digits contribute.
        assert_eq!(hash_hex_mod("de-ad-be-ef", 16), hash_hex_mod("deadbeef", 16));
        assert_eq!(hash_hex_mod("user:123", 1000), hash_hex_mod("123", 1000));
    }

    #[test]
    fn matches_naive_power_sum_definition() {
        // Cross-check the Horner optimization against the literal formula
        // from the spec for a handful of short keys.
        for key in ["a1", "ff00", "123abc", "0"] {
            let p = 97u32;
            let naive = naive_hash(key, p);
            assert_eq!(hash_hex_mod(key, p), naive);
        }
    }

    fn naive_hash(key: &str, p: u32) -> u32 {
        let digits: Vec<u64> = key.chars().filter_map(|c| c.to_digit(16)).map(u64::from).collect();
        let len = digits.len();
        let mut sum: u64 = 0;
        for (i, d) in digits.iter().enumerate() {
            sum += d * 16u64.pow((len - 1 - i) as u32);
        }
        (sum % p as u64) as u32
    }

    #[test]
    fn result_always_in_range() {
        for key in ["", "zzz", "deadbeefcafebabe1234567890"] {
            let partition = hash_hex_mod(key, 7);
            assert!(partition < 7);
        }
    }

    proptest::proptest! {
        #[test]
        fn proptest_result_always_in_range(key in "[a-fA-F0-9:_-]{0,64}", p in 1u32..1024) {
            let partition = hash_hex_mod(&key, p);
            proptest::prop_assert!(partition < p);
        }

        #[test]
        fn proptest_deterministic(key in "[a-fA-F0-9:_-]{0,64}", p in 1u32..1024) {
            proptest::prop_assert_eq!(hash_hex_mod(&key, p), hash_hex_mod(&key, p));
        }
    }
}
