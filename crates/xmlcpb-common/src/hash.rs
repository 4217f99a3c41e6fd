//! Content hashing for the string and attribute-set tables.
//!
//! Both tables key their dedup index on a multiplier-33 rolling hash
//! (`h = h * 33 + byte`, seeded with 5381). It is cheap to compute for the
//! short tag, name and value strings that dominate save data, and only used
//! to skip byte comparisons against non-matching entries.

const SEED: u32 = 5381;

/// Hash a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    data.iter()
        .fold(SEED, |h, &b| h.wrapping_mul(33).wrapping_add(u32::from(b)))
}

/// Hash a run of 16-bit words, low byte first.
///
/// Produces the same value as [`hash_bytes`] over the little-endian encoding
/// of `words`.
#[inline]
pub fn hash_words(words: &[u16]) -> u32 {
    words.iter().fold(SEED, |h, &w| {
        let [lo, hi] = w.to_le_bytes();
        h.wrapping_mul(33)
            .wrapping_add(u32::from(lo))
            .wrapping_mul(33)
            .wrapping_add(u32::from(hi))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash_is_seed() {
        assert_eq!(hash_bytes(&[]), 5381);
    }

    #[test]
    fn test_known_hash() {
        // 5381 * 33 + 'a'
        assert_eq!(hash_bytes(b"a"), 177_670);
    }

    #[test]
    fn test_words_match_bytes() {
        let words = [0x1234u16, 0xBEEF, 0x0001];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(hash_words(&words), hash_bytes(&bytes));
    }

    #[test]
    fn test_case_sensitive() {
        assert_ne!(hash_bytes(b"Entity"), hash_bytes(b"entity"));
    }
}
