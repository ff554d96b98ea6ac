// Stable hashing for keys and identities
//
// std's DefaultHasher is not guaranteed to be stable across releases, and
// expiry alignment must agree between processes, so FNV-1a is used instead.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the UTF-8 bytes of `input`
pub fn stable_hash(input: &str) -> u64 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(stable_hash("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_distinct_inputs_differ() {
        assert_ne!(stable_hash("report.daily"), stable_hash("report.hourly"));
    }
}
