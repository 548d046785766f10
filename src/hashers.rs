//! Built-in (hash, equal) pairs.
//!
//! Any pair can be passed straight to `ChainMap::new`; the functions coerce
//! to `HashFn<K>` / `EqualFn<K>` for the key type they are instantiated with.

/// Identity hash for integer-as-pointer keys.
///
/// The key is offset by one so that key `0` (a null pointer in disguise)
/// still hashes to something other than zero.
pub fn direct_hash(key: &usize) -> u32 {
    (*key as u32).wrapping_add(1)
}

/// Identity equality for integer-as-pointer keys.
pub fn direct_equal(a: &usize, b: &usize) -> bool {
    a == b
}

/// Address hash for raw pointer keys; the pointee is never read.
pub fn ptr_hash<T>(key: &*const T) -> u32 {
    direct_hash(&(*key as usize))
}

/// Pointer identity: two keys are equal only if they share an address.
pub fn ptr_equal<T>(a: &*const T, b: &*const T) -> bool {
    core::ptr::eq(*a, *b)
}

/// DJB2 hash over the key's bytes.
///
/// Bytes are sign-extended before mixing, so keys outside ASCII hash the
/// same way a `signed char` walk over the string would.
pub fn str_hash<S: AsRef<str>>(key: &S) -> u32 {
    key.as_ref().bytes().fold(5381u32, |hash, b| {
        (hash << 5)
            .wrapping_add(hash)
            .wrapping_add(b as i8 as u32)
    })
}

/// Byte-wise content equality for string keys.
pub fn str_equal<S: AsRef<str>>(a: &S, b: &S) -> bool {
    a.as_ref().as_bytes() == b.as_ref().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn direct_hash_never_maps_zero_to_zero() {
        assert_eq!(direct_hash(&0), 1);
        assert_eq!(direct_hash(&41), 42);
        assert!(direct_equal(&7, &7));
        assert!(!direct_equal(&7, &8));
    }

    #[test]
    fn pointer_pair_uses_identity() {
        let a = 1u8;
        let b = 1u8;
        let pa: *const u8 = &a;
        let pb: *const u8 = &b;
        assert!(ptr_equal(&pa, &pa));
        assert!(!ptr_equal(&pa, &pb));
        assert_eq!(ptr_hash(&core::ptr::null::<u8>()), 1);
    }

    #[test]
    fn str_hash_matches_djb2() {
        assert_eq!(str_hash(&""), 5381);
        // 5381 * 33 + 'a'
        assert_eq!(str_hash(&"a"), 177_670);
        assert_eq!(str_hash(&"ab"), 177_670u32.wrapping_mul(33).wrapping_add(98));
        assert_eq!(str_hash(&String::from("charlie")), str_hash(&"charlie"));
    }

    #[test]
    fn str_hash_sign_extends_high_bytes() {
        // 'é' is 0xC3 0xA9; both bytes are negative as signed chars.
        let expected = [0xC3u8, 0xA9]
            .iter()
            .fold(5381u32, |h, &b| h.wrapping_mul(33).wrapping_add(b as i8 as i32 as u32));
        assert_eq!(str_hash(&"é"), expected);
    }

    #[test]
    fn str_equal_compares_content() {
        let a = String::from("bob");
        let b = String::from("bob");
        assert!(str_equal(&a, &b));
        assert!(!str_equal(&a, &String::from("bobby")));
    }
}
