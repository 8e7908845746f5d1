use nanoid::nanoid;

/// Canonical alphabet for tagvault identifiers (no ambiguous glyphs).
const REGISTRY_ID_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y',
    'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
const REGISTRY_ID_LENGTH: usize = 16;

/// Generates a new identifier for a tagged field record or tag association.
pub fn generate_registry_id() -> String {
    nanoid!(REGISTRY_ID_LENGTH, REGISTRY_ID_ALPHABET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_has_expected_length_and_charset() {
        let id = generate_registry_id();
        assert_eq!(id.len(), REGISTRY_ID_LENGTH);
        assert!(id.chars().all(|c| REGISTRY_ID_ALPHABET.contains(&c)));
    }

    #[test]
    fn ids_do_not_repeat() {
        let a = generate_registry_id();
        let b = generate_registry_id();
        assert_ne!(a, b);
    }
}
