//! Invite-code formatting and validation, shared between the relay (which
//! generates codes) and the peer (which validates user input before deciding
//! whether to treat it as a code or a raw overlay address).

use rand::Rng;

/// Alphabet excludes `O`, `0`, `I`, `1` so codes read back unambiguously.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a random `XXXX-XXXX` code from the unambiguous alphabet.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.gen_range(0..ALPHABET.len());
        code.push(ALPHABET[idx] as char);
    }
    code
}

/// True if `s` has the `XXXX-XXXX` shape (case-insensitive, alphanumeric).
/// Accepted broadly on lookup even though generation restricts to the
/// unambiguous subset, so a code typed by hand from an older or differently
/// generated source still validates structurally.
pub fn is_well_formed(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 9
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_alphanumeric())
}

/// Normalize a user-supplied code to the canonical uppercase form.
pub fn normalize(s: &str) -> String {
    s.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..100 {
            let code = generate();
            assert!(is_well_formed(&code), "{code} is not well-formed");
        }
    }

    #[test]
    fn generated_codes_avoid_ambiguous_characters() {
        for _ in 0..200 {
            let code = generate();
            for c in ['O', '0', 'I', '1'] {
                assert!(!code.contains(c), "{code} contains ambiguous char {c}");
            }
        }
    }

    #[test]
    fn well_formed_accepts_lowercase() {
        assert!(is_well_formed("abcd-wxyz"));
    }

    #[test]
    fn well_formed_rejects_bad_shapes() {
        assert!(!is_well_formed("ABCDWXYZ"));
        assert!(!is_well_formed("ABC-WXYZ"));
        assert!(!is_well_formed("ABCD-WXY"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("/ip4/127.0.0.1/tcp/4001"));
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize(" abcd-wxyz \n"), "ABCD-WXYZ");
    }
}
