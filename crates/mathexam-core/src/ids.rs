//! Question identifiers and dedup signatures.

use rand::Rng;

const ID_PREFIX: &str = "q_";
const ID_LENGTH: usize = 8;
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a fresh opaque question id: `q_` followed by 8 lowercase
/// alphanumeric characters.
pub fn make_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut id = String::with_capacity(ID_PREFIX.len() + ID_LENGTH);
    id.push_str(ID_PREFIX);
    for _ in 0..ID_LENGTH {
        let idx = rng.gen_range(0..ID_ALPHABET.len());
        id.push(ID_ALPHABET[idx] as char);
    }
    id
}

/// Repeat-avoidance key for a question: `text|id`.
pub fn signature(question: &str, id: &str) -> String {
    format!("{question}|{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn id_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = make_id(&mut rng);
        assert_eq!(id.len(), 10);
        assert!(id.starts_with("q_"));
        assert!(id[2..]
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn ids_do_not_collide_in_practice() {
        let mut rng = StdRng::seed_from_u64(42);
        let ids: HashSet<String> = (0..10_000).map(|_| make_id(&mut rng)).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn signature_joins_text_and_id() {
        assert_eq!(signature("What is 2 + 2?", "q_abc"), "What is 2 + 2?|q_abc");
    }
}
