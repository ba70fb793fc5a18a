use rand::seq::SliceRandom;
use rand::Rng;

pub const GENERATED_PASSWORD_LEN: usize = 24;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
// Shell- and JSON-safe subset of what Azure accepts.
const SYMBOLS: &[u8] = b"!@#%^*-_=+.";

/// Admin password meeting Azure complexity rules (upper, lower, digit, symbol).
///
/// Pure: the caller owns the value and threads it into exactly one instance result.
pub fn generate_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();

    let mut out: Vec<u8> = classes
        .iter()
        .map(|set| set[rng.gen_range(0..set.len())])
        .collect();
    while out.len() < GENERATED_PASSWORD_LEN {
        out.push(all[rng.gen_range(0..all.len())]);
    }
    out.shuffle(rng);
    out.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn password_has_every_class() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let pw = generate_password(&mut rng);
            assert_eq!(pw.len(), GENERATED_PASSWORD_LEN);
            assert!(pw.bytes().any(|c| UPPER.contains(&c)));
            assert!(pw.bytes().any(|c| LOWER.contains(&c)));
            assert!(pw.bytes().any(|c| DIGITS.contains(&c)));
            assert!(pw.bytes().any(|c| SYMBOLS.contains(&c)));
        }
    }

    #[test]
    fn passwords_differ() {
        let mut rng = rand::thread_rng();
        assert_ne!(generate_password(&mut rng), generate_password(&mut rng));
    }
}
