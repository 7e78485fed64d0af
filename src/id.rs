use rand::Rng;

/// Length of a generated short id unless configured otherwise.
pub const DEFAULT_ID_LENGTH: usize = 8;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces candidate short ids. Candidates are not guaranteed unique; the
/// registry checks them against the store and asks again on collision.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniformly random base-62 ids. Eight characters give 62^8 (~2^47)
/// combinations.
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    len: usize,
}

impl RandomIdGenerator {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        random_code(self.len)
    }
}

/// Generate a random alphanumeric string of the given length.
fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
