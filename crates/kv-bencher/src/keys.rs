use crate::error::ConfigError;

/// Alphabet used for both keys and filler values.
pub const LETTERS: &[u8] =
    b"0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz";

/// Length of every generated key.
pub const KEY_LENGTH: usize = 16;

/// Number of trailing key bytes that encode the key index.
const INDEX_DIGITS: usize = 4;

/// Default number of keys in the universe.
pub const DEFAULT_KEY_COUNT: usize = 1000;

/// A fixed, ordered set of keys shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUniverse {
    keys: Vec<Vec<u8>>,
}

impl KeyUniverse {
    /// Largest universe the index encoding can keep unique.
    pub fn max_keys() -> usize {
        LETTERS.len().pow(INDEX_DIGITS as u32)
    }

    /// Generate `count` keys, validating the fixed-length invariant once up front.
    pub fn generate(count: usize) -> Result<Self, ConfigError> {
        let maximum = Self::max_keys();
        if count == 0 || count > maximum {
            return Err(ConfigError::InvalidKeyCount { count, maximum });
        }

        let keys = (0..count).map(key_for_index).collect::<Vec<_>>();
        for (index, key) in keys.iter().enumerate() {
            if key.len() != KEY_LENGTH {
                return Err(ConfigError::InvalidKeyLength {
                    index,
                    length: key.len(),
                    expected: KEY_LENGTH,
                });
            }
        }

        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key at `index`, wrapping around the universe.
    pub fn key(&self, index: usize) -> &[u8] {
        &self.keys[index % self.keys.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.iter().map(Vec::as_slice)
    }

    /// Reverse lookup, mainly useful when inspecting recorded traffic.
    pub fn index_of(&self, key: &[u8]) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }
}

/// Shared prefix taken from the alphabet, then the index in base `LETTERS.len()`.
fn key_for_index(index: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_LENGTH);
    key.extend((0..KEY_LENGTH - INDEX_DIGITS).map(|i| LETTERS[i % LETTERS.len()]));

    let base = LETTERS.len();
    let mut digits = [LETTERS[0]; INDEX_DIGITS];
    let mut rest = index;
    for digit in digits.iter_mut().rev() {
        *digit = LETTERS[rest % base];
        rest /= base;
    }
    key.extend_from_slice(&digits);
    key
}
