use crate::{error::ConfigError, keys::LETTERS};

/// Marker overlaid onto matching values, and sent as the pattern of a `ret`.
pub const MARKER: &[u8] = b"0123456789abcdef0123456789abcdef";

/// Smallest value length that can carry the marker.
pub const MIN_VALUE_LENGTH: usize = MARKER.len();

/// Which payload a write carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Filler,
    Matching,
}

/// Deterministic repeating pattern of `length` bytes.
pub fn filler_value(length: usize) -> Vec<u8> {
    (0..length).map(|i| LETTERS[i % LETTERS.len()]).collect()
}

/// Filler value with the marker overlaid at the front.
pub fn matching_value(length: usize) -> Result<Vec<u8>, ConfigError> {
    if length < MARKER.len() {
        return Err(ConfigError::ValueTooShort {
            length,
            minimum: MIN_VALUE_LENGTH,
        });
    }
    let mut value = filler_value(length);
    value[..MARKER.len()].copy_from_slice(MARKER);
    Ok(value)
}

/// Both payload variants for one configured length, built once per run.
#[derive(Debug, Clone)]
pub struct ValueFactory {
    filler: Vec<u8>,
    matching: Vec<u8>,
}

impl ValueFactory {
    pub fn new(length: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            matching: matching_value(length)?,
            filler: filler_value(length),
        })
    }

    pub fn value(&self, kind: ValueKind) -> &[u8] {
        match kind {
            ValueKind::Filler => &self.filler,
            ValueKind::Matching => &self.matching,
        }
    }

    pub fn pattern(&self) -> &[u8] {
        MARKER
    }

    pub fn len(&self) -> usize {
        self.filler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filler.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_is_idempotent() {
        assert_eq!(filler_value(32), filler_value(32));
        assert_eq!(filler_value(1000), filler_value(1000));
        assert_eq!(filler_value(100).len(), 100);
    }

    #[test]
    fn matching_differs_only_in_marker() {
        let filler = filler_value(128);
        let matching = matching_value(128).unwrap();
        assert_eq!(matching.len(), filler.len());
        assert_eq!(&matching[..MARKER.len()], MARKER);
        assert_eq!(&matching[MARKER.len()..], &filler[MARKER.len()..]);
    }

    #[test]
    fn too_short_for_marker() {
        assert_eq!(
            ValueFactory::new(31).unwrap_err(),
            ConfigError::ValueTooShort {
                length: 31,
                minimum: 32
            }
        );
        assert!(ValueFactory::new(32).is_ok());
    }

    #[test]
    fn factory_serves_both_variants() {
        let factory = ValueFactory::new(64).unwrap();
        assert_eq!(factory.value(ValueKind::Filler), filler_value(64).as_slice());
        assert_eq!(
            factory.value(ValueKind::Matching),
            matching_value(64).unwrap().as_slice()
        );
        assert_eq!(factory.pattern(), MARKER);
        assert_eq!(factory.len(), 64);
    }
}
