//! The map and reduce functions plugged into the engine

/// Word Count application
pub mod wc {
    use anyhow::{anyhow, Result};

    use crate::mr::worker::KeyValue;

    /// Every occurrence of a word contributes one
    pub fn map(word: &String) -> Result<KeyValue<String, u64>> {
        Ok(KeyValue::new(word.clone(), 1))
    }

    /// Sums the per-occurrence contributions of one word
    pub fn reduce(key: &String, values: &[u64]) -> Result<u64> {
        values.iter().try_fold(0u64, |total, &v| {
            total
                .checked_add(v)
                .ok_or_else(|| anyhow!("count for `{}` overflowed", key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::wc;

    #[test]
    fn test_wc_map_emits_one() {
        let kv = wc::map(&"cat".to_string()).unwrap();
        assert_eq!(kv.into_parts(), ("cat".to_string(), 1));
    }

    #[test]
    fn test_wc_reduce_sums() {
        assert_eq!(wc::reduce(&"cat".to_string(), &[1, 1, 1]).unwrap(), 3);
        assert_eq!(wc::reduce(&"cat".to_string(), &[]).unwrap(), 0);
    }

    #[test]
    fn test_wc_reduce_overflow_is_an_error() {
        let err = wc::reduce(&"cat".to_string(), &[u64::MAX, 1]).unwrap_err();
        assert!(err.to_string().contains("overflowed"));
    }
}
