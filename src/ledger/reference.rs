use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use crate::error::LedgerError;

pub const MAX_REFERENCE_ATTEMPTS: usize = 100;

const REFERENCE_PREFIX: &str = "TXN";
const SUFFIX_LEN: usize = 6;
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Issues `TXN-<year>-<6 alphanumerics>` references.
pub struct ReferenceGenerator {
    max_attempts: usize,
    counter: AtomicU64,
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(MAX_REFERENCE_ATTEMPTS)
    }
}

impl ReferenceGenerator {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            counter: AtomicU64::new(0),
        }
    }

    pub fn candidate<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> String {
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        format!("{REFERENCE_PREFIX}-{}-{suffix}", now.year())
    }

    /// Timestamp plus a process-wide counter. Used once random candidates run out.
    pub fn fallback(&self, now: DateTime<Utc>) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        format!(
            "{REFERENCE_PREFIX}-{}-{}{:04}",
            now.year(),
            now.timestamp_millis(),
            counter % 10_000
        )
    }

    /// Draws random candidates until `taken` reports a free one, then falls
    /// back to [`ReferenceGenerator::fallback`]. Only a failing lookup errors.
    pub async fn generate<F, Fut>(&self, mut taken: F) -> Result<String, LedgerError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, LedgerError>>,
    {
        for attempt in 1..=self.max_attempts {
            // the rng is not Send, keep it out of the await
            let reference = Self::candidate(&mut rand::thread_rng(), Utc::now());
            if !taken(reference.clone()).await? {
                return Ok(reference);
            }
            tracing::debug!("Reference {reference} taken on attempt {attempt}");
        }

        let reference = self.fallback(Utc::now());
        tracing::warn!(
            "No free random reference after {} attempts, using {reference}",
            self.max_attempts
        );
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn assert_shape(reference: &str, year: i32) {
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3, "{reference}");
        assert_eq!(parts[0], "TXN");
        assert_eq!(parts[1], year.to_string());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn candidate_has_expected_shape() {
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            assert_shape(&ReferenceGenerator::candidate(&mut rng, now), now.year());
        }
    }

    #[tokio::test]
    async fn free_candidate_is_returned_first_try() {
        let generator = ReferenceGenerator::default();
        let calls = AtomicUsize::new(0);
        let reference = generator
            .generate(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, LedgerError>(false) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_shape(&reference, Utc::now().year());
    }

    #[tokio::test]
    async fn exhausted_attempts_fall_back_to_timestamp() {
        let generator = ReferenceGenerator::new(5);
        let calls = AtomicUsize::new(0);
        let first = generator
            .generate(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, LedgerError>(true) }
            })
            .await
            .unwrap();
        let second = generator.generate(|_| async { Ok::<_, LedgerError>(true) }).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(first.starts_with(&format!("TXN-{}-", Utc::now().year())));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn lookup_failure_propagates() {
        let generator = ReferenceGenerator::default();
        let err = generator
            .generate(|_| async { Err::<bool, _>(LedgerError::Storage(sqlx::Error::PoolTimedOut)) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn skips_taken_references() {
        let generator = ReferenceGenerator::default();
        let mut seen = HashSet::new();
        for _ in 0..20 {
            let snapshot = seen.clone();
            let reference = generator
                .generate(move |candidate| {
                    let taken = snapshot.contains(&candidate);
                    async move { Ok::<_, LedgerError>(taken) }
                })
                .await
                .unwrap();
            assert!(seen.insert(reference));
        }
    }
}
