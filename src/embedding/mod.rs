//! Embedding provider contract and retry plumbing.
//!
//! Providers convert text batches to fixed-dimension vectors. The
//! orchestrator never talks to a concrete provider directly: it goes
//! through [`RetryingProvider`], which owns backoff for transient
//! failures and hard truncation for oversize inputs.

mod local;

pub use local::FastEmbedProvider;

use crate::error::{EmbeddingError, EmbeddingResult};
use std::time::Duration;
use tracing::{debug, warn};

/// Rough chars-per-token ratio used when converting a provider's token
/// limit into the character budget the splitter works in.
pub const CHARS_PER_TOKEN: usize = 4;

/// Converts text batches to fixed-dimension vectors.
///
/// Implementations must be thread-safe and preserve input order in
/// their output.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Native output dimension. Zero means "unknown until configured".
    fn dimension(&self) -> usize;

    /// Largest single input the provider accepts, in tokens.
    fn max_input_tokens(&self) -> usize;

    /// Short provider name for logs and error messages.
    fn provider_name(&self) -> &str;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<P> {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn max_input_tokens(&self) -> usize {
        (**self).max_input_tokens()
    }

    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }
}

/// Retry and truncation wrapper around any provider.
///
/// - Transient failures retry with exponential backoff, up to
///   `max_attempts`.
/// - Oversize inputs are hard-truncated at the provider's character
///   budget and resubmitted once; a second oversize failure is
///   permanent.
/// - Permanent failures propagate immediately.
pub struct RetryingProvider<P> {
    inner: P,
    max_attempts: usize,
    base_delay: Duration,
}

impl<P: EmbeddingProvider> RetryingProvider<P> {
    pub fn new(inner: P, max_attempts: usize) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
        }
    }

    /// Override the initial backoff delay. Mainly for tests.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn embed_with_retry(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.inner.embed_batch(texts) {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay * 2u32.pow(attempt as u32);
                    warn!(
                        provider = self.inner.provider_name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient embedding failure, backing off"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for RetryingProvider<P> {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        match self.embed_with_retry(texts) {
            Err(EmbeddingError::Oversize { .. }) => {
                let budget = self.inner.max_input_tokens() * CHARS_PER_TOKEN;
                debug!(
                    provider = self.inner.provider_name(),
                    budget, "truncating oversize inputs and resubmitting once"
                );
                let truncated: Vec<String> = texts
                    .iter()
                    .map(|t| truncate_to_char_budget(t, budget).to_string())
                    .collect();
                let refs: Vec<&str> = truncated.iter().map(String::as_str).collect();
                self.embed_with_retry(&refs)
            }
            other => other,
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn max_input_tokens(&self) -> usize {
        self.inner.max_input_tokens()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

/// Truncate to at most `budget` bytes, snapping back to a char
/// boundary so the result is always valid UTF-8.
#[must_use]
pub fn truncate_to_char_budget(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that fails transiently a configurable number of times.
    struct FlakyProvider {
        failures: AtomicUsize,
        oversize_once: bool,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn failing(n: usize) -> Self {
            Self {
                failures: AtomicUsize::new(n),
                oversize_once: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn oversize() -> Self {
            Self {
                failures: AtomicUsize::new(0),
                oversize_once: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl EmbeddingProvider for FlakyProvider {
        fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.oversize_once && call == 0 {
                return Err(EmbeddingError::Oversize {
                    actual: 9999,
                    limit: self.max_input_tokens(),
                });
            }
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EmbeddingError::Transient {
                    provider: "flaky".into(),
                    reason: "rate limited".into(),
                });
            }
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn max_input_tokens(&self) -> usize {
            8
        }

        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let provider = RetryingProvider::new(FlakyProvider::failing(2), 3)
            .with_base_delay(Duration::from_millis(1));
        let result = provider.embed_batch(&["hello"]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 4);
    }

    #[test]
    fn test_retry_budget_is_bounded() {
        let provider = RetryingProvider::new(FlakyProvider::failing(10), 3)
            .with_base_delay(Duration::from_millis(1));
        let err = provider.embed_batch(&["hello"]).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_oversize_truncates_and_resubmits_once() {
        let provider = RetryingProvider::new(FlakyProvider::oversize(), 3)
            .with_base_delay(Duration::from_millis(1));
        let long = "x".repeat(1000);
        let result = provider.embed_batch(&[&long]).unwrap();
        assert_eq!(result.len(), 1);
        // One oversize call plus one resubmission.
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let truncated = truncate_to_char_budget(text, 3);
        assert!(truncated.len() <= 3);
        assert!(text.starts_with(truncated));

        assert_eq!(truncate_to_char_budget("short", 100), "short");
    }
}
