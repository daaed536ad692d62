//! Timeout enforcement.
//!
//! Every suspension point goes through [`deadline`], so a timed-out wait turns
//! into the caller's own error variant instead of a generic elapsed error.

use std::future::Future;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};

/// Await `future`, or fail with `on_timeout()` once `limit` passes.
pub async fn deadline<T, Fut, E>(limit: Duration, future: Fut, on_timeout: E) -> RelayResult<T>
where
    Fut: Future<Output = RelayResult<T>>,
    E: FnOnce() -> RelayError,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_results() {
        let value = deadline(Duration::from_secs(1), async { Ok(7) }, || RelayError::ReadTimeout(1000)).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test]
    async fn maps_elapsed_to_callers_error() {
        let result: RelayResult<()> = deadline(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            || RelayError::ReadTimeout(10),
        )
        .await;
        assert!(matches!(result, Err(RelayError::ReadTimeout(10))));
    }
}
