use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{RestError, RestResult};

/// Sleep for `duration`, returning early with a cancellation error if the
/// abort signal fires first.
pub async fn delay(duration: Duration, abort_signal: Option<&CancellationToken>) -> RestResult<()> {
    match abort_signal {
        Some(token) if token.is_cancelled() => Err(RestError::cancelled("The delay was aborted.")),
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(RestError::cancelled("The delay was aborted.")),
                _ = tokio::time::sleep(duration) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

/// Random integer in `[min, max]`, inclusive on both ends.
pub(crate) fn random_inclusive(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    fastrand::u64(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn completes_without_signal() {
        let start = tokio::time::Instant::now();
        delay(Duration::from_secs(2), None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_when_signalled() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = delay(Duration::from_secs(60), Some(&token)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn already_cancelled_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(delay(Duration::from_secs(60), Some(&token)).await.is_err());
    }

    #[test]
    fn random_stays_in_range() {
        for _ in 0..100 {
            let value = random_inclusive(10, 20);
            assert!((10..=20).contains(&value));
        }
        assert_eq!(random_inclusive(5, 5), 5);
    }
}
