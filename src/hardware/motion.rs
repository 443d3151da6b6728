//! Motion acknowledgement handling shared by stage drivers.

use crate::core::Axis;
use crate::error::{AppResult, ScopeError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default time a controller gets to acknowledge a move.
pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Awaits a controller acknowledgement, bounded by `timeout`.
///
/// On expiry the pending move is dropped and `MotionTimeout` is returned; callers must
/// not update their notion of position in that case.
pub async fn await_acknowledgement<F, T>(axis: Axis, timeout: Duration, ack: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(timeout, ack).await {
        Ok(result) => result,
        Err(_) => {
            warn!(axis = %axis, ?timeout, "stage did not acknowledge move");
            Err(ScopeError::MotionTimeout { axis, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acknowledged_move_passes_result_through() {
        let result = await_acknowledgement(Axis::X, Duration::from_millis(50), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_acknowledgement_times_out() {
        let result = await_acknowledgement(Axis::Z, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(ScopeError::MotionTimeout { axis: Axis::Z, .. })
        ));
    }
}
