//! Bounded device calls.
//!
//! Every call the engine makes to a lock goes through [`with_timeout`], so a
//! silent lock surfaces as `DeviceError::Timeout` rather than a hung command.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DeviceError, Result};

/// Run a device operation, failing with `DeviceError::Timeout` after
/// `duration`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use slotwarden_device::timeout::with_timeout;
///
/// # #[tokio::main]
/// # async fn main() {
/// let value = with_timeout("read_slot", Duration::from_millis(50), async { Ok(7) })
///     .await
///     .unwrap();
/// assert_eq!(value, 7);
/// # }
/// ```
pub async fn with_timeout<T, F>(operation: &str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
            warn!("Device {} timed out after {}ms", operation, duration_ms);
            Err(DeviceError::timeout(operation, duration_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_times_out() {
        let result: Result<()> = with_timeout("write_slot", Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(DeviceError::timeout("write_slot", 100)));
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let result: Result<()> = with_timeout("clear_slot", Duration::from_secs(1), async {
            Err(DeviceError::rejected("busy"))
        })
        .await;

        assert_eq!(result, Err(DeviceError::rejected("busy")));
    }
}
