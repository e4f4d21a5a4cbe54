use async_trait::async_trait;
use pendel_core::ride::{Ride, RideStatus};
use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Best-effort side channel invoked after a status transition commits.
/// Failures are logged and swallowed by the caller; a notification must
/// never roll back a committed capacity or status change.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn ride_status_changed(
        &self,
        ride: &Ride,
        previous: RideStatus,
    ) -> Result<(), NotifyError>;
}

/// Default observer: logs instead of delivering. SMS/push backends replace
/// this behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn ride_status_changed(
        &self,
        ride: &Ride,
        previous: RideStatus,
    ) -> Result<(), NotifyError> {
        info!(
            ride_id = %ride.id,
            user_id = %ride.user_id,
            from = previous.as_str(),
            to = ride.status.as_str(),
            "ride status changed"
        );
        Ok(())
    }
}
