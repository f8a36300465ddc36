//! Optional-deadline sleeping for `tokio::select!` loops

use tokio::time::Instant;

/// Sleep until `deadline`, or forever when there is none
///
/// Re-creating this future with a new deadline is how a pending timer is
/// replaced; nothing polls.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
