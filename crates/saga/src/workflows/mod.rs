//! Reference workflows built on the orchestrator.
//!
//! Both workflows follow the same shape: a critical local mutation, a
//! critical remote counter update, and a best-effort notification. The
//! context keys each step reads and writes are listed as constants in the
//! workflow module.

pub mod publish_article;
pub mod publish_comment;

use crate::context::SagaContext;
use crate::error::{ServiceError, StepError};

pub use publish_article::PUBLISH_ARTICLE;
pub use publish_comment::PUBLISH_COMMENT;

/// Set to `true` once a notification was delivered, `false` otherwise.
pub const NOTIFICATION_SENT: &str = "notification_sent";
/// Set to `true` when the notification was skipped on purpose.
pub const NOTIFICATION_SKIPPED: &str = "notification_skipped";
/// Reason the notification could not be delivered.
pub const NOTIFICATION_ERROR: &str = "notification_error";

/// Records the outcome of a notification attempt in the context and turns
/// a delivery failure into a step error.
pub(crate) fn record_notification(
    ctx: &mut SagaContext,
    step: &str,
    outcome: Result<(), ServiceError>,
) -> Result<(), StepError> {
    ctx.insert(NOTIFICATION_SKIPPED, false);
    match outcome {
        Ok(()) => {
            ctx.insert(NOTIFICATION_SENT, true);
            Ok(())
        }
        Err(e) => {
            let reason = e.to_string();
            ctx.insert(NOTIFICATION_SENT, false);
            ctx.insert(NOTIFICATION_ERROR, &reason);
            Err(StepError::failed(step, reason))
        }
    }
}

/// Records that a notification was skipped because actor and recipient are
/// the same user.
pub(crate) fn skip_notification(ctx: &mut SagaContext) {
    ctx.insert(NOTIFICATION_SENT, false);
    ctx.insert(NOTIFICATION_SKIPPED, true);
}
