//! User-facing notifications and exception capture.
//!
//! Stores never render anything themselves. Success and failure messages go
//! to a [`Notifier`] (toast UI in the host application) and failures are
//! additionally captured with their error code and a context tag.

use tracing::{error, info};

use crate::error::ErrorCode;

pub trait Notifier: Send + Sync {
    /// Show a short success message.
    fn success(&self, message: &str);

    /// Show an error with a title and a description.
    fn error(&self, title: &str, description: &str);

    /// Forward a failure to error tracking. `context` names the failing call.
    fn capture(&self, err: &dyn ErrorCode, context: &'static str);
}

/// Report a failure the way every store does: capture, then show a toast.
pub(crate) fn report(notifier: &dyn Notifier, err: &dyn ErrorCode, context: &'static str, title: &str) {
    notifier.capture(err, context);
    notifier.error(title, &err.to_string());
}

/// Notifier that only writes structured log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(message, "notify success");
    }

    fn error(&self, title: &str, description: &str) {
        info!(title, description, "notify error");
    }

    fn capture(&self, err: &dyn ErrorCode, context: &'static str) {
        error!(code = err.error_code(), retryable = err.retryable(), context, error = %err, "captured failure");
    }
}
