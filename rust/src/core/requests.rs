use std::future::Future;
use std::time::Duration;

use crate::error::ChatError;
use crate::updates::{CoreMsg, InternalEvent};

use super::AppCore;

/// Run `fut` against `deadline`, mapping expiry to [`ChatError::Timeout`].
pub(super) async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, ChatError>>,
) -> Result<T, ChatError> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout),
    }
}

impl AppCore {
    /// Spawn a request on the actor's runtime and route its outcome back to the actor as the
    /// event built by `done`. Failures are logged here; handling is up to the completion.
    pub(super) fn spawn_request<T, Fut, F>(&self, request: &'static str, fut: Fut, done: F)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ChatError>> + Send + 'static,
        F: FnOnce(Result<T, ChatError>) -> InternalEvent + Send + 'static,
    {
        let tx = self.core_sender.clone();
        let deadline = self.config.request_timeout();
        self.runtime.spawn(async move {
            let result = with_deadline(deadline, fut).await;
            if let Err(e) = &result {
                tracing::warn!(request, %e, "request failed");
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(done(result))));
        });
    }
}
