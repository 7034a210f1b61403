use std::future::Future;

/// Spawns a task on the ambient tokio runtime.
///
/// Returns `false` if the caller is not running inside a runtime, in which case the future is
/// dropped without being polled.
pub(crate) fn spawn<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(err) => {
            log::error!("Cannot spawn background task: {err}");
            false
        }
    }
}
