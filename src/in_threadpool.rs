use std::panic;
use std::sync::Arc;
use std::sync::mpsc::channel;

use anyhow::{Result, anyhow};
use scoped_thread_pool::Pool;

/// Execute function inside thread pool and return its result. A panic
/// in `f` is reported as an error.
pub fn in_threadpool<F, R>(threadpool: Arc<Pool>, f: F) -> Result<R>
where F: FnOnce() -> R + Send,
      R: Send
{
    let (tx, rx) = channel();
    threadpool.scoped(move |scope| {
        scope.execute(move || {
            // We can ignore the small panic-safety mechanism of
            // `catch_unwind`, the closure's state is dropped anyway.
            let result = panic::catch_unwind(panic::AssertUnwindSafe(f));
            // The receiver is alive until the scope ends.
            let _ = tx.send(result);
        });
        let msg = rx.recv()?;
        msg.map_err(|e| {
            let what = e.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown".into());
            anyhow!("worker panicked: {what}")
        })
    })
}
