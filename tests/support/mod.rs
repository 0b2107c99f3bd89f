use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Wait for the first event that `pick` accepts, skipping the rest
///
/// Panics if nothing matches within `within`.
pub async fn wait_for<T, R>(
    rx: &mut UnboundedReceiver<T>,
    within: Duration,
    mut pick: impl FnMut(T) -> Option<R>,
) -> R {
    let result = timeout(within, async {
        while let Some(event) = rx.recv().await {
            if let Some(found) = pick(event) {
                return Some(found);
            }
        }
        None
    })
    .await;

    match result {
        Ok(Some(found)) => found,
        Ok(None) => panic!("progress channel closed"),
        Err(_) => panic!("timed out after {:?}", within),
    }
}

/// Poll `check` until it holds
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + within;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", within);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
