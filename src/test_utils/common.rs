use std::time::Duration;

use bytes::Bytes;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::WatchEvent;

/// Polls `condition` every few milliseconds until it holds or `timeout` elapses
pub(crate) async fn wait_until(
    timeout: Duration,
    condition: impl Fn() -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

pub(crate) fn put_event(
    key: &str,
    raw: &str,
    revision: u64,
) -> WatchEvent {
    WatchEvent::Put {
        key: key.to_string(),
        value: Bytes::copy_from_slice(raw.as_bytes()),
        revision,
    }
}

pub(crate) fn delete_event(
    key: &str,
    revision: u64,
) -> WatchEvent {
    WatchEvent::Delete {
        key: key.to_string(),
        revision,
    }
}
