//! Mock bucket plumbing built on the [mockall] doubles of [`KvBucket`] and
//! [`BucketProvider`].
//!
//! [`scripted_bucket`] hands the test the sending half of the change feed, so
//! events can be delivered to a cache's apply loop one at a time.
//!
//! [mockall]: https://docs.rs/mockall/latest/mockall/

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::KvBucket;
use crate::MockBucketProvider;
use crate::MockKvBucket;
use crate::WatchEvent;
use crate::Watcher;

/// Mock bucket whose single `watch_all` call returns a feed driven by the test
pub(crate) fn scripted_bucket() -> (MockKvBucket, mpsc::Sender<WatchEvent>) {
    let (feed, watcher) = Watcher::channel(16);
    let mut bucket = MockKvBucket::new();
    bucket.expect_watch_all().times(1).return_once(move || Ok(watcher));
    (bucket, feed)
}

/// Provider handing out `bucket` for any namespace
pub(crate) fn provider_for(bucket: MockKvBucket) -> MockBucketProvider {
    let bucket: Arc<dyn KvBucket> = Arc::new(bucket);
    let mut provider = MockBucketProvider::new();
    provider.expect_bucket().returning(move |_| Ok(bucket.clone()));
    provider
}
