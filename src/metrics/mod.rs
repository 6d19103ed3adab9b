use lazy_static::lazy_static;
use prometheus::register_int_counter;
use prometheus::register_int_counter_vec;
use prometheus::IntCounter;
use prometheus::IntCounterVec;

lazy_static! {
    pub static ref WATCH_EVENTS_APPLIED: IntCounterVec = register_int_counter_vec!(
        "whitelist_watch_events_applied",
        "Watch events committed to the local whitelist cache",
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_STALE: IntCounterVec = register_int_counter_vec!(
        "whitelist_watch_events_stale",
        "Watch events skipped because a newer revision was already applied",
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref MALFORMED_WATCH_EVENTS: IntCounterVec = register_int_counter_vec!(
        "whitelist_malformed_watch_events",
        "Watch events dropped because their payload could not be decoded",
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref STORE_WRITE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "whitelist_store_write_failures",
        "Write-through persists that failed",
        &["key"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_RESUBSCRIPTIONS: IntCounter = register_int_counter!(
        "whitelist_watch_resubscriptions",
        "Times an apply loop subscribed again after the store closed its feed"
    )
    .expect("metric can not be created");
}
