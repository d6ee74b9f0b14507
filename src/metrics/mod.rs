use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;


lazy_static! {
    /// Cache lookups by outcome: hit | miss | joined
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("watched_cache_lookups", "Cache lookups by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    /// Read attempts by result: ok | transient | failed
    pub static ref READ_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("watched_cache_read_attempts", "Resource read attempts by result"),
        &["result"]
    )
    .expect("metric can not be created");

    /// Entries leaving the cache by reason: expired | invalidated | replaced
    pub static ref CACHE_EVICTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("watched_cache_evictions", "Evicted cache entries by reason"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "watched_cache_watch_subscriptions",
        "Live change subscriptions"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

fn register_custom_metrics() {
    REGISTRY
        .register(Box::new(CACHE_LOOKUPS.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(READ_ATTEMPTS.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(CACHE_EVICTIONS.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(WATCH_SUBSCRIPTIONS.clone()))
        .expect("collector can be registered");
}

/// Renders all cache metrics in the Prometheus text exposition format
pub fn gather() -> String {
    REGISTER.call_once(register_custom_metrics);

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
