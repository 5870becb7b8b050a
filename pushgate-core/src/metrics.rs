//! Prometheus metrics for the push layer
//!
//! Everything registers into [`REGISTRY`], which the HTTP server exposes at
//! `/metrics`.

use prometheus::{register_counter_vec_with_registry, CounterVec, Encoder, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Identity resolution
pub mod identity {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    /// Lookups by tier (`l1`, `l2`, `store`) and result (`hit`, `miss`)
    pub static LOOKUPS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "pushgate_identity_cache_total",
            "Identity lookups by cache level and result",
            &["level", "result"],
            REGISTRY.clone()
        )
        .expect("Failed to register IDENTITY_LOOKUPS")
    });
}

/// Connection registry
pub mod registry {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    /// Connect-time registrations (`registered`, `unresolved`, `failed`)
    pub static REGISTRATIONS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "pushgate_registrations_total",
            "Connect-time registration attempts by result",
            &["result"],
            REGISTRY.clone()
        )
        .expect("Failed to register REGISTRATIONS")
    });
}

/// Fan-out broker
pub mod fanout {
    use super::{register_counter_vec_with_registry, CounterVec, REGISTRY};

    /// Events taken off the queue (`ok`, `error`, `undecodable`)
    pub static EVENTS_PROCESSED: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "pushgate_events_processed_total",
                "Events processed by the fan-out broker",
                &["result"],
                REGISTRY.clone()
            )
            .expect("Failed to register EVENTS_PROCESSED")
        });

    /// Per-connection deliveries (`delivered`, `gone`, `failed`)
    pub static DELIVERIES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "pushgate_deliveries_total",
            "Per-connection push attempts by outcome",
            &["outcome"],
            REGISTRY.clone()
        )
        .expect("Failed to register DELIVERIES")
    });

    pub static HOOK_FAILURES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "pushgate_hook_failures_total",
            "Side-effect hook failures (swallowed)",
            &["hook"],
            REGISTRY.clone()
        )
        .expect("Failed to register HOOK_FAILURES")
    });
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
