//! Shared utilities for the store integration suite.

#![allow(dead_code)]

pub mod mock_chroma;

pub use mock_chroma::MockChroma;

use async_trait::async_trait;
use forest_store::{BackoffPolicy, HealthProbe, StoreConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

static INIT_TRACING: Once = Once::new();

/// Install a subscriber once per test binary
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        forest_store::init_tracing_with("forest=debug");
    });
}

/// Reconnect policy with millisecond delays
pub fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy::new()
        .with_max_attempts(max_attempts)
        .with_base_delay_ms(1)
        .with_max_delay_ms(5)
}

/// Chroma config pointing at `url` with fast reconnects
pub fn chroma_config(url: &str) -> StoreConfig {
    let mut config = StoreConfig::chroma(url).with_reconnect(fast_policy(3));
    config.chroma.timeout_ms = 2_000;
    config
}

/// Probe whose answer the test controls
pub struct SwitchProbe {
    healthy: AtomicBool,
}

impl SwitchProbe {
    pub fn new(healthy: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
        })
    }

    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn check(&self) -> Result<(), String> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err("probe switched off".to_string())
        }
    }
}

/// Port nothing listens on (bound then released)
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|addr| addr.port())
        .expect("bind ephemeral port")
}
