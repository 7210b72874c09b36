//! Common test utilities for integration tests.

#![allow(dead_code)]

use backend_config::{load_config_from, ConfigError, ConnectionConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_KEY: &str =
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJyb2xlIjoiYW5vbiIsImlhdCI6MTcwMDAwMDAwMH0.sig";

/// Mutable stand-in for the process environment that counts loads.
#[derive(Clone, Default)]
pub struct TestEnv {
    vars: Arc<Mutex<HashMap<String, String>>>,
    loads: Arc<AtomicUsize>,
}

impl TestEnv {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let env = Self::default();
        for (k, v) in pairs {
            env.set(k, v);
        }
        env
    }

    /// Environment pointing at `endpoint` with a valid key.
    pub fn valid(endpoint: &str) -> Self {
        Self::new(&[("ENDPOINT_URL", endpoint), ("PUBLIC_API_KEY", TEST_KEY)])
    }

    pub fn set(&self, key: &str, value: &str) {
        self.vars
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Config source closure for `ClientManager::new`.
    pub fn source(&self) -> impl Fn() -> Result<ConnectionConfig, ConfigError> + Send + Sync {
        let env = self.clone();
        move || {
            env.loads.fetch_add(1, Ordering::SeqCst);
            let vars = env.vars.lock().unwrap().clone();
            load_config_from(vars)
        }
    }
}
