use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::source::{parse_payload, PayloadShape, TableSource};
use crate::table::Table;

/// In-memory source whose payload can be swapped or taken offline.
pub struct FakeSource {
    payload: Mutex<Option<String>>,
    fetches: AtomicUsize,
    latency: Mutex<Duration>,
}

impl FakeSource {
    pub fn serving(payload: &str) -> Arc<Self> {
        Arc::new(Self {
            payload: Mutex::new(Some(payload.to_string())),
            fetches: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            payload: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    pub fn set(&self, payload: &str) {
        *self.payload.lock().unwrap() = Some(payload.to_string());
    }

    pub fn go_offline(&self) {
        *self.payload.lock().unwrap() = None;
    }

    /// Make every fetch take `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableSource for FakeSource {
    async fn fetch(&self) -> Result<Table> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let payload = self.payload.lock().unwrap().clone();
        let latency = *self.latency.lock().unwrap();
        if latency.is_zero() {
            // Let other tasks run mid-fetch
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }
        match payload {
            Some(body) => parse_payload(body.as_bytes(), &PayloadShape::Array),
            None => Err(CacheError::from_status(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
                "offline",
            )),
        }
    }

    fn describe(&self) -> String {
        "fake://lookup_table.json".to_string()
    }
}
