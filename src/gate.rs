//! Admission gate serializing chunk processing
//!
//! Every inbound chunk, and every operator action that mutates the session,
//! runs with the gate held. Waiting is bounded by the configured lock
//! timeout.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::GateError;

#[derive(Debug)]
pub struct AdmissionGate<T> {
    inner: Mutex<T>,
    timeout: Duration,
}

impl<T> AdmissionGate<T> {
    pub fn new(value: T, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(value),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the gate, giving up after the configured timeout
    pub async fn acquire(&self) -> Result<MutexGuard<'_, T>, GateError> {
        match tokio::time::timeout(self.timeout, self.inner.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_elapsed) => {
                log::error!("gate not acquired within {:?}", self.timeout);
                Err(GateError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Take the gate only if nobody holds it
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let gate = AdmissionGate::new(0u32, Duration::from_millis(50));
        {
            let mut value = gate.acquire().await.unwrap();
            *value += 1;
        }
        assert_eq!(*gate.acquire().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_while_held() {
        let gate = AdmissionGate::new((), Duration::from_millis(20));
        let _held = gate.acquire().await.unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(
            gate.acquire().await.unwrap_err(),
            GateError::Timeout { timeout_ms: 20 }
        );
    }
}
