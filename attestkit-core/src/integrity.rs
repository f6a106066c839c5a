//! Lazily prepared, shared integrity token provider.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::RetryPolicy;
use crate::platform::{
    run_blocking, AttestationService, AttestationServiceResult, IntegrityTokenProvider,
};
use crate::retry::with_retry;

struct PreparedProvider {
    cloud_project_number: u64,
    provider: Arc<dyn IntegrityTokenProvider>,
}

/// Caches the token provider for the most recently used cloud project number.
///
/// The lock is held for the whole warm-up, so concurrent callers wait for a running
/// preparation instead of starting their own.
pub(crate) struct IntegrityTokenCache {
    service: Arc<dyn AttestationService>,
    prepared: Mutex<Option<PreparedProvider>>,
}

impl IntegrityTokenCache {
    pub(crate) fn new(service: Arc<dyn AttestationService>) -> Self {
        Self {
            service,
            prepared: Mutex::new(None),
        }
    }

    /// Returns the provider for `cloud_project_number`, preparing a new one if the cache is
    /// empty or was prepared for another project number.
    pub(crate) async fn ensure_ready(
        &self,
        cloud_project_number: u64,
        retry: &RetryPolicy,
    ) -> AttestationServiceResult<Arc<dyn IntegrityTokenProvider>> {
        let mut prepared = self.prepared.lock().await;

        if let Some(current) = prepared
            .as_ref()
            .filter(|current| current.cloud_project_number == cloud_project_number)
        {
            return Ok(Arc::clone(&current.provider));
        }

        log::info!(
            "initializing integrity token provider using cloud project number: {cloud_project_number}"
        );

        let provider = with_retry(retry, "obtaining integrity token provider", || {
            let service = Arc::clone(&self.service);
            run_blocking(move || service.prepare(cloud_project_number))
        })
        .await?;

        // Only replace the cache once preparation succeeded.
        *prepared = Some(PreparedProvider {
            cloud_project_number,
            provider: Arc::clone(&provider),
        });

        Ok(provider)
    }

    /// Requests an integrity token bound to `challenge`, warming up the provider first.
    pub(crate) async fn request_token(
        &self,
        cloud_project_number: u64,
        challenge: &[u8],
        retry: &RetryPolicy,
    ) -> AttestationServiceResult<Vec<u8>> {
        let provider = self.ensure_ready(cloud_project_number, retry).await?;
        let request_hash = request_hash(challenge);

        with_retry(retry, "obtaining integrity token", || {
            let provider = Arc::clone(&provider);
            let request_hash = request_hash.clone();
            run_blocking(move || provider.request_token(request_hash))
        })
        .await
    }
}

/// The request hash binding an integrity token to an attestation challenge.
pub(crate) fn request_hash(challenge: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(challenge))
}
