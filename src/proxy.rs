// ============================================================================
// Proof Proxy - Attestation Requests Against the zkTLS Network
// ============================================================================
//
// Thin client that asks the attestation network to fetch a URL and prove a
// content match. Mock mode fetches the page itself and signs the extracted
// fields with a local attestor key, which keeps the full settlement flow
// runnable without network credentials.
//
// ============================================================================

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::verifier::{MockAttestor, WebProof};

/// Owner recorded on proofs the proxy requests on behalf of the app.
const PROXY_OWNER: &str = "0x0000000000000000000000000000000000000000";

/// Proxy response: the raw proof plus the transformed layout `settle` takes.
/// Both carry the same claim here; the split mirrors the attestation SDK,
/// which returns them separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub proof: WebProof,
    pub transformed_proof: WebProof,
}

pub struct AttestorClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    mock: Option<MockAttestor>,
}

impl AttestorClient {
    pub fn from_env() -> Self {
        let mock_mode = std::env::var("ATTESTOR_MOCK_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            http: reqwest::Client::new(),
            base_url: std::env::var("ATTESTOR_URL")
                .unwrap_or_else(|_| "https://attestor.example.org".to_string()),
            app_id: std::env::var("ATTESTOR_APP_ID").unwrap_or_default(),
            app_secret: std::env::var("ATTESTOR_APP_SECRET").unwrap_or_default(),
            mock: mock_mode.then(MockAttestor::new),
        }
    }

    /// Mock attestor key the engine verifier must trust, if mock mode is on.
    pub fn mock_public_key(&self) -> Option<String> {
        self.mock.as_ref().map(|m| m.public_key_hex())
    }

    /// Request a proof that `url`'s content matches `pattern`. Named capture
    /// groups in the pattern become the extracted fields.
    pub async fn generate_proof(&self, url: &str, pattern: &str) -> Result<ProofBundle, String> {
        if let Some(attestor) = &self.mock {
            return self.mock_proof(attestor, url, pattern).await;
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ProofRequest<'a> {
            url: &'a str,
            pattern: &'a str,
            app_id: &'a str,
        }

        let response = self
            .http
            .post(format!("{}/proof", self.base_url))
            .basic_auth(&self.app_id, Some(&self.app_secret))
            .json(&ProofRequest { url, pattern, app_id: &self.app_id })
            .send()
            .await
            .map_err(|e| format!("attestor request failed: {}", e))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), url, "attestor rejected proof request");
            return Err(format!("attestor returned {}", response.status()));
        }

        let proof: WebProof = response
            .json()
            .await
            .map_err(|e| format!("failed to parse attestor response: {}", e))?;

        tracing::info!(url, "proof generated by attestation network");
        Ok(ProofBundle { transformed_proof: proof.clone(), proof })
    }

    async fn mock_proof(
        &self,
        attestor: &MockAttestor,
        url: &str,
        pattern: &str,
    ) -> Result<ProofBundle, String> {
        let re = Regex::new(pattern).map_err(|e| format!("bad pattern: {}", e))?;

        let body = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("fetch failed: {}", e))?
            .text()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;

        let caps = re
            .captures(&body)
            .ok_or_else(|| "pattern did not match page content".to_string())?;
        let mut fields: Vec<(String, String)> = Vec::new();
        for name in re.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                fields.push((name.to_string(), m.as_str().to_string()));
            }
        }
        if fields.is_empty() {
            return Err("pattern has no named capture groups".to_string());
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let proof = attestor.attest(url, &borrowed, PROXY_OWNER, now);

        tracing::info!(url, fields = fields.len(), "mock attestation issued");
        Ok(ProofBundle { transformed_proof: proof.clone(), proof })
    }
}
