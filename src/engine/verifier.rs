// ============================================================================
// Web Proof Verification - zkTLS Attestation Checking
// ============================================================================
//
// Proof layout mirrors what the attestation network returns once the proxy
// has transformed it for settlement: the claim info that was attested, the
// signed claim binding that info to an identifier, and the attestor
// signature set.
//
// Verification recomputes the identifier commitment, recovers the signer of
// every signature, and requires a quorum of trusted attestor keys before the
// claimed URL and extracted fields are believed. The attestation network's
// internal consensus is not modeled here; a signature from a trusted key is
// the trust boundary.
//
// ============================================================================

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey, VerifyOnly};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet};

// ============================================================================
// WIRE TYPES
// ============================================================================

/// What was fetched and how, exactly as attested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimInfo {
    /// Provider kind, e.g. "http".
    pub provider: String,
    /// Request parameters the attestor replayed (JSON string).
    pub parameters: String,
    /// Attested response context (JSON string holding the url and the
    /// extracted fields).
    pub context: String,
}

/// The claim an attestor put its signature on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimData {
    /// Keccak-256 commitment over the claim info, hex encoded.
    pub identifier: String,
    /// Address the proof was generated for.
    pub owner: String,
    pub timestamp_s: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedClaim {
    pub claim: ClaimData,
    /// 65-byte recoverable secp256k1 signatures, hex encoded.
    pub signatures: Vec<String>,
}

/// A transformed proof in the exact argument layout `settle` expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebProof {
    pub claim_info: ClaimInfo,
    pub signed_claim: SignedClaim,
}

/// Verified content of an accepted proof.
#[derive(Debug, Clone, Serialize)]
pub struct Attestation {
    /// URL the attestor actually fetched.
    pub url: String,
    /// Extracted fields from the attested response context.
    pub fields: HashMap<String, String>,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VerifyError {
    IdentifierMismatch { expected: String, got: String },
    NoSignatures,
    MalformedSignature(String),
    NotEnoughAttestors { trusted: usize, required: usize },
    BadContext(String),
    MissingUrl,
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::IdentifierMismatch { expected, got } => {
                write!(f, "identifier mismatch: claim info hashes to {}, proof says {}", expected, got)
            }
            VerifyError::NoSignatures => write!(f, "no attestor signatures"),
            VerifyError::MalformedSignature(msg) => write!(f, "malformed signature: {}", msg),
            VerifyError::NotEnoughAttestors { trusted, required } => {
                write!(f, "only {} trusted attestor signatures, need {}", trusted, required)
            }
            VerifyError::BadContext(msg) => write!(f, "unreadable context: {}", msg),
            VerifyError::MissingUrl => write!(f, "context missing url"),
        }
    }
}

impl std::error::Error for VerifyError {}

// ============================================================================
// VERIFIER
// ============================================================================

/// External attestation checker injected into the settlement engine.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &WebProof) -> Result<Attestation, VerifyError>;
}

/// Keccak-256 hex digest. Commitment scheme for data-source URLs and claim
/// identifiers.
pub fn keccak_hex(data: &str) -> String {
    hex::encode(Keccak256::digest(data.as_bytes()))
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn claim_info_identifier(info: &ClaimInfo) -> String {
    keccak_hex(&format!("{}\n{}\n{}", info.provider, info.parameters, info.context))
}

/// Digest the attestors sign: the claim serialized as newline-joined fields.
fn claim_digest(claim: &ClaimData) -> [u8; 32] {
    let serialized = format!(
        "{}\n{}\n{}\n{}",
        strip_0x(&claim.identifier),
        claim.owner,
        claim.timestamp_s,
        claim.epoch
    );
    Keccak256::digest(serialized.as_bytes()).into()
}

/// Checks proofs against a trusted attestor key set.
pub struct AttestorVerifier {
    secp: Secp256k1<VerifyOnly>,
    /// Compressed secp256k1 public keys, lowercase hex.
    trusted: HashSet<String>,
    /// Minimum count of distinct trusted signers.
    quorum: usize,
}

impl AttestorVerifier {
    pub fn new(trusted: impl IntoIterator<Item = String>, quorum: usize) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            trusted: trusted
                .into_iter()
                .map(|k| strip_0x(&k).to_lowercase())
                .collect(),
            quorum,
        }
    }
}

impl ProofVerifier for AttestorVerifier {
    fn verify(&self, proof: &WebProof) -> Result<Attestation, VerifyError> {
        // the identifier must commit to the claim info
        let expected = claim_info_identifier(&proof.claim_info);
        let got = &proof.signed_claim.claim.identifier;
        if !strip_0x(got).eq_ignore_ascii_case(&expected) {
            return Err(VerifyError::IdentifierMismatch {
                expected,
                got: got.clone(),
            });
        }

        if proof.signed_claim.signatures.is_empty() {
            return Err(VerifyError::NoSignatures);
        }

        let digest = claim_digest(&proof.signed_claim.claim);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;

        let mut signers = HashSet::new();
        for sig_hex in &proof.signed_claim.signatures {
            let raw = hex::decode(strip_0x(sig_hex))
                .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
            if raw.len() != 65 {
                return Err(VerifyError::MalformedSignature(format!(
                    "expected 65 bytes, got {}",
                    raw.len()
                )));
            }
            let recovery_id = RecoveryId::from_i32(raw[64] as i32)
                .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
            let signature = RecoverableSignature::from_compact(&raw[..64], recovery_id)
                .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
            let recovered = self
                .secp
                .recover_ecdsa(&message, &signature)
                .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
            let key_hex = hex::encode(recovered.serialize());
            if self.trusted.contains(&key_hex) {
                signers.insert(key_hex);
            }
        }
        if signers.len() < self.quorum {
            return Err(VerifyError::NotEnoughAttestors {
                trusted: signers.len(),
                required: self.quorum,
            });
        }

        parse_context(&proof.claim_info.context)
    }
}

/// Read the attested context JSON into the url plus extracted fields.
/// Accepts fields either at the top level or under "extractedParameters".
fn parse_context(context: &str) -> Result<Attestation, VerifyError> {
    let value: Value =
        serde_json::from_str(context).map_err(|e| VerifyError::BadContext(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| VerifyError::BadContext("context is not an object".to_string()))?;
    let url = object
        .get("url")
        .and_then(Value::as_str)
        .ok_or(VerifyError::MissingUrl)?
        .to_string();

    let mut fields = HashMap::new();
    for (key, val) in object {
        if key == "url" {
            continue;
        }
        if key == "extractedParameters" {
            if let Some(extracted) = val.as_object() {
                for (k, v) in extracted {
                    if let Some(s) = v.as_str() {
                        fields.insert(k.clone(), s.to_string());
                    }
                }
            }
            continue;
        }
        if let Some(s) = val.as_str() {
            fields.insert(key.clone(), s.to_string());
        }
    }
    Ok(Attestation { url, fields })
}

// ============================================================================
// MOCK ATTESTOR
// ============================================================================

/// Locally signed attestations for mock mode and tests. Not a zkTLS network:
/// whoever holds the key is the oracle.
pub struct MockAttestor {
    secp: Secp256k1<All>,
    secret: SecretKey,
    public: PublicKey,
}

impl MockAttestor {
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self { secp, secret, public }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Verifier that trusts exactly this attestor.
    pub fn verifier(&self) -> AttestorVerifier {
        AttestorVerifier::new([self.public_key_hex()], 1)
    }

    /// Issue a signed proof that `url` served content with the given fields.
    pub fn attest(
        &self,
        url: &str,
        fields: &[(&str, &str)],
        owner: &str,
        timestamp_s: u64,
    ) -> WebProof {
        let mut extracted = serde_json::Map::new();
        for (key, val) in fields {
            extracted.insert((*key).to_string(), Value::String((*val).to_string()));
        }
        let context = json!({
            "url": url,
            "extractedParameters": Value::Object(extracted),
        });

        let claim_info = ClaimInfo {
            provider: "http".to_string(),
            parameters: json!({ "url": url, "method": "GET" }).to_string(),
            context: context.to_string(),
        };
        let claim = ClaimData {
            identifier: claim_info_identifier(&claim_info),
            owner: owner.to_string(),
            timestamp_s,
            epoch: 1,
        };

        let message = Message::from_digest_slice(&claim_digest(&claim)).unwrap();
        let signature = self.secp.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();
        let mut raw = compact.to_vec();
        raw.push(recovery_id.to_i32() as u8);

        WebProof {
            claim_info,
            signed_claim: SignedClaim {
                claim,
                signatures: vec![hex::encode(raw)],
            },
        }
    }
}

impl Default for MockAttestor {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://site.api.espn.com/apis/v2/sports/nba/scoreboard?dates=2026-05-02";

    #[test]
    fn attest_then_verify_roundtrip() {
        let attestor = MockAttestor::new();
        let proof = attestor.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);

        let attestation = attestor.verifier().verify(&proof).unwrap();
        assert_eq!(attestation.url, URL);
        assert_eq!(attestation.fields.get("theWinner").map(String::as_str), Some("true"));
    }

    #[test]
    fn tampered_context_breaks_identifier() {
        let attestor = MockAttestor::new();
        let mut proof = attestor.attest(URL, &[("theWinner", "false")], "0xabc", 1_700_000_000);
        proof.claim_info.context = proof.claim_info.context.replace("false", "true");

        let err = attestor.verifier().verify(&proof).unwrap_err();
        assert!(matches!(err, VerifyError::IdentifierMismatch { .. }));
    }

    #[test]
    fn untrusted_signer_rejected() {
        let attestor = MockAttestor::new();
        let stranger = MockAttestor::new();
        let proof = stranger.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);

        let err = attestor.verifier().verify(&proof).unwrap_err();
        assert_eq!(
            err,
            VerifyError::NotEnoughAttestors { trusted: 0, required: 1 }
        );
    }

    #[test]
    fn garbage_signature_rejected() {
        let attestor = MockAttestor::new();
        let mut proof = attestor.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);
        proof.signed_claim.signatures = vec!["deadbeef".to_string()];

        let err = attestor.verifier().verify(&proof).unwrap_err();
        assert!(matches!(err, VerifyError::MalformedSignature(_)));
    }

    #[test]
    fn empty_signature_set_rejected() {
        let attestor = MockAttestor::new();
        let mut proof = attestor.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);
        proof.signed_claim.signatures.clear();
        // identifier still matches, so the signature check is what fires
        let err = attestor.verifier().verify(&proof).unwrap_err();
        assert_eq!(err, VerifyError::NoSignatures);
    }

    #[test]
    fn quorum_of_two_needs_two_distinct_attestors() {
        let a = MockAttestor::new();
        let b = MockAttestor::new();
        let mut proof = a.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);
        let second = b.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);
        proof
            .signed_claim
            .signatures
            .extend(second.signed_claim.signatures.clone());

        let verifier = AttestorVerifier::new([a.public_key_hex(), b.public_key_hex()], 2);
        assert!(verifier.verify(&proof).is_ok());

        // the same signature listed twice is one signer
        let mut doubled = a.attest(URL, &[("theWinner", "true")], "0xabc", 1_700_000_000);
        let dup = doubled.signed_claim.signatures[0].clone();
        doubled.signed_claim.signatures.push(dup);
        let err = verifier.verify(&doubled).unwrap_err();
        assert!(matches!(err, VerifyError::NotEnoughAttestors { trusted: 1, .. }));
    }

    #[test]
    fn context_missing_url_rejected() {
        let err = parse_context(r#"{"theWinner":"true"}"#).unwrap_err();
        assert_eq!(err, VerifyError::MissingUrl);

        let err = parse_context("not json").unwrap_err();
        assert!(matches!(err, VerifyError::BadContext(_)));
    }

    #[test]
    fn top_level_context_fields_are_extracted() {
        // older proofs put the extracted field next to the url
        let attestation =
            parse_context(&format!(r#"{{"url":"{}","theWinner":"false"}}"#, URL)).unwrap();
        assert_eq!(attestation.fields.get("theWinner").map(String::as_str), Some("false"));
    }
}
