#![forbid(unsafe_code)]
#![deny(missing_docs)]
// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Keystore: RSA-PSS/SHA-512 signing and verification over canonical JSON.
//!
//! The host identifier (`ServerKey`) is the Base58 encoding of the DER
//! `SubjectPublicKeyInfo` of an RSA public key — the identifier doubles as
//! the verification key. `ring::signature::RsaKeyPair::public_key()` already
//! hands back the DER SPKI bytes directly, so deriving the identifier from a
//! loaded key needs no ASN.1 work of our own. Verifying against a *received*
//! identifier needs the inverse: `spki` un-wraps the SPKI envelope to the
//! inner PKCS#1 `RSAPublicKey` bytes that `ring`'s RSA verification
//! algorithms expect.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use ring::{
    rand::SystemRandom,
    signature::{KeyPair, RsaKeyPair, RSA_PSS_2048_8192_SHA512, RSA_PSS_SHA512},
};
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

use crate::core::types::{canonical_json, payload_without_signature, Payload, SIGNATURE_FIELD};

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Could not read key material from disk.
    #[error("io")]
    Io,
    /// Key bytes did not parse as a PKCS#8 RSA private key.
    #[error("invalid key encoding")]
    InvalidKey,
    /// Host identifier did not decode to a valid RSA `SubjectPublicKeyInfo`.
    #[error("not a RSA public key")]
    NotRsa,
    /// Signing operation failed (RNG or key rejection).
    #[error("crypto")]
    Crypto,
    /// Signature failed to verify, or could not be Base64-decoded.
    #[error("bad signature")]
    BadSignature,
}

/// Loaded RSA key pair, able to sign and to derive its own host identifier.
pub struct Keystore {
    keypair: RsaKeyPair,
    rng: SystemRandom,
    /// Base58(DER SPKI) identifier, computed once at load time.
    server_key: String,
}

impl Keystore {
    /// Load a PKCS#8-encoded RSA private key from a file path.
    pub fn load_from_path(path: &Path) -> Result<Self, KeystoreError> {
        let mut bytes = std::fs::read(path).map_err(|_| KeystoreError::Io)?;
        let result = Self::load_from_pkcs8(&bytes);
        bytes.zeroize();
        result
    }

    /// Load a PKCS#8-encoded RSA private key from raw (already-decoded) bytes.
    pub fn load_from_pkcs8(pkcs8_der: &[u8]) -> Result<Self, KeystoreError> {
        let keypair = RsaKeyPair::from_pkcs8(pkcs8_der).map_err(|_| KeystoreError::InvalidKey)?;
        let server_key = bs58::encode(keypair.public_key().as_ref()).into_string();
        Ok(Self {
            keypair,
            rng: SystemRandom::new(),
            server_key,
        })
    }

    /// This key's host identifier: Base58 of the DER `SubjectPublicKeyInfo`.
    pub fn server_key(&self) -> &str {
        &self.server_key
    }

    /// Sign a payload in place: computes the signature over the canonical
    /// JSON of `payload` minus `hds.signature`, and sets `hds.signature` to
    /// the Base64 encoding of the result.
    pub fn sign_payload(&self, payload: &mut Payload) -> Result<(), KeystoreError> {
        let to_sign = payload_without_signature(payload);
        let bytes = canonical_json(&to_sign).map_err(|_| KeystoreError::Crypto)?;
        let mut sig = vec![0u8; self.keypair.public_modulus_len()];
        self.keypair
            .sign(&RSA_PSS_SHA512, &self.rng, &bytes, &mut sig)
            .map_err(|_| KeystoreError::Crypto)?;
        payload.insert(
            SIGNATURE_FIELD.to_string(),
            serde_json::Value::String(Base64.encode(sig)),
        );
        Ok(())
    }
}

/// Decode a Base58 host identifier to the inner PKCS#1 `RSAPublicKey` DER
/// bytes that `ring`'s RSA verification algorithms expect.
fn rsa_public_key_der(server_key: &str) -> Result<Vec<u8>, KeystoreError> {
    let spki_der = bs58::decode(server_key)
        .into_vec()
        .map_err(|_| KeystoreError::NotRsa)?;
    let spki = spki::SubjectPublicKeyInfoRef::try_from(spki_der.as_slice())
        .map_err(|_| KeystoreError::NotRsa)?;
    // RSA's OID is 1.2.840.113549.1.1.1; any other algorithm means this
    // identifier, while valid DER, isn't an RSA key.
    const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";
    if spki.algorithm.oid.to_string() != RSA_ENCRYPTION_OID {
        return Err(KeystoreError::NotRsa);
    }
    Ok(spki
        .subject_public_key
        .as_bytes()
        .ok_or(KeystoreError::NotRsa)?
        .to_vec())
}

/// Verify that `payload["hds.signature"]` is a valid RSA-PSS/SHA-512
/// signature over the canonical JSON of `payload` minus that field, under
/// the RSA public key recovered from `server_key`.
pub fn verify_payload(server_key: &str, payload: &Payload) -> Result<(), KeystoreError> {
    let pubkey_der = rsa_public_key_der(server_key)?;

    let sig_b64 = payload
        .get(SIGNATURE_FIELD)
        .and_then(|v| v.as_str())
        .ok_or(KeystoreError::BadSignature)?;
    let sig = Base64
        .decode(sig_b64)
        .map_err(|_| KeystoreError::BadSignature)?;

    let signed = payload_without_signature(payload);
    let bytes = canonical_json(&signed).map_err(|_| KeystoreError::BadSignature)?;

    let pubkey = ring::signature::UnparsedPublicKey::new(&RSA_PSS_2048_8192_SHA512, &pubkey_der);
    pubkey
        .verify(&bytes, &sig)
        .map_err(|_| KeystoreError::BadSignature)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Test-only RSA key generation. `ring` cannot generate RSA keys, so
    //! tests reach for the `rsa` crate's pure-Rust keygen and re-encode to
    //! the PKCS#8 bytes `Keystore::load_from_pkcs8` expects.
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;

    pub fn generate_pkcs8_der() -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("rsa keygen");
        key.to_pkcs8_der()
            .expect("pkcs8 encode")
            .as_bytes()
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::OnceLock;

    fn shared_keystore() -> &'static Keystore {
        static KS: OnceLock<Keystore> = OnceLock::new();
        KS.get_or_init(|| Keystore::load_from_pkcs8(&test_support::generate_pkcs8_der()).unwrap())
    }

    fn test_payload() -> Payload {
        match json!({"hds.ttl": 3600, "hds.host": "example.com"}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let ks = Keystore::load_from_pkcs8(&test_support::generate_pkcs8_der()).unwrap();
        let mut payload = test_payload();
        ks.sign_payload(&mut payload).unwrap();
        verify_payload(ks.server_key(), &payload).unwrap();
    }

    #[test]
    fn tampering_with_payload_breaks_verification() {
        let ks = Keystore::load_from_pkcs8(&test_support::generate_pkcs8_der()).unwrap();
        let mut payload = test_payload();
        ks.sign_payload(&mut payload).unwrap();
        payload.insert("hds.host".to_string(), json!("evil.example.com"));
        assert!(verify_payload(ks.server_key(), &payload).is_err());
    }

    #[test]
    fn tampering_with_signature_breaks_verification() {
        let ks = Keystore::load_from_pkcs8(&test_support::generate_pkcs8_der()).unwrap();
        let mut payload = test_payload();
        ks.sign_payload(&mut payload).unwrap();
        payload.insert(SIGNATURE_FIELD.to_string(), json!("bm90YXJlYWxzaWc="));
        assert!(verify_payload(ks.server_key(), &payload).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let ks_a = Keystore::load_from_pkcs8(&test_support::generate_pkcs8_der()).unwrap();
        let ks_b = Keystore::load_from_pkcs8(&test_support::generate_pkcs8_der()).unwrap();
        let mut payload = test_payload();
        ks_a.sign_payload(&mut payload).unwrap();
        assert!(verify_payload(ks_b.server_key(), &payload).is_err());
    }

    #[test]
    fn non_rsa_identifier_is_rejected() {
        // A Base58 blob that decodes to DER but is not a SubjectPublicKeyInfo at all.
        let bogus = bs58::encode(b"not a spki structure at all").into_string();
        let payload = test_payload();
        assert!(matches!(
            verify_payload(&bogus, &payload),
            Err(KeystoreError::NotRsa)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_sign_verify_round_trips(value in "[ -~]{1,64}", ttl in 3600i64..=259200i64) {
            let ks = shared_keystore();
            let mut payload: Payload = match json!({"hds.ttl": ttl, "hds.host": value}) {
                serde_json::Value::Object(m) => m,
                _ => unreachable!(),
            };
            ks.sign_payload(&mut payload).unwrap();
            prop_assert!(verify_payload(ks.server_key(), &payload).is_ok());
        }

        #[test]
        fn prop_mutated_payload_breaks_verification(value in "[ -~]{1,64}", tamper in "[ -~]{1,64}") {
            prop_assume!(value != tamper);
            let ks = shared_keystore();
            let mut payload: Payload = match json!({"hds.ttl": 3600, "hds.host": value}) {
                serde_json::Value::Object(m) => m,
                _ => unreachable!(),
            };
            ks.sign_payload(&mut payload).unwrap();
            payload.insert("hds.host".to_string(), json!(tamper));
            prop_assert!(verify_payload(ks.server_key(), &payload).is_err());
        }
    }
}
