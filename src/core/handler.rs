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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Admission: validates, verifies, and stores signed state and topic
//! payloads, and completes a host lookup via federation when local state
//! is absent.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::core::error::{ErrorKind, HdsError};
use crate::core::security::keystore::verify_payload;
use crate::core::store::{HostStatus, Store, StoreError, SubtopicMatch};
use crate::core::types::{
    Payload, DIRECTORY_TOPIC, HOST_KEY, MAX_KEY_SIZE, MAX_TTL_SEC, MAX_VALUE_SIZE, MIN_KEY_SIZE,
    MIN_TTL_SEC, SIGNATURE_FIELD,
};
use crate::federation::FederationClient;

/// Reserved hook for a future challenge/response proof that a key holder
/// actually operates at the host it claims. Currently a no-op that always
/// accepts, so real validation can be slotted in later without reshaping
/// the admission path.
pub fn validate_host(_host_key: &str, _claimed_host: &str) -> bool {
    true
}

/// Ties together the store, the verifier, and (optionally) an outbound
/// federation client.
pub struct Handler {
    store: Arc<Store>,
    federation: Option<Arc<FederationClient>>,
}

impl Handler {
    /// Construct a handler. `federation` is `None` on nodes with no
    /// federation key configured, in which case federation reads fail with
    /// [`ErrorKind::FederationDisabled`].
    pub fn new(store: Arc<Store>, federation: Option<Arc<FederationClient>>) -> Self {
        Self { store, federation }
    }

    fn check_key_size(key: &str) -> Result<(), HdsError> {
        if key.len() < MIN_KEY_SIZE {
            return Err(HdsError::new(ErrorKind::PayloadKeyTooShort, "key too short"));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(HdsError::new(ErrorKind::PayloadKeyTooLong, "key too long"));
        }
        Ok(())
    }

    fn extract_ttl(body: &Payload) -> Result<i64, HdsError> {
        let ttl = body
            .get("hds.ttl")
            .ok_or_else(|| HdsError::new(ErrorKind::PayloadMissingKey, "missing hds.ttl"))?;
        let ttl = ttl
            .as_i64()
            .ok_or_else(|| HdsError::new(ErrorKind::PayloadBadTtl, "hds.ttl must be an integer"))?;
        if !(MIN_TTL_SEC..=MAX_TTL_SEC).contains(&ttl) {
            return Err(HdsError::new(ErrorKind::PayloadBadTtl, "hds.ttl out of range"));
        }
        Ok(ttl)
    }

    fn require_signature(body: &Payload) -> Result<(), HdsError> {
        if body.get(SIGNATURE_FIELD).and_then(Value::as_str).is_none() {
            return Err(HdsError::new(
                ErrorKind::PayloadMissingKey,
                "missing hds.signature",
            ));
        }
        Ok(())
    }

    fn verify(host: &str, body: &Payload) -> Result<(), HdsError> {
        verify_payload(host, body).map_err(|_| {
            HdsError::new(ErrorKind::PayloadBadSignature, "signature verification failed")
        })
    }

    /// Validate, verify, and store one signed state key/value write. Returns
    /// the number of older entries evicted by the I3 capacity cap as a side
    /// effect of this write (usually `0`).
    pub fn put_state(&self, host: &str, key: &str, body: &Payload) -> Result<usize, HdsError> {
        Self::check_key_size(key)?;

        let value = match body.get(key) {
            Some(Value::String(s)) => s,
            Some(_) => {
                return Err(HdsError::new(ErrorKind::PayloadBadType, "value must be a string"))
            }
            None => {
                return Err(HdsError::new(ErrorKind::PayloadMissingKey, "missing value"))
            }
        };
        if value.is_empty() {
            return Err(HdsError::new(ErrorKind::PayloadBodyTooShort, "value too short"));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(HdsError::new(ErrorKind::PayloadBodyTooLong, "value too long"));
        }

        Self::require_signature(body)?;
        let ttl = Self::extract_ttl(body)?;
        Self::verify(host, body)?;

        let already_live = !self.store.has_host_expired(host).unwrap_or(true);
        if !already_live && key != HOST_KEY {
            return Err(HdsError::new(
                ErrorKind::StateNoHost,
                "host has no live hds.host entry",
            ));
        }

        let signature = body
            .get(SIGNATURE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default();

        let evicted = self
            .store
            .store_host_state(host, key, value, ttl, signature, None)
            .map_err(Self::store_error)?;

        info!(host = %truncate(host), key = %key, "accepted state write");
        Ok(evicted)
    }

    /// Validate, verify, and store a topic membership write, then fire an
    /// asynchronous fan-out to federation peers. Requires the host's
    /// `hds.host` entry to be present and not expired (spec §6).
    pub async fn put_topic(&self, host: &str, topic: &str, body: &Payload) -> Result<(), HdsError> {
        Self::check_key_size(topic)?;

        let subtopics = match body.get(topic) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| HdsError::new(ErrorKind::PayloadBadType, "subtopic must be a string"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(HdsError::new(
                    ErrorKind::PayloadBadType,
                    "topic value must be an ordered list of subtopics",
                ))
            }
            None => Vec::new(),
        };

        Self::require_signature(body)?;
        Self::verify(host, body)?;

        match self.store.host_status(host).map_err(Self::store_error)? {
            HostStatus::Missing => {
                return Err(HdsError::new(ErrorKind::HostMissing, "host has no hds.host entry"))
            }
            HostStatus::Expired => {
                return Err(HdsError::new(
                    ErrorKind::HostExpired,
                    "host's hds.host entry has expired",
                ))
            }
            HostStatus::Live => {}
        }

        let signature = body
            .get(SIGNATURE_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.store
            .store_host_topic(host, topic, subtopics, signature)
            .map_err(Self::store_error)?;

        info!(host = %truncate(host), topic = %topic, "accepted topic membership");

        if let Some(federation) = self.federation.clone() {
            let store = self.store.clone();
            let host = host.to_string();
            let topic = topic.to_string();
            let body = body.clone();
            tokio::spawn(async move {
                federation.fan_out_topic(&store, &host, &topic, &body).await;
            });
        }

        Ok(())
    }

    /// Resolve a host absent from local state by querying peer directories.
    pub async fn find_via_federation(&self, host: &str) -> Result<Value, HdsError> {
        let Some(federation) = &self.federation else {
            return Err(HdsError::new(
                ErrorKind::FederationDisabled,
                "no federation key configured",
            ));
        };

        let peers = self
            .store
            .get_topic_hosts(DIRECTORY_TOPIC, None, SubtopicMatch::Exact)
            .map_err(Self::store_error)?;
        if peers.is_empty() {
            return Err(HdsError::new(
                ErrorKind::FederationNoHosts,
                "no directory peers registered",
            ));
        }

        for peer_host in peers.keys() {
            let Ok(peer_state) = self.store.get_host_state(peer_host) else {
                continue;
            };
            let Some(peer_url) = peer_state.entries.get("hds.directory.url") else {
                continue;
            };
            if peer_state.expired.iter().any(|k| k == "hds.directory.url") {
                continue;
            }
            match federation.get_state(host, &peer_url.value).await {
                Ok(state) => return Ok(state),
                Err(e) => {
                    warn!(peer = %truncate(peer_host), error = ?e, "federation lookup failed");
                    continue;
                }
            }
        }

        Err(HdsError::new(ErrorKind::HostMissing, "host not found via federation"))
    }

    fn store_error(e: StoreError) -> HdsError {
        match e {
            StoreError::Tombstoned => HdsError::new(ErrorKind::HostTombstone, "host is tombstoned"),
            StoreError::HostsNone => HdsError::new(ErrorKind::HostsNone, "no matching host"),
            StoreError::HostsConflict => {
                HdsError::new(ErrorKind::HostsConflict, "ambiguous host prefix")
            }
            StoreError::DbOpen | StoreError::DbIo | StoreError::Corrupt => {
                HdsError::new(ErrorKind::Unknown, "storage backend error")
            }
        }
    }
}

fn truncate(host: &str) -> &str {
    let n = host.len().min(12);
    &host[..n]
}
