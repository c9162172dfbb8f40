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

//! Outbound federation: pushing signed state/topic updates to peer
//! directories, and reading from them when a host isn't known locally.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::security::keystore::Keystore;
use crate::core::store::{Store, SubtopicMatch};
use crate::core::types::{Payload, StateRecord, DIRECTORY_TOPIC, HOST_KEY, SIGNATURE_FIELD};
use crate::monitoring::metrics::Metrics;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Federation client errors.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The underlying HTTP request failed (connect, TLS, timeout, ...).
    #[error("transport")]
    Transport,
    /// The peer answered but not with a well-formed JSON body.
    #[error("bad response")]
    BadResponse,
    /// The peer answered with a non-2xx status.
    #[error("peer rejected request")]
    Rejected,
    /// Signing the outbound payload failed.
    #[error("signing")]
    Signing,
}

/// Outbound client parameterised by this directory's own key pair.
pub struct FederationClient {
    http: reqwest::Client,
    own_key: Arc<Keystore>,
    metrics: Arc<Metrics>,
}

impl FederationClient {
    /// Build a client signing outbound state as `own_key`.
    pub fn new(own_key: Arc<Keystore>, metrics: Arc<Metrics>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            own_key,
            metrics,
        }
    }

    fn state_url(peer_baseurl: &str, host: &str, key: &str) -> String {
        format!(
            "{}/_hds/hosts/{}/state/{}",
            peer_baseurl.trim_end_matches('/'),
            host,
            key
        )
    }

    fn topic_url(peer_baseurl: &str, host: &str, topic: &str) -> String {
        format!(
            "{}/_hds/hosts/{}/topic/{}",
            peer_baseurl.trim_end_matches('/'),
            host,
            topic
        )
    }

    /// Sign `{"hds.ttl": ttl, key: value}` as this node and PUT it to `peer_baseurl`.
    pub async fn send_state(
        &self,
        key: &str,
        value: &str,
        ttl: i64,
        peer_baseurl: &str,
    ) -> Result<(), FederationError> {
        let mut payload: Payload = match json!({ "hds.ttl": ttl, key: value }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        self.own_key
            .sign_payload(&mut payload)
            .map_err(|_| FederationError::Signing)?;
        let url = Self::state_url(peer_baseurl, self.own_key.server_key(), key);
        self.put_json(&url, &payload).await
    }

    /// Forward an already-signed state payload on behalf of `host_identity`
    /// (the signature is theirs, not this node's).
    pub async fn send_state_payload(
        &self,
        key: &str,
        payload: &Payload,
        host_identity: &str,
        peer_baseurl: &str,
    ) -> Result<(), FederationError> {
        let url = Self::state_url(peer_baseurl, host_identity, key);
        self.put_json(&url, payload).await
    }

    /// Sign `{topic: subtopics}` as this node and PUT it to `peer_baseurl`.
    pub async fn put_topic(
        &self,
        topic: &str,
        subtopics: &[String],
        peer_baseurl: &str,
    ) -> Result<(), FederationError> {
        let mut payload: Payload = match json!({ topic: subtopics }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        self.own_key
            .sign_payload(&mut payload)
            .map_err(|_| FederationError::Signing)?;
        let url = Self::topic_url(peer_baseurl, self.own_key.server_key(), topic);
        self.put_json(&url, &payload).await
    }

    /// Forward an already-signed topic payload on behalf of `host_identity`.
    pub async fn put_topic_payload(
        &self,
        topic: &str,
        payload: &Payload,
        host_identity: &str,
        peer_baseurl: &str,
    ) -> Result<(), FederationError> {
        let url = Self::topic_url(peer_baseurl, host_identity, topic);
        self.put_json(&url, payload).await
    }

    async fn put_json(&self, url: &str, payload: &Payload) -> Result<(), FederationError> {
        let result = self.put_json_inner(url, payload).await;
        let outcome = if result.is_ok() { "ok" } else { "err" };
        self.metrics
            .federation_push_total
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn put_json_inner(&self, url: &str, payload: &Payload) -> Result<(), FederationError> {
        let resp = self
            .http
            .put(url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|_| FederationError::Transport)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(FederationError::Rejected)
        }
    }

    /// Read a host's full state from a peer.
    pub async fn get_state(
        &self,
        host: &str,
        peer_baseurl: &str,
    ) -> Result<Value, FederationError> {
        let url = format!(
            "{}/_hds/hosts/{}",
            peer_baseurl.trim_end_matches('/'),
            host
        );
        self.get_json(&url).await
    }

    /// Read a topic's host membership from a peer, optionally filtered by subtopics.
    pub async fn get_topic(
        &self,
        topic: &str,
        subtopics: &[String],
        peer_baseurl: &str,
    ) -> Result<Value, FederationError> {
        let mut url = format!("{}/_hds/topics/{}", peer_baseurl.trim_end_matches('/'), topic);
        for s in subtopics {
            url.push('/');
            url.push_str(s);
        }
        self.get_json(&url).await
    }

    /// List every topic a peer knows about.
    pub async fn get_topics(&self, peer_baseurl: &str) -> Result<Value, FederationError> {
        let url = format!("{}/_hds/topics", peer_baseurl.trim_end_matches('/'));
        self.get_json(&url).await
    }

    /// Fetch a peer's identity claim.
    pub async fn identify(&self, peer_baseurl: &str) -> Result<Value, FederationError> {
        let url = format!("{}/_hds/identify", peer_baseurl.trim_end_matches('/'));
        self.get_json(&url).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, FederationError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|_| FederationError::Transport)?;
        if !resp.status().is_success() {
            return Err(FederationError::Rejected);
        }
        resp.json::<Value>()
            .await
            .map_err(|_| FederationError::BadResponse)
    }

    /// Fan out a freshly-accepted topic membership to every peer directory
    /// this node knows (members of `hds.directory`), forwarding the
    /// originator's `hds.host` state ahead of the topic payload itself.
    /// Each peer is attempted independently; failures are logged, never
    /// propagated.
    pub async fn fan_out_topic(
        &self,
        store: &Store,
        originator: &str,
        topic: &str,
        topic_payload: &Payload,
    ) {
        let peers = match store.get_topic_hosts(DIRECTORY_TOPIC, None, SubtopicMatch::Exact) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = ?e, "could not enumerate directory peers for fan-out");
                return;
            }
        };

        for peer_host in peers.keys() {
            if peer_host == originator {
                continue;
            }
            let Some(peer_url) = self.peer_directory_url(store, peer_host) else {
                continue;
            };

            if let Some(host_payload) = self.reconstruct_host_payload(store, originator) {
                if let Err(e) = self
                    .send_state_payload(HOST_KEY, &host_payload, originator, &peer_url)
                    .await
                {
                    warn!(peer = %peer_host, error = ?e, "federation push of hds.host failed");
                }
            }

            if let Err(e) = self
                .put_topic_payload(topic, topic_payload, originator, &peer_url)
                .await
            {
                warn!(peer = %peer_host, error = ?e, "federation push of topic failed");
            } else {
                info!(peer = %peer_host, topic = %topic, "forwarded topic to federation peer");
            }
        }
    }

    fn peer_directory_url(&self, store: &Store, peer_host: &str) -> Option<String> {
        let state = store.get_host_state(peer_host).ok()?;
        if state.expired.iter().any(|k| k == "hds.directory.url") {
            return None;
        }
        state
            .entries
            .get("hds.directory.url")
            .map(|r| r.value.clone())
    }

    fn reconstruct_host_payload(&self, store: &Store, host: &str) -> Option<Payload> {
        let state = store.get_host_state(host).ok()?;
        let record: &StateRecord = state.entries.get(HOST_KEY)?;
        Some(match json!({
            "hds.ttl": record.ttl,
            HOST_KEY: record.value,
            SIGNATURE_FIELD: record.signature,
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        })
    }
}

/// This node's own long-lived state entries at bootstrap: identity, name,
/// optional contact, directory URL, and node type, all written at
/// `MAX_TTL_SEC`. Does not touch `keystore` directly — callers sign each
/// entry themselves via [`Keystore::sign_payload`] before storing it.
pub fn own_identity_entries(
    advertised_host: &str,
    name: &str,
    contact_name: Option<&str>,
    contact_email: Option<&str>,
    directory_url: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut entries = vec![
        (HOST_KEY, advertised_host.to_string()),
        ("hds.name", name.to_string()),
        ("hds.type", "hds.directory".to_string()),
    ];
    if let Some(c) = contact_name {
        entries.push(("hds.contact.name", c.to_string()));
    }
    if let Some(c) = contact_email {
        entries.push(("hds.contact.email", c.to_string()));
    }
    if let Some(u) = directory_url {
        entries.push(("hds.directory.url", u.to_string()));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn own_identity_entries_include_required_fields() {
        let entries = own_identity_entries(
            "dir.example.com",
            "Example Directory",
            None,
            None,
            Some("https://dir.example.com"),
        );
        let keys: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&HOST_KEY));
        assert!(keys.contains(&"hds.type"));
        assert!(keys.contains(&"hds.directory.url"));
    }
}
