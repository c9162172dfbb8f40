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

//! Startup seeding of this node's own identity state, registration with
//! configured peers, and the periodic refresh loop that keeps remote TTLs
//! from lapsing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::core::security::keystore::Keystore;
use crate::core::store::Store;
use crate::core::types::{Payload, MAX_TTL_SEC};
use crate::federation::{own_identity_entries, FederationClient};

const REGISTER_MAX_ATTEMPTS: u32 = 5;
const REGISTER_BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Write this node's own long-lived identity entries into the local store,
/// signed under its own key, at `MAX_TTL_SEC`.
pub fn seed_own_identity(store: &Store, keystore: &Keystore, config: &Config) {
    let server_key = keystore.server_key();
    let entries = own_identity_entries(
        &config.node.advertised_host,
        &config.node.name,
        config.node.contact_name.as_deref(),
        config.node.contact_email.as_deref(),
        config.node.directory_url.as_deref(),
    );

    for (key, value) in entries {
        let mut payload: Payload = serde_json::Map::new();
        payload.insert("hds.ttl".to_string(), serde_json::json!(MAX_TTL_SEC));
        payload.insert(key.to_string(), serde_json::json!(value.clone()));
        if let Err(e) = keystore.sign_payload(&mut payload) {
            warn!(key = %key, error = ?e, "failed to sign own identity entry");
            continue;
        }
        let signature = payload
            .get("hds.signature")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if let Err(e) = store.store_host_state(server_key, key, &value, MAX_TTL_SEC, signature, None) {
            warn!(key = %key, error = ?e, "failed to seed own identity entry locally");
        }
    }

    info!(server_key = %truncate(server_key), "seeded own identity state");
}

/// Register with every configured peer: push this node's identity entries,
/// then join the well-known `hds.directory` topic. Retries each peer with a
/// short jittered backoff rather than a fixed sleep, so a peer still
/// starting up isn't treated as permanently unreachable.
pub async fn register_with_peers(federation: &FederationClient, config: &Config) {
    for peer in &config.federation.register_hosts {
        register_with_backoff(federation, config, peer).await;
    }
}

async fn register_with_backoff(federation: &FederationClient, config: &Config, peer: &str) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = register_once(federation, config, peer).await;
        match result {
            Ok(()) => {
                info!(peer = %peer, "federation registration succeeded");
                return;
            }
            Err(e) if attempt >= REGISTER_MAX_ATTEMPTS => {
                warn!(peer = %peer, error = ?e, attempt, "federation registration gave up");
                return;
            }
            Err(e) => {
                let backoff = REGISTER_BASE_BACKOFF * attempt;
                warn!(peer = %peer, error = ?e, attempt, backoff = ?backoff, "federation registration retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn register_once(
    federation: &FederationClient,
    config: &Config,
    peer: &str,
) -> Result<(), crate::federation::FederationError> {
    let entries = own_identity_entries(
        &config.node.advertised_host,
        &config.node.name,
        config.node.contact_name.as_deref(),
        config.node.contact_email.as_deref(),
        config.node.directory_url.as_deref(),
    );
    for (key, value) in &entries {
        federation.send_state(key, value, MAX_TTL_SEC, peer).await?;
    }
    federation.put_topic("hds.directory", &[], peer).await
}

/// Re-issue the identity writes to every registered peer every
/// `MAX_TTL_SEC - 60s`, so at least one refresh precedes expiry under
/// normal clock drift. Runs until the process exits.
pub async fn refresh_loop(federation: Arc<FederationClient>, config: Arc<Config>) {
    let period = Duration::from_secs((MAX_TTL_SEC - 60).max(60) as u64);
    loop {
        tokio::time::sleep(period).await;
        info!("refreshing federation registrations");
        register_with_peers(&federation, &config).await;
    }
}

fn truncate(host: &str) -> &str {
    let n = host.len().min(12);
    &host[..n]
}
