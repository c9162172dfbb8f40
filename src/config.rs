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

//! Typed, environment-driven configuration, loaded once at startup.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No private key source (path or inline data) was configured.
    #[error("no private key configured: set HDS_KEY_PATH or HDS_KEY_DATA")]
    MissingKey,
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Where to load this node's RSA private key from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum KeySource {
    /// Path to a PKCS#8 DER-encoded private key file.
    Path(String),
    /// Base64-encoded PKCS#8 DER private key bytes, passed inline.
    Inline(String),
}

/// Node identity and storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Where to load the private key from.
    pub key_source: KeySource,
    /// Reserved for encrypted key material; unused until a key format needs it.
    pub key_password: Option<String>,
    /// This directory's own advertised host string (`hds.host` value).
    pub advertised_host: String,
    /// Human-readable directory name (`hds.name`).
    pub name: String,
    /// Optional contact name (`hds.contact.name`).
    pub contact_name: Option<String>,
    /// Optional contact email (`hds.contact.email`).
    pub contact_email: Option<String>,
    /// This directory's own externally reachable base URL (`hds.directory.url`).
    pub directory_url: Option<String>,
    /// Sled database directory.
    pub data_dir: String,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, e.g. `0.0.0.0:8080`.
    pub listen_addr: String,
    /// TLS certificate path; presence of both this and `tls_key_path` enables TLS.
    pub tls_cert_path: Option<String>,
    /// TLS private key path.
    pub tls_key_path: Option<String>,
}

/// Federation peer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Base URLs of peers to register with at bootstrap (`REGISTER_HOSTS`).
    pub register_hosts: Vec<String>,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    /// `RUST_LOG`-style filter directive, e.g. `info` or `hds=debug,info`.
    pub level: String,
    /// `"json"` or `"compact"`.
    pub format: String,
}

/// Full node configuration, assembled once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Node identity and storage settings.
    pub node: NodeSettings,
    /// HTTP listener settings.
    pub http: HttpConfig,
    /// Federation peer settings.
    pub federation: FederationConfig,
    /// Logging settings.
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the process environment. Fails fast if no
    /// private key source is configured; every other field has an explicit
    /// default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let key_source = match (env_opt("HDS_KEY_PATH"), env_opt("HDS_KEY_DATA")) {
            (Some(path), _) => KeySource::Path(path),
            (None, Some(data)) => KeySource::Inline(data),
            (None, None) => return Err(ConfigError::MissingKey),
        };

        let register_hosts = env_opt("REGISTER_HOSTS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            node: NodeSettings {
                key_source,
                key_password: env_opt("HDS_KEY_PASSWORD"),
                advertised_host: env("HDS_ADVERTISED_HOST", "localhost"),
                name: env("HDS_NAME", "hds-directory"),
                contact_name: env_opt("HDS_CONTACT_NAME"),
                contact_email: env_opt("HDS_CONTACT_EMAIL"),
                directory_url: env_opt("HDS_DIRECTORY_URL"),
                data_dir: env("HDS_DATA_DIR", "./data"),
            },
            http: HttpConfig {
                listen_addr: env("HDS_LISTEN_ADDR", "0.0.0.0:8080"),
                tls_cert_path: env_opt("HDS_TLS_CERT_PATH"),
                tls_key_path: env_opt("HDS_TLS_KEY_PATH"),
            },
            federation: FederationConfig { register_hosts },
            log: LogConfig {
                level: env("HDS_LOG_LEVEL", "info"),
                format: env("HDS_LOG_FORMAT", "compact"),
            },
        })
    }

    /// Whether both TLS cert and key paths are configured.
    pub fn tls_enabled(&self) -> bool {
        self.http.tls_cert_path.is_some() && self.http.tls_key_path.is_some()
    }
}
