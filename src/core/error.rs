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

//! The `hds.error.*` error taxonomy shared by every layer, and its mapping
//! onto HTTP status codes for the wire envelope.

use std::fmt;

/// One of the wire-level `hds.error` kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request had no `Content-Type` header.
    HeadersMissing,
    /// Request had an unsupported `Content-Type`.
    HeadersUnsupported,
    /// A required payload field was absent.
    PayloadMissingKey,
    /// A payload field had the wrong JSON type.
    PayloadBadType,
    /// `hds.ttl` was out of range or the wrong type.
    PayloadBadTtl,
    /// State key or topic name longer than `MAX_KEY_SIZE`.
    PayloadKeyTooLong,
    /// State key or topic name shorter than `MIN_KEY_SIZE`.
    PayloadKeyTooShort,
    /// State value longer than `MAX_VALUE_SIZE`.
    PayloadBodyTooLong,
    /// State value shorter than 1 byte.
    PayloadBodyTooShort,
    /// Signature failed to decode or verify.
    PayloadBadSignature,
    /// Host identifier decodes but is not an RSA key.
    ServernameNotRsa,
    /// Write refused: host has no live `hds.host` and this update isn't one.
    StateNoHost,
    /// Host is unknown to the store.
    HostMissing,
    /// Host's `hds.host` entry has expired.
    HostExpired,
    /// Host has been tombstoned; all writes are rejected.
    HostTombstone,
    /// No host matches the given prefix.
    HostsNone,
    /// More than one host matches the given prefix.
    HostsConflict,
    /// No such topic is known.
    TopicMissing,
    /// This node has no federation key configured.
    FederationDisabled,
    /// No `hds.directory` peers are registered.
    FederationNoHosts,
    /// Key material could not be loaded.
    BadKey,
    /// Catch-all for unexpected/internal failures.
    Unknown,
}

impl ErrorKind {
    /// The wire string used as the `hds.error` field value.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::HeadersMissing => "hds.error.headers.missing",
            ErrorKind::HeadersUnsupported => "hds.error.headers.unsupported",
            ErrorKind::PayloadMissingKey => "hds.error.payload.missing_key",
            ErrorKind::PayloadBadType => "hds.error.payload.bad_type",
            ErrorKind::PayloadBadTtl => "hds.error.payload.bad_ttl",
            ErrorKind::PayloadKeyTooLong => "hds.error.payload.key_too_long",
            ErrorKind::PayloadKeyTooShort => "hds.error.payload.key_too_short",
            ErrorKind::PayloadBodyTooLong => "hds.error.payload.body_too_long",
            ErrorKind::PayloadBodyTooShort => "hds.error.payload.body_too_short",
            ErrorKind::PayloadBadSignature => "hds.error.payload.bad_signature",
            ErrorKind::ServernameNotRsa => "hds.error.servername.not_rsa",
            ErrorKind::StateNoHost => "hds.error.state.no_host",
            ErrorKind::HostMissing => "hds.error.host.missing",
            ErrorKind::HostExpired => "hds.error.host.expired",
            ErrorKind::HostTombstone => "hds.error.host.tombstone",
            ErrorKind::HostsNone => "hds.error.hosts.none",
            ErrorKind::HostsConflict => "hds.error.hosts.conflict",
            ErrorKind::TopicMissing => "hds.error.topic.missing",
            ErrorKind::FederationDisabled => "hds.error.federation.disabled",
            ErrorKind::FederationNoHosts => "hds.error.federation.no_hosts",
            ErrorKind::BadKey => "hds.error.badkey",
            ErrorKind::Unknown => "hds.error.unknown",
        }
    }

    /// The HTTP status code the surface should answer with for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::HostMissing | ErrorKind::HostsNone | ErrorKind::TopicMissing => 404,
            ErrorKind::Unknown => 500,
            _ => 400,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure carrying both a human message and a wire-level [`ErrorKind`].
#[derive(Debug)]
pub struct HdsError {
    /// Human-readable description (goes into `hds.error.text`).
    pub message: String,
    /// The wire-level error kind (goes into `hds.error`).
    pub kind: ErrorKind,
}

impl HdsError {
    /// Construct a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for HdsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.as_str())
    }
}

impl std::error::Error for HdsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorKind::HostMissing.http_status(), 404);
        assert_eq!(ErrorKind::HostsNone.http_status(), 404);
        assert_eq!(ErrorKind::TopicMissing.http_status(), 404);
        assert_eq!(ErrorKind::Unknown.http_status(), 500);
        assert_eq!(ErrorKind::PayloadBadSignature.http_status(), 400);
    }

    #[test]
    fn display_includes_kind() {
        let e = HdsError::new(ErrorKind::PayloadBadSignature, "nope");
        assert_eq!(e.to_string(), "nope (hds.error.payload.bad_signature)");
    }
}
