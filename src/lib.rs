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

//! Host Directory Service — a federated directory of signed host state and
//! topic memberships.
//!
//! This crate provides:
//! - Canonical JSON encoding and RSA-PSS/SHA-512 signing and verification
//! - A persistent, TTL-aware, tombstone-respecting host/topic store
//! - An admission pipeline validating and verifying signed payloads
//! - An HTTP-based federation client for peer-to-peer directory sync
//! - An axum HTTP surface implementing the wire protocol
//! - Monitoring via Prometheus metrics and structured logging

/// Startup identity seeding, peer registration, and the TTL refresh loop.
pub mod bootstrap;
/// Typed, environment-driven configuration.
pub mod config;
/// Protocol core: types, errors, keystore, store, and the admission pipeline.
pub mod core;
/// Outbound federation client and fan-out policy.
pub mod federation;
/// The `/_hds` HTTP surface.
pub mod http;
/// Observability (Prometheus metrics).
pub mod monitoring;
