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

//! Protocol core: canonical types, the error taxonomy, key management, the
//! persistent store, and the admission pipeline that ties them together.

/// The `hds.error.*` taxonomy and its HTTP status mapping.
pub mod error;
/// Signed-payload admission: `put_state`, `put_topic`, `find_via_federation`.
pub mod handler;
/// RSA-PSS keystore: signing and verification over canonical JSON.
pub mod security;
/// Persistent host/topic store.
pub mod store;
/// Deterministic core types and canonical encoding helpers.
pub mod types;
