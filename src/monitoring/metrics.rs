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

//! Prometheus metrics. Exposed at `GET /metrics`; not part of the
//! signed-payload protocol itself.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric failed to construct or register.
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry exposed via `GET /metrics`.
    pub registry: Registry,

    /// State writes admitted, by key.
    pub state_writes_total: IntCounter,
    /// State/topic writes rejected, labeled by `hds.error` kind.
    pub admission_rejected_total: IntCounterVec,
    /// Topic membership writes admitted.
    pub topic_writes_total: IntCounter,
    /// Topic query requests served.
    pub topic_queries_total: IntCounter,
    /// Host state keys dropped by the capacity-cap eviction routine.
    pub state_evictions_total: IntCounter,
    /// Outbound federation push attempts, labeled by outcome (`ok`/`err`).
    pub federation_push_total: IntCounterVec,
    /// Known hosts, as of the last refresh.
    pub hosts_known: IntGauge,
}

impl Metrics {
    /// Create and register all metrics on a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let state_writes_total =
            IntCounter::new("hds_state_writes_total", "Accepted state writes")
                .map_err(|_| MetricsError::Prom)?;
        let admission_rejected_total = IntCounterVec::new(
            Opts::new("hds_admission_rejected_total", "Rejected writes by error kind"),
            &["kind"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let topic_writes_total =
            IntCounter::new("hds_topic_writes_total", "Accepted topic membership writes")
                .map_err(|_| MetricsError::Prom)?;
        let topic_queries_total =
            IntCounter::new("hds_topic_queries_total", "Topic query requests served")
                .map_err(|_| MetricsError::Prom)?;
        let state_evictions_total = IntCounter::new(
            "hds_state_evictions_total",
            "State keys dropped by capacity-cap eviction",
        )
        .map_err(|_| MetricsError::Prom)?;
        let federation_push_total = IntCounterVec::new(
            Opts::new("hds_federation_push_total", "Outbound federation pushes by outcome"),
            &["outcome"],
        )
        .map_err(|_| MetricsError::Prom)?;
        let hosts_known =
            IntGauge::new("hds_hosts_known", "Hosts known to this directory")
                .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(state_writes_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(admission_rejected_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(topic_writes_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(topic_queries_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(state_evictions_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(federation_push_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(hosts_known.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            state_writes_total,
            admission_rejected_total,
            topic_writes_total,
            topic_queries_total,
            state_evictions_total,
            federation_push_total,
            hosts_known,
        })
    }

    /// Render the current metric values as Prometheus text exposition.
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_without_collision() {
        let m = Metrics::new().unwrap();
        m.state_writes_total.inc();
        m.admission_rejected_total
            .with_label_values(&["hds.error.payload.bad_signature"])
            .inc();
        let rendered = m.render();
        assert!(rendered.contains("hds_state_writes_total"));
        assert!(rendered.contains("hds_admission_rejected_total"));
    }
}
