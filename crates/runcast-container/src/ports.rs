//! Port-mapping strings.
//!
//! Two read shapes are accepted and normalised into [`PortMapping`]:
//!
//! ```text
//! discovery:  80/tcp -> 0.0.0.0:8080      (runtime `port` / inspect output)
//! install:    8080:80/tcp                  (the canonical stored form)
//!             80/tcp                       (container port only)
//! ```
//!
//! Only the install shape is ever written. A mapping without a host port
//! publishes the container port on a runtime-chosen host port.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROTOCOL: &str = "tcp";

const DISCOVERY_ARROW: &str = " -> ";

/// One host ↔ container port binding. Ports are kept as text so that
/// editor rows can hold partially filled values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: String,
    pub container_port: String,
    pub protocol: String,
}

impl PortMapping {
    pub fn new(
        host_port: impl Into<String>,
        container_port: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            host_port: host_port.into(),
            container_port: container_port.into(),
            protocol: protocol.into(),
        }
    }

    /// Parse either read shape. Returns `None` for malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains(DISCOVERY_ARROW) {
            parse_discovery(raw)
        } else {
            parse_install(raw)
        }
    }

    /// Editor → run-spec direction.
    ///
    /// `host:container/proto` with both ports, `container/proto` with only the
    /// container port, `None` when both are empty.
    pub fn to_spec(&self) -> Option<String> {
        let host = self.host_port.trim();
        let container = self.container_port.trim();
        let protocol = match self.protocol.trim() {
            "" => DEFAULT_PROTOCOL,
            p => p,
        };

        match (host.is_empty(), container.is_empty()) {
            (true, true) => None,
            (false, false) => Some(format!("{host}:{container}/{protocol}")),
            (true, false) => Some(format!("{container}/{protocol}")),
            // A host port alone cannot be published; treat as the container port.
            (false, true) => Some(format!("{host}/{protocol}")),
        }
    }
}

impl std::fmt::Display for PortMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host_port.is_empty() {
            write!(f, "{}/{}", self.container_port, self.protocol)
        } else {
            write!(f, "{}:{}/{}", self.host_port, self.container_port, self.protocol)
        }
    }
}

/// `"<containerPort>/<proto> -> <hostAddr>:<hostPort>"`. An empty host port
/// (unbound binding) yields a container-only mapping.
fn parse_discovery(raw: &str) -> Option<PortMapping> {
    let (left, right) = raw.split_once(DISCOVERY_ARROW)?;
    let (container_port, protocol) = split_protocol(left.trim());
    let right = right.trim();
    // IPv6 host addresses contain colons too, so take what follows the last one.
    let host_port = match right.rfind(':') {
        Some(idx) => &right[idx + 1..],
        None => right,
    };

    if container_port.is_empty() {
        return None;
    }
    Some(PortMapping::new(host_port, container_port, protocol))
}

/// `"<hostPort>:<containerPort>/<proto>"` or `"<containerPort>/<proto>"`;
/// anything with more than two colon-separated parts is dropped.
fn parse_install(raw: &str) -> Option<PortMapping> {
    let (ports, protocol) = split_protocol(raw);
    let parts: Vec<&str> = ports.split(':').collect();
    match parts.as_slice() {
        [container] => {
            let container = container.trim();
            is_port_number(container).then(|| PortMapping::new("", container, protocol))
        }
        [host, container] => {
            let (host, container) = (host.trim(), container.trim());
            if host.is_empty() || container.is_empty() {
                return None;
            }
            Some(PortMapping::new(host, container, protocol))
        }
        _ => None,
    }
}

/// A port or `start-end` port range.
fn is_port_number(s: &str) -> bool {
    let mut bounds = s.splitn(2, '-');
    bounds.all(|b| !b.is_empty() && b.bytes().all(|c| c.is_ascii_digit()))
}

fn split_protocol(s: &str) -> (&str, &str) {
    match s.split_once('/') {
        Some((port, proto)) if !proto.trim().is_empty() => (port.trim(), proto.trim()),
        Some((port, _)) => (port.trim(), DEFAULT_PROTOCOL),
        None => (s.trim(), DEFAULT_PROTOCOL),
    }
}

/// Normalise a list of mixed-shape port strings into canonical strings,
/// silently dropping malformed entries.
pub fn normalize_ports<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .filter_map(|p| PortMapping::parse(p.as_ref()))
        .map(|p| p.to_string())
        .collect()
}
