//! Traffic notifications reported by nodes through `GET /log`.

use meshsim_engine::{MeshEngine, NodeId};
use serde::{Deserialize, Serialize};

/// Message traffic seen by a node, forwarded to live viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TrafficEvent {
    Receive {
        source: String,
        target: String,
        event: String,
    },
    Sending {
        source: String,
        target: String,
        /// Route the message is expected to take, if both ends are known.
        path: Option<Vec<NodeId>>,
        event: String,
    },
}

/// Query string of a node's log callback.
#[derive(Debug, Clone, Deserialize)]
pub struct LogQuery {
    pub server: String,
    pub msg: String,
    pub event_id: Option<String>,
    pub origin: Option<String>,
    /// JSON array of destination hostnames.
    pub destinations: Option<String>,
}

/// Node id at the end of a hostname such as `synapse3` or `meshsim-node3`.
pub fn node_id_of(hostname: &str) -> Option<NodeId> {
    let digits = hostname.trim_start_matches(|c: char| !c.is_ascii_digit());
    digits.parse().ok().map(NodeId)
}

impl LogQuery {
    /// Events described by this log line. Unknown messages yield nothing.
    pub fn into_events(self, engine: &MeshEngine) -> Vec<TrafficEvent> {
        let event = self.event_id.unwrap_or_default();
        match self.msg.as_str() {
            "ReceivedPDU" => self
                .origin
                .map(|origin| TrafficEvent::Receive {
                    source: origin,
                    target: self.server,
                    event,
                })
                .into_iter()
                .collect(),
            "SendingPDU" => {
                let destinations: Vec<String> = self
                    .destinations
                    .as_deref()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_default();
                destinations
                    .into_iter()
                    .map(|target| {
                        let path = node_id_of(&self.server)
                            .zip(node_id_of(&target))
                            .and_then(|(a, b)| engine.path(a, b).ok().flatten());
                        TrafficEvent::Sending {
                            source: self.server.clone(),
                            target,
                            path,
                            event: event.clone(),
                        }
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshsim_engine::{EngineConfig, MemoryProvider};
    use std::sync::Arc;

    #[test]
    fn hostnames_map_to_ids() {
        assert_eq!(node_id_of("synapse12"), Some(NodeId(12)));
        assert_eq!(node_id_of("meshsim-node0"), Some(NodeId(0)));
        assert_eq!(node_id_of("client"), None);
    }

    #[tokio::test]
    async fn sending_lines_fan_out_with_paths() {
        let engine = MeshEngine::new(Arc::new(MemoryProvider::new()), EngineConfig::fast());
        let a = engine.add_node(0.0, 0.0).await.unwrap();
        let b = engine.add_node(100.0, 0.0).await.unwrap();

        let query = LogQuery {
            server: format!("synapse{a}"),
            msg: "SendingPDU".into(),
            event_id: Some("$ev".into()),
            origin: None,
            destinations: Some(format!(r#"["synapse{b}", "synapse99"]"#)),
        };
        let events = query.into_events(&engine);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            TrafficEvent::Sending {
                source: "synapse0".into(),
                target: "synapse1".into(),
                path: Some(vec![a, b]),
                event: "$ev".into(),
            }
        );
        assert!(matches!(&events[1], TrafficEvent::Sending { path: None, .. }));
    }

    #[test]
    fn receive_line_serializes_like_a_notification() {
        let event = TrafficEvent::Receive {
            source: "synapse0".into(),
            target: "synapse1".into(),
            event: "$ev".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "receive");
        assert_eq!(json["source"], "synapse0");
    }
}
