//! Synapse homeservers: container lifecycle plus a shared room for traffic.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use meshsim_engine::{
    ClientHealth, Error, HealthPayload, NodeAddress, NodeId, NodeProvider, Result, RouteEntry,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::script::{port_for, ScriptProvider};
use crate::config::ServerConfig;

/// Attempts per room operation.
const ROOM_ATTEMPTS: u32 = 5;
const ACCESS_TOKEN: &str = "fake_token";
const ROOM_ALIAS: &str = "test";

#[derive(Debug, Default)]
struct Room {
    id: Option<String>,
    joined: BTreeSet<NodeId>,
}

#[derive(Debug, Deserialize)]
struct RoomResponse {
    room_id: Option<String>,
    errcode: Option<String>,
    error: Option<String>,
}

impl RoomResponse {
    fn parse(raw: &str) -> Result<String> {
        let resp: RoomResponse =
            serde_json::from_str(raw).map_err(|e| Error::Provider(format!("bad response: {e}")))?;
        match (resp.room_id, resp.errcode) {
            (Some(room_id), None) => Ok(room_id),
            (_, errcode) => Err(Error::Provider(format!(
                "{}: {}",
                errcode.unwrap_or_else(|| "M_UNKNOWN".to_string()),
                resp.error.unwrap_or_default()
            ))),
        }
    }
}

pub struct SynapseProvider {
    nodes: ScriptProvider,
    client_port_base: u16,
    retry_delay: Duration,
    room: Mutex<Room>,
}

impl SynapseProvider {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            nodes: ScriptProvider::new(config, "synapse/start_node.sh", "synapse"),
            client_port_base: config.client_port_base,
            retry_delay: config.retry_delay,
            room: Mutex::new(Room::default()),
        }
    }

    pub fn nodes(&self) -> &ScriptProvider {
        &self.nodes
    }

    fn client_url(&self, id: NodeId, path: &str) -> Result<String> {
        let port = port_for(self.client_port_base, id)?;
        Ok(format!(
            "http://localhost:{port}/_matrix/client/r0/{path}?access_token={ACCESS_TOKEN}"
        ))
    }

    async fn create_room(&self, creator: NodeId) -> Result<String> {
        let url = self.client_url(creator, "createRoom")?;
        let body = serde_json::json!({"preset": "public_chat", "room_alias_name": ROOM_ALIAS});
        let client = self.nodes.client();
        let (url, body) = (url.as_str(), &body);
        let raw = attempts(ROOM_ATTEMPTS, self.retry_delay, "create room", move || async move {
            let raw = client
                .post(url, body)
                .await
                .map_err(|e| Error::unavailable(creator, e))?;
            RoomResponse::parse(&raw)
        })
        .await?;
        Ok(raw)
    }

    async fn join_room(&self, id: NodeId, room_id: &str) -> Result<()> {
        // Room ids hold no characters that need escaping in a path segment.
        let url = self.client_url(id, &format!("join/{room_id}"))?;
        let client = self.nodes.client();
        let url = url.as_str();
        attempts(ROOM_ATTEMPTS, self.retry_delay, "join room", move || async move {
            let raw = client
                .post(url, &serde_json::json!({}))
                .await
                .map_err(|e| Error::unavailable(id, e))?;
            RoomResponse::parse(&raw).map(|_| ())
        })
        .await
    }
}

/// Run `op` up to `limit` times, sleeping `delay` between failures.
async fn attempts<T, F, Fut>(limit: u32, delay: Duration, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < limit => {
                warn!(attempt, error = %e, "Failed to {what}, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl NodeProvider for SynapseProvider {
    async fn start(&self, id: NodeId, host: &str) -> Result<NodeAddress> {
        self.nodes.start(id, host).await
    }

    async fn stop(&self, id: NodeId) -> Result<()> {
        self.room.lock().await.joined.remove(&id);
        self.nodes.stop(id).await
    }

    async fn push_routes(&self, id: NodeId, routes: &[RouteEntry]) -> Result<String> {
        self.nodes.push_routes(id, routes).await
    }

    async fn push_health(&self, id: NodeId, health: &HealthPayload) -> Result<String> {
        self.nodes.push_health(id, health).await
    }

    async fn set_client_health(&self, clients: &[ClientHealth]) -> Result<()> {
        self.nodes.set_client_health(clients).await
    }

    /// Create the shared room on the first node, then join every node not yet in it.
    async fn bootstrap(&self, nodes: &[NodeId]) -> Result<()> {
        let mut room = self.room.lock().await;

        let room_id = match &room.id {
            Some(id) => id.clone(),
            None => {
                let creator = *nodes
                    .first()
                    .ok_or_else(|| Error::Provider("no started nodes".to_string()))?;
                let id = self.create_room(creator).await?;
                info!(room = %id, node = %creator, "Created room");
                room.id = Some(id.clone());
                room.joined.insert(creator);
                id
            }
        };

        for &node in nodes {
            if room.joined.contains(&node) {
                continue;
            }
            self.join_room(node, &room_id).await?;
            info!(room = %room_id, %node, "Joined room");
            room.joined.insert(node);
        }
        Ok(())
    }

    async fn send_message(&self, id: NodeId, message: &str) -> Result<()> {
        let room_id = self
            .room
            .lock()
            .await
            .id
            .clone()
            .ok_or_else(|| Error::Provider("mesh not bootstrapped".to_string()))?;

        let url = self.client_url(id, &format!("rooms/{room_id}/send/m.room.message"))?;
        let body = serde_json::json!({"body": message, "msgtype": "m.text"});
        let client = self.nodes.client();
        let (url, body) = (url.as_str(), &body);
        attempts(ROOM_ATTEMPTS, self.retry_delay, "send message", move || async move {
            client
                .post(url, body)
                .await
                .map(|_| ())
                .map_err(|e| Error::unavailable(id, e))
        })
        .await
    }

    fn hostname(&self, id: NodeId) -> String {
        self.nodes.hostname(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn room_response_parses_success_and_errors() {
        assert_eq!(
            RoomResponse::parse(r##"{"room_id": "!abc:synapse0", "room_alias": "#test:synapse0"}"##)
                .unwrap(),
            "!abc:synapse0"
        );
        let err = RoomResponse::parse(r#"{"errcode": "M_FORBIDDEN", "error": "nope"}"#).unwrap_err();
        assert!(err.to_string().contains("M_FORBIDDEN"));
        assert!(RoomResponse::parse("not json").is_err());
    }

    #[test]
    fn client_urls_carry_the_token() {
        let provider = SynapseProvider::new(&ServerConfig::default());
        assert_eq!(
            provider.client_url(NodeId(2), "createRoom").unwrap(),
            "http://localhost:18002/_matrix/client/r0/createRoom?access_token=fake_token"
        );
        assert_eq!(provider.hostname(NodeId(2)), "synapse2");
    }

    #[tokio::test]
    async fn attempts_stop_at_the_limit() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = attempts(5, Duration::from_millis(1), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::Provider("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn attempts_return_first_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = attempts(5, Duration::from_millis(1), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Provider("down".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn messages_need_a_bootstrapped_room() {
        let provider = SynapseProvider::new(&ServerConfig::default());
        assert!(matches!(
            provider.send_message(NodeId(0), "hi").await,
            Err(Error::Provider(_))
        ));
        assert!(matches!(provider.bootstrap(&[]).await, Err(Error::Provider(_))));
    }
}
