mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::ScriptedTransport;
use field_relay::commands::{router, AppState};
use field_relay::node::NodeManager;
use field_relay::serial::Correlator;
use field_relay::storage::MemoryStore;
use serde_json::{json, Value};

const REPLY_DELAY: Duration = Duration::from_millis(20);

struct TestServer {
    base: String,
    events: Arc<Mutex<Vec<String>>>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(transport: ScriptedTransport) -> Self {
        let events = transport.events();
        let correlator = Correlator::with_timing(
            Box::new(transport),
            Duration::from_millis(300),
            Duration::from_millis(10),
        );
        let manager = NodeManager::new(
            Arc::new(correlator),
            Arc::new(MemoryStore::new()),
            vec![1, 2],
        );
        let app = router(AppState {
            manager: Arc::new(manager),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            events,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    fn writes(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix("write ").map(str::to_string))
            .collect()
    }
}

fn answering_nodes() -> ScriptedTransport {
    ScriptedTransport::new()
        .reply("REQUEST_NODE_1", REPLY_DELAY, "Node 1 | M:512, H:55.0, T:24.3, P:ON")
        .reply("REQUEST_PUMP_NODE_1", REPLY_DELAY, "PUMP_STATUS_NODE_1:ON")
        .reply("REQUEST_TANK_THRESHOLD", REPLY_DELAY, "TANK_THRESHOLD:42.5")
}

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start(ScriptedTransport::new()).await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn live_fetch_is_persisted_and_served_newest_first() {
    let server = TestServer::start(answering_nodes()).await;

    let (status, body) = server.get("/periodic-data/1").await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["moisture"], 512);
    assert_eq!(body["data"]["pump_status"], "ON");

    let (status, body) = server
        .post(
            "/send-data",
            json!({"node_id": 1, "soil_moisture": 600, "temperature": 21.0, "humidity": 48.5}),
        )
        .await;
    assert_eq!(status, 201, "{}", body);

    let (status, body) = server.get("/node-data/1").await;
    assert_eq!(status, 200);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["moisture"], 600);
    assert_eq!(data[0]["pump_status"], "OFF");
    assert_eq!(data[1]["moisture"], 512);
    assert_eq!(data[1]["humidity"], 55.0);
    assert_eq!(data[1]["temperature"], 24.3);

    assert_eq!(server.writes(), vec!["REQUEST_NODE_1".to_string()]);
}

#[tokio::test]
async fn node_history_is_capped_at_five() {
    let server = TestServer::start(ScriptedTransport::new()).await;
    for moisture in 0..7 {
        let (status, _) = server
            .post(
                "/send-data",
                json!({"node_id": 2, "soil_moisture": moisture, "temperature": 20.0, "humidity": 50.0, "pump_status": "ON"}),
            )
            .await;
        assert_eq!(status, 201);
    }

    let (_, body) = server.get("/node-data/2").await;
    let moistures: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["moisture"].as_i64().unwrap())
        .collect();
    assert_eq!(moistures, vec![6, 5, 4, 3, 2]);

    let (_, body) = server.get("/all-node-data").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn send_data_rejects_incomplete_bodies() {
    let server = TestServer::start(ScriptedTransport::new()).await;

    let (status, body) = server
        .post("/send-data", json!({"node_id": 1, "soil_moisture": 400, "temperature": 20.5}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Missing 'humidity' parameter");

    let (status, body) = server
        .post("/send-data", json!({"node_id": "one", "soil_moisture": 400}))
        .await;
    assert_eq!(status, 400);
    assert!(body["message"].as_str().unwrap().starts_with("Invalid data format"));

    let (_, body) = server.get("/all-node-data").await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_node_has_no_history() {
    let server = TestServer::start(ScriptedTransport::new()).await;
    let (status, body) = server.get("/node-data/9").await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "No data found for node_id 9");
}

#[tokio::test]
async fn silent_node_yields_gateway_timeout() {
    let server = TestServer::start(ScriptedTransport::new()).await;

    let (status, body) = server.get("/periodic-data/2").await;
    assert_eq!(status, 504);
    assert_eq!(body["status"], "error");

    let (status, _) = server.get("/pump-status/2").await;
    assert_eq!(status, 504);

    let (_, metrics) = server.get("/link-metrics").await;
    assert_eq!(metrics["timeouts"], 2);
    assert_eq!(metrics["commands_sent"], 2);
}

#[tokio::test]
async fn sweep_reports_each_node() {
    let server = TestServer::start(answering_nodes()).await;

    let (status, body) = server.post("/get-data-from-nodes", json!({})).await;
    assert_eq!(status, 200);
    let reports = body["data"].as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["node_id"], 1);
    assert_eq!(reports[0]["status"], "success");
    assert_eq!(reports[0]["data"]["moisture"], 512);
    assert_eq!(reports[1]["node_id"], 2);
    assert_eq!(reports[1]["status"], "no_response");

    assert_eq!(
        server.writes(),
        vec!["REQUEST_NODE_1".to_string(), "REQUEST_NODE_2".to_string()]
    );
}

#[tokio::test]
async fn pump_and_tank_queries() {
    let server = TestServer::start(answering_nodes()).await;

    let (status, body) = server.get("/pump-status/1").await;
    assert_eq!(status, 200);
    assert_eq!(body["node_id"], 1);
    assert_eq!(body["isPumpOn"], true);

    let (status, body) = server.get("/tank-threshold").await;
    assert_eq!(status, 200);
    assert_eq!(body["threshold"], 42.5);
}

#[tokio::test]
async fn set_commands_are_written_without_waiting() {
    let server = TestServer::start(ScriptedTransport::new()).await;

    let (status, body) = server
        .post("/toggle-pump-status", json!({"node_id": 2, "status": true}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Pump for Node 2 turned On");

    let (status, body) = server
        .post("/set-threshold", json!({"node_id": 1, "threshold_moisture": 450}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Threshold 450 set for Node 1");

    let (status, body) = server
        .post("/toggle-pump-status", json!({"node_id": 2}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Missing 'status' parameter");

    assert_eq!(
        server.writes(),
        vec!["PUMP_NODE_2:ON".to_string(), "THRESHOLD_NODE_1:450".to_string()]
    );

    let (_, metrics) = server.get("/link-metrics").await;
    assert_eq!(metrics["timeouts"], 0);
}

#[tokio::test]
async fn radio_reading_is_newest_after_a_sweep() {
    let server = TestServer::start(answering_nodes()).await;

    let (status, _) = server
        .post(
            "/send-data",
            json!({"node_id": 1, "soil_moisture": 600, "temperature": 21.0, "humidity": 48.5}),
        )
        .await;
    assert_eq!(status, 201);

    let (status, _) = server.post("/get-data-from-nodes", json!({})).await;
    assert_eq!(status, 200);

    let (status, body) = server.get("/node-data/1").await;
    assert_eq!(status, 200);
    let newest = &body["data"][0];
    assert_eq!(newest["node_id"], 1);
    assert_eq!(newest["moisture"], 512);
    assert_eq!(newest["humidity"], 55.0);
    assert_eq!(newest["temperature"], 24.3);
    assert_eq!(newest["pump_status"], "ON");
    assert_eq!(body["data"][1]["moisture"], 600);
}

#[tokio::test]
async fn malformed_node_ids_get_json_errors() {
    let server = TestServer::start(ScriptedTransport::new()).await;

    for path in ["/node-data/abc", "/node-data/70000", "/pump-status/-1", "/periodic-data/x"] {
        let resp = server.client.get(server.url(path)).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 400, "{}", path);
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("application/json"), "{} gave {}", path, content_type);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().starts_with("Invalid node id"));
    }

    assert!(server.writes().is_empty());
}
