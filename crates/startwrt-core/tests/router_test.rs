#![allow(clippy::unwrap_used)]
// End-to-end tests for `Router` and the overlay against a mocked ubus endpoint.

use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use startwrt_core::{CoreError, Credentials, Router, RouterConfig, SectionId};

// ── Helpers ─────────────────────────────────────────────────────────

const SESSION: &str = "c1ed6c7b025d0caca723a816fa61b668";

fn router_config(server: &MockServer) -> RouterConfig {
    RouterConfig::new(
        Url::parse(&server.uri()).unwrap(),
        Credentials {
            username: "root".into(),
            password: SecretString::from("hunter2".to_owned()),
        },
    )
}

fn call_reply(id: u64, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/ubus"))
        .and(body_string_contains("\"login\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(
            1,
            json!([0, { "ubus_rpc_session": SESSION, "timeout": 300, "expires": 300 }]),
        )))
        .mount(server)
        .await;
}

fn zones(extra: Option<Value>) -> Value {
    let mut values = json!({
        "lan": { ".anonymous": false, ".type": "zone", ".name": "lan", ".index": 0, "input": "ACCEPT" },
        "wan": { ".anonymous": false, ".type": "zone", ".name": "wan", ".index": 1, "input": "REJECT" }
    });
    if let (Some(extra), Some(map)) = (extra, values.as_object_mut()) {
        map.insert("cfg0c5f1e".into(), extra);
    }
    json!([0, { "values": values }])
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_rejected_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(1, json!([6]))))
        .mount(&server)
        .await;

    let result = Router::connect(router_config(&server)).await;
    assert!(
        matches!(result, Err(CoreError::AuthenticationFailed { .. })),
        "expected AuthenticationFailed"
    );
}

#[tokio::test]
async fn test_save_round_trip() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    // First read returns the untouched config, later reads include the add.
    Mock::given(method("POST"))
        .and(body_string_contains("\"get\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(2, zones(None))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"get\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(
            4,
            zones(Some(json!({
                ".anonymous": true, ".type": "rule", ".name": "cfg0c5f1e", ".index": 2,
                "name": "Allow-SSH"
            }))),
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"add\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "jsonrpc": "2.0", "id": 3, "result": [0, { "section": "cfg0c5f1e" }] }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let router = Router::connect(router_config(&server)).await.unwrap();
    assert_eq!(router.client().session_id(), SESSION);

    let uci = router.uci();
    assert_eq!(uci.load(&["firewall"]).await, vec!["firewall"]);
    let sid = uci.add("firewall", "rule", None).unwrap().to_string();
    uci.set("firewall", &sid, "name", Some("Allow-SSH".into()));

    assert_eq!(uci.save().await.unwrap(), vec!["firewall"]);
    assert!(uci.changes().is_empty());
    assert_eq!(
        uci.resolve_sid("firewall", &sid),
        Some(SectionId::from("cfg0c5f1e"))
    );
    assert_eq!(
        uci.get_option("firewall", "@rule[0]", "name"),
        Some("Allow-SSH".into())
    );
}

#[tokio::test]
async fn test_load_survives_access_denied() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"get\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 2,
            "error": { "code": -32002, "message": "Access denied" }
        })))
        .mount(&server)
        .await;

    let router = Router::connect(router_config(&server)).await.unwrap();
    let uci = router.uci();
    assert!(uci.load(&["firewall"]).await.is_empty());
    assert!(uci.add("firewall", "zone", None).is_none());
}

#[tokio::test]
async fn test_resume_keeps_live_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"access\""))
        .and(body_string_contains(SESSION))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(call_reply(1, json!([0, { "access": true }]))),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"login\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(2, json!([6]))))
        .expect(0)
        .mount(&server)
        .await;

    let router = Router::resume(router_config(&server), SESSION).await.unwrap();
    assert_eq!(router.detach(), SESSION);
}

#[tokio::test]
async fn test_resume_logs_in_after_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"access\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": { "code": -32002, "message": "Access denied" }
        })))
        .mount(&server)
        .await;
    mount_login(&server).await;

    let router = Router::resume(router_config(&server), "ffffffffffffffffffffffffffffffff")
        .await
        .unwrap();
    assert_eq!(router.session_id(), SESSION);
}

#[tokio::test]
async fn test_oneshot_logs_out_after_work() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"get\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(2, zones(None))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"destroy\""))
        .and(body_string_contains(SESSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(3, json!([0]))))
        .expect(1)
        .mount(&server)
        .await;

    let input = Router::oneshot(router_config(&server), |uci| async move {
        uci.load(&["firewall"]).await;
        Ok(uci.get_option("firewall", "wan", "input"))
    })
    .await
    .unwrap();
    assert_eq!(input, Some("REJECT".into()));
}

#[tokio::test]
async fn test_oneshot_logs_out_after_failure() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"destroy\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(2, json!([0]))))
        .expect(1)
        .mount(&server)
        .await;

    let result: Result<(), CoreError> = Router::oneshot(router_config(&server), |_| async {
        Err(CoreError::ConfigNotLoaded {
            config: "firewall".into(),
        })
    })
    .await;
    assert!(matches!(result, Err(CoreError::ConfigNotLoaded { .. })));
}
