//! Integration tests for the protocol client against a mock venue

use digit_trader::execution::{BuyOrder, ContractType};
use digit_trader::protocol::{ClientEvent, ProtocolClient, ProtocolConfig, ProtocolError, RetryPolicy};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

enum Action {
    Reply(Vec<Value>),
    Ignore,
    /// Drop the connection without a close frame
    Drop,
}

struct MockVenue {
    url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    connections: Arc<AtomicUsize>,
}

impl MockVenue {
    fn requests_with(&self, key: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.get(key).is_some())
            .cloned()
            .collect()
    }
}

async fn mock_venue<F>(handler: F) -> MockVenue
where
    F: Fn(&Value) -> Action + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let handler = Arc::new(handler);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));

    let (seen, accepted) = (requests.clone(), connections.clone());
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            let handler = handler.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(&text).unwrap();
                    seen.lock().push(request.clone());
                    match handler(&request) {
                        Action::Reply(messages) => {
                            for message in messages {
                                if ws.send(Message::Text(message.to_string())).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Action::Ignore => {}
                        Action::Drop => return,
                    }
                }
            });
        }
    });

    MockVenue {
        url,
        requests,
        connections,
    }
}

/// Response echoing the request's `req_id`
fn reply(request: &Value, msg_type: &str, mut body: Value) -> Value {
    body["req_id"] = request["req_id"].clone();
    body["msg_type"] = json!(msg_type);
    body
}

fn authorize(request: &Value) -> Action {
    Action::Reply(vec![reply(
        request,
        "authorize",
        json!({"authorize": {"loginid": "VRTC1", "balance": "1000.00", "currency": "USD"}}),
    )])
}

/// Authorization plus `ping`; everything else is ignored
fn basic(request: &Value) -> Action {
    if request.get("authorize").is_some() {
        authorize(request)
    } else if request.get("ping").is_some() {
        Action::Reply(vec![reply(request, "ping", json!({"ping": "pong"}))])
    } else {
        Action::Ignore
    }
}

fn config(url: &str) -> ProtocolConfig {
    ProtocolConfig::new(url)
        .token("test-token")
        .request_timeout(Duration::from_secs(2))
        .reconnect(Duration::from_millis(10), Duration::from_millis(50), 3)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_authorizes() {
    let venue = mock_venue(basic).await;
    let (client, _events) = ProtocolClient::new(config(&venue.url));

    let account = client.connect().await.unwrap().unwrap();
    assert_eq!(account.loginid, "VRTC1");
    assert_eq!(account.balance, dec!(1000));
    assert!(client.is_connected());
    assert_eq!(venue.requests_with("authorize")[0]["authorize"], "test-token");
}

#[tokio::test]
async fn test_connect_without_token_skips_authorization() {
    let venue = mock_venue(basic).await;
    let (client, _events) = ProtocolClient::new(ProtocolConfig::new(&venue.url));

    assert!(client.connect().await.unwrap().is_none());
    assert!(venue.requests_with("authorize").is_empty());
}

#[tokio::test]
async fn test_rejected_token_is_fatal() {
    let venue = mock_venue(|request: &Value| {
        Action::Reply(vec![reply(
            request,
            "authorize",
            json!({"error": {"code": "InvalidToken", "message": "The token is invalid."}}),
        )])
    })
    .await;
    let (client, _events) = ProtocolClient::new(config(&venue.url));

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Auth { .. }));
    assert!(err.is_fatal());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_tick_stream_routed_by_subscription() {
    let venue = mock_venue(|request: &Value| {
        if request.get("ticks").is_some() {
            let sub = json!({"id": "sub-1"});
            Action::Reply(vec![
                reply(
                    request,
                    "tick",
                    json!({"tick": {"symbol": "R_100", "epoch": 1, "quote": 1234.5, "pip_size": 2}, "subscription": sub}),
                ),
                // unknown stream: dropped
                json!({"msg_type": "tick", "tick": {"symbol": "R_50", "epoch": 2, "quote": 99.11, "pip_size": 2}, "subscription": {"id": "sub-x"}}),
                json!({"msg_type": "tick", "tick": {"symbol": "R_100", "epoch": 3, "quote": 1234.56, "pip_size": 2}, "subscription": sub}),
            ])
        } else {
            basic(request)
        }
    })
    .await;
    let (client, mut events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();

    let id = client.subscribe_ticks("R_100").await.unwrap();
    assert_eq!(id, "sub-1");
    assert_eq!(client.subscriptions().len(), 1);

    match next_event(&mut events).await {
        ClientEvent::Tick(tick) => {
            assert_eq!(tick.symbol, "R_100");
            assert_eq!(tick.epoch, 3);
            assert_eq!(tick.last_digit(), 6);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_ticks_history() {
    let venue = mock_venue(|request: &Value| {
        if request.get("ticks_history").is_some() {
            Action::Reply(vec![reply(
                request,
                "history",
                json!({"history": {"prices": [100.12, 100.1, 100.17], "times": [1, 2, 3]}, "pip_size": 2}),
            )])
        } else {
            basic(request)
        }
    })
    .await;
    let (client, _events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();

    let ticks = client.ticks_history("R_100", 3).await.unwrap();
    let digits: Vec<u8> = ticks.iter().map(|t| t.last_digit()).collect();
    assert_eq!(digits, vec![2, 0, 7]);

    let request = &venue.requests_with("ticks_history")[0];
    assert_eq!(request["style"], "ticks");
    assert_eq!(request["end"], "latest");
    assert_eq!(request["count"], 3);
}

#[tokio::test]
async fn test_buy_and_track_until_sold() {
    let venue = mock_venue(|request: &Value| {
        if request.get("buy").is_some() {
            Action::Reply(vec![reply(
                request,
                "buy",
                json!({"buy": {"contract_id": 42, "buy_price": 10, "payout": 19.5, "balance_after": 990, "transaction_id": 7}}),
            )])
        } else if request.get("proposal_open_contract").is_some() {
            let sub = json!({"id": "poc-1"});
            Action::Reply(vec![
                reply(
                    request,
                    "proposal_open_contract",
                    json!({"proposal_open_contract": {"contract_id": 42, "is_sold": 0, "status": "open", "buy_price": 10, "profit": 0}, "subscription": sub}),
                ),
                json!({
                    "msg_type": "proposal_open_contract",
                    "proposal_open_contract": {
                        "contract_id": 42, "is_sold": 1, "status": "won", "buy_price": 10,
                        "profit": 9.5, "sell_price": 19.5,
                        "exit_tick": 1234.57, "exit_tick_display_value": "1234.57"
                    },
                    "subscription": sub,
                }),
            ])
        } else {
            basic(request)
        }
    })
    .await;
    let (client, mut events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();

    let order = BuyOrder {
        symbol: "R_100".to_string(),
        contract_type: ContractType::DigitDiff,
        barrier: 3,
        amount: dec!(10),
        duration_ticks: 1,
        currency: "USD".to_string(),
    };
    let receipt = client.buy(&order).await.unwrap();
    assert_eq!(receipt.contract_id, 42);
    assert_eq!(receipt.balance_after, dec!(990));

    let buy = &venue.requests_with("buy")[0];
    assert_eq!(buy["parameters"]["basis"], "stake");
    assert_eq!(buy["parameters"]["contract_type"], "DIGITDIFF");
    assert_eq!(buy["parameters"]["duration_unit"], "t");
    assert_eq!(buy["parameters"]["barrier"], "3");

    let tracking = client.track_contract(42).await.unwrap();
    assert_eq!(tracking.subscription.as_deref(), Some("poc-1"));
    assert!(!tracking.snapshot.unwrap().is_sold);

    match next_event(&mut events).await {
        ClientEvent::Contract(update) => {
            assert!(update.is_sold);
            assert!(update.won());
            assert_eq!(update.profit, dec!(9.5));
            assert_eq!(update.exit_digit, Some(7));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_error_classified() {
    let venue = mock_venue(|request: &Value| {
        if request.get("buy").is_some() {
            Action::Reply(vec![reply(
                request,
                "buy",
                json!({"error": {"code": "InsufficientBalance", "message": "Your account balance is insufficient."}}),
            )])
        } else {
            basic(request)
        }
    })
    .await;
    let (client, _events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();

    let err = client.request(json!({"buy": 1, "price": 10})).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Validation { ref code, .. } if code == "InsufficientBalance"));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_request_timeout_removes_pending() {
    let venue = mock_venue(basic).await;
    let (client, _events) = ProtocolClient::new(
        config(&venue.url).request_timeout(Duration::from_millis(200)),
    );
    client.connect().await.unwrap();

    let err = client.request(json!({"time": 1})).await.unwrap_err();
    assert!(matches!(err, ProtocolError::RequestTimeout { .. }));
    assert_eq!(client.pending_count(), 0);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_disconnect_rejects_pending_and_reports() {
    let venue = mock_venue(|request: &Value| {
        if request.get("drop").is_some() {
            Action::Drop
        } else {
            basic(request)
        }
    })
    .await;
    let (client, mut events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();

    let err = client.request(json!({"drop": 1})).await.unwrap_err();
    assert_eq!(err, ProtocolError::ConnectionLost);
    assert_eq!(client.pending_count(), 0);

    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Disconnected { .. }
    ));
    assert!(!client.is_connected());
    assert!(client.subscriptions().is_empty());
    assert_eq!(
        client.request(json!({"ping": 1})).await,
        Err(ProtocolError::NotConnected)
    );
}

#[tokio::test]
async fn test_reconnect_after_drop() {
    let venue = mock_venue(|request: &Value| {
        if request.get("drop").is_some() {
            Action::Drop
        } else {
            basic(request)
        }
    })
    .await;
    let (client, mut events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();
    let _ = client.request(json!({"drop": 1})).await;
    next_event(&mut events).await;

    let account = client.reconnect().await.unwrap();
    assert_eq!(account.map(|a| a.loginid).as_deref(), Some("VRTC1"));
    assert!(client.is_connected());
    assert_eq!(venue.connections.load(Ordering::SeqCst), 2);

    let pong = client.request(json!({"ping": 1})).await.unwrap();
    assert_eq!(pong["ping"], "pong");
}

#[tokio::test]
async fn test_intentional_close_not_reported() {
    let venue = mock_venue(basic).await;
    let (client, mut events) = ProtocolClient::new(config(&venue.url));
    client.connect().await.unwrap();

    client.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!client.is_connected());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_rate_limited_request_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let venue = mock_venue(move |request: &Value| {
        if request.get("balance").is_some() {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Action::Reply(vec![reply(
                    request,
                    "balance",
                    json!({"error": {"code": "RateLimit", "message": "slow down"}}),
                )]);
            }
            return Action::Reply(vec![reply(
                request,
                "balance",
                json!({"balance": {"balance": 1000, "currency": "USD"}}),
            )]);
        }
        basic(request)
    })
    .await;
    let retry = RetryPolicy {
        rate_limit_delay: Duration::from_millis(10),
        ..Default::default()
    };
    let (client, _events) = ProtocolClient::new(config(&venue.url).retry_policy(retry));
    client.connect().await.unwrap();

    let body = client.request_with_retry(json!({"balance": 1})).await.unwrap();
    assert_eq!(body["balance"]["balance"], 1000);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_throttled_subscribe_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let venue = mock_venue(move |request: &Value| {
        if request.get("ticks").is_some() {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Action::Reply(vec![reply(
                    request,
                    "tick",
                    json!({"error": {"code": "RateLimit", "message": "slow down"}}),
                )]);
            }
            return Action::Reply(vec![reply(
                request,
                "tick",
                json!({"tick": {"symbol": "R_100", "epoch": 1, "quote": 1234.5, "pip_size": 2}, "subscription": {"id": "sub-2"}}),
            )]);
        }
        basic(request)
    })
    .await;
    let retry = RetryPolicy {
        rate_limit_delay: Duration::from_millis(10),
        ..Default::default()
    };
    let (client, _events) = ProtocolClient::new(config(&venue.url).retry_policy(retry));
    client.connect().await.unwrap();

    let id = client.subscribe_ticks("R_100").await.unwrap();
    assert_eq!(id, "sub-2");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(client.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_heartbeat_pings_venue() {
    let venue = mock_venue(basic).await;
    let (client, _events) = ProtocolClient::new(
        config(&venue.url).heartbeat_interval(Duration::from_millis(50)),
    );
    client.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let pings = venue.requests_with("ping");
    assert!(pings.len() >= 2, "only {} pings", pings.len());
    assert!(pings.iter().all(|p| p["ping"] == 1));
    assert!(client.is_connected());
    assert_eq!(client.pending_count(), 0);
}
