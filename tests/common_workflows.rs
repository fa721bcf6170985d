//! Integration tests for common MyEvents workflows.
//!
//! Everything runs against the in-memory broker, so these exercise the same
//! declare/bind/consume/ack paths a RabbitMQ deployment goes through.

use std::sync::Arc;
use std::time::Duration;

use myevents::config::ServiceConfig;
use myevents::messaging::memory::InMemoryBroker;
use myevents::messaging::{Envelope, ExchangeConfig, HeaderValue, ListenerState};
use myevents::persistence::{Booking, DatabaseHandler};
use myevents::prelude::*;
use myevents::{ContractRegistry, EVENT_NAME_HEADER, EventBooked, EventCreated, UserCreated};

const DELAY: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(2);

async fn connect(broker: &InMemoryBroker) -> ConnectionManager {
    ConnectionManager::connect(broker.connector(), DELAY)
        .await
        .unwrap()
}

fn exchange() -> ExchangeConfig {
    ExchangeConfig::topic("myevents")
}

fn ann() -> UserCreated {
    UserCreated {
        id: "1".to_string(),
        first: "Ann".to_string(),
        last: "Lee".to_string(),
        age: 30,
    }
}

async fn consuming(listener: &BrokerEventListener) {
    let mut state = listener.watch_state();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ListenerState::Consuming))
        .await
        .expect("listener never started consuming")
        .unwrap();
}

// =============================================================================
// Publishing
// =============================================================================

#[tokio::test]
async fn test_emit_routes_by_event_name() {
    let broker = InMemoryBroker::new();
    let emitter = BrokerEventEmitter::new(connect(&broker).await, exchange())
        .await
        .unwrap();

    emitter.emit(&ann()).await.unwrap();

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    let message = &published[0];
    assert_eq!(message.routing_key, "user.created");
    assert_eq!(
        message.header(EVENT_NAME_HEADER),
        Some(&HeaderValue::String("user.created".to_string()))
    );
    assert_eq!(message.content_type.as_deref(), Some("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&message.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"id": "1", "first": "Ann", "last": "Lee", "age": 30})
    );
    assert_eq!(broker.open_channels().await, 0);
}

#[tokio::test]
async fn test_concurrent_emits_do_not_interfere() {
    let broker = InMemoryBroker::new();
    let emitter = BrokerEventEmitter::new(connect(&broker).await, exchange())
        .await
        .unwrap();

    let booking = EventBooked {
        id: "b1".to_string(),
        event_id: "e1".to_string(),
        user_id: "1".to_string(),
        seats: 4,
        ..Default::default()
    };
    let user = ann();
    let (first, second) = tokio::join!(emitter.emit(&user), emitter.emit(&booking));
    first.unwrap();
    second.unwrap();

    let published = broker.published().await;
    assert_eq!(published.len(), 2);
    for message in &published {
        let decoded = ContractRegistry::standard()
            .decode(&message.routing_key, &message.body)
            .unwrap();
        assert_eq!(decoded.name(), message.routing_key);
    }
    assert_eq!(broker.open_channels().await, 0);
}

#[tokio::test]
async fn test_emit_fails_once_connection_is_gone() {
    let broker = InMemoryBroker::new();
    let manager = connect(&broker).await;
    let emitter = BrokerEventEmitter::new(manager.clone(), exchange())
        .await
        .unwrap();

    broker.set_available(false);
    broker.disconnect_all().await;

    let err = emitter.emit(&ann()).await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(broker.published().await.is_empty());
}

// =============================================================================
// Consuming
// =============================================================================

#[tokio::test]
async fn test_listener_receives_and_acks() {
    let broker = InMemoryBroker::new();
    let manager = connect(&broker).await;
    let listener =
        BrokerEventListener::new(manager.clone(), exchange(), "users").with_retry_delay(DELAY);
    let (mut events, _errors) = listener
        .listen(&["user.created"])
        .await
        .unwrap()
        .into_parts();
    consuming(&listener).await;

    let emitter = BrokerEventEmitter::new(manager, exchange()).await.unwrap();
    emitter.emit(&ann()).await.unwrap();

    let event = tokio::time::timeout(WAIT, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, EventKind::UserCreated(ann()));

    tokio::time::sleep(DELAY).await;
    assert_eq!(broker.unacked("users").await, 0);
    assert!(broker.ready("users").await.is_empty());
}

#[tokio::test]
async fn test_listener_rejects_unreadable_messages() {
    let broker = InMemoryBroker::new();
    let listener = BrokerEventListener::new(connect(&broker).await, exchange(), "users")
        .with_retry_delay(DELAY);
    let (mut events, mut errors) = listener
        .listen(&["user.created"])
        .await
        .unwrap()
        .into_parts();
    consuming(&listener).await;

    broker
        .publish("myevents", Envelope::new("user.created", b"{}".to_vec()))
        .await
        .unwrap();
    let err = tokio::time::timeout(WAIT, errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(err.to_string(), "msg did not contain x-event-name header");

    broker
        .publish(
            "myevents",
            Envelope::new("user.created", b"{}".to_vec()).with_header(EVENT_NAME_HEADER, "foo.bar"),
        )
        .await
        .unwrap();
    let err = tokio::time::timeout(WAIT, errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(err.to_string(), "event type foo.bar is unknown");

    broker
        .publish(
            "myevents",
            Envelope::new("user.created", b"{not json".to_vec())
                .with_header(EVENT_NAME_HEADER, "user.created"),
        )
        .await
        .unwrap();
    let err = tokio::time::timeout(WAIT, errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(
        err.to_string()
            .starts_with("could not decode event user.created: "),
        "unexpected error: {err}"
    );

    tokio::time::sleep(DELAY).await;
    assert!(events.try_recv().is_err());
    assert_eq!(broker.unacked("users").await, 0);
    assert!(broker.ready("users").await.is_empty());
}

#[tokio::test]
async fn test_listener_resumes_after_connection_loss() {
    let broker = InMemoryBroker::new();
    let manager = connect(&broker).await;
    let listener =
        BrokerEventListener::new(manager.clone(), exchange(), "users").with_retry_delay(DELAY);
    let (mut events, _errors) = listener
        .listen(&["user.created"])
        .await
        .unwrap()
        .into_parts();
    consuming(&listener).await;

    broker.disconnect_all().await;

    tokio::time::timeout(WAIT, async {
        while broker.consumer_count("users").await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener did not resubscribe");

    let emitter = BrokerEventEmitter::new(manager, exchange()).await.unwrap();
    emitter.emit(&ann()).await.unwrap();

    let event = tokio::time::timeout(WAIT, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.id(), "1");
    assert!(broker.connection_count() >= 2);
}

// =============================================================================
// Service runtime
// =============================================================================

async fn eventually<F, Fut, T>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(value) = check().await {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

#[tokio::test]
async fn test_users_service_stores_users_events_and_bookings() {
    let broker = InMemoryBroker::new();
    let config = ServiceConfig {
        databasetype: "memory".to_string(),
        reconnect_delay_secs: 1,
        ..Default::default()
    };

    let runtime = Arc::new(
        ServiceRuntime::start(ServiceKind::Users, &config, broker.connector())
            .await
            .unwrap(),
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn({
        let runtime = runtime.clone();
        async move {
            runtime
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await
        }
    });
    consuming(runtime.listener()).await;
    assert_eq!(
        broker.bindings("users", "myevents").await,
        vec!["event.created", "user.created", "event.booked"]
    );

    let emitter = runtime.emitter();
    emitter.emit(&ann()).await.unwrap();

    let database = runtime.database();
    let user = eventually(|| {
        let database = database.clone();
        async move { database.find_user("1").await.ok() }
    })
    .await;
    assert_eq!((user.first.as_str(), user.last.as_str(), user.age), ("Ann", "Lee", 30));

    let start = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    emitter
        .emit(&EventCreated {
            id: "e1".to_string(),
            name: "Opera".to_string(),
            location_id: "l1".to_string(),
            start,
            end: start + chrono::Duration::hours(3),
        })
        .await
        .unwrap();

    let event = eventually(|| {
        let database = database.clone();
        async move { database.find_event("e1").await.ok() }
    })
    .await;
    assert_eq!(event.name, "Opera");
    assert_eq!(event.duration, 3);
    assert_eq!(event.start_date, 1_700_000_000);
    assert_eq!(event.location.id, "l1");

    emitter
        .emit(&EventBooked {
            id: "b1".to_string(),
            event_id: "e1".to_string(),
            user_id: "1".to_string(),
            seats: 2,
            ..Default::default()
        })
        .await
        .unwrap();

    let bookings = eventually(|| {
        let database = database.clone();
        async move {
            database
                .find_bookings_for_user("1")
                .await
                .ok()
                .filter(|b| !b.is_empty())
        }
    })
    .await;
    assert_eq!(
        bookings,
        vec![Booking {
            id: "b1".to_string(),
            date: 0,
            event_id: "e1".to_string(),
            seats: 2,
        }]
    );

    shutdown_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_runtime_rejects_unknown_database_type() {
    let broker = InMemoryBroker::new();
    let config = ServiceConfig {
        databasetype: "cassandra".to_string(),
        ..Default::default()
    };

    let result = ServiceRuntime::start(ServiceKind::Events, &config, broker.connector()).await;
    assert!(matches!(
        result,
        Err(myevents::service::ServiceError::Persistence(_))
    ));
}
