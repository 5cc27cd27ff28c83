use lanequeue_broker::{Broker, BrokerConfig};
use lanequeue_client::{
    ClientError, Connection, DeliveryStream, Publisher, ReconnectingPublisher, RetryPolicy,
};
use lanequeue_core::{LaneKind, LaneSpec, CONTENT_TYPE_JSON};
use lanequeue_protocol::Publishing;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_broker() -> (Arc<Broker>, String) {
    let mut config = BrokerConfig::default();
    config.persistence.enabled = false;
    let broker = Arc::new(Broker::new(config).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(broker.clone().serve(listener));
    (broker, addr)
}

/// Start a fresh broker on the address a stopped one used
async fn restart_on(addr: &str) -> Arc<Broker> {
    for _ in 0..200 {
        if let Ok(listener) = TcpListener::bind(addr).await {
            let mut config = BrokerConfig::default();
            config.persistence.enabled = false;
            let broker = Arc::new(Broker::new(config).unwrap());
            tokio::spawn(broker.clone().serve(listener));
            return broker;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never became free", addr);
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(10, 50, 3)
}

#[tokio::test]
async fn test_publish_consume_ack() {
    let (broker, addr) = start_broker().await;
    let connection = Connection::connect(addr, quick_retry()).await.unwrap();

    let publisher = connection.open_channel().await.unwrap();
    for lane in LaneKind::all_specs() {
        publisher.declare_lane(lane).await.unwrap();
    }
    publisher
        .publish(
            "task_queue",
            Publishing::persistent(5, CONTENT_TYPE_JSON, b"{\"title\":\"a\"}".to_vec()),
        )
        .await
        .unwrap();

    let consumer_channel = connection.open_channel().await.unwrap();
    let mut consumer = consumer_channel.consume("task_queue", 1).await.unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(2), consumer.next_delivery())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.priority, 5);
    assert_eq!(delivery.content_type.as_deref(), Some(CONTENT_TYPE_JSON));
    assert!(!delivery.redelivered);
    delivery.ack().await.unwrap();

    assert_eq!(
        broker
            .metrics()
            .messages_acked
            .with_label_values(&["task_queue"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_server_error_is_returned() {
    let (_broker, addr) = start_broker().await;
    let connection = Connection::connect(addr, quick_retry()).await.unwrap();
    let channel = connection.open_channel().await.unwrap();

    let err = channel
        .publish("missing", Publishing::persistent(1, CONTENT_TYPE_JSON, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ServerError(_)));

    // the session survives a failed request
    channel.declare_lane(LaneSpec::new("missing")).await.unwrap();
    channel
        .publish("missing", Publishing::persistent(1, CONTENT_TYPE_JSON, vec![]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_closed_channel_redelivers() {
    let (_broker, addr) = start_broker().await;
    let connection = Connection::connect(addr, quick_retry()).await.unwrap();

    let channel = connection.open_channel().await.unwrap();
    channel.declare_lane(LaneKind::Single.spec()).await.unwrap();
    channel
        .declare_lane(LaneSpec::new(LaneKind::Single.dead_letter_name()))
        .await
        .unwrap();
    channel
        .publish("task_queue", Publishing::persistent(10, CONTENT_TYPE_JSON, b"{}".to_vec()))
        .await
        .unwrap();

    let first = connection.open_channel().await.unwrap();
    let mut consumer = first.consume("task_queue", 1).await.unwrap();
    let delivery = consumer.next_delivery().await.unwrap();
    assert!(!delivery.redelivered);
    drop(delivery);
    first.close().await;
    assert!(first.is_closed());

    let second = connection.open_channel().await.unwrap();
    let mut consumer = second.consume("task_queue", 1).await.unwrap();
    let delivery = tokio::time::timeout(Duration::from_secs(2), consumer.next_delivery())
        .await
        .unwrap()
        .unwrap();
    assert!(delivery.redelivered);
}

#[tokio::test]
async fn test_connect_gives_up() {
    // bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = Connection::connect(addr, RetryPolicy::new(1, 5, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionError(_)));
}

#[tokio::test]
async fn test_single_consumer_per_channel() {
    let (_broker, addr) = start_broker().await;
    let connection = Connection::connect(addr, quick_retry()).await.unwrap();
    let channel = connection.open_channel().await.unwrap();
    channel.declare_lane(LaneSpec::new("task_queue")).await.unwrap();

    let _consumer = channel.consume("task_queue", 1).await.unwrap();
    assert!(matches!(
        channel.consume("task_queue", 1).await,
        Err(ClientError::ConsumerTaken)
    ));
}

#[tokio::test]
async fn test_publisher_reopens_after_broker_restart() {
    let (broker, addr) = start_broker().await;
    let connection = Connection::connect(addr.clone(), RetryPolicy::new(10, 50, 50))
        .await
        .unwrap();
    let publisher = ReconnectingPublisher::new(connection);
    for lane in LaneKind::all_specs() {
        publisher.declare_lane(lane).await.unwrap();
    }
    publisher
        .publish("task_queue", Publishing::persistent(5, CONTENT_TYPE_JSON, b"{}".to_vec()))
        .await
        .unwrap();

    broker.shutdown();
    let restarted = restart_on(&addr).await;

    // a publish racing the restart may fail, a later one must land
    let mut published = false;
    for _ in 0..100 {
        let publishing = Publishing::persistent(10, CONTENT_TYPE_JSON, b"{}".to_vec());
        if publisher.publish("task_queue", publishing).await.is_ok() {
            published = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(published);

    // lanes were declared again on the new broker
    assert_eq!(restarted.lane("task_queue").unwrap().len(), 1);
    assert!(restarted.lane("batch_task_queue.dead_letter").is_ok());
    publisher.close().await;
}
