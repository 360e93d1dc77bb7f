//! # Publish/Subscribe Scenarios
//!
//! Broadcast delivery, fan-out isolation, join/leave notifications and
//! disconnect semantics, run over both transports where it matters.

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        endpoint, next_connected, next_disconnected, registry, Sequenced, Text, WAIT,
    };
    use mq_01_transport::SocketConfig;
    use mq_02_serialization::Message;
    use mq_03_pubsub::{Publisher, PublisherEvent, Subscriber, SubscriberEvent};
    use shared_types::{Endpoint, MqError, TransportKind};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    // =========================================================================
    // FIXTURES
    // =========================================================================

    async fn publisher_on(transport: TransportKind, label: &str) -> (Publisher, Endpoint) {
        let publisher = Publisher::new(registry(), SocketConfig::default());
        let bound = publisher.bind(&endpoint(transport, label)).await.unwrap();
        (publisher, bound)
    }

    async fn join(publisher: &Publisher, endpoint: &Endpoint) -> Subscriber {
        let mut events = publisher.events();
        let subscriber = Subscriber::connect(endpoint, registry(), SocketConfig::default())
            .await
            .unwrap();
        next_connected(&mut events).await;
        subscriber
    }

    async fn expect_sequence(subscriber: &Subscriber, expected: impl IntoIterator<Item = u64>) {
        for n in expected {
            let message = subscriber.receive(WAIT).await.unwrap();
            assert_eq!(message.downcast_ref::<Sequenced>(), Some(&Sequenced(n)));
        }
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    async fn ordered_delivery(transport: TransportKind) {
        let (publisher, bound) = publisher_on(transport, "ordered").await;
        let subscriber = join(&publisher, &bound).await;

        for n in 0..200 {
            assert_eq!(publisher.broadcast(&Sequenced(n)).await.unwrap(), 1);
        }
        expect_sequence(&subscriber, 0..200).await;
    }

    #[tokio::test]
    async fn test_ordered_delivery_tcp() {
        ordered_delivery(TransportKind::Tcp).await;
    }

    #[tokio::test]
    async fn test_ordered_delivery_in_proc() {
        ordered_delivery(TransportKind::InProc).await;
    }

    async fn burst_beyond_receive_queue(transport: TransportKind) {
        const BURST: u64 = 3000;
        let (publisher, bound) = publisher_on(transport, "burst").await;
        let subscriber = join(&publisher, &bound).await;
        assert!(BURST as usize > SocketConfig::default().inbound_capacity);

        let send = async {
            for n in 0..BURST {
                assert_eq!(publisher.broadcast(&Sequenced(n)).await.unwrap(), 1);
            }
        };
        tokio::join!(send, expect_sequence(&subscriber, 0..BURST));
        assert!(matches!(
            subscriber.receive(Duration::from_millis(50)).await,
            Err(MqError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_burst_beyond_receive_queue_tcp() {
        burst_beyond_receive_queue(TransportKind::Tcp).await;
    }

    #[tokio::test]
    async fn test_burst_beyond_receive_queue_in_proc() {
        burst_beyond_receive_queue(TransportKind::InProc).await;
    }

    #[tokio::test]
    async fn test_hello_over_tcp() {
        let (publisher, bound) = publisher_on(TransportKind::Tcp, "hello").await;
        assert_ne!(bound.port(), 0);
        let subscriber = join(&publisher, &bound).await;

        publisher.broadcast(&Text::new("Hello")).await.unwrap();

        let message = subscriber.receive(WAIT).await.unwrap();
        assert_eq!(message.downcast_ref::<Text>(), Some(&Text::new("Hello")));
        assert!(matches!(
            subscriber.receive(Duration::from_millis(50)).await,
            Err(MqError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_batch_keeps_order() {
        let (publisher, bound) = publisher_on(TransportKind::Tcp, "batch").await;
        let subscriber = join(&publisher, &bound).await;

        let batch: Vec<Arc<dyn Message>> = (0..10)
            .map(|n| Arc::new(Sequenced(n)) as Arc<dyn Message>)
            .collect();
        assert_eq!(publisher.broadcast_batch(&batch).await.unwrap(), 1);
        publisher.broadcast(&Sequenced(10)).await.unwrap();

        expect_sequence(&subscriber, 0..=10).await;
    }

    #[tokio::test]
    async fn test_event_and_queue_delivery_agree() {
        let (publisher, bound) = publisher_on(TransportKind::InProc, "event-queue").await;
        let subscriber = join(&publisher, &bound).await;
        let mut events = subscriber.events();

        publisher.broadcast(&Text::new("both")).await.unwrap();

        let queued = subscriber.receive(WAIT).await.unwrap();
        let evented = match events.recv_timeout(WAIT).await.unwrap() {
            SubscriberEvent::MessageReceived(message) => message,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(queued.downcast_ref::<Text>(), evented.downcast_ref::<Text>());
    }

    // =========================================================================
    // FAN-OUT
    // =========================================================================

    #[tokio::test]
    async fn test_fan_out_survives_a_dead_subscriber() {
        let (publisher, bound) = publisher_on(TransportKind::Tcp, "fan-out").await;
        let mut subscribers = Vec::new();
        for _ in 0..4 {
            subscribers.push(join(&publisher, &bound).await);
        }
        assert_eq!(publisher.connected_count(), 4);

        let mut events = publisher.events();
        drop(subscribers.remove(1));

        // Broadcast immediately; the dead peer may or may not be noticed yet.
        let delivered = publisher.broadcast(&Sequenced(1)).await.unwrap();
        assert!(delivered >= 3);
        for subscriber in &subscribers {
            expect_sequence(subscriber, [1]).await;
        }

        let gone = next_disconnected(&mut events).await;
        assert!(!gone.is_connected());
        assert!(publisher.subscribers().iter().all(|c| c.id() != gone.id()));
        assert_eq!(publisher.connected_count(), 3);

        publisher.broadcast(&Sequenced(2)).await.unwrap();
        for subscriber in &subscribers {
            expect_sequence(subscriber, [2]).await;
        }
    }

    #[tokio::test]
    async fn test_late_joiner_gets_no_replay() {
        let (publisher, bound) = publisher_on(TransportKind::InProc, "late").await;
        let first = join(&publisher, &bound).await;

        publisher.broadcast(&Sequenced(1)).await.unwrap();
        let second = join(&publisher, &bound).await;
        publisher.broadcast(&Sequenced(2)).await.unwrap();

        expect_sequence(&first, [1, 2]).await;
        expect_sequence(&second, [2]).await;
        assert!(matches!(
            second.receive(Duration::from_millis(50)).await,
            Err(MqError::Timeout)
        ));
    }

    // =========================================================================
    // NOTIFICATIONS
    // =========================================================================

    #[tokio::test]
    async fn test_connect_and_disconnect_fire_once() {
        let (publisher, bound) = publisher_on(TransportKind::Tcp, "once").await;
        let mut events = publisher.events();

        let subscriber = Subscriber::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();
        let connected = next_connected(&mut events).await;

        subscriber.disconnect(WAIT).await;
        let disconnected = next_disconnected(&mut events).await;
        assert_eq!(connected.id(), disconnected.id());

        assert!(events.recv_timeout(Duration::from_millis(100)).await.is_err());
    }

    #[tokio::test]
    async fn test_upstream_message_names_its_sender() {
        let (publisher, bound) = publisher_on(TransportKind::Tcp, "upstream").await;
        let mut events = publisher.events();
        let subscriber = Subscriber::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();
        let client = next_connected(&mut events).await;

        subscriber.send_message(&Text::new("up")).await.unwrap();

        match events.recv_timeout(WAIT).await.unwrap() {
            PublisherEvent::MessageReceived { client: from, message } => {
                assert_eq!(from.id(), client.id());
                assert_eq!(message.downcast_ref::<Text>(), Some(&Text::new("up")));
            }
            other => panic!("unexpected {other:?}"),
        }

        publisher
            .send_to(&client, &Text::new("just you"))
            .await
            .unwrap();
        let reply = subscriber.receive(WAIT).await.unwrap();
        assert_eq!(reply.downcast_ref::<Text>(), Some(&Text::new("just you")));
    }

    // =========================================================================
    // DISCONNECT SEMANTICS
    // =========================================================================

    #[tokio::test]
    async fn test_unbind_disconnects_subscribers() {
        let (publisher, bound) = publisher_on(TransportKind::Tcp, "unbind").await;
        let first = join(&publisher, &bound).await;
        let second = join(&publisher, &bound).await;
        assert!(!first.is_disconnected());

        let mut events = publisher.events();
        publisher.unbind(&bound).await;
        publisher.unbind(&bound).await;

        let a = next_disconnected(&mut events).await;
        let b = next_disconnected(&mut events).await;
        assert_ne!(a.id(), b.id());
        assert!(events.recv_timeout(Duration::from_millis(100)).await.is_err());

        tokio::time::timeout(WAIT, first.closed()).await.unwrap();
        tokio::time::timeout(WAIT, second.closed()).await.unwrap();
        assert!(first.is_disconnected());
        assert!(second.is_disconnected());
        assert!(publisher.endpoints().is_empty());

        let refused = Subscriber::connect(&bound, registry(), SocketConfig::default()).await;
        assert!(refused.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_unblocks_pending_receive() {
        let (publisher, bound) = publisher_on(TransportKind::InProc, "unblock").await;
        let subscriber = Arc::new(join(&publisher, &bound).await);

        let waiting = {
            let subscriber = Arc::clone(&subscriber);
            tokio::spawn(async move { subscriber.receive(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        subscriber.disconnect(Duration::from_millis(500)).await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(subscriber.is_disconnected());

        let outcome = tokio::time::timeout(WAIT, waiting).await.unwrap().unwrap();
        assert!(matches!(outcome, Err(MqError::Disconnected)));
    }

    #[tokio::test]
    async fn test_rebind_after_unbind() {
        let name = endpoint(TransportKind::InProc, "rebind");
        let publisher = Publisher::new(registry(), SocketConfig::default());
        let bound = publisher.bind(&name).await.unwrap();
        publisher.unbind(&bound).await;

        let again = publisher.bind(&name).await.unwrap();
        let subscriber = join(&publisher, &again).await;
        publisher.broadcast(&Sequenced(7)).await.unwrap();
        expect_sequence(&subscriber, [7]).await;
    }
}
