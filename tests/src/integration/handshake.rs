//! # Greeting Scenarios
//!
//! Role checks between real engines and misbehaving raw sockets.

#[cfg(test)]
mod tests {
    use crate::fixtures::{endpoint, next_connected, registry, Sequenced, WAIT};
    use mq_01_transport::{connect, dial, ExpectedRoles, SocketConfig};
    use mq_03_pubsub::{Publisher, Subscriber};
    use mq_04_reqrep::{Requester, Responder, WorkerDefinition};
    use shared_types::{Endpoint, GreetingError, MqError, NodeType, TransportKind};
    use std::time::Duration;

    const QUIET: Duration = Duration::from_millis(200);

    async fn drain_until_closed(socket: &mut mq_01_transport::Socket) {
        let closed = tokio::time::timeout(WAIT, async {
            while socket.recv().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok(), "server kept the socket open");
    }

    #[tokio::test]
    async fn test_subscriber_refused_by_responder() {
        let responder = Responder::new(registry(), WorkerDefinition::new(), SocketConfig::default());
        let bound = responder
            .bind(&endpoint(TransportKind::Tcp, "wrong-role"))
            .await
            .unwrap();
        let mut events = responder.events();

        let refused = Subscriber::connect(&bound, registry(), SocketConfig::default()).await;
        assert!(matches!(refused, Err(MqError::Greeting(_))));

        assert!(events.recv_timeout(QUIET).await.is_err());
        assert_eq!(responder.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_requester_refused_by_publisher() {
        let publisher = Publisher::new(registry(), SocketConfig::default());
        let bound = publisher
            .bind(&endpoint(TransportKind::InProc, "wrong-role"))
            .await
            .unwrap();

        let refused = Requester::connect(&bound, registry(), SocketConfig::default()).await;
        match refused {
            Err(MqError::Greeting(GreetingError::Rejected(_))) => {}
            other => panic!("expected a rejected greeting, got {:?}", other.err()),
        }
        assert_eq!(publisher.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_additional_role_is_admitted() {
        let publisher = Publisher::new(
            registry(),
            SocketConfig::default().with_additional_remote_roles(vec![NodeType::Proxy]),
        );
        let bound = publisher
            .bind(&endpoint(TransportKind::Tcp, "proxy"))
            .await
            .unwrap();
        let mut events = publisher.events();

        let (mut socket, remote) = dial(
            &bound,
            &SocketConfig::default(),
            NodeType::Proxy,
            &ExpectedRoles::new(NodeType::Publisher),
        )
        .await
        .unwrap();
        assert_eq!(remote, NodeType::Publisher);

        let client = next_connected(&mut events).await;
        assert_eq!(client.remote_role(), NodeType::Proxy);

        publisher.broadcast(&Sequenced(3)).await.unwrap();
        let frame = tokio::time::timeout(WAIT, socket.recv()).await.unwrap().unwrap();
        let message = registry().deserialize_frame(&frame).unwrap();
        assert_eq!(message.downcast_ref::<Sequenced>(), Some(&Sequenced(3)));
    }

    #[tokio::test]
    async fn test_additional_role_not_configured_is_refused() {
        let publisher = Publisher::new(registry(), SocketConfig::default());
        let bound = publisher
            .bind(&endpoint(TransportKind::Tcp, "no-proxy"))
            .await
            .unwrap();

        let refused = dial(
            &bound,
            &SocketConfig::default(),
            NodeType::Proxy,
            &ExpectedRoles::new(NodeType::Publisher),
        )
        .await;
        // The dialer may finish its own check before the server's verdict
        // closes the socket.
        if let Ok((mut socket, _)) = refused {
            drain_until_closed(&mut socket).await;
        }
        tokio::time::sleep(QUIET).await;
        assert_eq!(publisher.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_traffic_before_greeting_is_refused() {
        let publisher = Publisher::new(registry(), SocketConfig::default());
        let bound = publisher
            .bind(&endpoint(TransportKind::Tcp, "eager"))
            .await
            .unwrap();
        let mut events = publisher.events();

        let mut socket = connect(&bound, &SocketConfig::default()).await.unwrap();
        let eager = registry().message_frame(&Sequenced(1)).unwrap();
        socket.send(eager).await.unwrap();

        drain_until_closed(&mut socket).await;
        assert!(events.recv_timeout(QUIET).await.is_err());
        assert_eq!(publisher.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let publisher = Publisher::new(
            registry(),
            SocketConfig::default().with_handshake_timeout(Duration::from_millis(100)),
        );
        let bound = publisher
            .bind(&endpoint(TransportKind::Tcp, "silent"))
            .await
            .unwrap();

        let mut socket = connect(&bound, &SocketConfig::default()).await.unwrap();
        drain_until_closed(&mut socket).await;
        assert_eq!(publisher.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_dialer_rejects_wrong_server_role() {
        let responder = Responder::new(registry(), WorkerDefinition::new(), SocketConfig::default());
        let bound: Endpoint = responder
            .bind(&endpoint(TransportKind::InProc, "dialer-check"))
            .await
            .unwrap();

        // Requester is an acceptable role here, but the server is not a publisher.
        let refused = dial(
            &bound,
            &SocketConfig::default(),
            NodeType::Requester,
            &ExpectedRoles::new(NodeType::Publisher),
        )
        .await;
        assert!(matches!(
            refused,
            Err(MqError::Greeting(GreetingError::Rejected(_)))
        ));
    }
}
