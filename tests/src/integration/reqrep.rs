//! # Request/Response Scenarios
//!
//! Handler mapping, unhandled types, concurrent correlation and connection
//! isolation between a Responder and several Requesters.

#[cfg(test)]
mod tests {
    use crate::fixtures::{endpoint, registry, Orphan, Shout, Whisper, WAIT};
    use mq_01_transport::SocketConfig;
    use mq_02_serialization::Message;
    use mq_04_reqrep::{Requester, Responder, ServerEvent, WorkerDefinition};
    use shared_types::{Endpoint, MqError, NodeType, TransportKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn shouter(name: &'static str) -> WorkerDefinition {
        WorkerDefinition::new().route(move |whisper: &Whisper| {
            Ok(Shout {
                body: whisper.body.to_uppercase(),
                served_by: name.to_string(),
            })
        })
    }

    async fn responder_on(transport: TransportKind, label: &str) -> (Responder, Endpoint) {
        let responder = Responder::new(registry(), shouter("responder"), SocketConfig::default());
        let bound = responder.bind(&endpoint(transport, label)).await.unwrap();
        (responder, bound)
    }

    async fn whisper(requester: &Requester, body: &str) -> Result<Shout, MqError> {
        let reply = requester
            .request(
                &Whisper {
                    body: body.to_string(),
                },
                WAIT,
            )
            .await?;
        Ok(reply
            .downcast_ref::<Shout>()
            .cloned()
            .unwrap_or_else(|| panic!("unexpected reply {reply:?}")))
    }

    async fn round_trip(transport: TransportKind) {
        let (_responder, bound) = responder_on(transport, "round-trip").await;
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        let shout = whisper(&requester, "psst").await.unwrap();
        assert_eq!(shout.body, "PSST");
        assert_eq!(shout.served_by, "responder");
    }

    #[tokio::test]
    async fn test_round_trip_tcp() {
        round_trip(TransportKind::Tcp).await;
    }

    #[tokio::test]
    async fn test_round_trip_in_proc() {
        round_trip(TransportKind::InProc).await;
    }

    #[tokio::test]
    async fn test_unhandled_type_without_fallback_fails() {
        let (_responder, bound) = responder_on(TransportKind::Tcp, "orphan").await;
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        let err = requester.request(&Orphan, WAIT).await.unwrap_err();
        assert!(matches!(err, MqError::Remote(_)));
        assert!(!requester.is_disconnected());
    }

    #[tokio::test]
    async fn test_fallback_answers_unrouted_types() {
        let worker = shouter("routed").fallback(
            |_: Arc<dyn Message>| -> anyhow::Result<Arc<dyn Message>> {
                Ok(Arc::new(Shout {
                    body: String::new(),
                    served_by: "fallback".to_string(),
                }))
            },
        );
        let responder = Responder::new(registry(), worker, SocketConfig::default());
        let bound = responder
            .bind(&endpoint(TransportKind::InProc, "fallback"))
            .await
            .unwrap();
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        let reply = requester.request(&Orphan, WAIT).await.unwrap();
        assert_eq!(
            reply.downcast_ref::<Shout>().map(|s| s.served_by.as_str()),
            Some("fallback")
        );
    }

    #[tokio::test]
    async fn test_many_requesters_many_requests() {
        let (responder, bound) = responder_on(TransportKind::Tcp, "many").await;
        let mut requesters = Vec::new();
        for _ in 0..4 {
            requesters.push(
                Requester::connect(&bound, registry(), SocketConfig::default())
                    .await
                    .unwrap(),
            );
        }

        let calls = requesters.iter().enumerate().flat_map(|(r, requester)| {
            (0..25).map(move |i| async move {
                let body = format!("r{r}-m{i}");
                let shout = whisper(requester, &body).await.unwrap();
                assert_eq!(shout.body, body.to_uppercase());
            })
        });
        futures::future::join_all(calls).await;
        assert_eq!(responder.connected_count(), 4);
    }

    #[tokio::test]
    async fn test_requester_loss_leaves_others_served() {
        let (responder, bound) = responder_on(TransportKind::Tcp, "isolation").await;
        let mut events = responder.events();
        let doomed = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();
        let survivor = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        doomed.disconnect(WAIT).await;
        loop {
            match events.recv_timeout(WAIT).await.unwrap() {
                ServerEvent::ClientDisconnected(peer) => {
                    assert_eq!(peer.remote_role, NodeType::Requester);
                    break;
                }
                _ => continue,
            }
        }

        assert_eq!(whisper(&survivor, "still here").await.unwrap().body, "STILL HERE");
        assert!(matches!(
            whisper(&doomed, "gone").await,
            Err(MqError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_responder_unbind_disconnects_requesters() {
        let (responder, bound) = responder_on(TransportKind::InProc, "unbind").await;
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        responder.unbind(&bound).await;
        responder.unbind(&bound).await;

        tokio::time::timeout(WAIT, requester.closed()).await.unwrap();
        assert!(requester.is_disconnected());
        assert!(matches!(
            requester.request(&Orphan, Duration::from_millis(100)).await,
            Err(MqError::Disconnected)
        ));
    }
}
