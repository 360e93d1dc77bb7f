//! # Service Queue Scenarios
//!
//! One accept point, a bounded job queue, in-process and remote workers.

#[cfg(test)]
mod tests {
    use crate::fixtures::{endpoint, registry, Shout, Whisper, WAIT};
    use async_trait::async_trait;
    use mq_01_transport::SocketConfig;
    use mq_02_serialization::{Message, TypedMessage};
    use mq_04_reqrep::{
        RequestHandler, Requester, ServerEvent, ServiceQueue, ServiceQueueConfig,
        ServiceQueueWorker, WorkerDefinition,
    };
    use shared_types::{Endpoint, MqError, TransportKind};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    /// Answers a whisper after `delay`, stamping who served it.
    struct Stamp {
        name: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl RequestHandler for Stamp {
        async fn handle(&self, request: Arc<dyn Message>) -> anyhow::Result<Arc<dyn Message>> {
            let whisper = request
                .downcast_ref::<Whisper>()
                .ok_or_else(|| anyhow::anyhow!("expected a whisper"))?;
            tokio::time::sleep(self.delay).await;
            Ok(Arc::new(Shout {
                body: whisper.body.to_uppercase(),
                served_by: self.name.to_string(),
            }))
        }
    }

    fn stamping(name: &'static str, delay: Duration) -> WorkerDefinition {
        WorkerDefinition::new().handler(Whisper::MESSAGE_TYPE, Stamp { name, delay })
    }

    async fn ask(requester: &Requester, body: String) -> Result<Shout, MqError> {
        let reply = requester.request(&Whisper { body }, WAIT).await?;
        Ok(reply
            .downcast_ref::<Shout>()
            .cloned()
            .unwrap_or_else(|| panic!("unexpected reply {reply:?}")))
    }

    async fn attach(queue: &ServiceQueue, workers: &Endpoint, name: &'static str) -> ServiceQueueWorker {
        let mut events = queue.events();
        let worker = ServiceQueueWorker::connect(
            workers,
            registry(),
            stamping(name, Duration::from_millis(40)),
            SocketConfig::default(),
        )
        .await
        .unwrap();
        loop {
            match events.recv_timeout(WAIT).await.unwrap() {
                ServerEvent::ClientConnected(peer) if peer.is_worker() => break,
                _ => continue,
            }
        }
        worker
    }

    #[tokio::test]
    async fn test_local_workers_over_tcp() {
        let queue = ServiceQueue::new(
            registry(),
            stamping("local", Duration::from_millis(10)),
            SocketConfig::default(),
            ServiceQueueConfig::default().with_workers(4),
        );
        let bound = queue.bind(&endpoint(TransportKind::Tcp, "sq-local")).await.unwrap();
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        let calls = (0..40).map(|i| ask(&requester, format!("job {i}")));
        let replies = futures::future::join_all(calls).await;
        for (i, reply) in replies.into_iter().enumerate() {
            let shout = reply.unwrap();
            assert_eq!(shout.body, format!("JOB {i}"));
            assert_eq!(shout.served_by, "local");
        }
        assert_eq!(queue.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_local_and_remote_workers_share_the_queue() {
        let queue = ServiceQueue::new(
            registry(),
            stamping("local", Duration::from_millis(40)),
            SocketConfig::default(),
            ServiceQueueConfig::default().with_workers(1),
        );
        let clients = queue
            .bind(&endpoint(TransportKind::InProc, "sq-mixed-clients"))
            .await
            .unwrap();
        let workers = queue
            .bind_workers(&endpoint(TransportKind::Tcp, "sq-mixed-workers"))
            .await
            .unwrap();
        let _remote = attach(&queue, &workers, "remote").await;
        assert_eq!(queue.remote_worker_count(), 1);

        let requester = Requester::connect(&clients, registry(), SocketConfig::default())
            .await
            .unwrap();
        let calls = (0..12).map(|i| ask(&requester, format!("mixed {i}")));
        let served_by: HashSet<String> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|reply| reply.unwrap().served_by)
            .collect();

        assert!(served_by.contains("local"));
        assert!(served_by.contains("remote"));
    }

    #[tokio::test]
    async fn test_several_requesters_one_queue() {
        let queue = ServiceQueue::new(
            registry(),
            stamping("local", Duration::from_millis(5)),
            SocketConfig::default(),
            ServiceQueueConfig::default().with_workers(2),
        );
        let bound = queue.bind(&endpoint(TransportKind::InProc, "sq-many")).await.unwrap();

        let mut requesters = Vec::new();
        for _ in 0..3 {
            requesters.push(
                Requester::connect(&bound, registry(), SocketConfig::default())
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(queue.connected_count(), 3);

        let calls = requesters.iter().enumerate().flat_map(|(r, requester)| {
            (0..10).map(move |i| async move {
                let shout = ask(requester, format!("r{r} j{i}")).await.unwrap();
                assert_eq!(shout.body, format!("R{r} J{i}"));
            })
        });
        futures::future::join_all(calls).await;
    }

    #[tokio::test]
    async fn test_overload_is_rejected_not_dropped() {
        let queue = ServiceQueue::new(
            registry(),
            stamping("local", Duration::from_millis(200)),
            SocketConfig::default(),
            ServiceQueueConfig::default()
                .with_workers(1)
                .with_queue_capacity(2)
                .with_enqueue_timeout(Duration::from_millis(20)),
        );
        let bound = queue.bind(&endpoint(TransportKind::Tcp, "sq-overload")).await.unwrap();
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();

        let calls = (0..8).map(|i| ask(&requester, format!("load {i}")));
        let outcomes = futures::future::join_all(calls).await;

        let served = outcomes.iter().filter(|o| o.is_ok()).count();
        let rejected = outcomes
            .iter()
            .filter(|o| matches!(o, Err(MqError::QueueFull)))
            .count();
        assert_eq!(served + rejected, 8);
        assert!(served >= 3);
        assert!(rejected >= 1);
    }

    #[tokio::test]
    async fn test_remote_worker_lost_mid_job() {
        let queue = ServiceQueue::new(
            registry(),
            WorkerDefinition::new(),
            SocketConfig::default(),
            ServiceQueueConfig::default().with_workers(0),
        );
        let clients = queue
            .bind(&endpoint(TransportKind::InProc, "sq-lost-clients"))
            .await
            .unwrap();
        let workers = queue
            .bind_workers(&endpoint(TransportKind::InProc, "sq-lost-workers"))
            .await
            .unwrap();

        let mut events = queue.events();
        let worker = ServiceQueueWorker::connect(
            &workers,
            registry(),
            stamping("remote", Duration::from_secs(5)),
            SocketConfig::default(),
        )
        .await
        .unwrap();
        loop {
            match events.recv_timeout(WAIT).await.unwrap() {
                ServerEvent::ClientConnected(peer) if peer.is_worker() => break,
                _ => continue,
            }
        }

        let requester = Requester::connect(&clients, registry(), SocketConfig::default())
            .await
            .unwrap();
        let (outcome, ()) = tokio::join!(ask(&requester, "doomed".to_string()), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            worker.disconnect(WAIT).await;
        });

        assert!(matches!(outcome, Err(MqError::Remote(_))));
        assert!(!requester.is_disconnected());
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_everyone() {
        let queue = ServiceQueue::new(
            registry(),
            stamping("local", Duration::from_millis(1)),
            SocketConfig::default(),
            ServiceQueueConfig::default().with_workers(1),
        );
        let clients = queue
            .bind(&endpoint(TransportKind::Tcp, "sq-shutdown-clients"))
            .await
            .unwrap();
        let workers = queue
            .bind_workers(&endpoint(TransportKind::InProc, "sq-shutdown-workers"))
            .await
            .unwrap();
        let remote = attach(&queue, &workers, "remote").await;
        let requester = Requester::connect(&clients, registry(), SocketConfig::default())
            .await
            .unwrap();
        ask(&requester, "before".to_string()).await.unwrap();

        queue.shutdown().await;

        tokio::time::timeout(WAIT, requester.closed()).await.unwrap();
        tokio::time::timeout(WAIT, remote.closed()).await.unwrap();
        assert!(queue.endpoints().is_empty());
        assert!(matches!(
            ask(&requester, "after".to_string()).await,
            Err(MqError::Disconnected)
        ));
    }
}
