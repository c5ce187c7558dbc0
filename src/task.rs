// Copyright 2026 ModKit Contributors

//! Task-spawning collaborator (spec.md §1, §5 "cooperative tasks on a
//! worker pool"). The engine never owns a scheduler; it consumes one
//! through this trait, the way `dashflow`'s executor consumes `tokio::spawn`
//! without implementing its own thread pool.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs a future to completion on the host executor. [`CommitEngine`](crate::commit::CommitEngine)
/// uses this to run each commit's per-node `LoadOp`s concurrently; it awaits
/// every `spawn` call's returned future as its own completion barrier
/// (spec.md §4.5.2/§4.5.4's `enqueue_count` reaching zero).
#[async_trait]
pub trait TaskSpawner: Send + Sync {
    async fn spawn(&self, fut: BoxFuture);
}

/// Default, production [`TaskSpawner`] backed by `tokio::spawn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

#[async_trait]
impl TaskSpawner for TokioSpawner {
    async fn spawn(&self, fut: BoxFuture) {
        match tokio::spawn(fut).await {
            Ok(()) => {}
            Err(join_err) => {
                // A node task panicking is a programming bug in the
                // instance layer's construct/start hooks, not a recoverable
                // engine error (spec.md §7 "internal invariant violations
                // ... are fatal").
                panic!("module load task panicked: {join_err}");
            }
        }
    }
}
