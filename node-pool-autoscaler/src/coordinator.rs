use std::{future::Future, sync::Arc};

use tokio::sync::Mutex;

/// Serializes size mutations across every node group of a provider.
///
/// Groups hold clones of the same coordinator. When a group also takes a
/// cache lock, it must take this one first.
#[derive(Clone, Default)]
pub struct SizeCoordinator {
    lock: Arc<Mutex<()>>,
}

impl SizeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while no other size mutation is in flight.
    pub async fn serialize<F, T>(&self, f: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        f.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn mutations_do_not_overlap() {
        let coordinator = SizeCoordinator::new();
        let in_flight = Arc::new(AtomicU32::new(0));

        let run = |c: SizeCoordinator, in_flight: Arc<AtomicU32>| async move {
            c.serialize(async {
                assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .await
        };

        tokio::join!(
            run(coordinator.clone(), in_flight.clone()),
            run(coordinator.clone(), in_flight.clone()),
            run(coordinator, in_flight),
        );
    }
}
