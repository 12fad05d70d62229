use tokio::sync::watch;

/// Resolve once shutdown is requested (`true` sent) or the sender is gone.
///
/// Safe to use as a `select!` branch: it holds no state between polls.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Non-blocking check of the current shutdown flag
pub fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancelled_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        assert!(!is_cancelled(&rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), cancelled(&mut rx))
            .await
            .unwrap();
        assert!(is_cancelled(&rx));
    }

    #[tokio::test]
    async fn test_cancelled_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), cancelled(&mut rx))
            .await
            .unwrap();
        assert!(is_cancelled(&rx));
    }

    #[tokio::test]
    async fn test_not_cancelled_by_false() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(false).unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), cancelled(&mut rx)).await;
        assert!(result.is_err());
    }
}
