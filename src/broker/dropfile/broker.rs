// src/broker/dropfile/broker.rs

//! Filesystem-backed broker.
//!
//! Storage layout: `<base>/<binding>/<timestamp><token>.<ext>`, one file per
//! pending or in-flight message.
//!
//! The whole protocol rests on three filesystem properties:
//! - unique names, so producers never need a lock to enqueue
//! - a non-blocking exclusive advisory lock per file, so one consumer at a
//!   time holds a message
//! - truncation under that lock, which is the commit point of a successful
//!   acknowledgement; an empty file is never delivered
//!
//! Releasing the lock without truncating (explicitly, or because the process
//! died and the OS dropped the lock) makes the message claimable again.

use std::path::PathBuf;
use std::time::Duration;

use super::storage::{self, LockedFile};
use super::FileQueueConfig;
use crate::{
    // ---
    BindingName,
    Broker,
    BrokerPtr,
    ConnectionConfig,
    Delivery,
    Envelope,
    QueueError,
    Receipt,
    Result,
};

struct PendingClaim {
    receipt: Receipt,
    locked: LockedFile,
}

/// Dropfile broker.
///
/// Any number of these, in any number of processes, may share a base
/// directory. There is no coordinator; the directory is the queue.
pub struct FileQueueBroker {
    config: Option<FileQueueConfig>,
    binding_dir: Option<PathBuf>,
    pending: Option<PendingClaim>,
    next_receipt: u64,
}

impl FileQueueBroker {
    // ---
    /// Create an unconnected broker.
    pub fn new() -> Self {
        Self {
            config: None,
            binding_dir: None,
            pending: None,
            next_receipt: 0,
        }
    }

    /// Directory of the current binding, once bound.
    pub fn binding_dir(&self) -> Option<&std::path::Path> {
        self.binding_dir.as_deref()
    }

    fn config(&self) -> Result<&FileQueueConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| QueueError::Configuration("dropfile broker is not connected".into()))
    }

    fn bound(&self) -> Result<(&FileQueueConfig, &PathBuf)> {
        let config = self.config()?;
        let dir = self.binding_dir.as_ref().ok_or_else(|| {
            QueueError::ProtocolViolation("dropfile broker is not bound".into())
        })?;
        Ok((config, dir))
    }

    fn take_pending(&mut self, delivery: &Delivery) -> Result<LockedFile> {
        // ---
        match self.pending.take() {
            Some(claim) if claim.receipt == delivery.receipt => Ok(claim.locked),
            other => {
                self.pending = other;
                Err(QueueError::ProtocolViolation(format!(
                    "{} does not match the pending claim",
                    delivery.receipt
                )))
            }
        }
    }

    async fn delete_resolved(&self, path: PathBuf) {
        // ---
        let retry = match self.config.as_ref() {
            Some(config) => config.delete_retry.clone(),
            None => return,
        };

        let target = path.as_path();
        let result = crate::retry_with_backoff(
            &retry,
            |_: &std::io::Error| true,
            || async move { storage::remove_file(target) },
        )
        .await;

        if let Err(_e) = result {
            // The file is already empty, so a later scan will remove it.
            crate::log_warn!(
                "giving up deleting resolved message {}: {_e}",
                path.display()
            );
        }
    }
}

impl Default for FileQueueBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Broker for FileQueueBroker {
    // ---
    fn kind(&self) -> &'static str {
        "dropfile"
    }

    fn poll_interval(&self) -> Duration {
        self.config
            .as_ref()
            .map(|c| c.poll_interval)
            .unwrap_or(FileQueueConfig::DEFAULT_POLL_INTERVAL)
    }

    /// Derive the typed config and make sure the base directory is usable.
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        // ---
        let file_config = FileQueueConfig::from_connection(config)?;

        let base = file_config.base_path.clone();
        run_blocking(move || storage::ensure_dir(&base))
            .await
            .map_err(|e| match e {
                QueueError::Io { context, source } => QueueError::Configuration(format!(
                    "base path is not usable ({context}: {source})"
                )),
                other => other,
            })?;

        crate::log_debug!(
            "dropfile broker using {}",
            file_config.base_path.display()
        );

        self.config = Some(file_config);
        Ok(())
    }

    /// Create `<base>/<binding>` if needed and make it current.
    async fn bind(&mut self, binding: &BindingName) -> Result<()> {
        // ---
        let dir = self.config()?.base_path.join(binding.as_str());

        let create = dir.clone();
        run_blocking(move || storage::ensure_dir(&create)).await?;

        self.binding_dir = Some(dir);
        Ok(())
    }

    async fn publish(&self, envelope: Envelope) -> Result<()> {
        // ---
        let (config, dir) = self.bound()?;
        if envelope.is_empty() {
            // An empty file reads as already resolved.
            return Err(QueueError::ProtocolViolation(
                "refusing to publish an empty envelope".into(),
            ));
        }
        let dir = dir.clone();
        let extension = config.extension.clone();

        let path =
            run_blocking(move || storage::write_message(&dir, &extension, envelope.as_bytes()))
                .await?;

        crate::log_debug!("published {}", path.display());
        Ok(())
    }

    async fn try_claim(&mut self) -> Result<Option<Delivery>> {
        // ---
        if self.release_pending().await? {
            crate::log_warn!("previous delivery was never acknowledged, released it for redelivery");
        }

        let (config, dir) = self.bound()?;
        let dir = dir.clone();
        let extension = config.extension.clone();

        let locked = match run_blocking(move || storage::claim_first(&dir, &extension)).await? {
            Some(locked) => locked,
            None => return Ok(None),
        };

        self.next_receipt += 1;
        let receipt = Receipt::new(self.next_receipt);
        let envelope = Envelope::from_bytes(locked.content.clone());

        crate::log_debug!("claimed {} as {receipt}", locked.path.display());

        self.pending = Some(PendingClaim { receipt, locked });
        Ok(Some(Delivery { envelope, receipt }))
    }

    /// Truncate, unlock, close, then delete with bounded retries.
    async fn ack_success(&mut self, delivery: Delivery) -> Result<()> {
        // ---
        let locked = self.take_pending(&delivery)?;

        let path = run_blocking(move || storage::truncate_and_release(locked)).await?;
        crate::log_debug!("resolved {}", path.display());

        self.delete_resolved(path).await;
        Ok(())
    }

    /// Unlock and close; the content stays for the next claimer.
    async fn ack_failure(&mut self, delivery: Delivery) -> Result<()> {
        // ---
        let locked = self.take_pending(&delivery)?;
        crate::log_debug!("requeued {}", locked.path.display());
        storage::release(locked);
        Ok(())
    }

    async fn release_pending(&mut self) -> Result<bool> {
        // ---
        match self.pending.take() {
            Some(claim) => {
                storage::release(claim.locked);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Run a filesystem operation on the blocking pool.
async fn run_blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| QueueError::io("running filesystem task", std::io::Error::other(e)))?
}

/// Create a new, unconnected dropfile broker.
pub fn create_broker() -> BrokerPtr {
    Box::new(FileQueueBroker::new())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use tempfile::TempDir;

    async fn bound_broker(base: &TempDir, name: &str) -> FileQueueBroker {
        let mut broker = FileQueueBroker::new();
        broker
            .connect(&ConnectionConfig::new(base.path().to_string_lossy()))
            .await
            .unwrap();
        broker.bind(&BindingName::new(name).unwrap()).await.unwrap();
        broker
    }

    fn files_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_connect_rejects_file_as_base() {
        // ---
        let base = TempDir::new().unwrap();
        let file = base.path().join("plain");
        std::fs::write(&file, b"x").unwrap();

        let mut broker = FileQueueBroker::new();
        let err = broker
            .connect(&ConnectionConfig::new(file.to_string_lossy()))
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn test_bind_creates_directory() {
        // ---
        let base = TempDir::new().unwrap();
        let broker = bound_broker(&base, "jobs").await;

        assert_eq!(broker.binding_dir(), Some(base.path().join("jobs").as_path()));
        assert!(base.path().join("jobs").is_dir());
    }

    #[tokio::test]
    async fn test_ack_success_removes_file() {
        // ---
        let base = TempDir::new().unwrap();
        let mut broker = bound_broker(&base, "jobs").await;
        let dir = base.path().join("jobs");

        broker.publish(Envelope::from_bytes("abc")).await.unwrap();
        assert_eq!(files_in(&dir), 1);

        let delivery = broker.try_claim().await.unwrap().unwrap();
        assert_eq!(delivery.envelope.as_bytes(), b"abc");

        broker.ack_success(delivery).await.unwrap();
        assert_eq!(files_in(&dir), 0);
        assert!(broker.try_claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ack_failure_keeps_content() {
        // ---
        let base = TempDir::new().unwrap();
        let mut broker = bound_broker(&base, "jobs").await;

        broker.publish(Envelope::from_bytes("abc")).await.unwrap();

        let first = broker.try_claim().await.unwrap().unwrap();
        broker.ack_failure(first).await.unwrap();

        let again = broker.try_claim().await.unwrap().unwrap();
        assert_eq!(again.envelope.as_bytes(), b"abc");
    }

    #[tokio::test]
    async fn test_foreign_receipt_is_rejected() {
        // ---
        let base = TempDir::new().unwrap();
        let mut broker = bound_broker(&base, "jobs").await;
        broker.publish(Envelope::from_bytes("abc")).await.unwrap();

        let real = broker.try_claim().await.unwrap().unwrap();
        let forged = Delivery {
            envelope: real.envelope.clone(),
            receipt: Receipt::new(real.receipt.value() + 100),
        };

        let err = broker.ack_success(forged).await.unwrap_err();
        assert!(matches!(err, QueueError::ProtocolViolation(_)));

        // The genuine claim is still pending and can be resolved.
        broker.ack_success(real).await.unwrap();
    }

    #[tokio::test]
    async fn test_unacked_claim_is_released_by_next_claim() {
        // ---
        let base = TempDir::new().unwrap();
        let mut broker = bound_broker(&base, "jobs").await;
        broker.publish(Envelope::from_bytes("only")).await.unwrap();

        let lost = broker.try_claim().await.unwrap().unwrap();
        drop(lost);

        let again = broker.try_claim().await.unwrap().expect("released for redelivery");
        assert_eq!(again.envelope.as_bytes(), b"only");
    }

    #[tokio::test]
    async fn test_publish_before_bind_is_rejected() {
        // ---
        let base = TempDir::new().unwrap();
        let mut broker = FileQueueBroker::new();
        broker
            .connect(&ConnectionConfig::new(base.path().to_string_lossy()))
            .await
            .unwrap();

        let err = broker.publish(Envelope::from_bytes("x")).await.unwrap_err();
        assert!(matches!(err, QueueError::ProtocolViolation(_)));
    }
}
