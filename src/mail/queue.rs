use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use super::{EmailJob, Mailer};

/// Sending half of the email queue. Cloned into request handlers.
#[derive(Clone)]
pub struct EmailQueue {
    tx: mpsc::Sender<EmailJob>,
}

/// Background task draining the queue. Finishes once every [`EmailQueue`] is dropped.
pub struct EmailWorker {
    handle: JoinHandle<()>,
}

impl EmailQueue {
    pub fn start(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, EmailWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, mailer));
        (Self { tx }, EmailWorker { handle })
    }

    /// Fire-and-forget: a full or closed queue drops the message with a warning.
    pub fn enqueue(&self, job: EmailJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(recipient = %job.recipient, subject = %job.subject, "email queue full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(recipient = %job.recipient, subject = %job.subject, "email queue closed, message dropped");
                false
            }
        }
    }
}

impl EmailWorker {
    /// Waits for queued messages to be delivered.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "email worker panicked");
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<EmailJob>, mailer: Arc<dyn Mailer>) {
    tracing::info!("email worker started");
    let mut sent: u64 = 0;
    let mut failed: u64 = 0;
    while let Some(job) = rx.recv().await {
        match mailer.send(&job).await {
            Ok(()) => {
                sent += 1;
                tracing::info!(recipient = %job.recipient, subject = %job.subject, "email sent");
            }
            Err(err) => {
                failed += 1;
                tracing::error!(recipient = %job.recipient, subject = %job.subject, error = %err, "email delivery failed");
            }
        }
    }
    tracing::info!(sent, failed, "email worker stopped");
}
