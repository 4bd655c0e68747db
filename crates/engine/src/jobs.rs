//! Background jobs.
//!
//! Settlement and trade execution run outside the request that triggered
//! them. Jobs travel over a bounded tokio channel to a [`Worker`], which runs
//! each one as its own task. Delivery is at-least-once: on start the worker
//! picks up bills and votes left mid-flight, and every handler is idempotent
//! through conditional status updates.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::Engine;

pub const DEFAULT_QUEUE_SIZE: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Job {
    SettleBill { bill_id: String },
    ExecuteTrade { vote_id: String },
}

/// Producer half of the queue, held by the engine.
#[derive(Clone, Debug)]
pub struct JobSender {
    tx: mpsc::Sender<Job>,
}

impl JobSender {
    /// Waits for queue capacity. If the worker is gone the job is dropped;
    /// start-up recovery will find it again.
    pub async fn send(&self, job: Job) {
        tracing::debug!(?job, "enqueue job");
        if let Err(err) = self.tx.send(job).await {
            tracing::warn!(job = ?err.0, "job queue closed, job dropped");
        }
    }
}

pub struct JobReceiver {
    rx: mpsc::Receiver<Job>,
}

pub fn queue(size: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(size.max(1));
    (JobSender { tx }, JobReceiver { rx })
}

pub struct Worker {
    engine: Arc<Engine>,
    receiver: JobReceiver,
}

impl Worker {
    pub fn new(engine: Arc<Engine>, receiver: JobReceiver) -> Self {
        Self { engine, receiver }
    }

    /// Runs until every `JobSender` is dropped.
    pub async fn run(mut self) {
        match self.engine.unfinished_jobs().await {
            Ok(jobs) => {
                if !jobs.is_empty() {
                    tracing::info!(count = jobs.len(), "resuming unfinished jobs");
                }
                for job in jobs {
                    self.spawn(job);
                }
            }
            Err(err) => tracing::error!(error = %err, "cannot load unfinished jobs"),
        }

        while let Some(job) = self.receiver.rx.recv().await {
            self.spawn(job);
        }
        tracing::info!("job queue closed, worker exiting");
    }

    fn spawn(&self, job: Job) {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { run_job(&engine, job).await });
    }
}

/// Runs one job, logging instead of propagating failures.
pub async fn run_job(engine: &Engine, job: Job) {
    match &job {
        Job::SettleBill { bill_id } => match engine.settle_bill(bill_id).await {
            Ok(outcome) => tracing::info!(%bill_id, ?outcome, "settle bill"),
            Err(err) => tracing::error!(%bill_id, error = %err, "settle bill failed"),
        },
        Job::ExecuteTrade { vote_id } => match engine.execute_trade(vote_id).await {
            Ok(outcome) => tracing::info!(%vote_id, ?outcome, "execute trade"),
            Err(err) => tracing::error!(%vote_id, error = %err, "execute trade failed"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_delivers_in_order() {
        let (sender, mut receiver) = queue(4);
        sender
            .send(Job::SettleBill {
                bill_id: "b1".to_string(),
            })
            .await;
        sender
            .send(Job::ExecuteTrade {
                vote_id: "v1".to_string(),
            })
            .await;
        assert_eq!(
            receiver.rx.recv().await,
            Some(Job::SettleBill {
                bill_id: "b1".to_string()
            })
        );
        assert_eq!(
            receiver.rx.recv().await,
            Some(Job::ExecuteTrade {
                vote_id: "v1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn send_after_close_does_not_panic() {
        let (sender, receiver) = queue(1);
        drop(receiver);
        sender
            .send(Job::SettleBill {
                bill_id: "b1".to_string(),
            })
            .await;
    }
}
