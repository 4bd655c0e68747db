//! Side effects that must only happen after a DB transaction commits.
//!
//! Operations collect notifications, realtime events and jobs into an
//! [`Outbox`] while the transaction is open; notification rows are written in
//! the same transaction. [`Engine::dispatch`] then delivers everything once
//! the commit succeeded, so a worker never observes uncommitted state.

use sea_orm::{ActiveModelTrait, DatabaseTransaction};

use crate::{
    ResultEngine,
    gateways::{Event, user_topic},
    jobs::Job,
    notifications::{self, Notification},
};

use super::Engine;

#[derive(Debug, Default)]
pub(super) struct Outbox {
    notifications: Vec<Notification>,
    events: Vec<(String, Event)>,
    jobs: Vec<Job>,
}

impl Outbox {
    pub(super) async fn notify(
        &mut self,
        db: &DatabaseTransaction,
        notification: Notification,
    ) -> ResultEngine<()> {
        notifications::ActiveModel::from(&notification)
            .insert(db)
            .await?;
        self.notifications.push(notification);
        Ok(())
    }

    pub(super) fn publish(&mut self, topic: String, event: Event) {
        self.events.push((topic, event));
    }

    pub(super) fn enqueue(&mut self, job: Job) {
        self.jobs.push(job);
    }
}

impl Engine {
    pub(super) async fn dispatch(&self, outbox: Outbox) {
        for notification in &outbox.notifications {
            self.broadcast.publish(
                &user_topic(&notification.username),
                &Event::Notification {
                    id: notification.id.to_string(),
                    kind: notification.kind.as_str().to_string(),
                    title: notification.title.clone(),
                    message: notification.message.clone(),
                },
            );
            if let Err(err) = self.notifier.deliver(notification).await {
                tracing::warn!(
                    user = %notification.username,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
        for (topic, event) in &outbox.events {
            self.broadcast.publish(topic, event);
        }
        for job in outbox.jobs {
            self.enqueue(job).await;
        }
    }

    pub(super) async fn enqueue(&self, job: Job) {
        match &self.jobs {
            Some(jobs) => jobs.send(job).await,
            None => tracing::debug!(?job, "no job queue configured, job not scheduled"),
        }
    }
}
