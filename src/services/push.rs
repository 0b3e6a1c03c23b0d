use crate::api::schemas::WireMessage;
use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;

/// Push-notification dispatch is an external collaborator: delivery only
/// requires that a failed push for one participant never affects the
/// others or the persist step.
#[async_trait]
pub trait PushNotifier: Send + Sync + Debug {
    async fn notify(&self, user_id: Uuid, message: &WireMessage) -> anyhow::Result<()>;
}

/// Default implementation: log and move on. Wiring a real APNs/FCM
/// provider means swapping this at construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushNotifier;

#[async_trait]
impl PushNotifier for LogPushNotifier {
    async fn notify(&self, user_id: Uuid, message: &WireMessage) -> anyhow::Result<()> {
        tracing::debug!(%user_id, message_id = %message.id, "Push notification (log only)");
        Ok(())
    }
}
