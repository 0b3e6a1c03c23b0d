#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::conversation_service::ConversationService;
use crate::services::delivery_service::DeliveryService;
use crate::services::presence_service::PresenceService;
use crate::services::push::{LogPushNotifier, PushNotifier};
use crate::services::rooms::RoomRegistry;
use crate::storage::conversation_repo::ConversationRepository;
use crate::storage::message_repo::MessageRepository;
use crate::storage::user_repo::UserRepository;
use std::sync::Arc;
use tokio::sync::watch;

/// Wires repositories and services against a ready database pool. The
/// push notifier defaults to the log-only implementation unless the
/// caller supplies a real provider.
#[must_use]
pub fn build_services(
    config: &Config,
    pool: storage::DbPool,
    push: Option<Arc<dyn PushNotifier>>,
) -> ServiceContainer {
    let rooms = Arc::new(RoomRegistry::new(config.websocket.room_capacity));
    let message_repo = MessageRepository::new(pool.clone());
    let conversation_repo = ConversationRepository::new(pool.clone());
    let user_repo = UserRepository::new(pool);

    let delivery_service = DeliveryService::new(
        message_repo.clone(),
        conversation_repo.clone(),
        Arc::clone(&rooms),
        push.unwrap_or_else(|| Arc::new(LogPushNotifier)),
    );
    let conversation_service = ConversationService::new(
        conversation_repo.clone(),
        message_repo,
        user_repo.clone(),
        delivery_service.clone(),
    );
    let presence_service = PresenceService::new(user_repo, conversation_repo, Arc::clone(&rooms));

    ServiceContainer { delivery_service, conversation_service, presence_service, rooms }
}

/// Flips the shutdown watch on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}
