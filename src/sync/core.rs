//! Wires the sync components to one scheduler and reacts to host signals.
//!
//! The host talks to the core through two channels: `SyncCommand`s down,
//! `SyncEvent`s up. Poll tasks report an expired login back to the core on
//! an internal channel; the core then logs out the same way an explicit
//! logout does.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::chat::ChatSync;
use super::clock::Clock;
use super::lifecycle::{AuthIdentity, LifecycleSignal};
use super::moderation::ModerationGate;
use super::notifications::NotificationSync;
use super::presence::PresenceHeartbeat;
use super::scheduler::{PollScheduler, PollTicket, TaskId, TaskState, poll_fn};
use super::session::{Session, SessionStore};
use crate::common::{Notice, SyncCommand, SyncEvent};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::network::{RatingsApi, Transport};
use crate::storage::Storage;

/// Everything the core needs from its host.
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub storage: Arc<dyn Storage>,
    pub clock: Arc<dyn Clock>,
}

/// Carries the login generation a poll task was started under, so an
/// expiry observed by a task from an earlier login is ignored.
#[derive(Clone)]
struct ExpiryWatch {
    generation: u64,
    tx: mpsc::UnboundedSender<u64>,
}

impl ExpiryWatch {
    fn observe(&self, task: TaskId, result: SyncResult<()>) {
        match result {
            Ok(()) => {}
            Err(SyncError::AuthExpired) => {
                log::warn!("{task}: login expired");
                if let Err(err) = self.tx.send(self.generation) {
                    log::debug!("Failed to signal login expiry: {err}");
                }
            }
            Err(err) if err.is_transient() => {
                log::debug!("{task}: poll failed, retrying on the next tick: {err}");
            }
            Err(err) => log::warn!("{task}: poll failed: {err}"),
        }
    }
}

pub struct SyncCore {
    config: SyncConfig,
    scheduler: Arc<PollScheduler>,
    session: Arc<Mutex<SessionStore>>,
    gate: Arc<ModerationGate>,
    notifications: Arc<NotificationSync>,
    chat: Arc<ChatSync>,
    presence: Arc<PresenceHeartbeat>,
    identity: Option<AuthIdentity>,
    login_generation: u64,
    events: mpsc::Sender<SyncEvent>,
    expiry_tx: mpsc::UnboundedSender<u64>,
    expiry_rx: mpsc::UnboundedReceiver<u64>,
}

impl SyncCore {
    pub fn new(
        config: SyncConfig,
        collaborators: Collaborators,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        let Collaborators {
            transport,
            storage,
            clock,
        } = collaborators;

        let api = RatingsApi::new(transport);
        let scheduler = Arc::new(PollScheduler::new());
        let session = Arc::new(Mutex::new(SessionStore::new(storage, clock.clone())));
        let gate = Arc::new(ModerationGate::new(
            api.clone(),
            config.max_message_length,
            config.ban_check_failure,
            events.clone(),
        ));
        let notifications = Arc::new(NotificationSync::new(
            api.clone(),
            session.clone(),
            gate.clone(),
            clock,
            events.clone(),
        ));
        let chat = Arc::new(ChatSync::new(
            api.clone(),
            gate.clone(),
            scheduler.clone(),
            config.message_limit,
            events.clone(),
        ));
        let presence = Arc::new(PresenceHeartbeat::new(api, gate.clone(), events.clone()));
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();

        Self {
            config,
            scheduler,
            session,
            gate,
            notifications,
            chat,
            presence,
            identity: None,
            login_generation: 0,
            events,
            expiry_tx,
            expiry_rx,
        }
    }

    pub fn identity(&self) -> Option<&AuthIdentity> {
        self.identity.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn task_state(&self, task: TaskId) -> TaskState {
        self.scheduler.state(task)
    }

    /// Snapshot of the current notification session.
    pub fn session(&self) -> Option<Session> {
        self.session.lock().session().cloned()
    }

    pub fn chat(&self) -> &Arc<ChatSync> {
        &self.chat
    }

    pub fn gate(&self) -> &Arc<ModerationGate> {
        &self.gate
    }

    pub async fn on_lifecycle(&mut self, signal: LifecycleSignal) {
        match signal {
            LifecycleSignal::Visible => self.on_visible(),
            LifecycleSignal::Hidden => self.on_hidden(),
            LifecycleSignal::AuthChanged(identity) => self.on_auth_changed(identity).await,
        }
    }

    /// Resume polling. Each task polls once immediately to catch up.
    pub fn on_visible(&self) {
        self.scheduler.resume();
    }

    pub fn on_hidden(&self) {
        self.scheduler.pause();
    }

    pub async fn on_auth_changed(&mut self, identity: Option<AuthIdentity>) {
        let Some(identity) = identity else {
            self.logout().await;
            return;
        };

        if let Some(current) = &self.identity {
            if current.user_id == identity.user_id {
                self.presence.set_admin_hint(identity.is_admin_hint);
                self.identity = Some(identity);
                return;
            }
            log::info!("User changed from {} to {}", current.user_id, identity.user_id);
            self.teardown();
        }

        self.session.lock().load_or_start(&identity.user_id);
        self.chat.set_current_user(Some(identity.user_id.clone()));
        self.presence.set_admin_hint(identity.is_admin_hint);
        self.login_generation += 1;
        let user_id = identity.user_id.clone();
        self.identity = Some(identity);
        self.start_tasks();

        log::info!("Sync started for {user_id}");
        self.emit(SyncEvent::SessionStarted { user_id }).await;
    }

    /// Stop every task, forget all per-user state and the persisted session.
    pub async fn logout(&mut self) {
        self.teardown();
        self.session.lock().clear();
        if let Some(identity) = self.identity.take() {
            log::info!("Logged out {}", identity.user_id);
            self.emit(SyncEvent::LoggedOut).await;
        }
    }

    pub async fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::Lifecycle(signal) => self.on_lifecycle(signal).await,
            SyncCommand::SendMessage(mut draft) => match self.chat.send(&mut draft).await {
                Ok(outcome) => self.emit(SyncEvent::Send(outcome)).await,
                Err(err) => self.report("Send", err).await,
            },
            SyncCommand::Typing(is_typing) => self.chat.notify_typing(is_typing),
            SyncCommand::DeleteMessage(message_id) => {
                let result = self.chat.delete_message(&message_id).await;
                self.finish("Delete", result, None).await;
            }
            SyncCommand::ClearMessages => {
                let result = self.chat.clear_all().await;
                self.finish("Clear", result, Some("Chat history cleared".to_string()))
                    .await;
            }
            SyncCommand::Ban(request) => {
                let result = self.gate.ban_user(&request).await;
                let name = if request.user_name.is_empty() {
                    request.user_id.clone()
                } else {
                    request.user_name.clone()
                };
                self.finish("Ban", result, Some(format!("Banned {name}"))).await;
            }
            SyncCommand::Unban { user_id } => {
                let result = self.gate.unban_user(&user_id).await;
                self.finish("Unban", result, Some(format!("Lifted ban for {user_id}")))
                    .await;
            }
            SyncCommand::ListBans => match self.gate.list_bans().await {
                Ok(bans) => self.emit(SyncEvent::Bans(bans)).await,
                Err(err) => self.report("Listing bans", err).await,
            },
            SyncCommand::AddModerator { user_id, user_name } => {
                let result = self.gate.add_moderator(&user_id, &user_name).await;
                self.finish("Adding moderator", result, Some(format!("{user_name} is now a moderator")))
                    .await;
            }
            SyncCommand::RemoveModerator { user_id } => {
                let result = self.gate.remove_moderator(&user_id).await;
                self.finish("Removing moderator", result, Some(format!("Removed moderator {user_id}")))
                    .await;
            }
            SyncCommand::ListModerators => match self.gate.list_moderators().await {
                Ok(moderators) => self.emit(SyncEvent::Moderators(moderators)).await,
                Err(err) => self.report("Listing moderators", err).await,
            },
            SyncCommand::TestNotification => {
                let result = self.notifications.send_test().await;
                self.finish("Test notification", result, Some("Test notification requested".to_string()))
                    .await;
            }
            SyncCommand::Logout => self.logout().await,
        }
    }

    /// Drive the core until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SyncCommand>) {
        log::info!("Sync core started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command).await;
                    } else {
                        break;
                    }
                }
                Some(generation) = self.expiry_rx.recv() => {
                    self.on_auth_expired(generation).await;
                }
            }
        }
        self.scheduler.stop_all();
        log::info!("Sync core stopped");
    }

    async fn on_auth_expired(&mut self, generation: u64) {
        if generation != self.login_generation || self.identity.is_none() {
            return;
        }
        log::warn!("Server rejected the login; logging out");
        self.logout().await;
        self.emit(SyncEvent::AuthExpired).await;
    }

    fn teardown(&mut self) {
        self.scheduler.stop_all();
        self.login_generation += 1;
        self.gate.reset();
        self.chat.reset();
        self.presence.set_admin_hint(false);
    }

    fn start_tasks(&self) {
        if self.config.notifications_enabled {
            self.schedule(
                TaskId::Notifications,
                self.config.notification_interval(),
                &self.notifications,
                |notifications, ticket| async move {
                    notifications.tick(&ticket).await.map(|_| ())
                },
            );
        }
        if self.config.chat_enabled {
            self.schedule(
                TaskId::ChatMessages,
                self.config.chat_interval(),
                &self.chat,
                |chat, ticket| async move { chat.poll_messages(&ticket).await },
            );
            self.schedule(
                TaskId::OnlineUsers,
                self.config.online_users_interval(),
                &self.chat,
                |chat, ticket| async move { chat.poll_online_users(&ticket).await },
            );
            self.schedule(
                TaskId::BanStatus,
                self.config.ban_status_interval(),
                &self.gate,
                |gate, ticket| async move { gate.poll(&ticket).await },
            );
        }
        self.schedule(
            TaskId::Heartbeat,
            self.config.heartbeat_interval(),
            &self.presence,
            |presence, ticket| async move { presence.tick(&ticket).await },
        );
    }

    fn schedule<S, F, Fut>(&self, task: TaskId, interval: Duration, component: &Arc<S>, poll: F)
    where
        S: Send + Sync + 'static,
        F: Fn(Arc<S>, PollTicket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<()>> + Send + 'static,
    {
        let component = component.clone();
        let watch = ExpiryWatch {
            generation: self.login_generation,
            tx: self.expiry_tx.clone(),
        };
        self.scheduler.start(
            task,
            interval,
            poll_fn(move |ticket| {
                let invocation = poll(component.clone(), ticket);
                let watch = watch.clone();
                async move { watch.observe(task, invocation.await) }
            }),
        );
    }

    async fn finish(&mut self, action: &str, result: SyncResult<()>, success: Option<String>) {
        match result {
            Ok(()) => {
                if let Some(text) = success {
                    self.emit(SyncEvent::Notice(Notice::info(text))).await;
                }
            }
            Err(err) => self.report(action, err).await,
        }
    }

    async fn report(&mut self, action: &str, err: SyncError) {
        let notice = match err {
            SyncError::AuthExpired => {
                self.on_auth_expired(self.login_generation).await;
                return;
            }
            SyncError::RateLimited => Notice::slow_down(),
            SyncError::ModerationDenied(reason) => Notice::warning(reason),
            SyncError::Forbidden => Notice::warning(format!("{action} failed: not allowed")),
            err => {
                log::warn!("{action} failed: {err}");
                Notice::warning(format!("{action} failed: {err}"))
            }
        };
        self.emit(SyncEvent::Notice(notice)).await;
    }

    async fn emit(&self, event: SyncEvent) {
        if let Err(err) = self.events.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}

impl Drop for SyncCore {
    fn drop(&mut self) {
        // Poll closures hold components that hold the scheduler.
        self.scheduler.stop_all();
    }
}
