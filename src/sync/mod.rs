//! Polling synchronization core: one scheduler, one session store and the
//! components that poll through them.

pub mod chat;
pub mod clock;
pub mod core;
pub mod lifecycle;
pub mod moderation;
pub mod notifications;
pub mod presence;
pub mod scheduler;
pub mod session;

pub use chat::ChatSync;
pub use clock::{Clock, SystemClock};
pub use self::core::{Collaborators, SyncCore};
pub use lifecycle::{AuthIdentity, LifecycleSignal};
pub use moderation::{GuardDecision, ModerationGate};
pub use notifications::NotificationSync;
pub use presence::PresenceHeartbeat;
pub use scheduler::{PollScheduler, PollTicket, TaskId, TaskState};
pub use session::{Session, SessionStore};
