//! Host lifecycle signals the sync core reacts to.
//!
//! A browser host maps `visibilitychange` and its auth events onto these; a
//! terminal or native host emits them directly.

/// The authenticated user as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIdentity {
    pub user_id: String,
    pub user_name: String,
    /// Self-reported by the host. Sent to the server as a hint only.
    pub is_admin_hint: bool,
}

impl AuthIdentity {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            is_admin_hint: false,
        }
    }

    pub fn with_admin_hint(mut self, is_admin: bool) -> Self {
        self.is_admin_hint = is_admin;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    Visible,
    Hidden,
    /// `None` means logged out.
    AuthChanged(Option<AuthIdentity>),
}
