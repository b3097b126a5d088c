use crate::models::{CredentialChallenge, Credentials};

/// The foreground surface an update session reports to. Implementations are
/// called from the worker thread and from the progress reporter thread and
/// must marshal to their own UI thread where needed.
pub trait ProgressView: Send + Sync {
    fn set_title(&self, title: &str);
    fn set_details(&self, details: &str);
    fn set_allow_cancel(&self, allow: bool);
    fn show_progress(&self, progress: u64, total: u64);
    /// Non-blocking notice; processing continues.
    fn show_warning(&self, title: &str, body: &str);
    /// Blocking user-facing message.
    fn show_message(&self, title: &str, body: &str);
    fn show_unhandled_error(&self, message: &str);
    fn close(&self);
}

/// Answers an authentication challenge raised by a download. `None` declines
/// and fails the download.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self, challenge: &CredentialChallenge) -> Option<Credentials>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&CredentialChallenge) -> Option<Credentials> + Send + Sync,
{
    fn credentials(&self, challenge: &CredentialChallenge) -> Option<Credentials> {
        self(challenge)
    }
}
