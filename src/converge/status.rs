//! Classification of observed status strings.

/// What a single observed status means for the wait loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusClass {
    /// Keep polling.
    Pending,
    /// The desired state was reached.
    Ready,
    /// The resource can no longer reach the desired state.
    Failed,
}

/// A remote observation that carries a status string.
pub trait Observed {
    /// Status reported by the API, for example `RUNNING`.
    fn status(&self) -> &str;
}

impl Observed for String {
    fn status(&self) -> &str {
        self
    }
}

impl Observed for &str {
    fn status(&self) -> &str {
        self
    }
}

/// Target, pending and fatal status sets.
///
/// A status listed in `target` is [`StatusClass::Ready`], one listed in
/// `fatal` is [`StatusClass::Failed`] and one listed in `pending` is
/// [`StatusClass::Pending`]. Any other status is treated as unexpected and
/// fails the wait when `pending` is non-empty; with an empty `pending` set
/// every unlisted status keeps the loop waiting.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusSets {
    target: Vec<String>,
    pending: Vec<String>,
    fatal: Vec<String>,
}

fn collect(statuses: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    statuses.into_iter().map(Into::into).collect()
}

impl StatusSets {
    /// Creates empty sets: every status is pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses that end the wait successfully.
    #[must_use]
    pub fn target(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.target = collect(statuses);
        self
    }

    /// Statuses that keep the loop waiting.
    #[must_use]
    pub fn pending(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.pending = collect(statuses);
        self
    }

    /// Statuses that end the wait with an error.
    #[must_use]
    pub fn fatal(mut self, statuses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fatal = collect(statuses);
        self
    }

    /// Classifies one observed status.
    #[must_use]
    pub fn classify(&self, status: &str) -> StatusClass {
        let listed = |set: &[String]| set.iter().any(|candidate| candidate == status);
        if listed(&self.target) {
            StatusClass::Ready
        } else if listed(&self.fatal) {
            StatusClass::Failed
        } else if listed(&self.pending) || self.pending.is_empty() {
            StatusClass::Pending
        } else {
            StatusClass::Failed
        }
    }
}
