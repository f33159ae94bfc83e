//! A fixed tracing target for machine-readable relayer events, so
//! dashboards and tests can subscribe to the event stream without parsing
//! free-form log lines.

/// The tracing target all probe events are emitted under.
pub const TARGET: &str = "xgov_probe";

/// The kind of the probe event.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum Kind {
    /// Relayer lifecycle (startup, shutdown).
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// A poll scan over pending actions.
    #[display(fmt = "poll")]
    Poll,
    /// Vote emission from a spoke network.
    #[display(fmt = "votes")]
    Votes,
    /// Queueing a signed bridge message.
    #[display(fmt = "queue")]
    Queue,
    /// Executing a proposal or a queued bridge message.
    #[display(fmt = "execute")]
    Execute,
    /// Notification delivery.
    #[display(fmt = "notify")]
    Notify,
}
