pub mod audio;
pub mod dispatcher;
pub mod queue;
pub mod transport;

pub use crate::detector::AlertEvent;
pub use audio::AlarmPlayer;
pub use dispatcher::{AlertDispatcher, DispatchOutcome, ReplayOutcome, DEFAULT_REPLAY_DELAY};
pub use queue::{QueuedAlert, RetryQueue};
pub use transport::{
    Destination, DestinationKind, HttpMethod, HttpTransport, NotificationPayload,
    NotificationTransport,
};
