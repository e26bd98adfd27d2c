// file: src/scheduler/mod.rs

pub mod dispatcher;
pub mod host;
pub mod resolver;
pub mod ring;

pub use dispatcher::AlarmDispatcher;
pub use host::{AlarmHost, TimerId, TokioAlarmHost, WakeEvent, WakeRequest};
pub use resolver::{compute_next, list_upcoming, Zone};
pub use ring::{run_ring_listener, RingHandler, RingOutcome};
