//! Domain model (ids, values, envelopes, lifecycle state, events).

pub mod event;
pub mod envelope;
pub mod ids;
pub mod state;
pub mod value;

pub use event::Event;
pub use envelope::{Direction, Envelope};
pub use ids::{Id, IdMarker, TimerId, WorkerId};
pub use state::WorkerState;
pub use value::{Array, Buffer, Function, Handle, Object, Value};
