//! Client side of a formcall voice call.
//!
//! [`controller::CallController`] owns the form, the transcript and the call
//! state; everything else talks to it through a [`controller::CallHandle`].

pub mod controller;
pub mod error;
pub mod machine;
pub mod session;
pub mod speaker;
pub mod termination;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{CallController, CallHandle, CallSnapshot, ControllerConfig};
pub use error::{ClientError, ErrorNotification};
pub use machine::{Activity, CallMachine, ConnectionPhase};
pub use speaker::{NullSpeaker, PlaybackEvent, Speaker};
pub use termination::TerminationPolicy;
pub use transport::{Connection, Connector, Frame, WsConnector};
