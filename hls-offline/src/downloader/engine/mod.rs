//! Transfer engine abstraction.
//!
//! This module defines the `TransferEngine` trait and the callback channel
//! through which an engine reports progress and completion.

mod traits;

pub use traits::{
    CANCELLED_BY_SYSTEM_CODE, EngineError, EngineEvent, EngineEventReceiver, EngineEventSender,
    NETWORK_FAILURE_CODE, TransferEngine, event_channel,
};
