//! Realtime plumbing: typed change events, the push transport seam and the
//! subscription manager that routes one into the other.
//!
//! DESIGN
//! ======
//! Frames are decoded once, at the channel boundary, into
//! [`event::ChangeEvent`]; everything downstream matches on that enum.
//! [`manager::RealtimeManager`] owns every live subscription and runs one
//! reader task per channel, so delivery within a channel stays ordered while
//! channels proceed independently.

pub mod event;
pub mod manager;
pub mod transport;

pub use event::{ChangeEvent, RecordId, RowChange};
pub use manager::{ChannelKey, RealtimeManager};
pub use transport::{MemoryHub, PushTransport, TransportError};
