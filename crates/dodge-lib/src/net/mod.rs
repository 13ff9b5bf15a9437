pub use error::{FrameError, ProtocolError};
pub use message::{Message, RoomMessage};

pub mod connection;
mod error;
mod message;
