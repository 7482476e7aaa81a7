//! Client core: prediction, mirroring and local hit resolution.
//!
//! Everything here is driven from one task: the frame loop calls
//! [`ClientGameState::frame`] and feeds inbound relay messages through
//! [`ClientGameState::handle_server_msg`] between frames.

pub mod combat;
pub mod connection;
pub mod handlers;
pub mod movement;
pub mod practice;
pub mod state;

pub use connection::{start_session, ClientError, RelayConnection};
pub use state::{ClientGameState, FrameInput, FrameOutput, GameMode, GameType, MovementMode, Notification};
