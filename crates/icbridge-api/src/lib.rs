// icbridge-api: line-delimited JSON protocol and TCP session for IntelliCenter controllers

pub mod auth;
pub mod codec;
pub mod error;
pub mod frame;
pub mod session;

pub use auth::Credentials;
pub use codec::{ChangeSource, Message, ObjectChange, ParamBag, Request};
pub use error::Error;
pub use frame::FrameAssembler;
pub use session::{DEFAULT_PORT, Session, SessionConfig, SessionEvent, SessionSender, SessionState};
