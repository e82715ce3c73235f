//! Protocol state machines for the congestion-control lab.
//!
//! Nothing in this crate touches a socket or a clock of its own: callers pass
//! timestamps in and send whatever frames come back out.

pub mod congestion;
pub mod growth;
pub mod loss;
pub mod receiver;
pub mod rtt;
pub mod sender;

pub use congestion::{CongestionController, ControllerParams, Phase, Reaction, WindowUpdate};
pub use growth::{Cubic, GrowthContext, GrowthLaw, Reno, growth_law};
pub use loss::{CompositeLoss, LossModel, RandomLoss, ScriptedLoss, loss_model_for};
pub use receiver::{AckEngine, Receiver, ReceiverStats};
pub use rtt::RttEstimator;
pub use sender::{AckEvent, SenderState, SenderStats};
