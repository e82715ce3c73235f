pub mod config;
pub mod frame;
pub mod scenario;

pub use config::{ClientConfig, ConfigError, RttConfig, ServerConfig, Variant};
pub use frame::{Frame, FrameDecoder, FrameError, Seq};
pub use scenario::{Assertion, ClientConfigOverride, Scenario, ServerConfigOverride};
