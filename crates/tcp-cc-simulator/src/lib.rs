pub mod channel;
pub mod error;
pub mod scenario_runner;
pub mod server;
pub mod session;
pub mod trace;

pub use channel::{FramedChannel, RecvOutcome};
pub use error::{ConnectionError, ServerError, SessionError};
pub use server::{Server, serve_connection};
pub use session::{Session, run_client};
pub use trace::{ConnectionSummary, SessionReport, WindowSample};
