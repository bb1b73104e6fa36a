mod blocking;
pub mod board_move;
pub mod cache;
pub mod cookies;
mod http;
#[cfg(feature = "test-helpers")]
pub mod mock;
pub mod mutations;
pub mod queries;
pub mod session;
mod traits;

pub use blocking::BlockingHttpService;
pub use board_move::{BoardMover, MoveOutcome};
pub use cache::{QueryCache, QueryKey};
pub use http::{AuthEvent, AuthHook, HttpConfig, HttpService};
pub use session::ProviderSession;
pub use traits::{Credentials, ServiceError, TrackerService};
