/* src/client/core/rust/src/lib.rs */

mod client;
mod error;
mod host;
pub mod navigation;
mod rerun;
mod router;
mod state;

// Re-exports for ergonomic use
pub use client::{Client, ClientBuilder, ClientHandleErrorFn, GotoOptions};
pub use error::NavigationError;
pub use host::{FetchSource, Host, ServerDataSource};
pub use navigation::{BeforeNavigate, CallbackId, Cleanup, Completion, Navigation, NavigationTarget, NavigationType};
pub use state::{Page, Preloaded};
pub use trellis_kit;
