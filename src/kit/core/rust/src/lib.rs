/* src/kit/core/rust/src/lib.rs */

pub mod action;
pub mod config;
pub mod control;
pub mod cookies;
pub mod deps;
pub mod errors;
pub mod event;
pub mod fetch;
pub mod load;
pub mod manifest;
pub mod node;
pub mod response;
pub mod routing;
pub mod wire;

use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

// Re-exports for ergonomic use
pub use action::{ActionOutput, ActionResult};
pub use config::{KitConfig, TrailingSlash};
pub use control::{ActionFailure, ErrorBody, HttpError, LoadError, Redirect, error, fail, redirect};
pub use cookies::{CookieOptions, Cookies, SameSite};
pub use deps::{DependencyKey, DependencyTracker, Invalidation, Uses};
pub use errors::KitError;
pub use event::{RequestEvent, ResponseHeaders};
pub use fetch::Fetch;
pub use load::{DataMap, LoadEvent, LoadTarget, ServerLoadEvent};
pub use manifest::{Manifest, ManifestBuilder, Route, RouteMatch};
pub use node::{EndpointDef, NodeDef, Prerender};
pub use response::{json, text};
pub use routing::{Params, resolve_path};
