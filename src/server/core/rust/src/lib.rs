/* src/server/core/rust/src/lib.rs */

mod action;
mod data;
mod endpoint;
pub mod escape;
mod fetch;
pub mod hooks;
pub mod negotiate;
mod page;
pub mod render;
mod respond;
mod server;

// Re-exports for ergonomic use
pub use escape::{escape_html, escape_json_for_script};
pub use hooks::{HandleErrorFn, HandleFetchFn, HandleFn, HandleResult, Resolve, handle_fn, sequence};
pub use render::{RenderContext, RenderedNode, Renderer, ShellRenderer};
pub use server::{RespondOptions, Server, ServerBuilder};
pub use trellis_kit;
