//! An OGC web services server: WMS and WFS requests parsed from query
//! strings or XML bodies, dispatched against a project, and wrapped by a
//! priority-ordered chain of server filters.

pub mod backend;
pub mod chain;
pub mod dispatcher;
pub mod exception;
pub mod filter;
pub mod geometry;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod ows;
pub mod render;
pub mod request;
pub mod response;
pub mod server;
pub mod service;
pub mod settings;
pub mod xml;

pub use backend::{JsonProjectStore, MemoryProjectStore, ProjectStore, Renderer};
pub use exception::{ServiceError, ServiceException};
pub use filter::{FilterError, FilterRegistry, ServerFilter};
pub use ows::OwsServer;
pub use render::DocumentRenderer;
pub use request::{Request, RequestInput};
pub use response::{AssembledResponse, Response};
pub use settings::Settings;
