pub mod completion;
pub mod request;
pub mod response;
pub mod router;

pub use completion::CompletionHooks;
pub use http::Method;
pub use request::Request;
pub use response::{Body, Response};
pub use router::{FnHandler, Handler, Router};
