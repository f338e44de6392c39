//! `servhost` core: type keys, request envelopes, handler contracts, and
//! client-side error interpretation.

pub mod message;
pub mod status;
pub mod traits;
pub mod types;

pub use message::{Request, Response};
pub use status::{ClientError, HasResponseStatus, ResponseStatus};
pub use traits::{AnyService, RequestHandler};
pub use types::{Lifecycle, TypeKey};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
