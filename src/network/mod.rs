pub mod api;
pub mod transport;

pub use api::RatingsApi;
pub use transport::{ApiRequest, ApiResponse, HttpMethod, HttpTransport, Transport};
