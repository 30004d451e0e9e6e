//! Typed HTTP values: methods, multi-maps, bodies, requests and responses.

mod body;
mod method;
mod multimap;
mod request;
mod response;

pub use body::{BodyKind, HttpBody};
pub use method::{HttpMethod, UnsupportedMethod};
pub use multimap::HttpMultiMap;
pub use request::{CapturedRequest, HttpRequest, UrlParts};
pub use response::{HttpResponse, MockResponse, ResponseAction, ResponseDeclaration};
