pub mod request_id;

pub use request_id::{http_trace_layer, request_id_middleware, RequestIdSpan, REQUEST_ID_HEADER};
