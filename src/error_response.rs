use hyper::{
  header::{HeaderValue, CONTENT_TYPE},
  Body, Response, StatusCode,
};

pub const NOT_FOUND_BODY: &str = "404 Not Found";

/// The raw response written whenever a request can't be routed or the backend can't be reached.
pub const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\n\
Content-Type: text/plain\r\n\
Content-Length: 13\r\n\
Connection: close\r\n\
\r\n\
404 Not Found";

pub fn not_found() -> Vec<u8> {
  NOT_FOUND.to_vec()
}

/// Same answer as [`NOT_FOUND`], for handlers running on hyper.
pub fn not_found_response() -> Response<Body> {
  let mut response = Response::new(Body::from(NOT_FOUND_BODY));
  *response.status_mut() = StatusCode::NOT_FOUND;
  response
    .headers_mut()
    .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
  response
}
