use hyper::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, HOST};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("request line is missing or is not `METHOD PATH VERSION`")]
  MalformedRequestLine,
}

/// A raw HTTP/1.x request broken into its parts. Only used to find the routing key, the bytes
/// forwarded to the backend are always the original ones.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
  pub method: String,
  pub path: String,
  pub version: String,
  /// Header names are case-insensitive, `Host` and `host` are the same entry.
  pub headers: HeaderMap,
  pub body: String,
  pub cookies: HashMap<String, String>,
}

impl ParsedRequest {
  pub fn parse(raw: &str) -> Result<ParsedRequest, ParseError> {
    let (method, path, version) = parse_request_line(raw)?;
    let headers = parse_headers(raw);
    let body = raw.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("").to_string();
    let cookies = header(&headers, COOKIE.as_str()).map(parse_cookies).unwrap_or_default();

    Ok(ParsedRequest {
      method,
      path,
      version,
      headers,
      body,
      cookies,
    })
  }

  /// Header value as text, `None` if absent or not valid UTF-8.
  pub fn header(&self, name: &str) -> Option<&str> {
    header(&self.headers, name)
  }

  pub fn host(&self) -> Option<&str> {
    self.header(HOST.as_str())
  }
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
  std::str::from_utf8(headers.get(name)?.as_bytes()).ok()
}

fn parse_request_line(raw: &str) -> Result<(String, String, String), ParseError> {
  let line = raw.lines().next().ok_or(ParseError::MalformedRequestLine)?;
  match line.split_whitespace().collect::<Vec<_>>().as_slice() {
    [method, path, version] => {
      let path = if *path == "/" { "/index.html" } else { *path };
      Ok((method.to_string(), path.to_string(), version.to_string()))
    }
    _ => Err(ParseError::MalformedRequestLine),
  }
}

/// Every `Name: value` line between the request line and the first blank line.
/// Lines without `": "`, with a name that is not a valid token or with control characters in the
/// value are skipped. Non-ASCII values are kept.
fn parse_headers(raw: &str) -> HeaderMap {
  let head = raw.split("\r\n\r\n").next().unwrap_or("");
  let mut headers = HeaderMap::new();

  for line in head.split("\r\n").skip(1) {
    let (name, value) = match line.split_once(": ") {
      Some(pair) => pair,
      None => continue,
    };
    let name = HeaderName::from_bytes(name.as_bytes());
    let value = HeaderValue::from_bytes(value.as_bytes());
    if let (Ok(name), Ok(value)) = (name, value) {
      headers.insert(name, value);
    }
  }
  headers
}

fn parse_cookies(cookie_header: &str) -> HashMap<String, String> {
  cookie_header
    .split(';')
    .filter_map(|pair| pair.split_once('='))
    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_minimal_get() {
    let request = ParsedRequest::parse("GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/index.html");
    assert_eq!(request.version, "HTTP/1.1");
    assert_eq!(request.headers.len(), 1);
    assert_eq!(request.header("host"), Some("example.com"));
    assert_eq!(request.body, "");
    assert!(request.cookies.is_empty());
  }

  #[test]
  fn parse_post_with_body_and_cookies() {
    let raw = "POST /login HTTP/1.1\r\n\
               Host: example.com\r\n\
               Cookie: sessionid=abc123; theme=dark\r\n\
               Content-Type: application/x-www-form-urlencoded\r\n\
               \r\n\
               username=admin&password=1234";

    let request = ParsedRequest::parse(raw).unwrap();

    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/login");
    assert_eq!(request.header("content-type"), Some("application/x-www-form-urlencoded"));
    assert_eq!(request.body, "username=admin&password=1234");
    assert_eq!(request.cookies.len(), 2);
    assert_eq!(request.cookies["sessionid"], "abc123");
    assert_eq!(request.cookies["theme"], "dark");
  }

  #[test]
  fn header_names_are_case_insensitive() {
    let request = ParsedRequest::parse("GET /a HTTP/1.0\r\nhOsT: app1.local:8080\r\n\r\n").unwrap();

    assert_eq!(request.header("Host"), Some("app1.local:8080"));
    assert_eq!(request.header("HOST"), Some("app1.local:8080"));
    assert_eq!(request.host(), Some("app1.local:8080"));
  }

  #[test]
  fn header_value_keeps_inner_colons() {
    let request = ParsedRequest::parse("GET /a HTTP/1.1\r\nReferer: http://example.com:81/x\r\n\r\n").unwrap();

    assert_eq!(request.header("referer"), Some("http://example.com:81/x"));
  }

  #[test]
  fn headers_stop_at_blank_line() {
    let request = ParsedRequest::parse("POST /a HTTP/1.1\r\nHost: a\r\n\r\nX-Not-A-Header: b").unwrap();

    assert_eq!(request.header("x-not-a-header"), None);
    assert_eq!(request.body, "X-Not-A-Header: b");
  }

  #[test]
  fn missing_separator_gives_empty_body() {
    let request = ParsedRequest::parse("GET /a HTTP/1.1\r\nHost: a").unwrap();

    assert_eq!(request.body, "");
    assert_eq!(request.host(), Some("a"));
  }

  #[test]
  fn malformed_pairs_are_skipped() {
    let request = ParsedRequest::parse("GET /a HTTP/1.1\r\nCookie: flag; token=x=y ;theme=dark\r\n\r\n").unwrap();

    assert_eq!(request.cookies.len(), 2);
    assert_eq!(request.cookies["token"], "x=y");
    assert_eq!(request.cookies["theme"], "dark");
  }

  #[test]
  fn non_ascii_header_values_are_kept() {
    let raw = "GET /a HTTP/1.1\r\n\
               Host: app1.local\r\n\
               Cookie: user=Nguyễn; theme=dark\r\n\
               X-Name: café\r\n\
               \r\n";

    let request = ParsedRequest::parse(raw).unwrap();

    assert_eq!(request.header("x-name"), Some("café"));
    assert_eq!(request.cookies["user"], "Nguyễn");
    assert_eq!(request.cookies["theme"], "dark");
  }

  #[test]
  fn non_ascii_host_is_readable() {
    let request = ParsedRequest::parse("GET /a HTTP/1.1\r\nHost: bücher.local\r\n\r\n").unwrap();

    assert_eq!(request.host(), Some("bücher.local"));
  }

  #[test]
  fn cookie_pairs_split_on_first_equals_and_trim() {
    let raw = "GET /a HTTP/1.1\r\nCookie: k = v ; =x; q=\"quoted\"; s=a b\r\n\r\n";

    let request = ParsedRequest::parse(raw).unwrap();

    assert_eq!(request.cookies.len(), 4);
    assert_eq!(request.cookies["k"], "v");
    assert_eq!(request.cookies[""], "x");
    assert_eq!(request.cookies["q"], "\"quoted\"");
    assert_eq!(request.cookies["s"], "a b");
  }

  #[test]
  fn malformed_request_line() {
    assert_eq!(
      ParsedRequest::parse("GET /\r\nHost: a\r\n\r\n").unwrap_err(),
      ParseError::MalformedRequestLine
    );
    assert_eq!(
      ParsedRequest::parse("GET / HTTP/1.1 extra\r\n\r\n").unwrap_err(),
      ParseError::MalformedRequestLine
    );
    assert_eq!(ParsedRequest::parse("").unwrap_err(), ParseError::MalformedRequestLine);
  }
}
