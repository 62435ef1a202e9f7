use vigil::error::{Direction, Error};
use vigil::http::method::Method;
use vigil::http::parser::{FormMethodOverride, HeaderMethodOverride, HttpRequestParser, RequestParser};
use vigil::http::request::Request;
use vigil::stream::{LimitedStream, ProtocolReader};

async fn parse_with<P: RequestParser>(parser: &P, raw: &[u8]) -> vigil::Result<Option<Request>> {
    let mut input = raw;
    let mut reader = ProtocolReader::default();
    parser.parse(&mut reader.bind(&mut input)).await
}

async fn parse(raw: &[u8]) -> vigil::Result<Option<Request>> {
    parse_with(&HttpRequestParser::new(), raw).await
}

#[tokio::test]
async fn test_parse_simple_get_request() {
    let req = b"GET /items/42?x=1 HTTP/1.1\r\nHost: h\r\nConnection: Keep-Alive\r\n\r\n";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(parsed.method(), Method::Get);
    assert_eq!(parsed.protocol(), "HTTP/1.1");
    assert_eq!(parsed.segments(), ["items", "42"]);
    assert_eq!(parsed.query().get("x"), Some("1"));
    assert_eq!(parsed.query().len(), 1);
    assert_eq!(parsed.header("host"), Some("h"));
    assert!(parsed.keep_alive());
    assert!(parsed.body().is_empty());
}

#[tokio::test]
async fn test_parse_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(parsed.method(), Method::Post);
    assert_eq!(parsed.uri(), "/api");
    assert_eq!(&parsed.body()[..], b"hello");
}

#[tokio::test]
async fn test_parse_body_is_exactly_content_length() {
    let raw = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\n\r\n";
    let mut input = &raw[..];
    let mut reader = ProtocolReader::default();
    let parser = HttpRequestParser::new();

    let first = parser.parse(&mut reader.bind(&mut input)).await.unwrap().unwrap();
    let second = parser.parse(&mut reader.bind(&mut input)).await.unwrap().unwrap();

    assert_eq!(&first.body()[..], b"abc");
    assert_eq!(second.method(), Method::Get);
    assert_eq!(second.uri(), "/b");
}

#[tokio::test]
async fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(parsed.headers().len(), 3);
    assert_eq!(parsed.header("Host"), Some("example.com"));
    assert_eq!(parsed.header("user-agent"), Some("test-client"));
    assert_eq!(parsed.header("ACCEPT"), Some("*/*"));
}

#[tokio::test]
async fn test_parse_header_value_keeps_colons() {
    let req = b"GET / HTTP/1.1\r\nReferer: http://a/b\r\n\r\n";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(parsed.header("referer"), Some("http://a/b"));
}

#[tokio::test]
async fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /search?q=rust+lang&page=2 HTTP/1.1\r\n\r\n";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(parsed.uri(), "/search");
    assert_eq!(parsed.query().get("q"), Some("rust lang"));
    assert_eq!(parsed.query().get("page"), Some("2"));
}

#[tokio::test]
async fn test_parse_target_with_spaces_uses_last_space() {
    let req = b"GET /a b HTTP/1.1\r\n\r\n";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(parsed.uri(), "/a b");
    assert_eq!(parsed.protocol(), "HTTP/1.1");
}

#[tokio::test]
async fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    assert!(parse(req).await.unwrap().is_none());
}

#[tokio::test]
async fn test_parse_empty_stream_is_no_request() {
    assert!(parse(b"").await.unwrap().is_none());
}

#[tokio::test]
async fn test_parse_request_line_without_protocol() {
    assert!(parse(b"GET\r\n\r\n").await.unwrap().is_none());
    assert!(parse(b"GET /\r\n\r\n").await.unwrap().is_none());
}

#[tokio::test]
async fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    let err = parse(req).await.unwrap_err();

    assert!(matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
}

#[tokio::test]
async fn test_parse_huge_content_length_fails_without_allocating() {
    let req = b"POST / HTTP/1.1\r\nContent-Length: 9223372036854775807\r\n\r\nabc";
    let err = parse(req).await.unwrap_err();

    assert!(matches!(err, Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
}

#[tokio::test]
async fn test_parse_body_past_read_budget_is_refused() {
    let raw: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 1000\r\n\r\nabc";
    let mut stream = LimitedStream::new(raw, Some(256), None);
    let mut reader = ProtocolReader::default();

    let err = HttpRequestParser::new()
        .parse(&mut reader.bind_budgeted(&mut stream))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Io(ref e) if Error::exceeded_direction(e) == Some(Direction::Read))
    );
}

#[tokio::test]
async fn test_parse_invalid_http_method() {
    let err = parse(b"INVALID / HTTP/1.1\r\n\r\n").await.unwrap_err();
    assert!(matches!(err, Error::UnknownMethod(name) if name == "INVALID"));
}

#[tokio::test]
async fn test_parse_malformed_header() {
    let err = parse(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n").await.unwrap_err();
    assert!(matches!(err, Error::MalformedHeader(_)));
}

#[tokio::test]
async fn test_parse_invalid_content_length() {
    let err = parse(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidContentLength(_)));
}

#[tokio::test]
async fn test_parse_negative_content_length_means_no_body() {
    let parsed = parse(b"POST / HTTP/1.1\r\nContent-Length: -4\r\n\r\n")
        .await
        .unwrap()
        .unwrap();
    assert!(parsed.body().is_empty());
}

#[tokio::test]
async fn test_parse_various_http_methods() {
    for expected in Method::ALL {
        let req = format!("{} / HTTP/1.1\r\n\r\n", expected.as_str().to_lowercase());
        let parsed = parse(req.as_bytes()).await.unwrap().unwrap();
        assert_eq!(parsed.method(), expected);
    }
}

#[tokio::test]
async fn test_parse_method_cache_is_shared_by_requests() {
    let parser = HttpRequestParser::new();
    parse_with(&parser, b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    parse_with(&parser, b"GET /x HTTP/1.1\r\n\r\n").await.unwrap();
    parse_with(&parser, b"POST / HTTP/1.1\r\n\r\n").await.unwrap();

    assert_eq!(parser.methods().len(), 2);
}

#[tokio::test]
async fn test_parse_request_with_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03";
    let parsed = parse(req).await.unwrap().unwrap();

    assert_eq!(&parsed.body()[..], b"\x00\x01\x02\x03");
}

#[tokio::test]
async fn test_header_override_replaces_method() {
    let parser = HeaderMethodOverride::new(HttpRequestParser::new());
    let req = b"POST /items/1 HTTP/1.1\r\nX-HTTP-Method-Override: DELETE\r\n\r\n";
    let parsed = parse_with(&parser, req).await.unwrap().unwrap();

    assert_eq!(parsed.method(), Method::Delete);
    assert_eq!(parsed.segments(), ["items", "1"]);
}

#[tokio::test]
async fn test_header_override_absent_keeps_method() {
    let parser = HeaderMethodOverride::new(HttpRequestParser::new());
    let parsed = parse_with(&parser, b"POST / HTTP/1.1\r\n\r\n").await.unwrap().unwrap();

    assert_eq!(parsed.method(), Method::Post);
}

#[tokio::test]
async fn test_form_override_reads_body_field() {
    let parser = FormMethodOverride::new(HttpRequestParser::new());
    let req = b"POST /items/1 HTTP/1.1\r\nContent-Length: 18\r\n\r\n_method=put&name=x";
    let parsed = parse_with(&parser, req).await.unwrap().unwrap();

    assert_eq!(parsed.method(), Method::Put);
    assert_eq!(parsed.form().get("name"), Some("x"));
}
