//! Runs the client against a canned HTTP/1.1 server bound to localhost.

use newrelic_client::{
    ApiKey,
    ApplicationSource,
    ClientError,
    Deployment,
    NewRelicClient,
    RemoteError,
};
use pretty_assertions::assert_eq;
use std::{
    io::{
        Read,
        Write,
    },
    net::{
        SocketAddr,
        TcpListener,
        TcpStream,
    },
    sync::mpsc,
    thread,
    time::{
        Duration,
        Instant,
    },
};
use url::Url;

struct CannedResponse {
    status: &'static str,
    headers: Vec<String>,
    body: String,
}

impl CannedResponse {
    fn ok(body: impl Into<String>) -> Self {
        Self {
            status: "200 OK",
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn status(status: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }
}

#[derive(Debug)]
struct RecordedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serves `responses` in order, one connection each, and reports what it received.
fn serve(responses: Vec<CannedResponse>) -> (SocketAddr, mpsc::Receiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            tx.send(request).unwrap();

            let mut raw = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                response.status,
                response.body.len()
            );
            for header in &response.headers {
                raw.push_str(header);
                raw.push_str("\r\n");
            }
            raw.push_str("\r\n");
            raw.push_str(&response.body);
            stream.write_all(raw.as_bytes()).unwrap();
        }
    });

    (addr, rx)
}

fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before the request head was complete");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.parse::<usize>().unwrap())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before the request body was complete");
        body.extend_from_slice(&chunk[..n]);
    }

    RecordedRequest {
        request_line,
        headers,
        body: String::from_utf8(body).unwrap(),
    }
}

fn client_for(addr: SocketAddr) -> NewRelicClient {
    NewRelicClient::builder(ApiKey::new("test-key"))
        .base_url(Url::parse(&format!("http://{addr}/v2/")).unwrap())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn application_json(id: i64, name: &str, response_time: f64) -> String {
    format!(
        r#"{{"id": {id}, "name": "{name}", "language": "ruby", "health_status": "green",
            "application_summary": {{"response_time": {response_time}, "throughput": 10.0, "error_rate": 0.0,
              "apdex_target": 0.5, "apdex_score": 1.0, "host_count": 1, "instance_count": 2}},
            "end_user_summary": {{"response_time": 0.0, "throughput": 0.0, "apdex_target": 0.0, "apdex_score": 0.0}}}}"#
    )
}

#[test]
fn lists_applications_with_api_key_header() {
    let body = format!(
        r#"{{"applications": [{}, {}]}}"#,
        application_json(1, "foo", 0.1),
        application_json(2, "bar", 0.2)
    );
    let (addr, requests) = serve(vec![CannedResponse::ok(body)]);

    let apps = client_for(addr).list_applications().unwrap();
    let names: Vec<_> = apps.iter().map(|app| app.name.as_str()).collect();
    assert_eq!(names, vec!["foo", "bar"]);
    assert_eq!(apps[1].application_summary.response_time, 0.2);

    let request = requests.recv().unwrap();
    assert_eq!(request.request_line, "GET /v2/applications.json HTTP/1.1");
    assert_eq!(request.header("x-api-key"), Some("test-key"));
    assert_eq!(request.header("content-type"), Some("application/json"));
}

#[test]
fn follows_pagination_links() {
    let (addr, requests) = {
        // The server address is only known after binding, so page one links
        // relatively.
        let first = CannedResponse::ok(format!(r#"{{"applications": [{}]}}"#, application_json(1, "foo", 0.1)))
            .with_header(r#"link: </v2/applications.json?page=2>; rel="next", </v2/applications.json?page=2>; rel="last""#);
        let second = CannedResponse::ok(format!(r#"{{"applications": [{}]}}"#, application_json(2, "checkout-api", 0.3)))
            .with_header(r#"link: </v2/applications.json?page=1>; rel="first""#);
        serve(vec![first, second])
    };

    let app = client_for(addr).find_application_by_name("checkout-api").unwrap();
    assert_eq!(app.id, 2);

    assert_eq!(requests.recv().unwrap().request_line, "GET /v2/applications.json HTTP/1.1");
    assert_eq!(
        requests.recv().unwrap().request_line,
        "GET /v2/applications.json?page=2 HTTP/1.1"
    );
}

#[test]
fn first_match_wins() {
    let body = format!(
        r#"{{"applications": [{}, {}]}}"#,
        application_json(1, "dup", 0.1),
        application_json(2, "dup", 0.2)
    );
    let (addr, _requests) = serve(vec![CannedResponse::ok(body)]);
    assert_eq!(client_for(addr).find_application_by_name("dup").unwrap().id, 1);
}

#[test]
fn unknown_name_is_not_found() {
    let body = format!(
        r#"{{"applications": [{}, {}]}}"#,
        application_json(1, "foo", 0.1),
        application_json(2, "bar", 0.2)
    );
    let (addr, _requests) = serve(vec![CannedResponse::ok(body)]);

    let err = client_for(addr).find_application_by_name("baz").unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[test]
fn error_status_is_a_remote_error() {
    let (addr, _requests) = serve(vec![CannedResponse::status(
        "401 Unauthorized",
        r#"{"error": {"title": "The API key provided is invalid"}}"#,
    )]);

    let err = client_for(addr).find_application_by_name("foo").unwrap_err();
    match err {
        ClientError::Remote(RemoteError::Status { status, body, .. }) => {
            assert_eq!(status.as_u16(), 401);
            assert!(body.contains("The API key provided is invalid"));
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[test]
fn malformed_body_is_a_decode_error() {
    let (addr, _requests) = serve(vec![CannedResponse::ok("<html>maintenance</html>")]);
    let err = client_for(addr).list_applications().unwrap_err();
    assert!(matches!(err, RemoteError::Decode { .. }), "unexpected error: {err}");
}

#[test]
fn unreachable_server_is_a_transport_error() {
    // Bind and drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let err = client_for(addr).list_applications().unwrap_err();
    assert!(matches!(err, RemoteError::Transport { .. }), "unexpected error: {err}");
}

#[test]
fn hung_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        // Accept and hold the connection without ever answering.
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_secs(30));
        drop(stream);
    });

    let client = NewRelicClient::builder(ApiKey::new("test-key"))
        .base_url(Url::parse(&format!("http://{addr}/v2/")).unwrap())
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();

    let started = Instant::now();
    let err = client.list_applications().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RemoteError::Transport { .. }), "unexpected error: {err}");
    assert!(elapsed < Duration::from_secs(5), "request took {elapsed:?}");
}

#[test]
fn endless_pagination_is_an_error() {
    let page = |n: usize| {
        CannedResponse::ok(format!(r#"{{"applications": [{}]}}"#, application_json(n as i64, "foo", 0.1)))
            .with_header(format!(r#"link: </v2/applications.json?page={}>; rel="next""#, n + 1))
    };
    let (addr, requests) = serve(vec![page(1), page(2)]);

    let client = NewRelicClient::builder(ApiKey::new("test-key"))
        .base_url(Url::parse(&format!("http://{addr}/v2/")).unwrap())
        .max_pages(2)
        .build()
        .unwrap();

    // The application could sit on a page that was never fetched, so this
    // must not turn into `NotFound`.
    let err = client.find_application_by_name("checkout-api").unwrap_err();
    match err {
        ClientError::Remote(RemoteError::TooManyPages { pages, url }) => {
            assert_eq!(pages, 2);
            assert_eq!(url.query(), Some("page=2"));
        }
        other => panic!("expected too many pages, got {other:?}"),
    }
    assert_eq!(requests.iter().count(), 2);
}

#[test]
fn records_deployment() {
    let (addr, requests) = serve(vec![CannedResponse::status("201 Created", r#"{"deployment": {"id": 1}}"#)]);

    let deployment = Deployment {
        revision: "abc123".to_string(),
        changelog: "fix checkout".to_string(),
        description: String::new(),
        user: "ci".to_string(),
    };
    client_for(addr).record_deployment(42, &deployment).unwrap();

    let request = requests.recv().unwrap();
    assert_eq!(request.request_line, "POST /v2/applications/42/deployments.json HTTP/1.1");
    assert_eq!(request.header("x-api-key"), Some("test-key"));
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "deployment": { "revision": "abc123", "changelog": "fix checkout", "description": "", "user": "ci" }
        })
    );
}

#[test]
fn rejected_deployment_carries_the_body() {
    let (addr, _requests) = serve(vec![CannedResponse::status(
        "422 Unprocessable Entity",
        r#"{"error": {"title": "revision can't be blank"}}"#,
    )]);

    let err = client_for(addr)
        .record_deployment(42, &Deployment::default())
        .unwrap_err();
    assert!(err.to_string().contains("revision can't be blank"), "unexpected error: {err}");
}
