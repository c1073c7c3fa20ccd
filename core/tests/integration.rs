//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every verb of
//! `HttpCall` over real HTTP. Notifications are observed through an
//! `EventStream` whose foreground context runs on a dedicated thread, the
//! way a host with its own main loop would use the engine.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use httpcall_core::{
    EngineConfig, Event, EventStream, Field, Flag, Foreground, HttpCall, HttpMethod, Progress,
    RequestHeader, Response, ResponseHandler, ResponseKind,
};
use mock_server::{file_bytes, lines_text, UploadedPart, FAILURE_BODY, FILE_SIZE};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn server() -> SocketAddr {
    static ADDR: OnceLock<SocketAddr> = OnceLock::new();
    *ADDR.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });
        addr
    })
}

fn url(path: &str) -> String {
    format!("http://{}{}", server(), path)
}

fn client(config: EngineConfig) -> (HttpCall, Receiver<Event>) {
    server();
    let (stream, events) = EventStream::channel();
    let (foreground, _handle) = Foreground::spawn("test-foreground").unwrap();
    (HttpCall::new(config, foreground, stream), events)
}

/// Events of one request, up to and including its terminal flag.
fn events_until_terminal(events: &Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(EVENT_TIMEOUT)
            .expect("request did not finish");
        let terminal = event.flag().is_some_and(Flag::is_terminal);
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

fn flags(events: &[Event]) -> Vec<Flag> {
    events.iter().filter_map(Event::flag).collect()
}

fn progress(events: &[Event]) -> Vec<Progress> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress(p) => Some(*p),
            Event::Flag { .. } => None,
        })
        .collect()
}

fn final_response(events: &[Event]) -> &Response {
    match events.last() {
        Some(Event::Flag { response, .. }) => response,
        other => panic!("expected a terminal flag, got {other:?}"),
    }
}

fn response_for(events: &[Event], wanted: Flag) -> &Response {
    events
        .iter()
        .find_map(|e| match e {
            Event::Flag { flag, response } if *flag == wanted => Some(response),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no {wanted} in {events:?}"))
}

// --- GET ---

#[test]
fn get_text_delivers_body() {
    let (client, events) = client(EngineConfig::default());
    assert_eq!(client.get_text(&url("/ok"), None).join(), Flag::ResponseIsReady);

    let events = events_until_terminal(&events);
    assert_eq!(flags(&events), vec![Flag::RequestAccepted, Flag::ResponseIsReady]);
    assert_eq!(
        response_for(&events, Flag::RequestAccepted).text(),
        Some("Started download of 5 bytes")
    );

    let response = final_response(&events);
    assert_eq!(response.text(), Some("hello"));
    assert_eq!(response.response_code(), 200);
    assert_eq!(response.content_length(), 5);
    assert_eq!(response.request_method(), Some(HttpMethod::Get));
    assert!(response.content_type().unwrap().starts_with("text/plain"));
}

#[test]
fn get_file_stores_body_under_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (client, events) = client(EngineConfig::default());
    client.get_file(&url("/file"), None, dir.path()).join();

    let events = events_until_terminal(&events);
    assert_eq!(flags(&events), vec![Flag::RequestAccepted, Flag::ResponseIsReady]);

    let path = final_response(&events).file_path().unwrap().to_path_buf();
    assert!(path.starts_with(dir.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), FILE_SIZE as u64);
    assert_eq!(std::fs::read(&path).unwrap(), file_bytes());

    let updates = progress(&events);
    assert_eq!(updates.last().map(|p| p.percentage), Some(100));
    assert!(updates.iter().all(|p| p.total_size == FILE_SIZE as i64));
}

#[test]
fn get_input_stream_hands_over_open_body() {
    let (client, events) = client(EngineConfig::default());
    client.get_input_stream(&url("/lines"), None).join();

    let events = events_until_terminal(&events);
    let stream = final_response(&events).stream().unwrap();
    let mut reader = stream.take().unwrap();
    let mut body = String::new();
    reader.read_to_string(&mut body).unwrap();
    assert_eq!(body, lines_text());
    assert!(stream.take().is_none());
}

#[test]
fn text_progress_is_strictly_increasing() {
    let (client, events) = client(EngineConfig::default());
    client.get_text(&url("/lines"), None).join();

    let events = events_until_terminal(&events);
    let percentages: Vec<u8> = progress(&events).iter().map(|p| p.percentage).collect();
    assert!(!percentages.is_empty());
    assert!(percentages.windows(2).all(|w| w[0] < w[1]), "{percentages:?}");
    assert_eq!(percentages.last(), Some(&100));
    assert_eq!(final_response(&events).text(), Some(lines_text().as_str()));
}

#[test]
fn unknown_length_reports_completion_once() {
    let (client, events) = client(EngineConfig::default());
    client.get_text(&url("/chunked"), None).join();

    let events = events_until_terminal(&events);
    let updates = progress(&events);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].percentage, 100);
    assert!(updates[0].total_size <= 0);
    assert_eq!(updates[0].bytes_read, lines_text().len() as u64);
    assert_eq!(
        response_for(&events, Flag::RequestAccepted).text(),
        Some("Started download of -1 bytes")
    );
}

#[test]
fn request_headers_are_sent() {
    let header = RequestHeader::new().with("X-Trace", "abc").with("X-Order", "1");
    let (client, events) = client(EngineConfig::default());
    client.get_text(&url("/headers"), Some(header)).join();

    let events = events_until_terminal(&events);
    let echoed: serde_json::Value = serde_json::from_str(final_response(&events).text().unwrap()).unwrap();
    assert_eq!(echoed["x-trace"], "abc");
    assert_eq!(echoed["x-order"], "1");
    assert!(echoed["user-agent"].as_str().unwrap().starts_with("httpcall/"));
}

// --- failures ---

#[test]
fn malformed_url_emits_only_wrong_url() {
    let (client, events) = client(EngineConfig::default());
    assert_eq!(client.get_text("not a url", None).join(), Flag::WrongUrl);

    let seen = events_until_terminal(&events);
    assert_eq!(flags(&seen), vec![Flag::WrongUrl]);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn non_success_status_is_unaccepted_with_code() {
    let (client, events) = client(EngineConfig::default());
    for code in [404u16, 500] {
        client.get_text(&url(&format!("/status/{code}")), None).join();
        let seen = events_until_terminal(&events);
        assert_eq!(flags(&seen), vec![Flag::RequestUnaccepted]);

        let response = final_response(&seen);
        assert_eq!(response.response_code(), code);
        assert_eq!(
            response.text(),
            Some(format!("{FAILURE_BODY} Response Code: {code}").as_str())
        );
    }
}

#[test]
fn configured_success_code_is_the_only_success() {
    let (client, events) = client(EngineConfig::default().with_successful_response_code(201));

    client
        .post_text(&url("/created"), None, Some("x"), ResponseKind::Text)
        .join();
    let seen = events_until_terminal(&events);
    assert_eq!(final_response(&seen).text(), Some("created:x"));

    client.get_text(&url("/ok"), None).join();
    let seen = events_until_terminal(&events);
    assert_eq!(flags(&seen), vec![Flag::RequestUnaccepted]);
    assert!(final_response(&seen).text().unwrap().ends_with(" Response Code: 200"));
}

#[test]
fn unreachable_server_is_error_message() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, events) = client(EngineConfig::default());
    client.get_text(&format!("http://{addr}/ok"), None).join();
    let seen = events_until_terminal(&events);
    assert_eq!(flags(&seen), vec![Flag::ErrorMessage]);
}

// --- writes ---

#[test]
fn write_methods_emit_accepted_sent_ready() {
    let (client, events) = client(EngineConfig::default());
    let target = url("/echo");

    for method in [HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete] {
        let handle = match method {
            HttpMethod::Post => client.post_text(&target, None, Some("  payload \n"), ResponseKind::Text),
            HttpMethod::Put => client.put_text(&target, None, Some("payload"), ResponseKind::Text),
            HttpMethod::Patch => client.patch_text(&target, None, Some("payload"), ResponseKind::Text),
            _ => client.delete_text(&target, None, Some("payload"), ResponseKind::Text),
        };
        assert_eq!(handle.join(), Flag::ResponseIsReady, "{method}");

        let seen = events_until_terminal(&events);
        assert_eq!(
            flags(&seen),
            vec![Flag::RequestAccepted, Flag::DataSent, Flag::ResponseIsReady],
            "{method}"
        );
        assert_eq!(final_response(&seen).text(), Some(format!("{method}:payload").as_str()));
    }
}

#[test]
fn missing_text_sends_empty_body() {
    let (client, events) = client(EngineConfig::default());
    client
        .delete_text(&url("/echo"), None, None, ResponseKind::Text)
        .join();
    let seen = events_until_terminal(&events);
    assert_eq!(final_response(&seen).text(), Some("DELETE:"));
}

#[test]
fn write_response_can_be_stored_as_file() {
    let dir = tempfile::tempdir().unwrap();
    let (client, events) = client(EngineConfig::default().with_download_prefix("reply"));
    client
        .post_text(&url("/echo"), None, Some("saved"), ResponseKind::file(dir.path()))
        .join();

    let seen = events_until_terminal(&events);
    let path = final_response(&seen).file_path().unwrap().to_path_buf();
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("reply_") && name.ends_with(".txt"), "{name}");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "POST:saved");
}

#[test]
fn multipart_form_uploads_fields_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("notes.txt");
    std::fs::write(&file_path, b"file contents").unwrap();

    let (client, events) = client(EngineConfig::default());
    let fields = vec![
        Field::new("a", "b"),
        Field::new("doc", file_path.to_string_lossy()),
    ];
    let header = RequestHeader::new().with("Content-Type", "application/json");
    client
        .post_multipart_form(&url("/upload"), Some(header), ResponseKind::Text, fields)
        .join();

    let seen = events_until_terminal(&events);
    assert_eq!(
        flags(&seen),
        vec![Flag::RequestAccepted, Flag::DataSent, Flag::ResponseIsReady]
    );
    let parts: Vec<UploadedPart> = serde_json::from_str(final_response(&seen).text().unwrap()).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "a");
    assert_eq!(parts[0].text.as_deref(), Some("b"));
    assert_eq!(parts[1].name, "doc");
    assert_eq!(parts[1].file_name.as_deref(), Some("notes.txt"));
    assert_eq!(parts[1].content_type.as_deref(), Some("text/plain"));
    assert_eq!(parts[1].size, "file contents".len());
}

#[test]
fn multipart_rejection_is_unaccepted() {
    let (client, events) = client(EngineConfig::default());
    client
        .post_multipart_form(&url("/ok"), None, ResponseKind::Text, vec![Field::new("a", "b")])
        .join();
    let seen = events_until_terminal(&events);
    assert_eq!(flags(&seen), vec![Flag::RequestUnaccepted]);
    assert!(final_response(&seen).text().unwrap().ends_with(" Response Code: 405"));
}

// --- dispatch ---

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(&'static str, Option<Flag>, Option<String>)>>,
}

impl Recorder {
    fn push(&self, stage: &'static str, flag: Option<Flag>) {
        let thread = thread::current().name().map(String::from);
        self.calls.lock().unwrap().push((stage, flag, thread));
    }
}

impl ResponseHandler for Recorder {
    fn on_background(&self, flag: Flag, _response: &Response) {
        self.push("bg", Some(flag));
    }

    fn on_foreground(&self, flag: Flag, _response: &Response) {
        self.push("fg", Some(flag));
    }

    fn on_progress(&self, _progress: Progress) {
        self.push("progress", None);
    }
}

#[test]
fn background_callbacks_run_on_worker_before_foreground() {
    server();
    let recorder = Arc::new(Recorder::default());
    let (foreground, main_loop) = Foreground::channel();
    let client = HttpCall::new(EngineConfig::default(), foreground, recorder.clone());

    client
        .post_text(&url("/echo"), None, Some("x"), ResponseKind::Text)
        .join();
    let before = recorder.calls.lock().unwrap().clone();
    // Three flags plus the single 100% update for the 6-byte reply.
    assert_eq!(main_loop.run_pending(), 4);
    let after = recorder.calls.lock().unwrap().clone();

    let flags = [Flag::RequestAccepted, Flag::DataSent, Flag::ResponseIsReady];
    assert_eq!(before.len(), 3);
    for ((stage, flag, thread), want) in before.iter().zip(flags) {
        assert_eq!((*stage, *flag), ("bg", Some(want)));
        assert!(thread.as_deref().unwrap().starts_with("httpcall-"));
    }

    let foreground: Vec<(&str, Option<Flag>)> =
        after[3..].iter().map(|(stage, flag, _)| (*stage, *flag)).collect();
    assert_eq!(
        foreground,
        vec![
            ("fg", Some(Flag::RequestAccepted)),
            ("fg", Some(Flag::DataSent)),
            ("progress", None),
            ("fg", Some(Flag::ResponseIsReady)),
        ]
    );
    let test_thread = thread::current().name().map(String::from);
    assert!(after[3..].iter().all(|(_, _, thread)| thread == &test_thread));
}

// --- broken and raw replies ---

/// Serve one connection with a fixed response head and a body that may be
/// shorter than its `Content-Length`, then close.
fn raw_server(head: &'static str, body: &'static [u8]) -> String {
    server();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while !request.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).unwrap() == 0 {
                return;
            }
            request.push(byte[0]);
        }
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
    });
    format!("http://{addr}/raw")
}

const TRUNCATED_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 100\r\n\r\n";

#[test]
fn truncated_file_download_is_error_without_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let (client, events) = client(EngineConfig::default());
    let target = raw_server(TRUNCATED_HEAD, b"abc");

    assert_eq!(client.get_file(&target, None, dir.path()).join(), Flag::ErrorMessage);
    let seen = events_until_terminal(&events);
    assert_eq!(flags(&seen), vec![Flag::RequestAccepted, Flag::ErrorMessage]);
    assert!(final_response(&seen).result().is_none());

    let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(left.is_empty(), "files left behind: {left:?}");
}

#[test]
fn truncated_text_download_is_error_message() {
    let (client, events) = client(EngineConfig::default());
    let target = raw_server(TRUNCATED_HEAD, b"abc");

    assert_eq!(client.get_text(&target, None).join(), Flag::ErrorMessage);
    let seen = events_until_terminal(&events);
    assert_eq!(flags(&seen), vec![Flag::RequestAccepted, Flag::ErrorMessage]);
    let message = final_response(&seen).text().unwrap();
    assert!(
        message.starts_with("No response from server beyond accepting the request"),
        "{message}"
    );
}

#[test]
fn encoded_reply_keeps_wire_metadata() {
    let (client, events) = client(EngineConfig::default());
    let target = raw_server(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Encoding: gzip\r\nContent-Length: 4\r\n\r\n",
        b"\x1f\x8b\x08\x00",
    );

    let handle = client.get_input_stream(&target, None);
    assert_eq!(handle.join(), Flag::ResponseIsReady);
    let seen = events_until_terminal(&events);
    let response = final_response(&seen);
    assert_eq!(response.content_encoding(), Some("gzip"));
    assert_eq!(response.content_length(), 4);

    let mut body = Vec::new();
    response.stream().unwrap().take().unwrap().read_to_end(&mut body).unwrap();
    assert_eq!(body, b"\x1f\x8b\x08\x00");
}
