use super::{Book, Chapter, LibraryClient, LibraryError, ProgressRecord};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const USER_AGENT: &str = concat!("novel-scroll/", env!("CARGO_PKG_VERSION"));

/// Client for a Legado-style web service.
#[derive(Debug, Clone)]
pub struct HttpLibraryClient {
    base_url: String,
    http: Client,
}

impl HttpLibraryClient {
    pub fn new(base_url: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build library http client")?;
        info!(
            base_url = %base_url,
            connect_timeout_ms = connect_timeout.as_millis(),
            request_timeout_ms = request_timeout.as_millis(),
            "Library client ready"
        );
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, LibraryError> {
        debug!(path, "Library GET");
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LibraryError::HttpStatus {
                path: path.to_string(),
                status,
            });
        }
        Ok(response.text()?)
    }
}

impl LibraryClient for HttpLibraryClient {
    fn find_book_by_name(&self, name: &str) -> Result<Book, LibraryError> {
        let body = self.get_text("/getBookshelf", &[])?;
        let books: Vec<Book> = parse_data_list(&body)?;
        debug!(shelf_size = books.len(), "Fetched bookshelf");
        find_on_shelf(books, name)
    }

    fn chapter_list(&self, book: &Book) -> Result<Vec<Chapter>, LibraryError> {
        let body = self.get_text("/getChapterList", &[("url", book.book_url.clone())])?;
        parse_data_list(&body)
    }

    fn book_content(&self, book: &Book, chapter_index: usize) -> Result<String, LibraryError> {
        let body = self.get_text(
            "/getBookContent",
            &[
                ("url", book.book_url.clone()),
                ("index", chapter_index.to_string()),
            ],
        )?;
        parse_content(&body)
    }

    fn save_progress(&self, record: &ProgressRecord) -> Result<(), LibraryError> {
        let path = "/saveBookProgress";
        let payload = ProgressPayload::new(record, now_unix_millis());
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(&payload)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LibraryError::HttpStatus {
                path: path.to_string(),
                status,
            });
        }
        debug!(
            chapter = record.chapter_index,
            offset = record.chapter_pos,
            "Progress saved"
        );
        Ok(())
    }
}

/// Trim, drop trailing slashes, and assume `http://` when no scheme is given.
pub fn normalize_base_url(raw: &str) -> String {
    let url = raw.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressPayload<'a> {
    name: &'a str,
    author: &'a str,
    url: &'a str,
    dur_chapter_index: usize,
    dur_chapter_pos: usize,
    dur_chapter_title: &'a str,
    dur_chapter_time: u64,
}

impl<'a> ProgressPayload<'a> {
    fn new(record: &'a ProgressRecord, sent_at_ms: u64) -> Self {
        Self {
            name: &record.book_name,
            author: &record.author,
            url: &record.book_url,
            dur_chapter_index: record.chapter_index,
            dur_chapter_pos: record.chapter_pos,
            dur_chapter_title: &record.chapter_title,
            dur_chapter_time: sent_at_ms,
        }
    }
}

fn find_on_shelf(books: Vec<Book>, name: &str) -> Result<Book, LibraryError> {
    books
        .into_iter()
        .find(|book| !name.is_empty() && book.name.contains(name))
        .ok_or_else(|| LibraryError::BookNotFound(name.to_string()))
}

/// Unwraps the service envelope: `{"data": ...}` or the bare value.
fn unwrap_data(root: Value) -> Result<Value, LibraryError> {
    match root {
        Value::Object(mut map) => {
            if map.get("isSuccess").and_then(Value::as_bool) == Some(false) {
                let message = map
                    .get("errorMsg")
                    .and_then(Value::as_str)
                    .unwrap_or("request rejected")
                    .to_string();
                return Err(LibraryError::UnexpectedPayload(message));
            }
            match map.remove("data") {
                Some(data) => Ok(data),
                None => Ok(Value::Object(map)),
            }
        }
        other => Ok(other),
    }
}

fn parse_data_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, LibraryError> {
    match unwrap_data(serde_json::from_str(body)?)? {
        list @ Value::Array(_) => Ok(serde_json::from_value(list)?),
        Value::Null => Ok(Vec::new()),
        other => Err(LibraryError::UnexpectedPayload(format!(
            "expected a list, got {}",
            json_kind(&other)
        ))),
    }
}

fn parse_content(body: &str) -> Result<String, LibraryError> {
    Ok(match unwrap_data(serde_json::from_str(body)?)? {
        Value::Object(mut map) if map.contains_key("content") => match map.remove("content") {
            Some(content) => scalar_text(content),
            None => String::new(),
        },
        other => scalar_text(other),
    })
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Request line and body of one captured request.
    type Captured = (String, String);

    /// Accepts one connection, records the request and answers with `body`.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let base = format!("http://{}", listener.local_addr().expect("listener address"));
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept request");
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let mut content_length = 0;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).expect("header line");
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("content length");
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).expect("request body");

            let mut stream = reader.into_inner();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
            stream.flush().expect("flush response");
            (
                request_line.trim_end().to_string(),
                String::from_utf8(request_body).expect("utf-8 request body"),
            )
        });
        (base, server)
    }

    fn local_client(base: &str) -> HttpLibraryClient {
        HttpLibraryClient {
            base_url: normalize_base_url(base),
            http: Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("test http client"),
        }
    }

    fn shelf_book() -> Book {
        Book {
            name: "诡秘之主".into(),
            author: "爱潜水的乌贼".into(),
            book_url: "https://lib.test/b?id=7".into(),
            ..Book::default()
        }
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(normalize_base_url(" 192.168.1.5:1122/ "), "http://192.168.1.5:1122");
        assert_eq!(normalize_base_url("https://legado.local//"), "https://legado.local");
        assert_eq!(normalize_base_url("http://127.0.0.1:1122"), "http://127.0.0.1:1122");
    }

    #[test]
    fn bookshelf_accepts_envelope_and_bare_array() {
        let wrapped = r#"{"isSuccess":true,"data":[{"name":"Book A"},{"name":"Book B","durChapterIndex":3}]}"#;
        let books: Vec<Book> = parse_data_list(wrapped).expect("wrapped list");
        assert_eq!(books.len(), 2);
        assert_eq!(books[1].dur_chapter_index, 3);

        let bare = r#"[{"name":"Only"}]"#;
        let books: Vec<Book> = parse_data_list(bare).expect("bare list");
        assert_eq!(books[0].name, "Only");
    }

    #[test]
    fn rejected_request_surfaces_the_service_message() {
        let body = r#"{"isSuccess":false,"errorMsg":"未找到书籍","data":null}"#;
        let err = parse_data_list::<Chapter>(body).expect_err("rejected");
        assert!(matches!(err, LibraryError::UnexpectedPayload(ref msg) if msg == "未找到书籍"));
    }

    #[test]
    fn non_list_payload_is_unexpected() {
        let err = parse_data_list::<Chapter>(r#"{"data":{"title":"x"}}"#).expect_err("object");
        assert!(matches!(err, LibraryError::UnexpectedPayload(_)));
        let err = parse_data_list::<Chapter>("not json").expect_err("garbage");
        assert!(matches!(err, LibraryError::Decode(_)));
    }

    #[test]
    fn chapter_list_ignores_unknown_fields() {
        let body = r#"{"data":[{"title":"第一章","index":0,"url":"c0","isVolume":false},{"title":"第二章","index":1}]}"#;
        let chapters: Vec<Chapter> = parse_data_list(body).expect("chapters");
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title, "第二章");
        assert!(chapters[1].url.is_empty());
    }

    #[test]
    fn content_shapes() {
        assert_eq!(parse_content(r#"{"data":"正文"}"#).expect("string"), "正文");
        assert_eq!(
            parse_content(r#"{"data":{"content":"inner","title":"t"}}"#).expect("object"),
            "inner"
        );
        assert_eq!(parse_content(r#"{"data":null}"#).expect("null"), "");
        assert_eq!(parse_content(r#"{"data":42}"#).expect("number"), "42");
        assert_eq!(parse_content(r#"{"data":["a"]}"#).expect("array"), r#"["a"]"#);
        assert_eq!(parse_content(r#""bare text""#).expect("bare"), "bare text");
    }

    #[test]
    fn shelf_lookup_matches_by_substring() {
        let shelf = vec![
            Book {
                name: "凡人修仙传".into(),
                ..Book::default()
            },
            Book {
                name: "诡秘之主".into(),
                ..Book::default()
            },
        ];
        assert_eq!(find_on_shelf(shelf.clone(), "诡秘").expect("found").name, "诡秘之主");
        assert!(matches!(
            find_on_shelf(shelf.clone(), "missing"),
            Err(LibraryError::BookNotFound(name)) if name == "missing"
        ));
        assert!(find_on_shelf(shelf, "").is_err());
    }

    #[test]
    fn progress_payload_uses_service_field_names() {
        let book = Book {
            name: "Book".into(),
            author: "Author".into(),
            book_url: "https://example.org/b".into(),
            ..Book::default()
        };
        let record = ProgressRecord::for_book(&book, 4, 120, "Chapter 5");
        let json = serde_json::to_value(ProgressPayload::new(&record, 1_700_000_000_000))
            .expect("payload serializes");
        assert_eq!(json["name"], "Book");
        assert_eq!(json["author"], "Author");
        assert_eq!(json["url"], "https://example.org/b");
        assert_eq!(json["durChapterIndex"], 4);
        assert_eq!(json["durChapterPos"], 120);
        assert_eq!(json["durChapterTitle"], "Chapter 5");
        assert_eq!(json["durChapterTime"], 1_700_000_000_000u64);
    }

    #[test]
    fn bookshelf_request_targets_the_shelf_endpoint() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"isSuccess":true,"data":[{"name":"诡秘之主","durChapterIndex":2}]}"#,
        );
        let book = local_client(&base)
            .find_book_by_name("诡秘")
            .expect("book found");
        let (request_line, _) = server.join().expect("server thread");
        assert_eq!(request_line, "GET /getBookshelf HTTP/1.1");
        assert_eq!(book.dur_chapter_index, 2);
    }

    #[test]
    fn content_request_encodes_book_url_and_index() {
        let (base, server) = serve_once("200 OK", r#"{"isSuccess":true,"data":"正文内容"}"#);
        let text = local_client(&base)
            .book_content(&shelf_book(), 12)
            .expect("content fetched");
        let (request_line, _) = server.join().expect("server thread");
        assert_eq!(
            request_line,
            "GET /getBookContent?url=https%3A%2F%2Flib.test%2Fb%3Fid%3D7&index=12 HTTP/1.1"
        );
        assert_eq!(text, "正文内容");
    }

    #[test]
    fn chapter_list_request_carries_the_book_url() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"isSuccess":true,"data":[{"title":"第一章","index":0,"url":"c0"}]}"#,
        );
        let chapters = local_client(&base)
            .chapter_list(&shelf_book())
            .expect("chapters fetched");
        let (request_line, _) = server.join().expect("server thread");
        assert!(request_line.starts_with("GET /getChapterList?url=https%3A%2F%2Flib.test"));
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "第一章");
    }

    #[test]
    fn progress_is_posted_as_json() {
        let (base, server) = serve_once("200 OK", r#"{"isSuccess":true}"#);
        let record = ProgressRecord::for_book(&shelf_book(), 4, 120, "第五章");
        local_client(&base)
            .save_progress(&record)
            .expect("progress saved");
        let (request_line, body) = server.join().expect("server thread");
        assert_eq!(request_line, "POST /saveBookProgress HTTP/1.1");

        let json: Value = serde_json::from_str(&body).expect("json body");
        assert_eq!(json["name"], "诡秘之主");
        assert_eq!(json["url"], "https://lib.test/b?id=7");
        assert_eq!(json["durChapterIndex"], 4);
        assert_eq!(json["durChapterPos"], 120);
        assert_eq!(json["durChapterTitle"], "第五章");
        assert!(json["durChapterTime"].as_u64().is_some_and(|ms| ms > 0));
    }

    #[test]
    fn error_status_is_reported_with_the_path() {
        let (base, server) = serve_once("500 Internal Server Error", "{}");
        let err = local_client(&base)
            .book_content(&shelf_book(), 0)
            .expect_err("server error");
        server.join().expect("server thread");
        assert!(matches!(
            err,
            LibraryError::HttpStatus { ref path, status }
                if path == "/getBookContent" && status.as_u16() == 500
        ));
    }
}
