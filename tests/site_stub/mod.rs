use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// A tiny static site:
///
/// `/` links to `/about`, `#content`, a cross-origin `/outside` and
/// `/partner`, which redirects to another origin;
/// `/about` links to `/broken` (500) and `/services`.
pub struct SiteStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SiteStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let port = addr.to_ip().map(|a| a.port()).expect("tcp listener");
        // Same server, different host string: a different origin.
        let cross_origin = format!("http://localhost:{port}/outside");
        let partner_target = format!("http://localhost:{port}/elsewhere");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_for_server = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                requests_for_server
                    .lock()
                    .expect("lock requests")
                    .push(path.clone());

                if path == "/partner" {
                    let location =
                        tiny_http::Header::from_bytes(&b"Location"[..], partner_target.as_bytes())
                            .expect("build header");
                    let _ = request.respond(
                        tiny_http::Response::from_string("")
                            .with_status_code(302)
                            .with_header(location),
                    );
                    continue;
                }

                let (status, body) = match path.as_str() {
                    "/" => (
                        200,
                        format!(
                            r##"<!doctype html>
<html>
  <head><title>Home</title></head>
  <body>
    <h1>Welcome</h1>
    <a href="/about">About</a>
    <a href="#content">Skip to content</a>
    <a href="{cross_origin}">Outside</a>
    <a href="/partner">Partner</a>
    <a href="mailto:hello@example.com">Mail</a>
  </body>
</html>
"##
                        ),
                    ),
                    "/about" => (
                        200,
                        r#"<!doctype html>
<html>
  <head>
    <title>About</title>
    <meta name="description" content="About the team">
  </head>
  <body>
    <h1>About us</h1>
    <a href="broken">Broken</a>
    <a href="./services">Services</a>
  </body>
</html>
"#
                        .to_owned(),
                    ),
                    "/services" => (
                        200,
                        r#"<!doctype html>
<html>
  <head>
    <title>Services</title>
    <meta name="description" content="What we do">
  </head>
  <body>
    <h1>Services</h1>
    <a href="/">Home</a>
  </body>
</html>
"#
                        .to_owned(),
                    ),
                    "/broken" => (500, "internal error".to_owned()),
                    "/outside" => (
                        200,
                        "<html><head><title>Outside</title></head></html>".to_owned(),
                    ),
                    "/elsewhere" => (
                        200,
                        "<html><head><title>Elsewhere</title></head><body><h1>OTHER SITE</h1></body></html>"
                            .to_owned(),
                    ),
                    _ => (404, "not found".to_owned()),
                };

                let mut response = tiny_http::Response::from_string(body).with_status_code(status);
                if status == 200 {
                    let header = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/html; charset=utf-8"[..],
                    )
                    .expect("build header");
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Request paths in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock requests").clone()
    }
}

impl Drop for SiteStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// An address nothing listens on.
#[allow(dead_code)]
pub fn closed_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}
