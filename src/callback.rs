/// Local HTTP listener standing in for the app's callback page
use crate::error::{Result, SessionError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};
use url::Url;

/// Listens where the identity provider sends the browser back
///
/// The server binds the host and port of the configured callback URL and
/// hands back the full page URL (callback URL plus whatever query the
/// provider appended), which is exactly what the controller's `initialize`
/// inspects on page load.
pub struct CallbackServer {
    listener: TcpListener,
    callback_url: Url,
}

impl CallbackServer {
    /// Bind the callback URL's host and port
    ///
    /// Port `0` picks a free port; [`CallbackServer::redirect_uri`] reports it.
    pub async fn bind(callback_url: &Url) -> Result<Self> {
        let host = callback_url
            .host_str()
            .ok_or_else(|| SessionError::ConfigError("callback URL has no host".into()))?;
        let port = callback_url
            .port_or_known_default()
            .ok_or_else(|| SessionError::ConfigError("callback URL has no port".into()))?;

        // `localhost` resolves to whatever the resolver prefers; the browser
        // lands on the loopback address either way.
        let host = if host == "localhost" { "127.0.0.1" } else { host };
        let listener = TcpListener::bind((host, port)).await?;

        let mut callback_url = callback_url.clone();
        callback_url.set_query(None);
        callback_url.set_fragment(None);
        if port == 0 {
            let actual = listener.local_addr()?.port();
            callback_url
                .set_port(Some(actual))
                .map_err(|_| SessionError::ConfigError("callback URL cannot carry a port".into()))?;
        }

        info!(addr = %listener.local_addr()?, "listening for callback");
        Ok(Self {
            listener,
            callback_url,
        })
    }

    /// The callback URL this server answers on
    pub fn redirect_uri(&self) -> &Url {
        &self.callback_url
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the browser to arrive on the callback path
    ///
    /// Requests for other paths (favicons and the like) get a 404 and are
    /// otherwise ignored.
    pub async fn wait_for_callback(&self, timeout: Duration) -> Result<Url> {
        tokio::time::timeout(timeout, self.accept_callback())
            .await
            .map_err(|_| SessionError::CallbackTimeout)?
    }

    async fn accept_callback(&self) -> Result<Url> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "callback connection");
            if let Some(page_url) = self.handle_request(stream).await? {
                return Ok(page_url);
            }
        }
    }

    async fn handle_request(&self, mut stream: TcpStream) -> Result<Option<Url>> {
        let mut request_line = String::new();
        {
            let mut reader = BufReader::new(&mut stream);
            reader.read_line(&mut request_line).await?;

            // Drain the headers so closing the socket does not reset the connection
            let mut header = String::new();
            while reader.read_line(&mut header).await? > 2 {
                header.clear();
            }
        }

        // Request line: GET /callback?code=... HTTP/1.1
        let mut parts = request_line.split_whitespace();
        let target = match (parts.next(), parts.next()) {
            (Some(_method), Some(target)) => target,
            _ => {
                send_response(&mut stream, "400 Bad Request", "Invalid request").await?;
                return Ok(None);
            }
        };

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        if path != self.callback_url.path() {
            send_response(&mut stream, "404 Not Found", "Not found").await?;
            return Ok(None);
        }

        let mut page_url = self.callback_url.clone();
        page_url.set_query(query);

        let failed = page_url.query_pairs().any(|(key, _)| key == "error");
        if failed {
            send_response(
                &mut stream,
                "400 Bad Request",
                "Authorization failed. Return to your terminal for details.",
            )
            .await?;
        } else {
            send_response(
                &mut stream,
                "200 OK",
                "Authorization received. You can close this window and return to your terminal.",
            )
            .await?;
        }

        Ok(Some(page_url))
    }
}

async fn send_response(stream: &mut TcpStream, status: &str, message: &str) -> Result<()> {
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>codeflow</title></head>\n<body><p>{}</p></body>\n</html>",
        message
    );

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        html.len(),
        html
    );

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", target).as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn server() -> CallbackServer {
        CallbackServer::bind(&Url::parse("http://127.0.0.1:0/callback").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_reports_actual_port() {
        let server = server().await;
        let port = server.local_addr().unwrap().port();

        assert!(port > 0);
        assert_eq!(
            server.redirect_uri().as_str(),
            format!("http://127.0.0.1:{}/callback", port)
        );
    }

    #[tokio::test]
    async fn test_callback_returns_page_url() {
        let server = server().await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let ignored = get(addr, "/favicon.ico").await;
            let answered = get(addr, "/callback?code=abc123&session_state=s1").await;
            (ignored, answered)
        });

        let page_url = server
            .wait_for_callback(Duration::from_secs(5))
            .await
            .unwrap();
        let (ignored, answered) = client.await.unwrap();

        assert!(ignored.starts_with("HTTP/1.1 404"));
        assert!(answered.starts_with("HTTP/1.1 200"));
        assert_eq!(page_url.path(), "/callback");
        assert!(page_url
            .query_pairs()
            .any(|(k, v)| k == "code" && v == "abc123"));
    }

    #[tokio::test]
    async fn test_provider_error_is_still_returned() {
        let server = server().await;
        let addr = server.local_addr().unwrap();

        let client = tokio::spawn(async move {
            get(addr, "/callback?error=access_denied&error_description=User%20cancelled").await
        });

        let page_url = server
            .wait_for_callback(Duration::from_secs(5))
            .await
            .unwrap();
        let response = client.await.unwrap();

        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(page_url
            .query_pairs()
            .any(|(k, v)| k == "error_description" && v == "User cancelled"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let server = server().await;

        let result = server.wait_for_callback(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SessionError::CallbackTimeout)));
    }
}
