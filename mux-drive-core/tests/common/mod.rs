#![allow(dead_code)]

use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

/// Deterministic bytes that are not trivially compressible.
pub fn payload(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}

/// Serve `routes` on an ephemeral localhost port. Each route is `(path, body, with_length)`:
/// with `with_length == false` the body is streamed in pieces without a Content-Length header.
/// Unknown paths answer 404.
pub async fn serve(routes: Vec<(&'static str, Vec<u8>, bool)>) -> String {
    let mut app = Router::new();
    for (path, body, with_length) in routes {
        app = if with_length {
            app.route(path, get(move || async move { body.clone() }))
        } else {
            app.route(
                path,
                get(move || {
                    let pieces: Vec<Result<Vec<u8>, std::io::Error>> =
                        body.chunks(7_919).map(|c| Ok(c.to_vec())).collect();
                    async move { Body::from_stream(futures::stream::iter(pieces)) }
                }),
            )
        };
    }
    let app = app.fallback(|| async { StatusCode::NOT_FOUND });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}
