mod common;

use std::sync::Arc;

use common::{PROJECT, feature_ids, server};
use ows_server::{FilterError, Request, Response, ServerFilter};

struct Tagger;

impl ServerFilter for Tagger {
    fn send_response(&self, _request: &Request, response: &mut Response) -> Result<(), FilterError> {
        response.set_header("X-Tagged", "1");
        Ok(())
    }
}

fn content_length(header: &[u8]) -> usize {
    String::from_utf8_lossy(header)
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .and_then(|value| value.parse().ok())
        .unwrap_or(usize::MAX)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_while_registering() {
    let server = Arc::new(server());
    let mut tasks = Vec::new();

    for i in 0..32 {
        let server = Arc::clone(&server);
        tasks.push(tokio::task::spawn_blocking(move || {
            if i % 4 == 0 {
                server.filters().register(Arc::new(Tagger), i);
                None
            } else {
                let query = format!(
                    "MAP={}&SERVICE=WFS&REQUEST=GetFeature&TYPENAME=testlayer&STARTINDEX=1&MAXFEATURES=2",
                    PROJECT
                );
                Some(server.handle_query(&query))
            }
        }));
    }

    for task in tasks {
        if let Some((header, body)) = task.await.unwrap() {
            assert_eq!(content_length(&header), body.len());
            assert_eq!(feature_ids(&body), vec![2, 3]);
        }
    }
    assert_eq!(server.filters().len(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_servers_are_independent_across_threads() {
    let handles: Vec<_> = (0..10)
        .map(|_| {
            tokio::task::spawn_blocking(|| {
                let server = server();
                server.filters().register(Arc::new(Tagger), 0);
                let assembled =
                    server.handle_request(&ows_server::RequestInput::get(""));
                assembled.header_value("X-Tagged").map(str::to_string)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().as_deref(), Some("1"));
    }
}

#[test]
fn test_repeated_construct_and_drop() {
    for round in 0..10 {
        let server = server();
        server.filters().register(Arc::new(Tagger), round);
        let (header, body) = server.handle_query("");
        assert_eq!(content_length(&header), body.len());
        assert_eq!(server.filters().len(), 1);
    }
}
