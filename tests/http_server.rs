mod common;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

use common::{PROJECT, feature_ids, server};
use ows_server::server::new_server;

fn start() -> SocketAddr {
    let server = new_server("127.0.0.1:0", Arc::new(server()));
    let listener = server.bind().unwrap();
    let address = listener.local_addr().unwrap();
    thread::spawn(move || server.serve(listener));
    address
}

fn exchange(address: SocketAddr, raw: &[u8]) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(address).unwrap();
    stream.write_all(raw).unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();

    let split = reply
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap();
    let head = String::from_utf8(reply[..split].to_vec()).unwrap();
    (head, reply[split + 4..].to_vec())
}

#[test]
fn test_get_over_tcp() {
    let address = start();
    let request = format!(
        "GET /?MAP={}&SERVICE=WFS&REQUEST=GetFeature&TYPENAME=testlayer&MAXFEATURES=2 HTTP/1.1\r\nHost: localhost\r\n\r\n",
        PROJECT
    );
    let (head, body) = exchange(address, request.as_bytes());

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("\r\nServer: ows-server/"));
    assert!(head.contains("\r\nDate: "));
    assert!(head.contains(&format!("\r\nContent-Length: {}\r\n", body.len())));
    assert!(head.contains("\r\nContent-Type: text/xml; charset=utf-8\r\n"));
    assert_eq!(feature_ids(&body), vec![1, 2]);
}

#[test]
fn test_post_over_tcp() {
    let address = start();
    let body = r#"<wfs:GetFeature service="WFS" xmlns:wfs="http://www.opengis.net/wfs"><wfs:Query typeName="testlayer"><ogc:Filter xmlns:ogc="http://www.opengis.net/ogc"><ogc:BBOX><gml:Box xmlns:gml="http://www.opengis.net/gml"><gml:coordinates>8,44 9,45</gml:coordinates></gml:Box></ogc:BBOX></ogc:Filter></wfs:Query></wfs:GetFeature>"#;
    let request = format!(
        "POST /?MAP={} HTTP/1.1\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
        PROJECT,
        body.len(),
        body
    );
    let (head, reply) = exchange(address, request.as_bytes());

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(feature_ids(&reply), vec![1, 2, 3]);
}

#[test]
fn test_exception_over_tcp() {
    let address = start();
    let (head, body) = exchange(address, b"GET / HTTP/1.1\r\n\r\n");
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("\r\nContent-Length: 197\r\n"));
    assert_eq!(body.len(), 197);
}

#[test]
fn test_malformed_request_line() {
    let address = start();
    let (head, body) = exchange(address, b"GARBAGE\r\n\r\n");
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(body, b"Bad Request");
}
