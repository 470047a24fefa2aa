//! Accept loop: one tokio task per client connection.

use tokio::net::TcpListener;
use tracing::{debug, warn};

use cinder_core::ShardedStore;

use crate::connection;

/// Accepts connections forever, spawning a handler task for each.
pub async fn serve(listener: TcpListener, store: ShardedStore) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "client connected");
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(e) = connection::handle(stream, store).await {
                        warn!(%peer, "connection error: {e}");
                    }
                    debug!(%peer, "client disconnected");
                });
            }
            Err(e) => {
                warn!("accept failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use cinder_core::StoreConfig;
    use cinder_protocol::{parse_frame, Frame};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_server(nodes: &[&str]) -> (std::net::SocketAddr, ShardedStore) {
        let store = ShardedStore::new(StoreConfig::default());
        for node in nodes {
            store.add_node(node).await.unwrap();
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, store.clone()));
        (addr, store)
    }

    fn encode_command(parts: &[&str]) -> BytesMut {
        let frame = Frame::Array(parts.iter().map(|p| Frame::bulk(*p)).collect());
        let mut buf = BytesMut::new();
        frame.serialize(&mut buf);
        buf
    }

    async fn roundtrip(stream: &mut TcpStream, parts: &[&str]) -> Frame {
        stream.write_all(&encode_command(parts)).await.unwrap();

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            stream.read_buf(&mut buf).await.unwrap();
            if let Some((frame, _)) = parse_frame(&buf).unwrap() {
                return frame;
            }
        }
    }

    #[tokio::test]
    async fn set_get_ttl_over_the_wire() {
        let (addr, _store) = start_server(&["n1", "n2"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(&mut stream, &["SET", "foo", "bar", "EX", "2"]).await;
        assert_eq!(reply, Frame::Simple("OK".into()));

        let reply = roundtrip(&mut stream, &["GET", "foo"]).await;
        assert_eq!(reply, Frame::bulk("bar"));

        let reply = roundtrip(&mut stream, &["TTL", "foo"]).await;
        match reply {
            Frame::Integer(s) => assert!((1..=2).contains(&s), "ttl {s}"),
            other => panic!("expected integer, got {other:?}"),
        }

        tokio::time::sleep(std::time::Duration::from_millis(2200)).await;
        let reply = roundtrip(&mut stream, &["GET", "foo"]).await;
        assert_eq!(reply, Frame::Null);
        let reply = roundtrip(&mut stream, &["TTL", "foo"]).await;
        assert_eq!(reply, Frame::Integer(-2));
    }

    #[tokio::test]
    async fn type_guard_over_the_wire() {
        let (addr, _store) = start_server(&["n1"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(&mut stream, &["SADD", "s", "a", "b", "c"]).await;
        assert_eq!(reply, Frame::Integer(3));

        let reply = roundtrip(&mut stream, &["GET", "s"]).await;
        match reply {
            Frame::Error(msg) => assert!(msg.starts_with("WRONGTYPE"), "{msg}"),
            other => panic!("expected error, got {other:?}"),
        }

        let reply = roundtrip(&mut stream, &["SMEMBERS", "s"]).await;
        match reply {
            Frame::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zrank_ties_and_zrange_withscores() {
        let (addr, _store) = start_server(&["n1"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(&mut stream, &["ZADD", "z", "1", "b", "1", "a", "2", "c"]).await;
        assert_eq!(reply, Frame::Integer(3));

        assert_eq!(roundtrip(&mut stream, &["ZRANK", "z", "a"]).await, Frame::Integer(0));
        assert_eq!(roundtrip(&mut stream, &["ZRANK", "z", "b"]).await, Frame::Integer(1));
        assert_eq!(roundtrip(&mut stream, &["ZRANK", "z", "c"]).await, Frame::Integer(2));

        let reply = roundtrip(&mut stream, &["ZRANGE", "z", "0", "-1", "WITHSCORES"]).await;
        assert_eq!(
            reply,
            Frame::Array(vec![
                Frame::bulk("a"),
                Frame::bulk("1.000000"),
                Frame::bulk("b"),
                Frame::bulk("1.000000"),
                Frame::bulk("c"),
                Frame::bulk("2.000000"),
            ])
        );
    }

    #[tokio::test]
    async fn addnode_migrates_without_breaking_reads() {
        let (addr, _store) = start_server(&["n1", "n2"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        for i in 0..30 {
            let reply =
                roundtrip(&mut stream, &["SET", &format!("key:{i}"), &format!("v{i}")]).await;
            assert_eq!(reply, Frame::Simple("OK".into()));
        }

        let reply = roundtrip(&mut stream, &["ADDNODE", "n3"]).await;
        assert_eq!(reply, Frame::Simple("OK".into()));

        // give the background migration time to settle
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        for i in 0..30 {
            let reply = roundtrip(&mut stream, &["GET", &format!("key:{i}")]).await;
            assert_eq!(reply, Frame::bulk(format!("v{i}")), "key:{i}");
        }
    }

    #[tokio::test]
    async fn removenode_drains_data_first() {
        let (addr, store) = start_server(&["n1", "n2"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        for i in 0..20 {
            roundtrip(&mut stream, &["SET", &format!("key:{i}"), "v"]).await;
        }

        let reply = roundtrip(&mut stream, &["REMOVENODE", "n1"]).await;
        assert_eq!(reply, Frame::Simple("OK".into()));
        assert_eq!(store.nodes().await, vec!["n2".to_string()]);

        for i in 0..20 {
            let reply = roundtrip(&mut stream, &["GET", &format!("key:{i}")]).await;
            assert_eq!(reply, Frame::bulk("v"), "key:{i}");
        }
    }

    #[tokio::test]
    async fn pipelined_commands_answer_in_order() {
        let (addr, _store) = start_server(&["n1"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // three commands in one write
        let mut buf = encode_command(&["SET", "p", "1"]);
        buf.extend_from_slice(&encode_command(&["GET", "p"]));
        buf.extend_from_slice(&encode_command(&["DEL", "p"]));
        stream.write_all(&buf).await.unwrap();

        let mut data = BytesMut::with_capacity(4096);
        let mut frames = Vec::new();
        while frames.len() < 3 {
            stream.read_buf(&mut data).await.unwrap();
            while let Some((frame, consumed)) = parse_frame(&data).unwrap() {
                let _ = data.split_to(consumed);
                frames.push(frame);
            }
        }

        assert_eq!(
            frames,
            vec![
                Frame::Simple("OK".into()),
                Frame::bulk("1"),
                Frame::Integer(1),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_command_keeps_connection_usable() {
        let (addr, _store) = start_server(&["n1"]).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(&mut stream, &["FLUSHALL"]).await;
        assert!(matches!(reply, Frame::Error(_)));

        assert_eq!(
            roundtrip(&mut stream, &["PING"]).await,
            Frame::Simple("PONG".into())
        );
    }
}
