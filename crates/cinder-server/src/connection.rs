//! Per-connection handler.
//!
//! Reads RESP frames from the socket, routes typed commands through
//! the sharded store, and writes replies back. Pipelining comes for
//! free: every complete frame in the read buffer is answered in order
//! before the next socket write.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use cinder_core::{Reply, ShardedStore, ShardRequest, TtlResult};
use cinder_protocol::{parse_frame, Command, Frame, SetExpire};

/// Initial buffer capacity per connection.
const BUF_CAPACITY: usize = 4096;

/// Read buffer cap; a client streaming an endless incomplete frame
/// gets disconnected instead of growing the buffer forever.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Drives one client connection until it closes.
pub async fn handle(mut stream: TcpStream, store: ShardedStore) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);

    loop {
        if buf.len() > MAX_BUF_SIZE {
            let mut err = BytesMut::new();
            Frame::Error("ERR max buffer size exceeded".into()).serialize(&mut err);
            let _ = stream.write_all(&err).await;
            return Ok(());
        }

        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(()); // clean disconnect
        }

        out.clear();
        loop {
            match parse_frame(&buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = buf.split_to(consumed);
                    let response = process(frame, &store).await;
                    response.serialize(&mut out);
                }
                Ok(None) => break, // need more bytes
                Err(e) => {
                    // framing is broken; answer and drop the connection
                    Frame::Error(format!("ERR protocol error: {e}")).serialize(&mut out);
                    stream.write_all(&out).await?;
                    return Ok(());
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }
}

/// Parses and executes a single request frame.
async fn process(frame: Frame, store: &ShardedStore) -> Frame {
    match Command::from_frame(frame) {
        Ok(cmd) => execute(cmd, store).await,
        Err(e) => Frame::Error(format!("ERR {e}")),
    }
}

/// Executes a parsed command against the store.
async fn execute(cmd: Command, store: &ShardedStore) -> Frame {
    match cmd {
        Command::Ping => Frame::Simple("PONG".into()),

        Command::Set { key, value, expire } => {
            let expire = expire.map(|e| match e {
                SetExpire::Ex(secs) => Duration::from_secs(secs),
                SetExpire::Px(millis) => Duration::from_millis(millis),
            });
            respond(store, ShardRequest::Set { key, value, expire }).await
        }
        Command::Get { key } => respond(store, ShardRequest::Get { key }).await,

        Command::Del { keys } => {
            // multi-key: route each key independently and sum
            let mut deleted = 0;
            for key in keys {
                match store.execute(ShardRequest::Del { key }).await {
                    Ok(Reply::Bool(true)) => deleted += 1,
                    Ok(_) => {}
                    Err(e) => return Frame::Error(format!("ERR {e}")),
                }
            }
            Frame::Integer(deleted)
        }

        Command::Ttl { key } => respond(store, ShardRequest::Ttl { key }).await,

        Command::SAdd { key, members } => {
            respond(store, ShardRequest::SAdd { key, members }).await
        }
        Command::SRem { key, members } => {
            respond(store, ShardRequest::SRem { key, members }).await
        }
        Command::SMembers { key } => respond(store, ShardRequest::SMembers { key }).await,
        Command::SCard { key } => respond(store, ShardRequest::SCard { key }).await,
        Command::SIsMember { key, member } => {
            respond(store, ShardRequest::SIsMember { key, member }).await
        }
        Command::SUnion { key, others } => {
            respond(store, ShardRequest::SUnion { key, others }).await
        }
        Command::SInter { key, others } => {
            respond(store, ShardRequest::SInter { key, others }).await
        }
        Command::SDiff { key, others } => {
            respond(store, ShardRequest::SDiff { key, others }).await
        }

        Command::SPop { key, count } => {
            // bare SPOP answers with a single bulk, counted SPOP with
            // an array
            match store.execute(ShardRequest::SPop { key, count }).await {
                Ok(Reply::Strings(mut members)) if count == 1 => match members.pop() {
                    Some(member) => Frame::bulk(member),
                    None => Frame::Null,
                },
                Ok(reply) => render(reply),
                Err(e) => Frame::Error(format!("ERR {e}")),
            }
        }
        Command::SRandMember { key, count } => {
            match store.execute(ShardRequest::SRandMember { key, count }).await {
                Ok(Reply::Strings(mut members)) if count == 0 => match members.pop() {
                    Some(member) => Frame::bulk(member),
                    None => Frame::Null,
                },
                Ok(reply) => render(reply),
                Err(e) => Frame::Error(format!("ERR {e}")),
            }
        }

        Command::HSet { key, field, value } => {
            respond(store, ShardRequest::HSet { key, field, value }).await
        }
        Command::HGet { key, field } => respond(store, ShardRequest::HGet { key, field }).await,
        Command::HDel { key, fields } => respond(store, ShardRequest::HDel { key, fields }).await,
        Command::HGetAll { key } => respond(store, ShardRequest::HGetAll { key }).await,

        Command::CmsIncr { key, item, count } => {
            respond(store, ShardRequest::CmsIncr { key, item, count }).await
        }
        Command::CmsQuery { key, item } => {
            respond(store, ShardRequest::CmsQuery { key, item }).await
        }

        Command::LPush { key, values } => {
            respond(store, ShardRequest::LPush { key, values }).await
        }
        Command::RPush { key, values } => {
            respond(store, ShardRequest::RPush { key, values }).await
        }
        Command::LPop { key } => respond(store, ShardRequest::LPop { key }).await,
        Command::RPop { key } => respond(store, ShardRequest::RPop { key }).await,
        Command::LLen { key } => respond(store, ShardRequest::LLen { key }).await,
        Command::LRange { key, start, stop } => {
            respond(store, ShardRequest::LRange { key, start, stop }).await
        }

        Command::ZAdd { key, members } => {
            respond(store, ShardRequest::ZAdd { key, members }).await
        }
        Command::ZScore { key, member } => {
            respond(store, ShardRequest::ZScore { key, member }).await
        }
        Command::ZCard { key } => respond(store, ShardRequest::ZCard { key }).await,
        Command::ZRank { key, member } => {
            respond(store, ShardRequest::ZRank { key, member }).await
        }
        Command::ZRange {
            key,
            start,
            stop,
            with_scores,
        } => match store.execute(ShardRequest::ZRange { key, start, stop }).await {
            Ok(Reply::Scored(pairs)) => {
                let mut items = Vec::with_capacity(pairs.len() * if with_scores { 2 } else { 1 });
                for (member, score) in pairs {
                    items.push(Frame::bulk(member));
                    if with_scores {
                        items.push(Frame::bulk(format_score(score)));
                    }
                }
                Frame::Array(items)
            }
            Ok(reply) => render(reply),
            Err(e) => Frame::Error(format!("ERR {e}")),
        },

        Command::BfAdd { key, item } => respond(store, ShardRequest::BfAdd { key, item }).await,
        Command::BfExists { key, item } => {
            respond(store, ShardRequest::BfExists { key, item }).await
        }

        Command::AddNode { id } => match store.add_node(&id).await {
            Ok(_migration) => Frame::Simple("OK".into()),
            Err(e) => Frame::Error(format!("ERR failed to add node: {e}")),
        },
        Command::RemoveNode { id } => match store.remove_node_drained(&id).await {
            Ok(_moved) => Frame::Simple("OK".into()),
            Err(e) => Frame::Error(format!("ERR failed to remove node: {e}")),
        },

        Command::Unknown(name) => Frame::Error(format!("ERR unknown command '{name}'")),
    }
}

/// Routes a request and renders the reply with the default mapping.
async fn respond(store: &ShardedStore, request: ShardRequest) -> Frame {
    match store.execute(request).await {
        Ok(reply) => render(reply),
        Err(e) => Frame::Error(format!("ERR {e}")),
    }
}

/// Default reply → frame mapping.
fn render(reply: Reply) -> Frame {
    match reply {
        Reply::Ok => Frame::Simple("OK".into()),
        Reply::Bytes(Some(data)) => Frame::Bulk(data),
        Reply::Bytes(None) => Frame::Null,
        Reply::Int(n) => Frame::Integer(n),
        Reply::Bool(b) => Frame::Integer(i64::from(b)),
        Reply::Str(Some(s)) => Frame::bulk(s),
        Reply::Str(None) => Frame::Null,
        Reply::Strings(items) => Frame::Array(items.into_iter().map(Frame::bulk).collect()),
        Reply::Pairs(pairs) => {
            let mut items = Vec::with_capacity(pairs.len() * 2);
            for (field, value) in pairs {
                items.push(Frame::bulk(field));
                items.push(Frame::bulk(value));
            }
            Frame::Array(items)
        }
        Reply::Scored(pairs) => {
            Frame::Array(pairs.into_iter().map(|(m, _)| Frame::bulk(m)).collect())
        }
        Reply::Score(Some(score)) => Frame::bulk(format_score(score)),
        Reply::Score(None) => Frame::Null,
        Reply::Rank(Some(rank)) => Frame::Integer(rank),
        Reply::Rank(None) => Frame::Null,
        Reply::Ttl(TtlResult::Seconds(s)) => Frame::Integer(s.min(i64::MAX as u64) as i64),
        Reply::Ttl(TtlResult::NoExpiry) => Frame::Integer(-1),
        Reply::Ttl(TtlResult::NotFound) => Frame::Integer(-2),
        Reply::WrongType => {
            Frame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
        }
        Reply::Moved { key, node } => {
            Frame::Error(format!("MOVED: key {key} should be on node {node}"))
        }
        Reply::Error(msg) => Frame::Error(format!("ERR {msg}")),
        // migration internals never reach a client connection
        Reply::Dump(_) => Frame::Error("ERR internal reply on client connection".into()),
    }
}

/// Fixed six-decimal score formatting for the wire.
fn format_score(score: f64) -> String {
    format!("{score:.6}")
}
