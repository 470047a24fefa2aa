//! Typed command parsing from request frames.
//!
//! A client request is an array frame whose first element names the
//! command. `Command::from_frame` validates arity and argument shapes
//! here so the server's dispatch never re-parses strings. Arity and
//! number errors are per-request: the connection stays usable.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::types::Frame;

/// Expiration option on SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetExpire {
    /// EX seconds.
    Ex(u64),
    /// PX milliseconds.
    Px(u64),
}

/// A parsed client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Set {
        key: String,
        value: Bytes,
        expire: Option<SetExpire>,
    },
    Get {
        key: String,
    },
    Del {
        keys: Vec<String>,
    },
    Ttl {
        key: String,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
    SMembers {
        key: String,
    },
    SCard {
        key: String,
    },
    SIsMember {
        key: String,
        member: String,
    },
    SUnion {
        key: String,
        others: Vec<String>,
    },
    SInter {
        key: String,
        others: Vec<String>,
    },
    SDiff {
        key: String,
        others: Vec<String>,
    },
    SPop {
        key: String,
        count: usize,
    },
    SRandMember {
        key: String,
        count: i64,
    },
    HSet {
        key: String,
        field: String,
        value: String,
    },
    HGet {
        key: String,
        field: String,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
    HGetAll {
        key: String,
    },
    CmsIncr {
        key: String,
        item: String,
        count: u32,
    },
    CmsQuery {
        key: String,
        item: String,
    },
    LPush {
        key: String,
        values: Vec<String>,
    },
    RPush {
        key: String,
        values: Vec<String>,
    },
    LPop {
        key: String,
    },
    RPop {
        key: String,
    },
    LLen {
        key: String,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    ZAdd {
        key: String,
        members: Vec<(f64, String)>,
    },
    ZScore {
        key: String,
        member: String,
    },
    ZCard {
        key: String,
    },
    ZRank {
        key: String,
        member: String,
    },
    ZRange {
        key: String,
        start: i64,
        stop: i64,
        with_scores: bool,
    },
    BfAdd {
        key: String,
        item: String,
    },
    BfExists {
        key: String,
        item: String,
    },
    /// Admin: add a node and start background migration toward it.
    AddNode {
        id: String,
    },
    /// Admin: drain a node's keys to their new owners, then remove it.
    RemoveNode {
        id: String,
    },
    /// Recognized nowhere; the server answers with an error.
    Unknown(String),
}

impl Command {
    /// Parses a request frame (an array of strings) into a command.
    pub fn from_frame(frame: Frame) -> Result<Command, ProtocolError> {
        let frames = match frame {
            Frame::Array(frames) => frames,
            _ => {
                return Err(ProtocolError::InvalidCommandFrame(
                    "expected array frame".into(),
                ))
            }
        };
        if frames.is_empty() {
            return Err(ProtocolError::InvalidCommandFrame(
                "empty command array".into(),
            ));
        }

        let name = as_string(&frames[0])?;
        let args = &frames[1..];

        match name.to_ascii_uppercase().as_str() {
            "PING" => Ok(Command::Ping),
            "SET" => parse_set(args),
            "GET" => Ok(Command::Get {
                key: one_key("GET", args)?,
            }),
            "DEL" => Ok(Command::Del {
                keys: at_least_one("DEL", args)?,
            }),
            "TTL" => Ok(Command::Ttl {
                key: one_key("TTL", args)?,
            }),
            "SADD" => {
                let (key, members) = key_and_rest("SADD", args)?;
                Ok(Command::SAdd { key, members })
            }
            "SREM" => {
                let (key, members) = key_and_rest("SREM", args)?;
                Ok(Command::SRem { key, members })
            }
            "SMEMBERS" => Ok(Command::SMembers {
                key: one_key("SMEMBERS", args)?,
            }),
            "SCARD" => Ok(Command::SCard {
                key: one_key("SCARD", args)?,
            }),
            "SISMEMBER" => {
                let (key, member) = two_strings("SISMEMBER", args)?;
                Ok(Command::SIsMember { key, member })
            }
            "SUNION" => {
                let (key, others) = key_and_maybe_rest("SUNION", args)?;
                Ok(Command::SUnion { key, others })
            }
            "SINTER" => {
                let (key, others) = key_and_maybe_rest("SINTER", args)?;
                Ok(Command::SInter { key, others })
            }
            "SDIFF" => {
                let (key, others) = key_and_maybe_rest("SDIFF", args)?;
                Ok(Command::SDiff { key, others })
            }
            "SPOP" => parse_spop(args),
            "SRANDMEMBER" => parse_srandmember(args),
            "HSET" => {
                let (key, field, value) = three_strings("HSET", args)?;
                Ok(Command::HSet { key, field, value })
            }
            "HGET" => {
                let (key, field) = two_strings("HGET", args)?;
                Ok(Command::HGet { key, field })
            }
            "HDEL" => {
                let (key, fields) = key_and_rest("HDEL", args)?;
                Ok(Command::HDel { key, fields })
            }
            "HGETALL" => Ok(Command::HGetAll {
                key: one_key("HGETALL", args)?,
            }),
            "CMSINCR" => parse_cmsincr(args),
            "CMSQUERY" => {
                let (key, item) = two_strings("CMSQUERY", args)?;
                Ok(Command::CmsQuery { key, item })
            }
            "LPUSH" => {
                let (key, values) = key_and_rest("LPUSH", args)?;
                Ok(Command::LPush { key, values })
            }
            "RPUSH" => {
                let (key, values) = key_and_rest("RPUSH", args)?;
                Ok(Command::RPush { key, values })
            }
            "LPOP" => Ok(Command::LPop {
                key: one_key("LPOP", args)?,
            }),
            "RPOP" => Ok(Command::RPop {
                key: one_key("RPOP", args)?,
            }),
            "LLEN" => Ok(Command::LLen {
                key: one_key("LLEN", args)?,
            }),
            "LRANGE" => parse_lrange(args),
            "ZADD" => parse_zadd(args),
            "ZSCORE" => {
                let (key, member) = two_strings("ZSCORE", args)?;
                Ok(Command::ZScore { key, member })
            }
            "ZCARD" => Ok(Command::ZCard {
                key: one_key("ZCARD", args)?,
            }),
            "ZRANK" => {
                let (key, member) = two_strings("ZRANK", args)?;
                Ok(Command::ZRank { key, member })
            }
            "ZRANGE" => parse_zrange(args),
            "BFADD" => {
                let (key, item) = two_strings("BFADD", args)?;
                Ok(Command::BfAdd { key, item })
            }
            "BFEXISTS" => {
                let (key, item) = two_strings("BFEXISTS", args)?;
                Ok(Command::BfExists { key, item })
            }
            "ADDNODE" => Ok(Command::AddNode {
                id: one_key("ADDNODE", args)?,
            }),
            "REMOVENODE" => Ok(Command::RemoveNode {
                id: one_key("REMOVENODE", args)?,
            }),
            _ => Ok(Command::Unknown(name)),
        }
    }
}

// ---------------------------------------------------------------------------
// argument shapes
// ---------------------------------------------------------------------------

fn as_string(frame: &Frame) -> Result<String, ProtocolError> {
    match frame {
        Frame::Bulk(data) => String::from_utf8(data.to_vec()).map_err(|_| {
            ProtocolError::InvalidCommandFrame("argument is not valid utf-8".into())
        }),
        Frame::Simple(s) => Ok(s.clone()),
        _ => Err(ProtocolError::InvalidCommandFrame(
            "expected a string argument".into(),
        )),
    }
}

fn as_bytes(frame: &Frame) -> Result<Bytes, ProtocolError> {
    match frame {
        Frame::Bulk(data) => Ok(data.clone()),
        Frame::Simple(s) => Ok(Bytes::from(s.clone().into_bytes())),
        _ => Err(ProtocolError::InvalidCommandFrame(
            "expected a string argument".into(),
        )),
    }
}

fn strings(args: &[Frame]) -> Result<Vec<String>, ProtocolError> {
    args.iter().map(as_string).collect()
}

fn parse_num<T: std::str::FromStr>(frame: &Frame, cmd: &str) -> Result<T, ProtocolError> {
    let s = as_string(frame)?;
    s.parse().map_err(|_| {
        ProtocolError::InvalidArgument(cmd.to_owned(), format!("'{s}' is not a valid number"))
    })
}

fn one_key(cmd: &str, args: &[Frame]) -> Result<String, ProtocolError> {
    if args.len() != 1 {
        return Err(ProtocolError::WrongArity(cmd.to_owned()));
    }
    as_string(&args[0])
}

fn at_least_one(cmd: &str, args: &[Frame]) -> Result<Vec<String>, ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::WrongArity(cmd.to_owned()));
    }
    strings(args)
}

fn two_strings(cmd: &str, args: &[Frame]) -> Result<(String, String), ProtocolError> {
    if args.len() != 2 {
        return Err(ProtocolError::WrongArity(cmd.to_owned()));
    }
    Ok((as_string(&args[0])?, as_string(&args[1])?))
}

fn three_strings(cmd: &str, args: &[Frame]) -> Result<(String, String, String), ProtocolError> {
    if args.len() != 3 {
        return Err(ProtocolError::WrongArity(cmd.to_owned()));
    }
    Ok((
        as_string(&args[0])?,
        as_string(&args[1])?,
        as_string(&args[2])?,
    ))
}

/// `CMD key item [item ...]`: key plus at least one more argument.
fn key_and_rest(cmd: &str, args: &[Frame]) -> Result<(String, Vec<String>), ProtocolError> {
    if args.len() < 2 {
        return Err(ProtocolError::WrongArity(cmd.to_owned()));
    }
    Ok((as_string(&args[0])?, strings(&args[1..])?))
}

/// `CMD key [key ...]`: key plus optionally more.
fn key_and_maybe_rest(cmd: &str, args: &[Frame]) -> Result<(String, Vec<String>), ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::WrongArity(cmd.to_owned()));
    }
    Ok((as_string(&args[0])?, strings(&args[1..])?))
}

fn parse_set(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 2 && args.len() != 4 {
        return Err(ProtocolError::WrongArity("SET".to_owned()));
    }
    let key = as_string(&args[0])?;
    let value = as_bytes(&args[1])?;

    let expire = if args.len() == 4 {
        let opt = as_string(&args[2])?;
        match opt.to_ascii_uppercase().as_str() {
            "EX" => Some(SetExpire::Ex(parse_num(&args[3], "SET")?)),
            "PX" => Some(SetExpire::Px(parse_num(&args[3], "SET")?)),
            other => {
                return Err(ProtocolError::InvalidArgument(
                    "SET".to_owned(),
                    format!("unknown option '{other}'"),
                ))
            }
        }
    } else {
        None
    };

    Ok(Command::Set { key, value, expire })
}

fn parse_spop(args: &[Frame]) -> Result<Command, ProtocolError> {
    match args.len() {
        1 => Ok(Command::SPop {
            key: as_string(&args[0])?,
            count: 1,
        }),
        2 => Ok(Command::SPop {
            key: as_string(&args[0])?,
            count: parse_num(&args[1], "SPOP")?,
        }),
        _ => Err(ProtocolError::WrongArity("SPOP".to_owned())),
    }
}

fn parse_srandmember(args: &[Frame]) -> Result<Command, ProtocolError> {
    match args.len() {
        1 => Ok(Command::SRandMember {
            key: as_string(&args[0])?,
            count: 0,
        }),
        2 => Ok(Command::SRandMember {
            key: as_string(&args[0])?,
            count: parse_num(&args[1], "SRANDMEMBER")?,
        }),
        _ => Err(ProtocolError::WrongArity("SRANDMEMBER".to_owned())),
    }
}

fn parse_cmsincr(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 3 {
        return Err(ProtocolError::WrongArity("CMSINCR".to_owned()));
    }
    Ok(Command::CmsIncr {
        key: as_string(&args[0])?,
        item: as_string(&args[1])?,
        count: parse_num(&args[2], "CMSINCR")?,
    })
}

fn parse_lrange(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 3 {
        return Err(ProtocolError::WrongArity("LRANGE".to_owned()));
    }
    Ok(Command::LRange {
        key: as_string(&args[0])?,
        start: parse_num(&args[1], "LRANGE")?,
        stop: parse_num(&args[2], "LRANGE")?,
    })
}

fn parse_zadd(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() < 3 || args.len() % 2 != 1 {
        return Err(ProtocolError::WrongArity("ZADD".to_owned()));
    }
    let key = as_string(&args[0])?;
    let mut members = Vec::with_capacity((args.len() - 1) / 2);
    for pair in args[1..].chunks_exact(2) {
        let score: f64 = parse_num(&pair[0], "ZADD")?;
        let member = as_string(&pair[1])?;
        members.push((score, member));
    }
    Ok(Command::ZAdd { key, members })
}

fn parse_zrange(args: &[Frame]) -> Result<Command, ProtocolError> {
    if args.len() != 3 && args.len() != 4 {
        return Err(ProtocolError::WrongArity("ZRANGE".to_owned()));
    }
    let with_scores = if args.len() == 4 {
        let opt = as_string(&args[3])?;
        if !opt.eq_ignore_ascii_case("WITHSCORES") {
            return Err(ProtocolError::InvalidArgument(
                "ZRANGE".to_owned(),
                format!("unknown option '{opt}'"),
            ));
        }
        true
    } else {
        false
    };
    Ok(Command::ZRange {
        key: as_string(&args[0])?,
        start: parse_num(&args[1], "ZRANGE")?,
        stop: parse_num(&args[2], "ZRANGE")?,
        with_scores,
    })
}
