use std::io::{Error, ErrorKind};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;
use uuid::Uuid;

mod message;

pub use message::{FileAttachment, Message, MessageStatus, MessageType, NAME_SEPARATOR, SYSTEM_SENDER};

// encode and decode bypass libraries like serde or message pack,
// every frame is: version u8, kind u8, body length u32, body

pub const VERSION: u8 = 1;
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 6;

const FRAME_JOIN: u8 = b'&';
const FRAME_RECORD: u8 = b'#';

const TYPE_TEXT: u8 = b'*';
const TYPE_PRIVATE: u8 = b'@';
const TYPE_GROUP: u8 = b'%';
const TYPE_FILE: u8 = b'^';
const TYPE_USERLIST: u8 = b':';
const TYPE_CONFIRMREAD: u8 = b'!';

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMsg {
    Join(String), // handshake, first frame from a client
    Record(Message),
}

#[derive(Debug, Clone)]
pub struct ChatCodec {
    max_frame_len: usize,
}

impl ChatCodec {
    pub fn new() -> Self {
        ChatCodec { max_frame_len: MAX_FRAME_LEN }
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        ChatCodec { max_frame_len }
    }

    fn put_frame(&self, kind: u8, body: BytesMut, dst: &mut BytesMut) -> Result<(), Error> {
        if body.len() > self.max_frame_len {
            return Err(invalid(format!("frame of {} bytes exceeds limit {}", body.len(), self.max_frame_len)))
        }

        dst.reserve(HEADER_LEN + body.len());
        dst.put_u8(VERSION);
        dst.put_u8(kind);
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        ChatCodec::new()
    }
}

// convert bytes to ChatMsg, only whole frames are ever handed out
impl Decoder for ChatCodec {
    type Item = ChatMsg;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None)
        }

        let version = src[0];
        let kind = src[1];
        let len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;

        if version != VERSION {
            return Err(invalid(format!("unsupported protocol version {}", version)))
        }

        if len > self.max_frame_len {
            return Err(invalid(format!("frame of {} bytes exceeds limit {}", len, self.max_frame_len)))
        }

        if src.len() < HEADER_LEN + len {
            // wait for the rest of the frame
            trace!("partial frame, have {} of {} bytes", src.len(), HEADER_LEN + len);
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None)
        }

        src.advance(HEADER_LEN);
        let mut body = src.split_to(len).freeze();

        let msg = match kind {
            FRAME_JOIN => ChatMsg::Join(utf8(body.to_vec())?),
            FRAME_RECORD => {
                let msg = decode_message(&mut body)?;
                if body.has_remaining() {
                    return Err(invalid(format!("{} trailing bytes after record", body.remaining())))
                }
                ChatMsg::Record(msg)
            },
            k => return Err(invalid(format!("unknown frame kind {:#04x}", k))),
        };

        Ok(Some(msg))
    }
}

impl Encoder<ChatMsg> for ChatCodec {
    type Error = Error;

    fn encode(&mut self, item: ChatMsg, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            ChatMsg::Join(name) => {
                let body = BytesMut::from(name.as_bytes());
                self.put_frame(FRAME_JOIN, body, dst)
            },
            ChatMsg::Record(msg) => Encoder::<&Message>::encode(self, &msg, dst),
        }
    }
}

// server fan out shares one message across many outbound queues
impl Encoder<Arc<Message>> for ChatCodec {
    type Error = Error;

    fn encode(&mut self, item: Arc<Message>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Message>::encode(self, item.as_ref(), dst)
    }
}

impl<'a> Encoder<&'a Message> for ChatCodec {
    type Error = Error;

    fn encode(&mut self, item: &'a Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::new();
        encode_message(item, &mut body)?;
        self.put_frame(FRAME_RECORD, body, dst)
    }
}

fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<(), Error> {
    dst.extend_from_slice(msg.id.as_bytes());
    encode_str16(&msg.sender, dst)?;
    match &msg.receiver {
        Some(r) => {
            dst.put_u8(PRESENT);
            encode_str16(r, dst)?;
        },
        None => dst.put_u8(ABSENT),
    }
    encode_bytes32(msg.content.as_bytes(), dst)?;
    encode_time(&msg.timestamp, dst);
    dst.put_u8(type_tag(msg.msg_type));
    match &msg.file {
        Some(f) => {
            dst.put_u8(PRESENT);
            encode_str16(&f.name, dst)?;
            encode_bytes32(&f.payload, dst)?;
        },
        None => dst.put_u8(ABSENT),
    }
    dst.put_u8(status_tag(msg.status));
    encode_opt_time(&msg.delivered_time, dst);
    encode_opt_time(&msg.read_time, dst);
    Ok(())
}

fn decode_message(src: &mut Bytes) -> Result<Message, Error> {
    ensure(src, 16)?;
    let mut id = [0u8; 16];
    src.copy_to_slice(&mut id);

    let sender = decode_str16(src)?;
    let receiver = if decode_flag(src)? { Some(decode_str16(src)?) } else { None };
    let content = utf8(decode_bytes32(src)?.to_vec())?;
    let timestamp = decode_time(src)?;

    ensure(src, 1)?;
    let msg_type = type_from_tag(src.get_u8());

    let file = if decode_flag(src)? {
        let name = decode_str16(src)?;
        let payload = decode_bytes32(src)?;
        Some(FileAttachment { name, payload })
    } else {
        None
    };

    ensure(src, 1)?;
    let status = status_from_tag(src.get_u8())?;
    let delivered_time = decode_opt_time(src)?;
    let read_time = decode_opt_time(src)?;

    Ok(Message {
        id: Uuid::from_bytes(id),
        sender,
        receiver,
        content,
        file,
        timestamp,
        msg_type,
        status,
        delivered_time,
        read_time,
    })
}

fn type_tag(t: MessageType) -> u8 {
    match t {
        MessageType::Text => TYPE_TEXT,
        MessageType::Private => TYPE_PRIVATE,
        MessageType::Group => TYPE_GROUP,
        MessageType::File => TYPE_FILE,
        MessageType::UserList => TYPE_USERLIST,
        MessageType::ConfirmRead => TYPE_CONFIRMREAD,
        MessageType::Unrecognized(tag) => tag,
    }
}

fn type_from_tag(tag: u8) -> MessageType {
    match tag {
        TYPE_TEXT => MessageType::Text,
        TYPE_PRIVATE => MessageType::Private,
        TYPE_GROUP => MessageType::Group,
        TYPE_FILE => MessageType::File,
        TYPE_USERLIST => MessageType::UserList,
        TYPE_CONFIRMREAD => MessageType::ConfirmRead,
        other => MessageType::Unrecognized(other),
    }
}

fn status_tag(s: MessageStatus) -> u8 {
    match s {
        MessageStatus::Sending => 0,
        MessageStatus::Sent => 1,
        MessageStatus::Delivered => 2,
        MessageStatus::Read => 3,
        MessageStatus::Failed => 4,
    }
}

fn status_from_tag(tag: u8) -> Result<MessageStatus, Error> {
    match tag {
        0 => Ok(MessageStatus::Sending),
        1 => Ok(MessageStatus::Sent),
        2 => Ok(MessageStatus::Delivered),
        3 => Ok(MessageStatus::Read),
        4 => Ok(MessageStatus::Failed),
        t => Err(invalid(format!("unknown status {}", t))),
    }
}

// write a u16 length prefixed string into BytesMut
fn encode_str16(s: &str, dst: &mut BytesMut) -> Result<(), Error> {
    let len = u16::try_from(s.len())
        .map_err(|_| invalid(format!("field of {} bytes too long", s.len())))?;
    dst.reserve(2 + s.len());
    dst.put_u16(len);
    dst.extend_from_slice(s.as_bytes());
    Ok(())
}

fn encode_bytes32(b: &[u8], dst: &mut BytesMut) -> Result<(), Error> {
    let len = u32::try_from(b.len())
        .map_err(|_| invalid(format!("field of {} bytes too long", b.len())))?;
    dst.reserve(4 + b.len());
    dst.put_u32(len);
    dst.extend_from_slice(b);
    Ok(())
}

fn encode_time(t: &DateTime<Utc>, dst: &mut BytesMut) {
    dst.put_i64(t.timestamp());
    dst.put_u32(t.timestamp_subsec_nanos());
}

fn encode_opt_time(t: &Option<DateTime<Utc>>, dst: &mut BytesMut) {
    match t {
        Some(t) => {
            dst.put_u8(PRESENT);
            encode_time(t, dst);
        },
        None => dst.put_u8(ABSENT),
    }
}

fn decode_str16(src: &mut Bytes) -> Result<String, Error> {
    ensure(src, 2)?;
    let len = src.get_u16() as usize;
    ensure(src, len)?;
    utf8(src.split_to(len).to_vec())
}

fn decode_bytes32(src: &mut Bytes) -> Result<Bytes, Error> {
    ensure(src, 4)?;
    let len = src.get_u32() as usize;
    ensure(src, len)?;
    Ok(src.split_to(len))
}

fn decode_flag(src: &mut Bytes) -> Result<bool, Error> {
    ensure(src, 1)?;
    match src.get_u8() {
        ABSENT => Ok(false),
        PRESENT => Ok(true),
        f => Err(invalid(format!("bad option flag {}", f))),
    }
}

fn decode_time(src: &mut Bytes) -> Result<DateTime<Utc>, Error> {
    ensure(src, 12)?;
    let secs = src.get_i64();
    let nanos = src.get_u32();
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| invalid(format!("timestamp {}.{} out of range", secs, nanos)))
}

fn decode_opt_time(src: &mut Bytes) -> Result<Option<DateTime<Utc>>, Error> {
    if decode_flag(src)? { decode_time(src).map(Some) } else { Ok(None) }
}

// a length field pointing past the frame means the record is malformed
fn ensure(src: &Bytes, n: usize) -> Result<(), Error> {
    if src.remaining() < n {
        return Err(invalid(format!("truncated record, need {} bytes have {}", n, src.remaining())))
    }
    Ok(())
}

fn utf8(bytes: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(bytes).map_err(|_| Error::new(ErrorKind::InvalidData, "Invalid utf8"))
}

fn invalid(msg: String) -> Error {
    Error::new(ErrorKind::InvalidData, msg)
}
