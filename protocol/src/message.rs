use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// sender name stamped on server generated messages e.g. user lists
pub const SYSTEM_SENDER: &str = "SYSTEM";

// separator used for group receivers and for rendering user lists
pub const NAME_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Text,
    Private,
    Group,
    File,
    UserList,
    ConfirmRead,
    Unrecognized(u8), // unknown wire tag, kept so routing can log and drop it
}

/// Delivery state attached to every message.
///
/// Only carried through routing, the server never moves a message between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStatus {
    #[default]
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub name: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    pub receiver: Option<String>,
    pub content: String,
    pub file: Option<FileAttachment>,
    pub timestamp: DateTime<Utc>,
    pub msg_type: MessageType,
    pub status: MessageStatus,
    pub delivered_time: Option<DateTime<Utc>>,
    pub read_time: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(msg_type: MessageType, sender: impl Into<String>,
               receiver: Option<String>, content: impl Into<String>) -> Self {
        Message {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver,
            content: content.into(),
            file: None,
            timestamp: Utc::now(),
            msg_type,
            status: MessageStatus::Sending,
            delivered_time: None,
            read_time: None,
        }
    }

    // public chat line, goes to everyone online except the sender
    pub fn text(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Message::new(MessageType::Text, sender, None, content)
    }

    pub fn private(sender: impl Into<String>, receiver: impl Into<String>, content: impl Into<String>) -> Self {
        Message::new(MessageType::Private, sender, Some(receiver.into()), content)
    }

    pub fn group<I, S>(sender: impl Into<String>, receivers: I, content: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join_names(receivers);
        Message::new(MessageType::Group, sender, Some(joined), content)
    }

    pub fn file(sender: impl Into<String>, receiver: impl Into<String>,
                name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let mut msg = Message::new(MessageType::File, sender, Some(receiver.into()), "");
        msg.file = Some(FileAttachment { name: name.into(), payload: payload.into() });
        msg
    }

    pub fn confirm_read(sender: impl Into<String>, receiver: impl Into<String>, content: impl Into<String>) -> Self {
        Message::new(MessageType::ConfirmRead, sender, Some(receiver.into()), content)
    }

    /// Presence notice listing everyone currently online, sent by the server.
    pub fn user_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Message::new(MessageType::UserList, SYSTEM_SENDER, None, join_names(names))
    }

    /// Receivers of a group message.
    ///
    /// Entries are trimmed, blanks skipped and repeats collapsed so each
    /// name shows up once, in the order first listed.
    pub fn group_receivers(&self) -> Vec<String> {
        split_names(self.receiver.as_deref().unwrap_or_default())
    }

    // inverse of user_list, for clients reading presence notices
    pub fn user_list_names(&self) -> Vec<String> {
        split_names(&self.content)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "TEXT"),
            MessageType::Private => write!(f, "PRIVATE"),
            MessageType::Group => write!(f, "GROUP"),
            MessageType::File => write!(f, "FILE"),
            MessageType::UserList => write!(f, "USER_LIST"),
            MessageType::ConfirmRead => write!(f, "CONFIRM_READ"),
            MessageType::Unrecognized(tag) => write!(f, "UNRECOGNIZED({:#04x})", tag),
        }
    }
}

fn join_names<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter()
        .map(|n| n.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(&NAME_SEPARATOR.to_string())
}

fn split_names(list: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for n in list.split(NAME_SEPARATOR).map(str::trim) {
        if n.is_empty() || names.iter().any(|seen| seen == n) { continue }
        names.push(n.to_owned());
    }

    names
}
