//! The gossip wire protocol: the handshake and the five typed messages
//! exchanged over an established connection. Every message is
//! preceded by a 16-bit type tag; `Message::encode`/`Message::decode`
//! handle that tag, deferring the body to `slick_util::wire`.

use slick_util::error::{ErrorType, NetworkError};
use slick_util::wire::{Bytes, Decode, Encode};
use slick_util::NetworkResult;

use crate::ids::{KeyId, NodeId};
use crate::location::NodeLocation;

/// Sent once per direction as the first frame after connect/accept. A
/// mismatched tag or version is fatal — there is no negotiation.
pub const INIT_TAG: &str = "_slick_peer_disc_";
pub const VERSION: u32 = 1;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Handshake {
    pub node_id: NodeId,
}

impl Handshake {
    pub fn encode(&self, out: &mut Vec<u8>) {
        INIT_TAG.to_string().encode(out);
        VERSION.encode(out);
        self.node_id.encode(out);
    }

    /// Parses the handshake head, validating both the tag and the
    /// version. Either failure is always fatal to the connection.
    pub fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let tag = String::decode(input)?;
        if tag != INIT_TAG {
            return Err(NetworkError::Fatal(ErrorType::UnknownInitTag));
        }
        let version = u32::decode(input)?;
        if version != VERSION {
            return Err(NetworkError::Fatal(ErrorType::VersionMismatch));
        }
        let node_id = NodeId::decode(input)?;
        Ok(Handshake { node_id })
    }
}

/// `{key, keyId, nodeLocation, ttl}` — asserts a key/version exists at a
/// location until `now + ttl`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyItem {
    pub key: String,
    pub key_id: KeyId,
    pub location: NodeLocation,
    pub ttl_ms: u64,
}

impl Encode for KeyItem {
    fn encode(&self, out: &mut Vec<u8>) {
        self.key.encode(out);
        self.key_id.encode(out);
        self.location.encode(out);
        self.ttl_ms.encode(out);
    }
}

impl Decode for KeyItem {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(KeyItem {
            key: String::decode(input)?,
            key_id: KeyId::decode(input)?,
            location: NodeLocation::decode(input)?,
            ttl_ms: u64::decode(input)?,
        })
    }
}

/// `{nodeId, nodeLocation, ttl}` — asserts membership.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NodeItem {
    pub node_id: NodeId,
    pub location: NodeLocation,
    pub ttl_ms: u64,
}

impl Encode for NodeItem {
    fn encode(&self, out: &mut Vec<u8>) {
        self.node_id.encode(out);
        self.location.encode(out);
        self.ttl_ms.encode(out);
    }
}

impl Decode for NodeItem {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(NodeItem {
            node_id: NodeId::decode(input)?,
            location: NodeLocation::decode(input)?,
            ttl_ms: u64::decode(input)?,
        })
    }
}

/// `{key, keyId}` — requests a payload on a fetch-mode connection.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FetchItem {
    pub key: String,
    pub key_id: KeyId,
}

impl Encode for FetchItem {
    fn encode(&self, out: &mut Vec<u8>) {
        self.key.encode(out);
        self.key_id.encode(out);
    }
}

impl Decode for FetchItem {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(FetchItem {
            key: String::decode(input)?,
            key_id: KeyId::decode(input)?,
        })
    }
}

/// `{key, keyId, payload}` — reply to `Fetch`; an empty payload means
/// "unknown or stale".
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DataItem {
    pub key: String,
    pub key_id: KeyId,
    pub payload: Bytes,
}

impl Encode for DataItem {
    fn encode(&self, out: &mut Vec<u8>) {
        self.key.encode(out);
        self.key_id.encode(out);
        self.payload.encode(out);
    }
}

impl Decode for DataItem {
    fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        Ok(DataItem {
            key: String::decode(input)?,
            key_id: KeyId::decode(input)?,
            payload: Bytes::decode(input)?,
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
    Keys(Vec<KeyItem>),
    Query { sender: NodeLocation, keys: Vec<String> },
    Nodes(Vec<NodeItem>),
    Fetch(Vec<FetchItem>),
    Data(Vec<DataItem>),
}

const TYPE_KEYS: u16 = 1;
const TYPE_QUERY: u16 = 2;
const TYPE_NODES: u16 = 3;
const TYPE_FETCH: u16 = 4;
const TYPE_DATA: u16 = 5;

impl Message {
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Message::Keys(items) => {
                TYPE_KEYS.encode(out);
                items.encode(out);
            }
            Message::Query { sender, keys } => {
                TYPE_QUERY.encode(out);
                sender.encode(out);
                keys.encode(out);
            }
            Message::Nodes(items) => {
                TYPE_NODES.encode(out);
                items.encode(out);
            }
            Message::Fetch(items) => {
                TYPE_FETCH.encode(out);
                items.encode(out);
            }
            Message::Data(items) => {
                TYPE_DATA.encode(out);
                items.encode(out);
            }
        }
    }

    /// Unknown message types are a fatal protocol error: there is no
    /// forward-compatible skip-unknown path.
    pub fn decode(input: &mut &[u8]) -> NetworkResult<Self> {
        let msg_type = u16::decode(input)?;
        match msg_type {
            TYPE_KEYS => Ok(Message::Keys(Vec::decode(input)?)),
            TYPE_QUERY => {
                let sender = NodeLocation::decode(input)?;
                let keys = Vec::decode(input)?;
                Ok(Message::Query { sender, keys })
            }
            TYPE_NODES => Ok(Message::Nodes(Vec::decode(input)?)),
            TYPE_FETCH => Ok(Message::Fetch(Vec::decode(input)?)),
            TYPE_DATA => Ok(Message::Data(Vec::decode(input)?)),
            _ => Err(NetworkError::Fatal(ErrorType::UnknownMessageType)),
        }
    }
}
