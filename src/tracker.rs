use std::{net::Ipv4Addr, ops::Deref, time::Duration};

use serde_bencode::value::Value;
use serde_bytes::ByteBuf;

use crate::{
    bencode::{from_bytes, from_dict_bytes, value_span},
    validate::{is_aligned, validate_utf8},
    DecodeError,
};

pub const COMPACT_PEER_LEN: usize = 6;

#[derive(Debug, serde::Deserialize)]
struct RawPeer {
    ip: String,
    port: u16,
}

#[derive(Debug, serde::Deserialize)]
struct RawTrackerResponse {
    #[serde(rename = "failure reason")]
    failure_reason: Option<ByteBuf>,
    #[serde(rename = "warning message")]
    warning_message: Option<ByteBuf>,
    interval: Option<u64>,
    #[serde(rename = "min interval")]
    min_interval: Option<u64>,
    #[serde(rename = "tracker id")]
    tracker_id: Option<ByteBuf>,
    complete: Option<u64>,
    incomplete: Option<u64>,
    // Either wire mode is resolved later from the exact bytes.
    #[serde(skip)]
    peers: Option<Vec<u8>>,
}

/// Peer endpoints as `host:port`, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerAddrs(pub Vec<String>);

impl Deref for PeerAddrs {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<String>> for PeerAddrs {
    fn from(value: Vec<String>) -> Self {
        PeerAddrs(value)
    }
}

impl FromIterator<String> for PeerAddrs {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        PeerAddrs(iter.into_iter().collect())
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

enum PeerListState {
    AttemptBytes,
    Binary(Vec<u8>),
    Dictionary,
}

/// The payload of `raw` when it is a lone byte string and nothing else.
fn compact_payload(raw: &[u8]) -> Option<Vec<u8>> {
    match from_bytes::<Value>(raw) {
        Ok(Value::Bytes(payload)) => Some(payload),
        _ => None,
    }
}

/// Fails with the first host that is not a valid IPv4 address.
fn binary_peers(payload: &[u8]) -> Result<PeerAddrs, String> {
    payload
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|peer| {
            let host = format!("{}.{}.{}.{}", peer[0], peer[1], peer[2], peer[3]);
            if host.parse::<Ipv4Addr>().is_err() {
                return Err(host);
            }

            let port = u16::from_be_bytes([peer[4], peer[5]]);

            Ok(join_host_port(&host, port))
        })
        .collect()
}

fn dictionary_peers(raw: &[u8]) -> Result<PeerAddrs, DecodeError> {
    let peers = from_bytes::<Vec<RawPeer>>(raw).map_err(|err| {
        DecodeError::MalformedPeerList(format!(
            "error decoding peer list in both binary and list-of-dictionary mode: {err}"
        ))
    })?;

    Ok(peers
        .iter()
        .map(|peer| join_host_port(&peer.ip, peer.port))
        .collect())
}

/// Decodes a peer list given either as one packed byte string or as a list
/// of `ip`/`port` dictionaries.
///
/// The byte string reading is tried first. A byte string whose length is not
/// a multiple of 6 is corrupt and fails right away. One that splits into
/// groups but yields an invalid IPv4 host is read again as a dictionary list.
pub fn decode_peers(raw: &[u8]) -> Result<PeerAddrs, DecodeError> {
    let mut state = PeerListState::AttemptBytes;

    loop {
        state = match state {
            PeerListState::AttemptBytes => match compact_payload(raw) {
                None => PeerListState::Dictionary,
                Some(payload) if !is_aligned(payload.len(), COMPACT_PEER_LEN) => {
                    return Err(DecodeError::MalformedPeerList(format!(
                        "malformed peer list in binary mode: length {} is not a multiple of {}",
                        payload.len(),
                        COMPACT_PEER_LEN
                    )));
                }
                Some(payload) => PeerListState::Binary(payload),
            },
            PeerListState::Binary(payload) => match binary_peers(&payload) {
                Ok(peers) => return Ok(peers),
                Err(host) => {
                    tracing::debug!(%host, "peer list not in binary mode, retrying as dictionaries");
                    PeerListState::Dictionary
                }
            },
            PeerListState::Dictionary => return dictionary_peers(raw),
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Announce {
    pub warning_msg: Option<String>,
    pub poll_interval: Option<Duration>,
    pub tracker_id: Option<Vec<u8>>,
    pub seeder_cnt: Option<u64>,
    pub leecher_cnt: Option<u64>,
    pub peer_addrs: PeerAddrs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerResponse {
    Failure { reason: String },
    Success(Announce),
}

impl TrackerResponse {
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TrackerResponse::Failure { reason } => Some(reason),
            TrackerResponse::Success(_) => None,
        }
    }

    pub fn announce(&self) -> Option<&Announce> {
        match self {
            TrackerResponse::Failure { .. } => None,
            TrackerResponse::Success(announce) => Some(announce),
        }
    }
}

impl TryFrom<RawTrackerResponse> for TrackerResponse {
    type Error = DecodeError;

    fn try_from(response: RawTrackerResponse) -> Result<Self, Self::Error> {
        if let Some(reason) = response.failure_reason {
            let reason = validate_utf8("failure reason", reason.into_vec())?;

            return Ok(TrackerResponse::Failure { reason });
        }

        let warning_msg = response
            .warning_message
            .map(|msg| validate_utf8("warning message", msg.into_vec()))
            .transpose()?;

        // `min interval` wins when both are given.
        let poll_interval = response
            .min_interval
            .or(response.interval)
            .map(Duration::from_secs);

        let peer_addrs = match response.peers {
            Some(raw) => decode_peers(&raw)?,
            None => PeerAddrs::default(),
        };

        Ok(TrackerResponse::Success(Announce {
            warning_msg,
            poll_interval,
            tracker_id: response.tracker_id.map(ByteBuf::into_vec),
            seeder_cnt: response.complete,
            leecher_cnt: response.incomplete,
            peer_addrs,
        }))
    }
}

pub fn decode_tracker_response(raw: &[u8]) -> Result<TrackerResponse, DecodeError> {
    let mut response: RawTrackerResponse =
        from_dict_bytes(raw).map_err(DecodeError::structural("tracker response"))?;
    response.peers = value_span(raw, b"peers")
        .map_err(DecodeError::structural("tracker response"))?
        .map(<[u8]>::to_vec);

    let response = TrackerResponse::try_from(response)?;

    match &response {
        TrackerResponse::Failure { reason } => {
            tracing::debug!(%reason, "tracker responded with failure");
        }
        TrackerResponse::Success(announce) => {
            tracing::debug!(peers = announce.peer_addrs.len(), "decoded tracker response");
        }
    }

    Ok(response)
}
