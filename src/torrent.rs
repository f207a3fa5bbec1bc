use std::{
    collections::HashSet,
    fmt,
    ops::Deref,
    path::{PathBuf, MAIN_SEPARATOR_STR},
};

use chrono::{DateTime, Utc};
use serde::Deserializer;
use serde_bencode::value::Value;
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};
use url::Url;

use crate::{
    bencode::{from_dict_bytes, under_key, value_span, Shown},
    validate::{is_aligned, non_negative, sum_with_overflow_guard, validate_utf8},
    DecodeError,
};

pub const PIECE_HASH_LEN: usize = 20;

#[derive(Debug, serde::Deserialize)]
struct RawFile {
    length: i64,
    // Missing and empty path lists are the same size violation.
    #[serde(default)]
    path: Vec<ByteBuf>,
}

#[derive(Debug, serde::Deserialize)]
struct RawInfo {
    name: ByteBuf,
    #[serde(rename = "piece length")]
    piece_length: i64,
    pieces: ByteBuf,
    length: Option<i64>,
    #[serde(default, deserialize_with = "files")]
    files: Option<Vec<RawFile>>,
}

fn files<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<RawFile>>, D::Error> {
    under_key("files", deserializer)
}

#[derive(Debug, serde::Deserialize)]
struct RawTorrent {
    announce: ByteBuf,
    #[serde(default, rename = "announce-list", deserialize_with = "announce_list")]
    announce_list: Vec<Vec<ByteBuf>>,
    comment: Option<ByteBuf>,
    #[serde(rename = "creation date")]
    creation_date: Option<i64>,
    #[serde(default, rename = "httpseeds")]
    http_seeds: Vec<ByteBuf>,
    #[serde(default, deserialize_with = "nodes")]
    nodes: Vec<Value>,
    #[serde(deserialize_with = "info")]
    info: RawInfo,
    // Hashed as is, so it is looked up in the original bytes.
    #[serde(skip)]
    raw_info: Vec<u8>,
}

fn announce_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Vec<ByteBuf>>, D::Error> {
    under_key("announce-list", deserializer)
}

fn nodes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    under_key("nodes", deserializer)
}

fn info<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RawInfo, D::Error> {
    under_key("info", deserializer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub fn hash(raw_info: &[u8]) -> Self {
        Self(Sha1::digest(raw_info).into())
    }
}

impl Deref for InfoHash {
    type Target = [u8; 20];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceHash(pub [u8; PIECE_HASH_LEN]);

impl Deref for PieceHash {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Concatenated SHA-1 hashes, one per piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pieces {
    buf: Vec<u8>,
}

impl Pieces {
    pub fn len(&self) -> usize {
        self.buf.len() / PIECE_HASH_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<PieceHash> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = PieceHash> + '_ {
        self.buf
            .chunks_exact(PIECE_HASH_LEN)
            .filter_map(|chunk| chunk.try_into().ok())
            .map(PieceHash)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl TryFrom<Vec<u8>> for Pieces {
    type Error = DecodeError;

    fn try_from(pieces: Vec<u8>) -> Result<Self, Self::Error> {
        if is_aligned(pieces.len(), PIECE_HASH_LEN) {
            Ok(Pieces { buf: pieces })
        } else {
            Err(DecodeError::SizeInvariant(
                "pieces byte string length is not a multiple of 20".to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub len_bytes: u64,
    pub path: PathBuf,
}

impl TryFrom<RawFile> for FileSpec {
    type Error = DecodeError;

    fn try_from(file: RawFile) -> Result<Self, Self::Error> {
        if file.path.is_empty() {
            return Err(DecodeError::SizeInvariant(
                "got zero-length path list for file entry".to_string(),
            ));
        }

        let segments = file
            .path
            .into_iter()
            .map(|segment| validate_utf8("info.files.path", segment.into_vec()))
            .collect::<Result<Vec<_>, _>>()?;

        // Segments are joined verbatim, `.` and `..` included.
        let path = PathBuf::from(segments.join(MAIN_SEPARATOR_STR));
        let len_bytes = non_negative("info.files.length", file.length)?;

        Ok(FileSpec { len_bytes, path })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtNode {
    pub host: String,
    pub port: u16,
}

impl TryFrom<Value> for DhtNode {
    type Error = DecodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let invalid = |reason: String| DecodeError::Structural {
            context: "nodes",
            reason,
        };

        let items = match value {
            Value::List(items) => items,
            other => return Err(invalid(format!("DHT node is not a list: {}", Shown(&other)))),
        };

        let [host, port]: [Value; 2] = items.try_into().map_err(|items| {
            DecodeError::SizeInvariant(format!(
                "inadequate info in list to represent a DHT node: {}",
                Shown(&Value::List(items))
            ))
        })?;

        let host = match host {
            Value::Bytes(bytes) => validate_utf8("nodes.host", bytes)?,
            other => return Err(invalid(format!("invalid DHT node hostname: {}", Shown(&other)))),
        };

        let port = match port {
            Value::Int(int) => u16::try_from(int)
                .map_err(|_| invalid(format!("invalid DHT node port: {int}")))?,
            other => return Err(invalid(format!("invalid DHT node port: {}", Shown(&other)))),
        };

        Ok(DhtNode { host, port })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    pub name: String,
    pub hash: InfoHash,
    pub piece_len_bytes: u64,
    pub pieces: Pieces,
    pub len_bytes: u64,
    pub files: Vec<FileSpec>,
}

impl TorrentInfo {
    pub fn is_single_file(&self) -> bool {
        self.files.is_empty()
    }
}

fn build_info(info: RawInfo, raw_info: &[u8]) -> Result<TorrentInfo, DecodeError> {
    let name = validate_utf8("info.name", info.name.into_vec())?;
    let pieces = Pieces::try_from(info.pieces.into_vec())?;

    let piece_len_bytes = u64::try_from(info.piece_length)
        .ok()
        .filter(|&len| len > 0)
        .ok_or_else(|| DecodeError::SizeInvariant("piece length is not positive".to_string()))?;

    let files = info
        .files
        .unwrap_or_default()
        .into_iter()
        .map(FileSpec::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let len_bytes = match info.length {
        Some(length) => non_negative("info.length", length)?,
        None => sum_with_overflow_guard("info.files.length", files.iter().map(|f| f.len_bytes))?,
    };

    let hash = InfoHash::hash(raw_info);

    Ok(TorrentInfo {
        name,
        hash,
        piece_len_bytes,
        pieces,
        len_bytes,
        files,
    })
}

/// Decodes an info dictionary from its exact wire bytes, which are also
/// what the info hash is computed over.
pub fn decode_info(raw_info: &[u8]) -> Result<TorrentInfo, DecodeError> {
    let info: RawInfo = from_dict_bytes(raw_info).map_err(DecodeError::structural("info"))?;

    build_info(info, raw_info)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub info: TorrentInfo,
    pub trackers: Vec<String>,
    pub comment: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub http_seeds: Vec<String>,
    pub dht_nodes: Vec<DhtNode>,
}

impl Torrent {
    /// Trackers that parse as URLs, in tracker order.
    pub fn tracker_urls(&self) -> impl Iterator<Item = Url> + '_ {
        self.trackers
            .iter()
            .filter_map(|tracker| match Url::parse(tracker) {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(%tracker, %err, "skipping unparsable tracker url");
                    None
                }
            })
    }
}

fn unique_trackers(
    announce: String,
    announce_list: Vec<Vec<ByteBuf>>,
) -> Result<Vec<String>, DecodeError> {
    let mut seen = HashSet::from([announce.clone()]);
    let mut trackers = vec![announce];

    for tracker in announce_list.into_iter().flatten() {
        let tracker = validate_utf8("announce-list", tracker.into_vec())?;

        if !seen.contains(&tracker) {
            seen.insert(tracker.clone());
            trackers.push(tracker);
        }
    }

    Ok(trackers)
}

impl TryFrom<RawTorrent> for Torrent {
    type Error = DecodeError;

    fn try_from(file: RawTorrent) -> Result<Self, Self::Error> {
        let info = build_info(file.info, &file.raw_info)?;

        let announce = validate_utf8("announce", file.announce.into_vec())?;
        let comment = file
            .comment
            .map(|comment| validate_utf8("comment", comment.into_vec()))
            .transpose()?;
        let http_seeds = file
            .http_seeds
            .into_iter()
            .map(|seed| validate_utf8("httpseeds", seed.into_vec()))
            .collect::<Result<Vec<_>, _>>()?;

        let trackers = unique_trackers(announce, file.announce_list)?;

        let creation_date = file
            .creation_date
            .map(|secs| {
                DateTime::from_timestamp(secs, 0).ok_or(DecodeError::Overflow("creation date"))
            })
            .transpose()?;

        let dht_nodes = file
            .nodes
            .into_iter()
            .map(DhtNode::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Torrent {
            info,
            trackers,
            comment,
            creation_date,
            http_seeds,
            dht_nodes,
        })
    }
}

pub fn decode_torrent(raw: &[u8]) -> Result<Torrent, DecodeError> {
    let mut file: RawTorrent = from_dict_bytes(raw).map_err(DecodeError::structural("torrent"))?;
    file.raw_info = value_span(raw, b"info")
        .map_err(DecodeError::structural("torrent"))?
        .ok_or_else(|| DecodeError::Structural {
            context: "torrent",
            reason: "missing info dictionary".to_string(),
        })?
        .to_vec();

    let torrent = Torrent::try_from(file)?;

    tracing::debug!(
        info_hash = %torrent.info.hash,
        trackers = torrent.trackers.len(),
        files = torrent.info.files.len(),
        "decoded torrent"
    );

    Ok(torrent)
}
