use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed {context}: {reason}")]
    Structural {
        context: &'static str,
        reason: String,
    },
    #[error("field '{field}' is not valid UTF-8 string, bytes: {bytes:?}")]
    Encoding { field: &'static str, bytes: Vec<u8> },
    #[error("{0}")]
    SizeInvariant(String),
    #[error("negative or overflowed size in field '{0}'")]
    Overflow(&'static str),
    #[error("malformed peer list: {0}")]
    MalformedPeerList(String),
}

impl DecodeError {
    pub(crate) fn structural(context: &'static str) -> impl FnOnce(serde_bencode::Error) -> Self {
        move |err| DecodeError::Structural {
            context,
            reason: err.to_string(),
        }
    }
}
