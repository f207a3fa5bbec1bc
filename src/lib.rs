mod bencode;
mod error;
mod torrent;
mod tracker;
mod validate;

pub use error::*;
pub use torrent::*;
pub use tracker::*;
pub use validate::*;
