//! Typed values
//!
//! The engine stores opaque bytes. Anything that can turn itself into bytes
//! and back implements [`Encoder`] and can be stored with
//! `Store::set_object` / read with `Store::get_object`.
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! struct Session { user: u64, roles: Vec<String> }
//!
//! store.set_object("session:1", &Bincode(session), NO_TTL)?;
//! let Bincode(session) = store.get_object::<Bincode<Session>>("session:1")?;
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{EmberError, Result};

/// Byte encoding of a value kind
pub trait Encoder: Sized {
    fn serialize(&self) -> Result<Vec<u8>>;

    fn deserialize(bytes: &[u8]) -> Result<Self>;
}

impl Encoder for Vec<u8> {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl Encoder for String {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| EmberError::Serialization(e.to_string()))
    }
}

/// Any serde type, encoded with bincode
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bincode<T>(pub T);

impl<T> Bincode<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Encoder for Bincode<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.0).map_err(|e| EmberError::Serialization(e.to_string()))
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map(Bincode)
            .map_err(|e| EmberError::Serialization(e.to_string()))
    }
}
