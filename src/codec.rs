use serde::de::DeserializeOwned;
use serde::Serialize;

pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Abstracts away the selection of the Serialize/Deserialize format used for values handed to
/// the store. Codecs are stateless, so they are selected as a type parameter rather than held.
///
/// The format must be deterministic: encoding the same value twice yields the same bytes.
pub trait Codec: Send + Sync + 'static {
    fn encode<T>(value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized;

    fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned;
}

/// Field-tagged, human-readable text. This is the default for everything the accessors write.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T>(value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary encoding. Not human-readable, so prefer it for store-internal bookkeeping
/// (e.g. the on-disk records of the file store) over values other processes may inspect.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T>(value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: Serialize + ?Sized,
    {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T>(bytes: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Missing data and whitespace-only text read the same way: as "nothing stored".
pub fn is_blank(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim().is_empty(),
        Err(_) => false,
    }
}
