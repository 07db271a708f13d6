/// (De)serialize a [`uuid::Uuid`] as its hyphenated string, whichever
/// serializer is in use. The BSON raw serializer is not human readable and
/// would otherwise store a binary blob that string filters never match.
pub mod serde_uuid {
    use std::str::FromStr;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Uuid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Uuid::from_str(&string).map_err(D::Error::custom)
    }
}

/// (De)serialize file contents as BSON binary rather than an array of integers.
pub mod serde_binary {
    use mongodb::bson::{spec::BinarySubtype, Binary};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.to_vec(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Binary::deserialize(deserializer).map(|binary| binary.bytes)
    }
}
