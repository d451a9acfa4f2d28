//! Identifiers that name a cluster, its members, the bound database and the
//! incarnation of the local store.

use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentityError;
use crate::marshal::{self, Marshal};

const HALF_MASK: u128 = u64::MAX as u128;

fn marshal_uuid<W: Write>(uuid: &Uuid, writer: &mut W) -> io::Result<()> {
    let bits = uuid.as_u128();
    marshal::write_u64(writer, (bits >> 64) as u64)?;
    marshal::write_u64(writer, (bits & HALF_MASK) as u64)
}

fn unmarshal_uuid<R: Read>(reader: &mut R) -> io::Result<Uuid> {
    let most = marshal::read_u64(reader)? as u128;
    let least = marshal::read_u64(reader)? as u128;
    Ok(Uuid::from_u128((most << 64) | least))
}

/// Identity shared by every member of one cluster.
///
/// Created exactly once, by the member that bootstraps the cluster, and
/// learned by everyone else from discovery or durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(Uuid);

impl ClusterId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterId{{{}}}", self.0)
    }
}

impl Marshal for ClusterId {
    fn marshal<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        marshal_uuid(&self.0, writer)
    }

    fn unmarshal<R: Read>(reader: &mut R) -> io::Result<Self> {
        unmarshal_uuid(reader).map(Self)
    }
}

/// Identity of a single core member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let simple = self.0.simple().to_string();
        write!(f, "MemberId{{{}}}", &simple[..8])
    }
}

impl Marshal for MemberId {
    fn marshal<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        marshal_uuid(&self.0, writer)
    }

    fn unmarshal<R: Read>(reader: &mut R) -> io::Result<Self> {
        unmarshal_uuid(reader).map(Self)
    }
}

/// Name of the logical database bound to this cluster instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseName(String);

impl DatabaseName {
    pub const MAX_LEN: usize = 127;

    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.len() > Self::MAX_LEN {
            return Err(IdentityError::DatabaseNameTooLong(name.len()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Layout: `[u8 present] [u8 len] [len bytes of UTF-8]`.
impl Marshal for DatabaseName {
    fn marshal<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let bytes = self.0.as_bytes();
        writer.write_all(&[1, bytes.len() as u8])?;
        writer.write_all(bytes)
    }

    fn unmarshal<R: Read>(reader: &mut R) -> io::Result<Self> {
        if marshal::read_u8(reader)? == 0 {
            return Err(marshal::invalid_data("database name marked absent"));
        }
        let len = marshal::read_u8(reader)? as usize;
        if len > Self::MAX_LEN {
            return Err(marshal::invalid_data(format!(
                "database name length {len} exceeds {}",
                Self::MAX_LEN
            )));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        let name = String::from_utf8(buf).map_err(|err| marshal::invalid_data(err.to_string()))?;
        Ok(Self(name))
    }
}

/// Provenance of the durable store.
///
/// [`StoreId::DEFAULT`] marks an unknown store and never compares equal to
/// anything, itself included, which is why there is no `Eq` impl.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreId {
    pub creation_time: i64,
    pub random_id: i64,
    pub upgrade_time: i64,
    pub upgrade_id: i64,
}

impl StoreId {
    pub const DEFAULT: StoreId = StoreId {
        creation_time: -1,
        random_id: -1,
        upgrade_time: -1,
        upgrade_id: -1,
    };

    pub fn new(creation_time: i64, random_id: i64, upgrade_time: i64, upgrade_id: i64) -> Self {
        Self {
            creation_time,
            random_id,
            upgrade_time,
            upgrade_id,
        }
    }

    pub fn is_default(&self) -> bool {
        self.creation_time == Self::DEFAULT.creation_time
            && self.random_id == Self::DEFAULT.random_id
            && self.upgrade_time == Self::DEFAULT.upgrade_time
            && self.upgrade_id == Self::DEFAULT.upgrade_id
    }
}

impl PartialEq for StoreId {
    fn eq(&self, other: &Self) -> bool {
        if self.is_default() || other.is_default() {
            return false;
        }
        self.creation_time == other.creation_time
            && self.random_id == other.random_id
            && self.upgrade_time == other.upgrade_time
            && self.upgrade_id == other.upgrade_id
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreId{{creation_time: {}, random_id: {}, upgrade_time: {}, upgrade_id: {}}}",
            self.creation_time, self.random_id, self.upgrade_time, self.upgrade_id
        )
    }
}

impl Marshal for StoreId {
    fn marshal<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        marshal::write_i64(writer, self.creation_time)?;
        marshal::write_i64(writer, self.random_id)?;
        marshal::write_i64(writer, self.upgrade_time)?;
        marshal::write_i64(writer, self.upgrade_id)
    }

    fn unmarshal<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            creation_time: marshal::read_i64(reader)?,
            random_id: marshal::read_i64(reader)?,
            upgrade_time: marshal::read_i64(reader)?,
            upgrade_id: marshal::read_i64(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_id_layout_is_two_big_endian_halves() -> io::Result<()> {
        let uuid = Uuid::from_u128(0x0102_0304_0506_0708_1112_1314_1516_1718);
        let bytes = ClusterId::new(uuid).to_bytes()?;
        assert_eq!(
            bytes,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18]
        );
        assert_eq!(ClusterId::unmarshal(&mut &bytes[..])?, ClusterId::new(uuid));
        Ok(())
    }

    #[test]
    fn database_name_layout() -> anyhow::Result<()> {
        let name = DatabaseName::new("graph.db")?;
        let bytes = name.to_bytes()?;
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[2..], b"graph.db");
        assert_eq!(DatabaseName::unmarshal(&mut &bytes[..])?, name);
        Ok(())
    }

    #[test]
    fn database_name_rejects_long_names() {
        assert!(DatabaseName::new("x".repeat(127)).is_ok());
        assert!(matches!(
            DatabaseName::new("x".repeat(128)),
            Err(IdentityError::DatabaseNameTooLong(128))
        ));
    }

    #[test]
    fn absent_database_name_marker_is_rejected() {
        let err = DatabaseName::unmarshal(&mut &[0u8][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn default_store_id_equals_nothing() {
        let store = StoreId::new(1, 2, 3, 4);
        assert_eq!(store, StoreId::new(1, 2, 3, 4));
        assert_ne!(store, StoreId::new(1, 2, 3, 5));
        assert_ne!(StoreId::DEFAULT, StoreId::DEFAULT);
        assert_ne!(StoreId::DEFAULT, store);
        assert_ne!(store, StoreId::DEFAULT);
    }

    #[test]
    fn store_id_layout_is_four_longs() -> io::Result<()> {
        let store = StoreId::new(10, 20, 30, 40);
        let bytes = store.to_bytes()?;
        assert_eq!(bytes.len(), 32);
        assert_eq!(StoreId::unmarshal(&mut &bytes[..])?, store);
        Ok(())
    }
}
