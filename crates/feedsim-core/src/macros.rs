/// Defines an opaque, fixed-width, hash-derived identifier type.
///
/// Every id minted by this crate (`PostId`, `CommentId`, `TimelineId`) is a
/// 16-byte digest, never a counter, so that two independent runs of the
/// simulator that reach the same logical event derive the exact same id
/// (see `hash::derive_id`). The macro gives each such type:
///
/// - value equality/ordering/hash so it can be a `redb` table key,
/// - `bincode::Encode`/`Decode` for the on-disk projection tables,
/// - `serde::Serialize`/`Deserialize` as a lowercase hex string (so it reads
///   cleanly inside the canonical JSON event payloads), and
/// - a hex `Display`/`FromStr`.
macro_rules! define_hash_id {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ::bincode::Encode, ::bincode::Decode)]
        pub struct $name([u8; 16]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&data_encoding::HEXLOWER.encode(&self.0))
            }
        }

        impl std::str::FromStr for $name {
            type Err = data_encoding::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = data_encoding::HEXLOWER.decode(s.as_bytes())?;
                let bytes: [u8; 16] = bytes.try_into().map_err(|_| data_encoding::DecodeError {
                    position: 0,
                    kind: data_encoding::DecodeKind::Length,
                })?;
                Ok(Self(bytes))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                s.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(d: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = <String>::deserialize(d)?;
                s.parse().map_err(|e| serde::de::Error::custom(format!("invalid {}: {e}", stringify!($name))))
            }
        }
    };
}

pub(crate) use define_hash_id;
