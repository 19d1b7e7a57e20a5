//! Fixed-size byte array types.

/// Define a fixed-size byte array newtype with hex formatting and serde
/// support.
macro_rules! impl_bytes {
    ($name:ident, $size:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $size]);

        impl $name {
            /// Size of the type in bytes.
            pub const SIZE: usize = $size;

            /// Returns true iff every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name([0u8; $size])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(b: [u8; $size]) -> Self {
                $name(b)
            }
        }

        impl From<&[u8]> for $name {
            fn from(b: &[u8]) -> Self {
                let mut out = [0u8; $size];
                out.copy_from_slice(b);
                $name(out)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                use rustc_hex::FromHex;

                let b: Vec<u8> = s.from_hex().unwrap();
                Self::from(&b[..])
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                use rustc_hex::ToHex;

                let hex: String = self.0.to_hex();
                write!(f, "{}", hex)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{:?}", self)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.serialize_bytes(&self.0)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let b = <::serde_bytes::ByteBuf as ::serde::Deserialize>::deserialize(
                    deserializer,
                )?;
                if b.len() != $size {
                    return Err(::serde::de::Error::invalid_length(
                        b.len(),
                        &concat!(stringify!($size), " bytes"),
                    ));
                }
                Ok(Self::from(&b[..]))
            }
        }
    };
}

impl_bytes!(Address, 20, "A 20-byte on-chain account address.");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::cbor;

    #[test]
    fn test_address_hex() {
        let addr = Address::from("000102030405060708090a0b0c0d0e0f10111213");
        assert_eq!(addr.0[0], 0x00);
        assert_eq!(addr.0[19], 0x13);
        assert_eq!(
            format!("{}", addr),
            "000102030405060708090a0b0c0d0e0f10111213"
        );
    }

    #[test]
    fn test_address_serde_roundtrip() {
        let addr = Address([0xab; 20]);
        let decoded: Address = cbor::from_slice(&cbor::to_vec(&addr)).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn test_address_zero() {
        assert!(Address::default().is_zero());
        assert!(!Address([1; 20]).is_zero());
    }
}
