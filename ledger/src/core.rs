use std::fmt;

use alloy::primitives::{ruint::UintTryFrom, U256};
use serde::{Deserialize, Serialize};

pub use alloy::primitives::{Address, B256};

pub type ChainId = u64;

/// An inclusive span of block numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    #[serde(with = "decimal")]
    pub from: U256,
    #[serde(with = "decimal")]
    pub to: U256,
}

impl BlockRange {
    pub fn new<N>(from: N, to: N) -> Self
    where
        U256: UintTryFrom<N>,
    {
        Self {
            from: U256::from(from),
            to: U256::from(to),
        }
    }

    /// Number of blocks in the range.
    pub fn width(&self) -> U256 {
        self.to - self.from + U256::from(1)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Parse a base-10 unsigned integer of up to 256 bits.
pub fn parse_decimal(value: &str) -> Option<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(value, 10).ok()
}

/// Serialize 256-bit integers as decimal strings.
///
/// Deserialization also accepts plain json integers, which is convenient in
/// hand-written configuration files.
pub mod decimal {
    use std::fmt;

    use alloy::primitives::U256;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DecimalVisitor)
    }

    struct DecimalVisitor;

    impl<'de> de::Visitor<'de> for DecimalVisitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a decimal string or an unsigned integer")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<U256, E> {
            Ok(U256::from(value))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<U256, E> {
            super::parse_decimal(value)
                .ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
        }
    }

    pub mod option {
        use alloy::primitives::U256;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => serializer.collect_str(value),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] U256);

            let value: Option<Wrapper> = Option::deserialize(deserializer)?;
            Ok(value.map(|Wrapper(inner)| inner))
        }
    }
}
