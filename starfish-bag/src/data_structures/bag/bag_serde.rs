//! Serde support, enabled with the `serde` feature.
//!
//! A bag serializes as a plain sequence taken under a freeze and deserializes
//! into a fresh bag holding every item in one list. No list layout, worker
//! slot or counter is preserved.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::concurrent_bag::ConcurrentBag;

impl<T: Serialize> Serialize for ConcurrentBag<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let frozen = self.freeze();
        let mut seq = serializer.serialize_seq(Some(frozen.count()))?;
        for value in frozen.values() {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

struct BagVisitor<T> {
    _marker: PhantomData<T>,
}

impl<'de, T: Deserialize<'de>> Visitor<'de> for BagVisitor<T> {
    type Value = ConcurrentBag<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a sequence of bag items")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ConcurrentBag::from_items(items))
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ConcurrentBag<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(BagVisitor {
            _marker: PhantomData,
        })
    }
}
