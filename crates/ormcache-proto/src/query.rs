//! Compiled query handed to a store.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::filter::StoreFilter;

/// A query compiled from an operation and an optional ordering.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct CompiledQuery {
    /// Entity type being queried.
    pub entity: String,
    /// Row filter.
    pub filter: StoreFilter,
    /// Ordering specification, empty for store order.
    pub order_by: Vec<OrderSpec>,
}

impl CompiledQuery {
    /// Create a query for an entity.
    pub fn new(entity: impl Into<String>, filter: StoreFilter) -> Self {
        Self {
            entity: entity.into(),
            filter,
            order_by: vec![],
        }
    }

    /// Add ordering for this query.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Encode with rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode an rkyv buffer and check the filter arena.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        let query = rkyv::from_bytes::<CompiledQuery, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        query.filter.validate()?;
        Ok(query)
    }
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct OrderSpec {
    /// Field to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
    /// Where nulls sort.
    pub nulls: NullOrdering,
}

impl OrderSpec {
    /// Create an ascending order spec with nulls first.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
            nulls: NullOrdering::First,
        }
    }

    /// Create a descending order spec with nulls last.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
            nulls: NullOrdering::Last,
        }
    }

    /// Override null placement.
    pub fn with_nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Placement of null values in a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum NullOrdering {
    /// Nulls sort before every value.
    First,
    /// Nulls sort after every value.
    Last,
}
