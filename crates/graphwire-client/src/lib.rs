//! graphwire-client: Graph entities as objects over a Cypher endpoint.
//!
//! Nodes and relationships are proxies with lazily fetched, write-invalidated
//! caches. Every read and write becomes a generated Cypher [`Statement`] run
//! through the session's active [`Transaction`] (or an autocommit request),
//! and executed by an [`Adaptor`]: the transactional HTTP endpoint or Bolt.

pub mod adaptor;
pub mod cypher;
pub mod node;
pub mod property;
pub mod relationship;
pub mod response;
pub mod session;
pub mod transaction;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use adaptor::{Adaptor, AdaptorResponse, BoltAdaptor, HttpAdaptor, SchemaListing};
pub use cypher::{statement, MatchReturn, MatchSpec, Statement};
pub use node::Node;
pub use property::PropertyAccessor;
pub use relationship::Relationship;
pub use response::{RawResult, RawRow};
pub use session::{Session, Transaction};
pub use transaction::{TransactionCoordinator, TransactionState};
pub use value::{QueryResult, Row, Value};

pub use graphwire_core::{
    ConnectionConfig, ConstraintKind, Direction, GraphError, PropertyMap, PropertyValue, Result,
    WrapLevel,
};
