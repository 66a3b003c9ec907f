//! In-memory store client for docmapper.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreClient` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Query language** - Comparison, membership, existence and logical filter operators
//! - **Operator updates** - `$set`, `$unset` and `$inc`, with upsert
//! - **Identity assignment** - Documents inserted without `_id` receive an ObjectId
//!
//! # Quick Start
//!
//! ```ignore
//! use docmapper::{prelude::*, memory::InMemoryStoreClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mapper = Mapper::with_connection(
//!         Connection::builder(InMemoryStoreClient::new()).build()?,
//!     );
//!     let hotels = mapper.register(SchemaBuilder::new("Hotel"))?;
//!
//!     let mut hotel = hotels.new_entity();
//!     hotel.set("name", "Grand");
//!     hotel.save().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmapper_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStoreClient, InMemoryStoreClientBuilder};
