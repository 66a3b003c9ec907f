//! MongoDB store client for docmapper.
//!
//! This crate provides a MongoDB-based implementation of the `StoreClient` trait,
//! handing filters and operator updates straight to the server.
//!
//! To use this client, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmapper = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native queries** - Filters, sorts and updates run on MongoDB's query engine
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//! - **Indexing** - Field index hints become MongoDB indexes
//!
//! # Example
//!
//! ```ignore
//! use docmapper::{client::StoreClientBuilder, mongodb::MongoStoreClient, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MongoStoreClient::builder("mongodb://localhost:27017")
//!         .database("hotels")
//!         .build()
//!         .await?;
//!
//!     let mapper = Mapper::with_connection(Connection::builder(client).build()?);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmapper_mongodb;

pub mod store;

pub use store::{MongoStoreClient, MongoStoreClientBuilder};
