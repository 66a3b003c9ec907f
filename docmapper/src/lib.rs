//! Main docmapper crate: schema validation and lifecycle hooks over document stores.
//!
//! This crate is the primary entry point for users of the docmapper framework.
//! It re-exports the core types and functionality from the sub-crates and provides
//! access to the available store clients.
//!
//! # Features
//!
//! - **Declarative schemas** - Field specs that validate, normalize and default record fields
//! - **Lifecycle hooks** - Before-hooks that can rewrite or veto, after-hooks that never block
//! - **Schema-agnostic records** - Documents addressed by field name, with typed conversions
//! - **Multiple stores** - In-memory and MongoDB clients behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmapper::{prelude::*, memory::InMemoryStoreClient};
//! use bson::doc;
//!
//! pub struct HotelBooking;
//!
//! impl DocumentSchema for HotelBooking {
//!     fn schema_name() -> &'static str { "HotelBooking" }
//!
//!     fn declare(schema: SchemaBuilder) -> SchemaBuilder {
//!         schema
//!             .field("guest", StringField::new().required().index(IndexKind::Ascending))
//!             .field("nights", IntegerField::new().required().default_value(1))
//!             .field("extras", SequenceField::new().item(StringField::new()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> MapperResult<()> {
//!     let mapper = Mapper::with_connection(
//!         Connection::builder(InMemoryStoreClient::new()).build()?,
//!     );
//!
//!     let bookings = mapper.model_of::<HotelBooking>()?;
//!     bookings.ensure_indexes().await?;
//!
//!     // Stamp every booking before it is written
//!     bookings.before_save_hook(Hook::sync(|ctx| {
//!         if let Some(record) = ctx.record_mut() {
//!             record.insert("source", "web");
//!         }
//!         Ok(())
//!     }));
//!
//!     let mut booking = bookings.new_entity();
//!     booking.set("guest", "Ada");
//!     booking.save().await?;
//!
//!     // Defaults were filled in and an identity assigned
//!     assert_eq!(booking.get("nights"), Some(&bson::Bson::Int32(1)));
//!     assert!(booking.id().is_some());
//!
//!     let extended = bookings
//!         .update_one(doc! { "guest": "Ada" }, doc! { "$inc": { "nights": 2 } }, UpdateOptions::default())
//!         .await?;
//!     println!("{:?}", extended.get("nights"));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Stores
//!
//! - [`memory`] - In-memory client for development and testing
//! - [`mongodb`] - MongoDB client (requires `mongodb` feature)

pub mod prelude;

pub use docmapper_core::{client, connection, entity, error, field, hook, mapper, model, naming, schema};

// Re-export BSON types for convenience
pub use bson;

/// In-memory store client.
pub mod memory {
    pub use docmapper_memory::{InMemoryStoreClient, InMemoryStoreClientBuilder};
}

/// MongoDB store client.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmapper_mongodb::{MongoStoreClient, MongoStoreClientBuilder};
}
