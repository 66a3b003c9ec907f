//! Schema-validation and lifecycle-hook layer over document stores.
//!
//! This crate is the core of the docmapper project and provides:
//!
//! - **Field specs** ([`field`]) - Per-field validation, normalization, defaults and index hints
//! - **Schema declaration** ([`schema`]) - Declaring schema types and building their descriptors
//! - **Collection naming** ([`naming`]) - Deriving collection names from schema type names
//! - **Store client abstraction** ([`client`]) - The contract document-store clients implement
//! - **Connections** ([`connection`]) - A client bound to the runtime after-hooks run on
//! - **Lifecycle hooks** ([`hook`]) - Before/after hooks around find, update and save
//! - **Mapper registry** ([`mapper`]) - Schema registration and the shared connection slot
//! - **Schema types** ([`model`]) - Collection-level operations of a registered schema
//! - **Records** ([`entity`]) - Record-level operations: save, refresh, query, update
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmapper_core::{field::*, mapper::Mapper, schema::{DocumentSchema, SchemaBuilder}};
//!
//! pub struct HotelBooking;
//!
//! impl DocumentSchema for HotelBooking {
//!     fn schema_name() -> &'static str {
//!         "HotelBooking"
//!     }
//!
//!     fn declare(schema: SchemaBuilder) -> SchemaBuilder {
//!         schema
//!             .field("guest", StringField::new().required())
//!             .field("nights", IntegerField::new().default_value(1))
//!     }
//! }
//!
//! let bookings = mapper.model_of::<HotelBooking>()?;
//! assert_eq!(bookings.collection(), "hotel_bookings");
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmapper_core;

pub mod client;
pub mod connection;
pub mod entity;
pub mod error;
pub mod field;
pub mod hook;
pub mod mapper;
pub mod model;
pub mod naming;
pub mod schema;
