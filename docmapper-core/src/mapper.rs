//! Process-wide mapper state: the schema registry and the connection slot.
//!
//! A [`Mapper`] is created once by the host application. Schema types are
//! registered on it exactly once and every [`Model`] it hands out reads the
//! same connection slot, so installing or clearing the connection is seen by
//! all of them at the next operation.
//!
//! # Example
//!
//! ```ignore
//! use docmapper::prelude::*;
//!
//! let mapper = Mapper::new();
//! mapper.set_connection(Connection::builder(InMemoryStoreClient::new()).build()?);
//!
//! let hotels = mapper.register(
//!     SchemaBuilder::new("Hotel").field("name", StringField::new().required()),
//! )?;
//!
//! let mut hotel = hotels.new_entity();
//! hotel.set("name", "Grand");
//! hotel.save().await?;
//! ```

use parking_lot::RwLock;
use std::{any::TypeId, collections::HashMap, sync::Arc};
use tracing::info;

use crate::{
    connection::Connection,
    error::{MapperError, MapperResult},
    model::Model,
    schema::{DocumentSchema, SchemaBuilder},
};

/// Connection slot shared between a mapper and its models.
pub(crate) type ConnectionSlot = Arc<RwLock<Option<Connection>>>;

/// A registered model and the [`DocumentSchema`] type that declared it, if any.
#[derive(Debug)]
struct Registered {
    model: Arc<Model>,
    declared_by: Option<TypeId>,
}

/// Registry of schema types bound to one connection slot.
#[derive(Debug, Default)]
pub struct Mapper {
    connection: ConnectionSlot,
    models: RwLock<HashMap<String, Registered>>,
}

impl Mapper {
    /// Creates a mapper with no connection and no schema types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mapper with `connection` already installed.
    pub fn with_connection(connection: Connection) -> Self {
        let mapper = Self::new();
        mapper.set_connection(connection);
        mapper
    }

    /// Installs the connection used by every model of this mapper.
    pub fn set_connection(&self, connection: Connection) {
        info!(client = ?connection.client(), "setting mapper connection");
        *self.connection.write() = Some(connection);
    }

    /// Clears the connection and returns the previous one.
    ///
    /// Operations fail with [`MapperError::NotConnected`] until a new one is set.
    pub fn reset_connection(&self) -> Option<Connection> {
        info!("resetting mapper connection");
        self.connection.write().take()
    }

    /// Returns the installed connection.
    pub fn connection(&self) -> MapperResult<Connection> {
        self.connection
            .read()
            .clone()
            .ok_or(MapperError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Declares a schema type.
    ///
    /// # Errors
    ///
    /// - [`MapperError::SchemaAlreadyRegistered`] if the name is taken
    /// - any error from [`SchemaBuilder::build`]
    pub fn register(&self, schema: SchemaBuilder) -> MapperResult<Arc<Model>> {
        let mut models = self.models.write();

        if models.contains_key(schema.name()) {
            return Err(MapperError::SchemaAlreadyRegistered(schema.name().to_string()));
        }

        let model = Arc::new(Model::new(schema.build()?, self.connection.clone()));
        models.insert(
            model.name().to_string(),
            Registered { model: model.clone(), declared_by: None },
        );

        Ok(model)
    }

    /// Returns the schema type registered under `name`.
    pub fn model(&self, name: &str) -> Option<Arc<Model>> {
        self.models.read().get(name).map(|registered| registered.model.clone())
    }

    /// Returns the schema type declared by `S`, registering it on first use.
    ///
    /// # Errors
    ///
    /// - [`MapperError::SchemaAlreadyRegistered`] if the name was taken by
    ///   [`Mapper::register`] or by another [`DocumentSchema`] type
    /// - any error from [`SchemaBuilder::build`]
    pub fn model_of<S: DocumentSchema>(&self) -> MapperResult<Arc<Model>> {
        let mut models = self.models.write();

        if let Some(registered) = models.get(S::schema_name()) {
            return match registered.declared_by {
                Some(type_id) if type_id == TypeId::of::<S>() => Ok(registered.model.clone()),
                _ => Err(MapperError::SchemaAlreadyRegistered(S::schema_name().to_string())),
            };
        }

        let schema = S::declare(SchemaBuilder::new(S::schema_name())).build()?;
        let model = Arc::new(Model::new(schema, self.connection.clone()));
        models.insert(
            model.name().to_string(),
            Registered { model: model.clone(), declared_by: Some(TypeId::of::<S>()) },
        );

        Ok(model)
    }

    /// Names of every registered schema type.
    pub fn schema_names(&self) -> Vec<String> {
        let mut names = self.models.read().keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}
