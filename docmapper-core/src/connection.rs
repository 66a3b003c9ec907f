//! Store connection: a client plus the execution context after-hooks run on.

use std::sync::Arc;
use tokio::runtime::Handle;

use crate::{
    client::StoreClient,
    error::{MapperError, MapperResult},
};

/// A store client bound to the runtime that after-hooks are spawned on.
///
/// Cheap to clone; clones share the same client.
#[derive(Debug, Clone)]
pub struct Connection {
    client: Arc<dyn StoreClient>,
    runtime: Handle,
}

impl Connection {
    pub fn new(client: Arc<dyn StoreClient>, runtime: Handle) -> Self {
        Self { client, runtime }
    }

    /// Starts building a connection around `client`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let connection = Connection::builder(InMemoryStoreClient::new())
    ///     .runtime(tokio::runtime::Handle::current())
    ///     .build()?;
    /// ```
    pub fn builder<C: StoreClient + 'static>(client: C) -> ConnectionBuilder {
        ConnectionBuilder {
            client: Arc::new(client),
            runtime: None,
        }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// Builder for [`Connection`].
#[derive(Debug)]
pub struct ConnectionBuilder {
    client: Arc<dyn StoreClient>,
    runtime: Option<Handle>,
}

impl ConnectionBuilder {
    /// Spawns after-hooks on `runtime` instead of the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the connection.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Initialization`] when no runtime was given and the
    /// builder is not called from within a tokio runtime.
    pub fn build(self) -> MapperResult<Connection> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| MapperError::Initialization(e.to_string()))?,
        };

        Ok(Connection::new(self.client, runtime))
    }
}
