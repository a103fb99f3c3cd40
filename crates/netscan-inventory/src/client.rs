//! Neo4j connection management and shared graph client.

use neo4rs::{ConfigBuilder, Graph, Query};
use netscan_core::StoreError;
use serde::Deserialize;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<GraphError> for StoreError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Connection(msg) => StoreError::Unavailable(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Configuration for connecting to Neo4j.
///
/// Loaded from the `[neo4j]` section of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "netscan-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Key constraints. `MERGE` on a constrained key is atomic per node.
const SCHEMA: &[&str] = &[
    "CREATE CONSTRAINT host_address IF NOT EXISTS FOR (n:Host) REQUIRE n.address IS UNIQUE",
    "CREATE CONSTRAINT range_network IF NOT EXISTS FOR (n:AddressRange) REQUIRE n.network IS UNIQUE",
    "CREATE CONSTRAINT subnet_network IF NOT EXISTS FOR (n:Subnet) REQUIRE n.network IS UNIQUE",
    "CREATE CONSTRAINT application_name IF NOT EXISTS FOR (n:Application) REQUIRE n.name IS UNIQUE",
];

/// Thread-safe Neo4j client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j and make sure the key constraints exist.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let client = Self { graph };
        client.ensure_schema().await?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(client)
    }

    async fn ensure_schema(&self) -> Result<(), GraphError> {
        for stmt in SCHEMA {
            self.run(neo4rs::query(stmt)).await?;
        }
        Ok(())
    }

    /// Execute a write-only query (MERGE, SET, DELETE).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Execute a query returning a single integer column.
    pub async fn query_count(&self, query: Query, column: &str) -> Result<i64, GraphError> {
        match self.query_one(query).await? {
            Some(row) => Ok(row.get::<i64>(column).unwrap_or(0)),
            None => Ok(0),
        }
    }
}
