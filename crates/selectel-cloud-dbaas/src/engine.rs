//! Datastore engine families and datastore type validation

use crate::client::DbaasClient;
use crate::error::{DbaasError, Result};

/// Engine family a resource type accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    PostgreSql,
    MySql,
    Redis,
    Kafka,
}

impl Family {
    /// Datastore type engines belonging to this family
    pub fn engines(self) -> &'static [&'static str] {
        match self {
            Family::PostgreSql => &["postgresql"],
            Family::MySql => &["mysql", "mysql_native"],
            Family::Redis => &["redis"],
            Family::Kafka => &["kafka"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Family::PostgreSql => "PostgreSQL",
            Family::MySql => "MySQL",
            Family::Redis => "Redis",
            Family::Kafka => "Kafka",
        }
    }
}

/// Error message for a datastore type outside the expected engines.
pub fn engine_mismatch_message(expected: &[&str], engine: &str) -> String {
    let base = if expected.len() > 1 {
        "Provided datastore type must have one of the following engine types: "
    } else {
        "Provided datastore type must have an engine "
    };
    format!(
        "{base}{} for this resource. But provided type is {engine}",
        expected.join(", ")
    )
}

/// Check that `type_id` names a datastore type of the given family.
pub async fn validate_datastore_type(client: &DbaasClient, family: Family, type_id: &str) -> Result<()> {
    let datastore_type = client
        .datastore_type(type_id)
        .await
        .map_err(|err| {
            tracing::debug!(%err, type_id, "Datastore type lookup failed");
            DbaasError::DatastoreTypeLookup(type_id.to_string())
        })?;

    let expected = family.engines();
    if !expected.contains(&datastore_type.engine.as_str()) {
        return Err(DbaasError::DatastoreType(engine_mismatch_message(
            expected,
            &datastore_type.engine,
        )));
    }
    Ok(())
}

/// Check that the datastore `datastore_id` runs an engine of the given family.
pub async fn validate_parent_datastore(client: &DbaasClient, family: Family, datastore_id: &str) -> Result<()> {
    let datastore = client.datastore(datastore_id).await?;
    validate_datastore_type(client, family, &datastore.type_id).await
}
