//! Status vocabularies and waits for DBaaS objects
//!
//! Every DBaaS object reports a `status` field. Creation and updates poll it
//! until `ACTIVE`; deletion polls the object's HTTP status until `404`.

use crate::client::{Acl, Database, Datastore, DbaasClient, LogicalReplicationSlot, Topic, User};
use crate::error::{DbaasError, Result};
use async_trait::async_trait;
use selectel_cloud::{
    CloudError, Observation, PollTiming, StateRefresh, StateWaiter, deletion_observation,
};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;

const ACTIVE: &[&str] = &["ACTIVE"];

/// Kind of DBaaS object, with its API route and poll vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Datastore,
    Database,
    User,
    Slot,
    Topic,
    Acl,
}

impl Kind {
    /// Object name used in log lines and errors
    pub fn object(self) -> &'static str {
        match self {
            Kind::Datastore => "datastore",
            Kind::Database => "database",
            Kind::User => "user",
            Kind::Slot => "logical replication slot",
            Kind::Topic => "topic",
            Kind::Acl => "acl",
        }
    }

    pub(crate) fn collection(self) -> &'static str {
        match self {
            Kind::Datastore => "datastores",
            Kind::Database => "databases",
            Kind::User => "users",
            Kind::Slot => "logical-replication-slots",
            Kind::Topic => "topics",
            Kind::Acl => "acls",
        }
    }

    pub(crate) fn envelope(self) -> &'static str {
        match self {
            Kind::Datastore => "datastore",
            Kind::Database => "database",
            Kind::User => "user",
            Kind::Slot => "logical-replication-slot",
            Kind::Topic => "topic",
            Kind::Acl => "acl",
        }
    }

    pub fn pending(self) -> &'static [&'static str] {
        match self {
            Kind::Datastore => &["PENDING_CREATE", "PENDING_UPDATE", "RESIZING"],
            _ => &["PENDING_CREATE", "PENDING_UPDATE"],
        }
    }

    pub fn polling(self) -> Polling {
        let secs = Duration::from_secs;
        let (active, deletion) = match self {
            Kind::Datastore => (secs(20), secs(15)),
            Kind::Database | Kind::User | Kind::Slot => (secs(3), secs(3)),
            Kind::Topic => (secs(20), secs(3)),
            Kind::Acl => (secs(15), secs(3)),
        };
        Polling {
            active: PollTiming::new(secs(10), active),
            deletion: PollTiming::new(secs(10), deletion),
        }
    }
}

/// Poll timings for waiting on ACTIVE and on deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polling {
    pub active: PollTiming,
    pub deletion: PollTiming,
}

impl Polling {
    pub const IMMEDIATE: Polling = Polling {
        active: PollTiming::IMMEDIATE,
        deletion: PollTiming::IMMEDIATE,
    };
}

/// API objects that carry a status token
pub trait Tracked: DeserializeOwned + Send + Sync + 'static {
    fn status(&self) -> &str;
}

macro_rules! tracked {
    ($($ty:ty),+) => {
        $(impl Tracked for $ty {
            fn status(&self) -> &str {
                &self.status
            }
        })+
    };
}

tracked!(Datastore, Database, User, LogicalReplicationSlot, Topic, Acl);

struct ActiveRefresh<'a, T> {
    client: &'a DbaasClient,
    kind: Kind,
    id: &'a str,
    _object: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Tracked> StateRefresh for ActiveRefresh<'_, T> {
    type Output = T;
    type Error = DbaasError;

    async fn refresh(&self) -> Result<Observation<T>> {
        let object: T = self.client.get(self.kind, self.id).await?;
        let status = object.status().to_string();
        Ok(Observation::new(object, status))
    }
}

struct DeletionRefresh<'a> {
    client: &'a DbaasClient,
    kind: Kind,
    id: &'a str,
}

#[async_trait]
impl StateRefresh for DeletionRefresh<'_> {
    type Output = serde_json::Value;
    type Error = DbaasError;

    async fn refresh(&self) -> Result<Observation<serde_json::Value>> {
        let result = self
            .client
            .get(self.kind, self.id)
            .await
            .map_err(CloudError::from);
        Ok(deletion_observation(result)?)
    }
}

/// Wait until the object reports `ACTIVE` and return it.
pub async fn wait_for_active<T: Tracked>(
    client: &DbaasClient,
    kind: Kind,
    id: &str,
    timeout: Duration,
    timing: PollTiming,
) -> Result<T> {
    tracing::debug!(object = kind.object(), id, "Waiting to become ACTIVE");
    let refresh = ActiveRefresh {
        client,
        kind,
        id,
        _object: PhantomData,
    };
    StateWaiter::new(id, kind.pending(), ACTIVE, timeout)
        .with_timing(timing)
        .wait(&refresh)
        .await
        .map_err(|e| CloudError::waiting(kind.object(), id, e))?
        .ok_or_else(|| CloudError::ResourceNotFound(id.to_string()).into())
}

/// Read an object, mapping a missing one to `None`.
pub async fn fetch<T: Tracked>(client: &DbaasClient, kind: Kind, id: &str) -> Result<Option<T>> {
    match client.get(kind, id).await {
        Ok(object) => Ok(Some(object)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(CloudError::getting(kind.object(), id, err).into()),
    }
}

/// Delete an object and poll until the API answers `404`.
///
/// An object that is already gone counts as deleted.
pub async fn delete_and_wait(
    client: &DbaasClient,
    kind: Kind,
    id: &str,
    timeout: Duration,
    timing: PollTiming,
) -> Result<()> {
    match client.delete(kind, id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(CloudError::deleting(kind.object(), id, err).into()),
    }

    tracing::debug!(object = kind.object(), id, "Waiting to become deleted");
    StateWaiter::for_deletion(id, timeout)
        .with_timing(timing)
        .wait(&DeletionRefresh { client, kind, id })
        .await
        .map_err(|e| CloudError::deleting(kind.object(), id, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> DbaasClient {
        DbaasClient::new(reqwest::Client::new(), &server.base_url(), "token")
    }

    #[test]
    fn test_vocabulary() {
        assert!(Kind::Datastore.pending().contains(&"RESIZING"));
        assert!(!Kind::User.pending().contains(&"RESIZING"));
        assert_eq!(Kind::Acl.polling().active.min_interval, Duration::from_secs(15));
        assert_eq!(Kind::Datastore.polling().deletion.min_interval, Duration::from_secs(15));
        assert_eq!(Kind::Topic.polling().deletion.min_interval, Duration::from_secs(3));
        assert_eq!(Kind::Slot.collection(), "logical-replication-slots");
    }

    #[tokio::test]
    async fn test_wait_for_active_fails_on_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/users/u-1");
            then.status(200).json_body(json!({"user": {
                "id": "u-1", "datastore_id": "ds-1", "name": "app", "status": "ERROR"
            }}));
        });

        let err = wait_for_active::<User>(
            &client(&server),
            Kind::User,
            "u-1",
            Duration::from_secs(5),
            PollTiming::IMMEDIATE,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("unexpected status 'ERROR'"));
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_succeeds() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/topics/t-1");
            then.status(404);
        });

        delete_and_wait(
            &client(&server),
            Kind::Topic,
            "t-1",
            Duration::from_secs(5),
            PollTiming::IMMEDIATE,
        )
        .await
        .unwrap();
        delete.assert();
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/acls/a-1");
            then.status(404);
        });

        let acl = fetch::<Acl>(&client(&server), Kind::Acl, "a-1").await.unwrap();
        assert!(acl.is_none());
    }
}
