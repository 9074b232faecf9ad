//! Selectel managed databases
//!
//! Datastores for PostgreSQL, MySQL, Redis and Kafka, plus the objects that
//! live inside them: databases, users, logical replication slots, topics and
//! ACLs.
//!
//! Child objects validate the engine of their parent datastore before they
//! are created, and every mutation of a child takes the lock of its parent
//! datastore so concurrent changes are serialised.

pub mod client;
pub mod database;
pub mod datastore;
pub mod engine;
pub mod error;
pub mod floating_ip;
pub mod kafka;
pub mod slot;
pub mod status;
pub mod user;

pub use client::{DbaasClient, Flavor, FloatingIps, PatternType, Restore};
pub use database::{DatabaseHandler, DatabaseSpec, DatabaseState};
pub use datastore::{DatastoreHandler, DatastoreSpec, DatastoreState, Firewall};
pub use engine::Family;
pub use error::{DbaasError, Result};
pub use floating_ip::{FloatingIpStep, plan_floating_ips};
pub use kafka::{AclHandler, AclSpec, AclState, TopicHandler, TopicSpec, TopicState};
pub use slot::{SlotHandler, SlotSpec, SlotState};
pub use status::{Kind, Polling};
pub use user::{DbUserHandler, DbUserSpec, DbUserState};
