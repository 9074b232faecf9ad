//! Resource type registry

use selectel_cloud::{CloudError, DynResource, erase};
use selectel_cloud_dbaas::{
    AclHandler, DatabaseHandler, DatastoreHandler, DbUserHandler, Family, SlotHandler, TopicHandler,
};
use selectel_cloud_domains::DomainHandler;
use selectel_cloud_mks::ClusterHandler;
use selectel_cloud_vpc::{
    FloatingIpHandler, KeypairHandler, LicenseHandler, ProjectHandler, SubnetHandler, UserHandler,
};
use std::collections::BTreeMap;

/// Every resource type the provider serves, keyed by type name
pub struct Provider {
    resources: BTreeMap<&'static str, Box<dyn DynResource>>,
}

impl Provider {
    /// Registry without any resource types
    pub fn empty() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    pub fn new() -> Self {
        let mut provider = Self::empty();

        provider.register(erase(ProjectHandler));
        provider.register(erase(UserHandler));
        provider.register(erase(SubnetHandler));
        provider.register(erase(FloatingIpHandler));
        provider.register(erase(LicenseHandler));
        provider.register(erase(KeypairHandler));

        provider.register(erase(ClusterHandler::default()));

        for family in [Family::PostgreSql, Family::MySql, Family::Redis, Family::Kafka] {
            provider.register(erase(DatastoreHandler::new(family)));
        }
        provider.register(erase(DatabaseHandler::postgresql()));
        provider.register(erase(DatabaseHandler::mysql()));
        provider.register(erase(DbUserHandler::default()));
        provider.register(erase(SlotHandler::default()));
        provider.register(erase(TopicHandler::default()));
        provider.register(erase(AclHandler::default()));

        provider.register(erase(DomainHandler));
        provider
    }

    /// Add a handler; a later registration replaces one with the same name.
    pub fn register(&mut self, resource: Box<dyn DynResource>) {
        let name = resource.type_name();
        if self.resources.insert(name, resource).is_some() {
            tracing::warn!(resource_type = name, "Replacing registered resource type");
        }
    }

    pub fn resource(&self, resource_type: &str) -> Result<&dyn DynResource, CloudError> {
        self.resources
            .get(resource_type)
            .map(|resource| &**resource)
            .ok_or_else(|| CloudError::Validation(format!("unknown resource type: {resource_type}")))
    }

    /// Registered type names in sorted order
    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_resource_types_registered() {
        let provider = Provider::new();
        let types: Vec<_> = provider.resource_types().collect();
        assert_eq!(
            types,
            [
                "selectel_dbaas_acl_v1",
                "selectel_dbaas_kafka_datastore_v1",
                "selectel_dbaas_mysql_database_v1",
                "selectel_dbaas_mysql_datastore_v1",
                "selectel_dbaas_postgresql_database_v1",
                "selectel_dbaas_postgresql_datastore_v1",
                "selectel_dbaas_postgresql_logical_replication_slot_v1",
                "selectel_dbaas_redis_datastore_v1",
                "selectel_dbaas_topic_v1",
                "selectel_dbaas_user_v1",
                "selectel_domains_domain_v1",
                "selectel_mks_cluster_v1",
                "selectel_vpc_floatingip_v2",
                "selectel_vpc_keypair_v2",
                "selectel_vpc_license_v2",
                "selectel_vpc_project_v2",
                "selectel_vpc_subnet_v2",
                "selectel_vpc_user_v2",
            ]
        );
    }

    #[test]
    fn test_unknown_resource_type() {
        let provider = Provider::new();
        let err = provider.resource("selectel_vpc_vrrp_subnet_v2").err().unwrap();
        assert_eq!(err.to_string(), "unknown resource type: selectel_vpc_vrrp_subnet_v2");
    }

    #[test]
    fn test_default_timeouts() {
        let provider = Provider::new();
        let mks = provider.resource("selectel_mks_cluster_v1").unwrap();
        assert_eq!(mks.default_timeouts().create.as_secs(), 10 * 60);
        let datastore = provider.resource("selectel_dbaas_redis_datastore_v1").unwrap();
        assert_eq!(datastore.default_timeouts().delete.as_secs(), 60 * 60);
    }
}
