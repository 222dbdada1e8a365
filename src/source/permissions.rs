//! Access control documents
//!
//! Objects with directly granted permissions get a companion
//! `databricks_permissions` resource pointing at the exported object.
//! Inherited grants are left to the parent object and an object without
//! direct grants yields no document.

use super::{identifier, ObjectRef, SourceContext};
use crate::document::VersionedDocument;
use crate::hcl::interpolate;
use crate::hcl::DocumentBuilder;
use crate::processor::ProcessorChain;
use serde_json::{Map, Value};

pub const RESOURCE_TYPE: &str = "databricks_permissions";

/// How an exported object is addressed by the permissions API and resource
#[derive(Debug, Clone, Copy)]
pub struct PermissionTarget {
    /// Object type segment of `permissions/<type>/<id>`
    pub object_type: &'static str,
    /// Attribute of `databricks_permissions` naming the object
    pub object_id_field: &'static str,
    /// Attribute of the parent resource holding its id
    pub resource_attribute: &'static str,
}

pub const INSTANCE_POOL: PermissionTarget = PermissionTarget {
    object_type: "instance-pools",
    object_id_field: "instance_pool_id",
    resource_attribute: "id",
};

/// Identifier of the permissions resource of one object
pub fn permissions_identifier(parent_type: &str, object_id: &str) -> String {
    identifier(parent_type, &format!("{object_id}-permissions"))
}

/// Direct grants of an access control list as `access_control` contents
pub fn direct_grants(acl: &Value) -> Vec<Value> {
    let entries = acl
        .get("access_control_list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut grants = Vec::new();
    for entry in entries {
        let principal = ["user_name", "group_name", "service_principal_name"]
            .into_iter()
            .find_map(|key| entry.get(key).and_then(Value::as_str).map(|v| (key, v)));
        let Some((key, principal)) = principal else {
            continue;
        };
        let permissions = entry
            .get("all_permissions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for permission in permissions {
            if permission.get("inherited").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            if let Some(level) = permission.get("permission_level").and_then(Value::as_str) {
                let mut grant = Map::new();
                grant.insert(key.to_string(), Value::String(principal.to_string()));
                grant.insert("permission_level".to_string(), Value::String(level.to_string()));
                grants.push(Value::Object(grant));
            }
        }
    }
    grants
}

/// Body of the permissions resource, `None` without direct grants
pub fn make_permissions_dict(
    target: &PermissionTarget,
    parent_type: &str,
    parent_identifier: &str,
    acl: &Value,
) -> Option<Map<String, Value>> {
    let grants = direct_grants(acl);
    if grants.is_empty() {
        return None;
    }
    let reference = interpolate::resource(parent_type, parent_identifier, target.resource_attribute);
    DocumentBuilder::new(RESOURCE_TYPE)
        .for_object(parent_identifier)
        .required(target.object_id_field, || Ok(Value::String(reference)))
        .dynamic_blocks("access_control", || Ok(Value::Array(grants)), None)
        .build()
        .ok()
}

impl SourceContext {
    /// Companion permissions document of an exported object.
    ///
    /// A failed lookup or an object without direct grants is skipped.
    pub async fn permissions_document(
        &self,
        folder: &str,
        target: &PermissionTarget,
        parent_type: &str,
        object: &ObjectRef<'_>,
    ) -> Option<VersionedDocument> {
        let path = format!("permissions/{}/{}", target.object_type, object.external_id);
        let acl = match self.client.get(&path, &[]).await {
            Ok(acl) => acl,
            Err(e) => {
                tracing::debug!("no permissions for {}: {:#}", object.identifier, e);
                return None;
            }
        };
        let Some(body) = make_permissions_dict(target, parent_type, &object.identifier, &acl) else {
            tracing::debug!("{} has no direct permissions", object.identifier);
            return None;
        };
        let name = format!("{} permissions", object.display_name.unwrap_or(object.external_id));
        let permissions = ObjectRef::new(object.external_id, permissions_identifier(parent_type, object.external_id))
            .named(&name);
        Some(self.create_document(folder, RESOURCE_TYPE, permissions, Ok(body), &ProcessorChain::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn acl() -> Value {
        json!({
            "object_id": "/instance-pools/0101-pool",
            "access_control_list": [
                {
                    "user_name": "ana@example.com",
                    "all_permissions": [
                        {"permission_level": "CAN_MANAGE", "inherited": false}
                    ]
                },
                {
                    "group_name": "admins",
                    "all_permissions": [
                        {"permission_level": "CAN_MANAGE", "inherited": true,
                         "inherited_from_object": ["/instance-pools/"]}
                    ]
                },
                {
                    "group_name": "data-eng",
                    "all_permissions": [
                        {"permission_level": "CAN_ATTACH_TO", "inherited": false}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_inherited_grants_are_dropped() {
        assert_eq!(
            direct_grants(&acl()),
            vec![
                json!({"user_name": "ana@example.com", "permission_level": "CAN_MANAGE"}),
                json!({"group_name": "data-eng", "permission_level": "CAN_ATTACH_TO"}),
            ]
        );
    }

    #[test]
    fn test_permissions_reference_parent() {
        let body = make_permissions_dict(
            &INSTANCE_POOL,
            "databricks_instance_pool",
            "databricks_instance_pool_0101_pool",
            &acl(),
        )
        .unwrap();
        assert_eq!(
            body["instance_pool_id"],
            "${databricks_instance_pool.databricks_instance_pool_0101_pool.id}"
        );
        let blocks = body["dynamic"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0]["access_control"]["content"]["user_name"],
            "ana@example.com"
        );
    }

    #[test]
    fn test_only_inherited_grants_yield_nothing() {
        let acl = json!({
            "access_control_list": [
                {"group_name": "admins", "all_permissions": [{"permission_level": "CAN_MANAGE", "inherited": true}]}
            ]
        });
        assert!(make_permissions_dict(&INSTANCE_POOL, "databricks_instance_pool", "p", &acl).is_none());
        assert!(make_permissions_dict(&INSTANCE_POOL, "databricks_instance_pool", "p", &json!({})).is_none());
    }

    #[test]
    fn test_permissions_identifier() {
        assert_eq!(
            permissions_identifier("databricks_instance_pool", "0101-pool"),
            "databricks_instance_pool_0101_pool_permissions"
        );
    }
}
