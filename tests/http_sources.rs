//! Integration tests for the workspace client and sources using wiremock
//!
//! These tests run real sources against mocked workspace endpoints, from a
//! single GET up to a full export into a temporary directory.

use dbsync::api::{WorkspaceClient, WorkspaceCredentials};
use dbsync::config::{ExportConfig, PipelineSettings};
use dbsync::pipeline::files::ExportFiles;
use dbsync::pipeline::Pipeline;
use dbsync::report::{ItemStatus, MemoryReport};
use dbsync::source::instance_pools::InstancePoolSource;
use dbsync::source::registry::build_sources;
use dbsync::source::{stream_source, SourceContext};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{bearer_token, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> WorkspaceClient {
    WorkspaceClient::new(WorkspaceCredentials::new(&server.uri(), "test-token").unwrap()).unwrap()
}

fn pools() -> Value {
    json!({
        "instance_pools": [
            {
                "instance_pool_id": "0101-pool",
                "instance_pool_name": "shared-pool",
                "min_idle_instances": 2,
                "node_type_id": "i3.xlarge",
                "idle_instance_autotermination_minutes": 10
            },
            {
                "instance_pool_id": "0102-pool",
                "instance_pool_name": "scratch",
                "min_idle_instances": 0,
                "node_type_id": "i3.xlarge",
                "idle_instance_autotermination_minutes": 10
            }
        ]
    })
}

fn pool_acl() -> Value {
    json!({
        "object_id": "/instance-pools/0101-pool",
        "object_type": "instance-pool",
        "access_control_list": [
            {
                "group_name": "data-eng",
                "all_permissions": [{"permission_level": "CAN_ATTACH_TO", "inherited": false}]
            },
            {
                "group_name": "admins",
                "all_permissions": [
                    {"permission_level": "CAN_MANAGE", "inherited": true, "inherited_from_object": ["/instance-pools/"]}
                ]
            }
        ]
    })
}

fn inherited_only_acl() -> Value {
    json!({
        "object_id": "/instance-pools/0102-pool",
        "access_control_list": [
            {
                "group_name": "admins",
                "all_permissions": [{"permission_level": "CAN_MANAGE", "inherited": true}]
            }
        ]
    })
}

async fn mount_pool_permissions(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/2.0/permissions/instance-pools/0101-pool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pool_acl()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.0/permissions/instance-pools/0102-pool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inherited_only_acl()))
        .mount(server)
        .await;
}

/// Test module for the workspace client
mod client_tests {
    use super::*;

    /// Test successful GET sends the bearer token and query
    #[tokio::test]
    async fn test_get_success_returns_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/2.0/workspace/list"))
            .and(query_param("path", "/Shared"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
            .mount(&server)
            .await;

        let response = client(&server)
            .get("workspace/list", &[("path", "/Shared".to_string())])
            .await
            .expect("Request should succeed");

        assert_eq!(response, json!({"objects": []}));
    }

    /// Test 401 response surfaces the status
    #[tokio::test]
    async fn test_401_returns_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/2.0/clusters/list"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error_code": "UNAUTHENTICATED",
                "message": "Invalid access token"
            })))
            .mount(&server)
            .await;

        let err = client(&server).get("clusters/list", &[]).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("401"), "unexpected error: {message}");
        assert!(message.contains("GET clusters/list"));
    }

    /// Test empty body is read as an empty object
    #[tokio::test]
    async fn test_empty_body_is_empty_object() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/2.0/instance-profiles/list"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let response = client(&server).get("instance-profiles/list", &[]).await.unwrap();
        assert_eq!(response, json!({}));
    }
}

/// Test module for sources against mocked endpoints
mod source_tests {
    use super::*;

    #[tokio::test]
    async fn test_instance_pool_source_streams_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/instance-pools/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pools()))
            .mount(&server)
            .await;

        let ctx = SourceContext::new(
            client(&server),
            ExportFiles::new("/tmp/unused"),
            &["shared-*".to_string()],
            BTreeMap::new(),
        )
        .unwrap();
        let source = InstancePoolSource::new(ctx).unwrap();
        let report = Arc::new(MemoryReport::new());

        let docs: Vec<_> = stream_source(Arc::new(source), 2, report.clone()).collect().await;

        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.identifier(), "databricks_instance_pool_0101_pool");
        assert_eq!(doc.raw().display_name(), "shared-pool");
        assert_eq!(doc.raw().origin_url(), server.uri());
        assert_eq!(doc.latest()["min_idle_instances"], "${tobool(var.PASSIVE_MODE) ? 0 : 2}");
        assert_eq!(doc.latest()["enable_elastic_disk"], true);
        let row = report
            .get("databricks_instance_pool_0101_pool", "databricks_instance_pool")
            .unwrap();
        assert_eq!(row.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_pool_with_direct_grants_yields_permissions_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/instance-pools/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pools()))
            .mount(&server)
            .await;
        mount_pool_permissions(&server).await;

        let ctx = SourceContext::new(
            client(&server),
            ExportFiles::new("/tmp/unused"),
            &[] as &[String],
            BTreeMap::new(),
        )
        .unwrap();
        let report = Arc::new(MemoryReport::new());
        let docs: Vec<_> = stream_source(Arc::new(InstancePoolSource::new(ctx).unwrap()), 2, report.clone())
            .collect()
            .await;

        let ids: Vec<&str> = docs.iter().map(|d| d.identifier()).collect();
        // the second pool only has inherited grants
        assert_eq!(
            ids,
            vec![
                "databricks_instance_pool_0101_pool",
                "databricks_instance_pool_0101_pool_permissions",
                "databricks_instance_pool_0102_pool",
            ]
        );
        let permissions = &docs[1];
        assert_eq!(permissions.resource_type(), "databricks_permissions");
        assert_eq!(
            permissions.latest()["instance_pool_id"],
            "${databricks_instance_pool.databricks_instance_pool_0101_pool.id}"
        );
        assert_eq!(
            permissions.latest()["dynamic"][0]["access_control"]["content"],
            json!({"group_name": "data-eng", "permission_level": "CAN_ATTACH_TO"})
        );
        let row = report
            .get("databricks_instance_pool_0101_pool_permissions", "databricks_permissions")
            .unwrap();
        assert_eq!(row.display_name, "shared-pool permissions");
        assert_eq!(row.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_failing_list_is_reported_under_resource_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/instance-pools/list"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let ctx = SourceContext::new(
            client(&server),
            ExportFiles::new("/tmp/unused"),
            &[] as &[String],
            BTreeMap::new(),
        )
        .unwrap();
        let report = Arc::new(MemoryReport::new());
        let docs: Vec<_> = stream_source(Arc::new(InstancePoolSource::new(ctx).unwrap()), 2, report.clone())
            .collect()
            .await;

        assert!(docs.is_empty());
        match report.get("instance_pool", "databricks_instance_pool").unwrap().status {
            ItemStatus::Failed { error } => assert!(error.contains("503"), "unexpected error: {error}"),
            other => panic!("unexpected status {other:?}"),
        }
    }
}

/// Test module for full exports against a mocked workspace
mod export_tests {
    use super::*;

    async fn mount_workspace(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/2.0/instance-pools/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pools()))
            .mount(server)
            .await;
        mount_pool_permissions(server).await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/workspace/list"))
            .and(query_param("path", "/Shared"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objects": [
                    {"object_type": "DIRECTORY", "path": "/Shared/team"},
                    {"object_type": "NOTEBOOK", "path": "/Shared/etl", "language": "PYTHON", "object_id": 1}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/workspace/list"))
            .and(query_param("path", "/Shared/team"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objects": [
                    {"object_type": "NOTEBOOK", "path": "/Shared/team/report", "language": "SQL", "object_id": 2}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/workspace/export"))
            .and(query_param("path", "/Shared/etl"))
            .and(query_param("format", "SOURCE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "cHJpbnQoMSk="})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/2.0/workspace/export"))
            .and(query_param("path", "/Shared/team/report"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_export_pools_and_notebooks() {
        let server = MockServer::start().await;
        mount_workspace(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let files = ExportFiles::new(dir.path());
        let config = ExportConfig::from_yaml_str(
            "name: test\nobjects:\n  instance_pool:\n  notebook:\n    notebook_path: /Shared\n",
        )
        .unwrap();
        let sources = build_sources(&config, &client(&server), &files).unwrap();
        let report = Arc::new(MemoryReport::new());
        let settings = PipelineSettings {
            parallelism: 2,
            ..PipelineSettings::default()
        };

        let results = Pipeline::new(sources, files.clone(), settings, report.clone())
            .run()
            .await
            .unwrap();

        // two pools, one permissions resource and one notebook written,
        // the second notebook failed
        assert_eq!(results.succeeded, 4);
        assert_eq!(results.failed, 1);

        let pool: Value = serde_json::from_str(
            &std::fs::read_to_string(files.resource_path("instance_pool", "databricks_instance_pool_0101_pool"))
                .unwrap(),
        )
        .unwrap();
        let body = &pool["resource"]["databricks_instance_pool"]["databricks_instance_pool_0101_pool"];
        assert_eq!(body["node_type_id"], "${var.i3_xlarge}");
        assert_eq!(body["min_idle_instances"], "${tobool(var.PASSIVE_MODE) ? 0 : 2}");

        let permissions: Value = serde_json::from_str(
            &std::fs::read_to_string(
                files.resource_path("instance_pool", "databricks_instance_pool_0101_pool_permissions"),
            )
            .unwrap(),
        )
        .unwrap();
        assert!(permissions["resource"]["databricks_permissions"]
            .get("databricks_instance_pool_0101_pool_permissions")
            .is_some());
        assert!(!files
            .resource_path("instance_pool", "databricks_instance_pool_0102_pool_permissions")
            .exists());
        assert_eq!(
            report
                .get("databricks_instance_pool_0101_pool_permissions", "databricks_permissions")
                .unwrap()
                .status,
            ItemStatus::Succeeded {
                file_path: "exports/instance_pool/databricks_instance_pool_0101_pool_permissions.tf.json".into()
            }
        );

        let notebook = std::fs::read_to_string(files.data_path("notebook", "databricks_notebook_Shared_etl.py")).unwrap();
        assert_eq!(notebook, "print(1)");
        assert!(files
            .resource_path("notebook", "databricks_notebook_Shared_etl")
            .exists());
        assert!(!files
            .resource_path("notebook", "databricks_notebook_Shared_team_report")
            .exists());

        assert_eq!(results.shared_variables, 1);
        assert_eq!(
            std::fs::read_to_string(files.tfvars_path()).unwrap(),
            "i3_xlarge=\"i3.xlarge\"\n"
        );
        assert_eq!(report.summary().total_failed(), 1);
    }
}
