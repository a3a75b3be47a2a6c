//! SQL Server reconciliation tests using testcontainers.
//!
//! Requires Docker. The container accepts the SQL Server EULA on start.

#![cfg(feature = "mssql")]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use tablekeeper_core::{
    AuditStatus, DatabaseAdapter, ReconcileRequest, ReconcileStatus, Reconciler,
    ReconcilerConfig, StaticConfigProvider, adapters::create_adapter,
    orchestrator::ALREADY_CONSISTENT,
};
use testcontainers_modules::{mssql_server::MssqlServer, testcontainers::runners::AsyncRunner};

const SA_PASSWORD: &str = "yourStrong(!)Password";

const CONFIG: &str = r#"{
    "secret": "correctpass123",
    "tables": [
        { "name": "Chamados", "columns": [
            { "position": 1, "name": "Nome" },
            { "position": 2, "name": "Status" }
        ] },
        { "name": "Historico", "columns": [
            { "position": 1, "name": "A" },
            { "position": 2, "name": "B" },
            { "position": 3, "name": "C" }
        ] }
    ],
    "audit": { "table": "LogErros", "columns": [
        { "position": 1, "name": "Data" },
        { "position": 2, "name": "Hora" },
        { "position": 3, "name": "Tabela" },
        { "position": 4, "name": "Acao" }
    ] }
}"#;

fn request(secret: &str, tables: &[&str]) -> ReconcileRequest {
    ReconcileRequest::new(secret, tables.iter().map(|t| t.to_string()).collect())
}

#[tokio::test]
async fn test_mssql_reconciliation_round() {
    let container = MssqlServer::default()
        .with_accept_eula()
        .start()
        .await
        .expect("Failed to start SQL Server container");

    let port = container
        .get_host_port_ipv4(1433)
        .await
        .expect("Failed to get SQL Server port");

    let connection_string = format!(
        "mssql://sa:{}@localhost:{}/master?trust_server_certificate=true",
        SA_PASSWORD, port
    );
    let adapter: Arc<dyn DatabaseAdapter> = Arc::from(
        create_adapter(&connection_string)
            .await
            .expect("Failed to create SQL Server adapter"),
    );
    adapter
        .test_connection()
        .await
        .expect("SQL Server connection test failed");

    let config = ReconcilerConfig::from_json_str(CONFIG).expect("Invalid test configuration");
    let reconciler = Reconciler::new(adapter.clone(), Arc::new(StaticConfigProvider::new(config)));

    // Table creation, then idempotence
    let created = reconciler.reconcile(&request("correctpass123", &["Chamados"])).await;
    assert_eq!(created.status, ReconcileStatus::Done, "{}", created.message);
    assert_eq!(created.message, "table Chamados and its columns were created");

    let again = reconciler.reconcile(&request("correctpass123", &["Chamados"])).await;
    assert_eq!(again.message, ALREADY_CONSISTENT);

    // Missing columns are added in one ALTER TABLE
    adapter
        .execute_ddl("CREATE TABLE [Historico] ([A] VARCHAR(255))")
        .await
        .expect("Failed to create Historico");
    let added = reconciler.reconcile(&request("correctpass123", &["Historico"])).await;
    assert_eq!(added.message, "columns B, C added to table Historico");
    let columns = adapter
        .list_columns("Historico")
        .await
        .expect("Failed to list columns");
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[2].name, "C");

    // A same-named table in another schema stays out of the comparison
    adapter
        .execute_ddl("CREATE SCHEMA [archive]")
        .await
        .expect("Failed to create schema");
    adapter
        .execute_ddl("CREATE TABLE [archive].[Historico] ([Z] VARCHAR(255))")
        .await
        .expect("Failed to create archive.Historico");
    let unchanged = reconciler.reconcile(&request("correctpass123", &["Historico"])).await;
    assert_eq!(unchanged.message, ALREADY_CONSISTENT);

    // Denial without an audit table still answers
    let denied = reconciler.reconcile(&request("wrong", &["Chamados"])).await;
    assert_eq!(denied.status, ReconcileStatus::Denied);
    assert!(matches!(denied.audit, AuditStatus::Unavailable { .. }));

    // and is recorded once the audit table exists
    adapter
        .execute_ddl(
            "CREATE TABLE [LogErros] ([Data] VARCHAR(255), [Hora] VARCHAR(255), \
             [Tabela] VARCHAR(255), [Acao] VARCHAR(255))",
        )
        .await
        .expect("Failed to create audit table");
    let denied = reconciler.reconcile(&request("wrong", &["Chamados"])).await;
    assert_eq!(denied.audit, AuditStatus::Recorded);
}
