//! End-to-end: boot the executive and drive applications and push events.

use std::time::Duration;

use jump_executive::{Executive, ExecutiveConfig, StoreConfig, QUEUE_CAPACITY_PROPERTY};
use jump_isolate::{AppState, Application, ContainerKind, IsolateState};
use jump_module::ModuleKind;
use jump_push_registry::{ConnectionInfo, SuiteId};

#[tokio::test]
async fn every_module_kind_is_installed() {
    let executive = Executive::boot(ExecutiveConfig::in_memory()).unwrap();
    assert_eq!(executive.registry().installed(), ModuleKind::ALL.to_vec());
    assert_eq!(executive.services().port(), Some(1099));
    assert_eq!(executive.presentation().presentation().mode(), "headless");
    executive.shutdown().await;
}

#[tokio::test]
async fn application_lifecycle_through_the_executive() {
    let executive = Executive::boot(ExecutiveConfig::in_memory()).unwrap();
    let (isolate, app) = executive
        .launch(Application::new(1, "demo.Hello"), vec!["hi".into()], None)
        .await
        .unwrap();
    assert_eq!(executive.get_app_windows(isolate, app).len(), 1);

    let client = executive.lifecycle().client();
    assert_eq!(client.pause_app(isolate, app).await.unwrap(), AppState::Paused);
    assert_eq!(
        executive.lifecycle().isolate_state(isolate),
        Some(IsolateState::Paused)
    );
    assert_eq!(client.resume_app(isolate, app).await.unwrap(), AppState::Active);
    assert_eq!(
        client.destroy_app(isolate, app, false).await.unwrap(),
        AppState::Destroyed
    );

    assert!(executive.get_app_windows(isolate, app).is_empty());
    assert_eq!(
        executive.lifecycle().isolate_state(isolate),
        Some(IsolateState::Destroyed)
    );
    executive.shutdown().await;
}

#[tokio::test]
async fn multi_container_from_config() {
    let config = ExecutiveConfig {
        container: ContainerKind::Multi,
        ..ExecutiveConfig::in_memory()
    };
    let executive = Executive::boot(config).unwrap();
    let (isolate, first) = executive
        .launch(Application::new(1, "demo.Hello"), vec![], None)
        .await
        .unwrap();
    let second = executive
        .lifecycle()
        .client()
        .start_app(isolate, Application::new(1, "demo.Clock"), vec![])
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(executive.lifecycle().container_kind(isolate), Some(ContainerKind::Multi));
    executive.shutdown().await;
}

#[tokio::test]
async fn queue_capacity_reaches_the_transport() {
    let config = ExecutiveConfig {
        queue_capacity: 7,
        ..ExecutiveConfig::in_memory()
    };
    let executive = Executive::boot(config).unwrap();
    assert_eq!(
        executive.registry().config().get(QUEUE_CAPACITY_PROPERTY),
        Some("7")
    );
    assert_eq!(executive.transport().capacity(), 7);
    executive.shutdown().await;
}

#[tokio::test]
async fn pushed_data_launches_the_application() {
    let executive = Executive::boot(ExecutiveConfig::in_memory()).unwrap();
    let suite = SuiteId::new(42);
    let connections = executive.push().connections().unwrap();
    assert!(connections
        .register_connection(
            suite,
            ConnectionInfo::new("socket://:79", "demo.Finger", "*")
        )
        .unwrap());

    assert!(executive.connections().deliver("socket://:79"));
    assert_eq!(connections.list_connections(suite, true), vec!["socket://:79"]);

    let launched = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(launch) = executive.launcher().launched().into_iter().next() {
                return launch;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let (isolate, app_id, app) = launched;
    assert_eq!(app, Application::new(42, "demo.Finger"));
    assert_eq!(executive.get_app_windows(isolate, app_id).len(), 1);

    executive.lifecycle().terminate_isolate(isolate).await.unwrap();
    assert!(executive.launcher().launched().is_empty());

    assert!(connections.unregister_connection(suite, "socket://:79"));
    assert!(!executive.connections().deliver("socket://:79"));
    executive.shutdown().await;
}

#[tokio::test]
async fn reregistering_replaces_the_held_connection() {
    let executive = Executive::boot(ExecutiveConfig::in_memory()).unwrap();
    let suite = SuiteId::new(42);
    let connections = executive.push().connections().unwrap();
    for midlet in ["demo.Finger", "demo.Hello"] {
        assert!(connections
            .register_connection(suite, ConnectionInfo::new("socket://:79", midlet, "*"))
            .unwrap());
    }

    assert_eq!(executive.connections().reserved(), vec!["socket://:79"]);
    assert_eq!(
        connections.get_midlet(suite, "socket://:79").as_deref(),
        Some("demo.Hello")
    );
    executive.shutdown().await;
}

#[tokio::test]
async fn push_registrations_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ExecutiveConfig {
        store: StoreConfig::Local {
            path: dir.path().join("store"),
        },
        ..ExecutiveConfig::default()
    };
    let suite = SuiteId::new(42);

    let executive = Executive::boot(config.clone()).unwrap();
    executive
        .push()
        .connections()
        .unwrap()
        .register_connection(suite, ConnectionInfo::new("socket://:79", "demo.Finger", "*"))
        .unwrap();
    executive.shutdown().await;

    let executive = Executive::boot(config).unwrap();
    let connections = executive.push().connections().unwrap();
    assert_eq!(connections.list_connections(suite, false), vec!["socket://:79"]);
    assert_eq!(executive.connections().reserved(), vec!["socket://:79"]);
    executive.shutdown().await;
}
