use jump_module::presentation::MODE_PROPERTY;
use jump_module::{
    presentation_factory, service_registry_factory, ModuleConfig, ModuleError, ModuleKey,
    ModuleKind, ModuleRegistry, PresentationModes, PresentationModule, ServiceRegistryModule,
};

fn registry() -> ModuleRegistry {
    ModuleRegistry::new(
        ModuleConfig::new()
            .with(MODE_PROPERTY, "headless")
            .with("service-registry.port", "2000"),
    )
}

#[test]
fn factories_share_the_registry_config() {
    let registry = registry();
    let presentation = registry
        .get_or_init(ModuleKind::Presentation, |config| {
            presentation_factory(PresentationModes::builtin(), config.clone())
        })
        .unwrap();
    let services = registry
        .get_or_init(ModuleKind::ServiceRegistry, |config| {
            service_registry_factory(config.clone())
        })
        .unwrap();

    assert_eq!(presentation.get_default().unwrap().presentation().mode(), "headless");
    assert_eq!(services.get_default().unwrap().port(), Some(2000));
    assert_eq!(
        registry.installed(),
        vec![ModuleKind::Presentation, ModuleKind::ServiceRegistry]
    );
}

#[test]
fn lookup_with_wrong_type_is_an_error() {
    let registry = registry();
    registry
        .install(service_registry_factory(ModuleConfig::new()))
        .unwrap();

    let err = registry
        .factory::<PresentationModule>(ModuleKind::ServiceRegistry)
        .err()
        .unwrap();
    assert!(matches!(err, ModuleError::FactoryTypeMismatch(ModuleKind::ServiceRegistry)));

    let err = registry
        .factory::<PresentationModule>(ModuleKind::Presentation)
        .err()
        .unwrap();
    assert!(matches!(err, ModuleError::NotInstalled(ModuleKind::Presentation)));
}

#[test]
fn unknown_mode_does_not_poison_the_factory() {
    let registry = registry();
    let factory = registry
        .install(presentation_factory(PresentationModes::builtin(), ModuleConfig::new()))
        .unwrap();

    assert!(matches!(
        factory.get_module(&ModuleKey::mode("holographic")),
        Err(ModuleError::UnknownMode(_))
    ));
    assert!(factory.loaded_keys().is_empty());
    assert!(factory.get_module(&ModuleKey::mode("headless")).is_ok());
}

#[test]
fn unload_all_reaches_every_factory() {
    let registry = registry();
    let services = registry
        .install(service_registry_factory(registry.config().clone()))
        .unwrap();
    let module = services.get_default().unwrap();
    module
        .register("clock", jump_messaging::IsolateId::new(4))
        .unwrap();

    registry.unload_all();

    assert!(module.services().is_empty());
    assert!(services.cached(&ModuleKey::Default).is_none());
    let again: std::sync::Arc<ServiceRegistryModule> = services.get_default().unwrap();
    assert_eq!(again.lookup("clock"), None);
}
