//! Page lifecycle against a real container and a fake network.

use std::sync::Arc;
use std::time::Duration;

use louder_core::{CacheConfig, PwaConfig, SiteConfig};
use louder_net::StubNetwork;
use louder_pwa::{
    DeferredInstallPrompt, FileStore, KeyValueStore, MemoryStore, PageEffect, PageEvent,
    PwaRuntime, INSTALL_PROMPT_DISMISSED,
};
use louder_sw::{
    CacheStorage, RegistrationOptions, ServiceWorkerContainer, ServiceWorkerEvent, UpdateResult,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

fn cache_config(version: &str) -> CacheConfig {
    CacheConfig {
        version: version.to_string(),
        precache_urls: vec!["/".to_string(), "/assets/css/style.css".to_string()],
        skip_waiting_on_install: false,
        ..Default::default()
    }
}

fn pwa_config() -> PwaConfig {
    PwaConfig {
        install_prompt_delay_ms: 10,
        install_success_duration_ms: 10,
        update_check_interval_ms: 50,
        ..Default::default()
    }
}

fn site() -> Arc<StubNetwork> {
    let network = Arc::new(StubNetwork::new());
    network.ok("https://stillouder.space/", "text/html", "home");
    network.ok("https://stillouder.space/assets/css/style.css", "text/css", "body{}");
    network.ok("https://stillouder.space/offline.html", "text/html", "offline");
    network
}

fn page_runtime<S: KeyValueStore>(
    network: Arc<StubNetwork>,
    store: S,
) -> (
    PwaRuntime<StubNetwork, S>,
    mpsc::UnboundedReceiver<PageEvent>,
) {
    let (container, worker_events) =
        ServiceWorkerContainer::new(cache_config("v1"), Arc::new(CacheStorage::new()), network);
    PwaRuntime::new(
        pwa_config(),
        Url::parse("https://stillouder.space/").unwrap(),
        Arc::new(container),
        worker_events,
        store,
    )
}

/// A container that already went through an earlier page load.
async fn container_with_history(
    network: Arc<StubNetwork>,
) -> (
    Arc<ServiceWorkerContainer<StubNetwork>>,
    mpsc::UnboundedReceiver<ServiceWorkerEvent>,
) {
    let (container, mut worker_events) =
        ServiceWorkerContainer::new(cache_config("v1"), Arc::new(CacheStorage::new()), network);
    container
        .register("https://stillouder.space/sw.js", RegistrationOptions::default())
        .await
        .unwrap();
    while worker_events.try_recv().is_ok() {}
    (Arc::new(container), worker_events)
}

fn reload_page(
    container: Arc<ServiceWorkerContainer<StubNetwork>>,
    worker_events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
) -> PwaRuntime<StubNetwork, MemoryStore> {
    PwaRuntime::new(
        pwa_config(),
        Url::parse("https://stillouder.space/").unwrap(),
        container,
        worker_events,
        MemoryStore::new(),
    )
    .0
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<PageEvent>) -> PageEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for page event")
        .expect("page event channel closed")
}

#[tokio::test]
async fn first_visit_registers_without_reload() {
    let (runtime, _rx) = page_runtime(site(), MemoryStore::new());

    let effects = runtime.start(false).await.unwrap();

    assert!(!effects.contains(&PageEffect::Reload));
    assert!(!effects.contains(&PageEffect::ShowUpdateNotice));
    assert!(runtime.container().has_controller().await);
    assert_eq!(
        runtime.registration().await.unwrap().as_str(),
        "https://stillouder.space/"
    );
    assert!(runtime.manager().lock().await.is_controlled());
}

#[tokio::test]
async fn accepted_update_reloads_into_new_version() {
    let (runtime, _rx) = page_runtime(site(), MemoryStore::new());
    runtime.start(false).await.unwrap();

    runtime.container().deploy(cache_config("v2")).await;
    let offered = runtime.check_for_updates_now().await.unwrap();
    assert_eq!(offered, vec![PageEffect::ShowUpdateNotice]);
    assert_eq!(
        runtime.container().controller_version().await.as_deref(),
        Some("v1")
    );

    let accepted = runtime.dispatch(PageEvent::UpdateAccepted).await.unwrap();
    assert_eq!(accepted, vec![PageEffect::HideUpdateNotice, PageEffect::Reload]);
    assert_eq!(
        runtime.container().controller_version().await.as_deref(),
        Some("v2")
    );
    for name in runtime.container().caches().keys().await {
        assert!(name.starts_with("v2-"), "{name} survived activation");
    }
}

#[tokio::test]
async fn dismissed_update_keeps_old_version() {
    let (runtime, _rx) = page_runtime(site(), MemoryStore::new());
    runtime.start(false).await.unwrap();
    runtime.container().deploy(cache_config("v2")).await;
    runtime.check_for_updates_now().await.unwrap();

    let dismissed = runtime.dispatch(PageEvent::UpdateDismissed).await.unwrap();

    assert_eq!(dismissed, vec![PageEffect::HideUpdateNotice]);
    assert_eq!(
        runtime.container().controller_version().await.as_deref(),
        Some("v1")
    );
    assert!(runtime.check_for_updates_now().await.unwrap().is_empty());
}

#[tokio::test]
async fn install_dismissal_survives_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("local-storage.json");

    {
        let (runtime, mut rx) = page_runtime(site(), FileStore::load(&path));
        runtime.start(false).await.unwrap();

        let scheduled = runtime
            .dispatch(PageEvent::BeforeInstallPrompt(DeferredInstallPrompt::new()))
            .await
            .unwrap();
        assert!(scheduled.is_empty());

        let due = next_event(&mut rx).await;
        assert_eq!(due, PageEvent::InstallPromptDue);
        assert_eq!(
            runtime.dispatch(due).await.unwrap(),
            vec![PageEffect::ShowInstallPrompt]
        );
        assert_eq!(
            runtime.dispatch(PageEvent::InstallDismissed).await.unwrap(),
            vec![PageEffect::HideInstallPrompt]
        );
    }

    assert!(FileStore::load(&path).flag(INSTALL_PROMPT_DISMISSED));

    let (runtime, _rx) = page_runtime(site(), FileStore::load(&path));
    runtime.start(false).await.unwrap();
    runtime
        .dispatch(PageEvent::BeforeInstallPrompt(DeferredInstallPrompt::new()))
        .await
        .unwrap();
    assert!(runtime.show_install_prompt().await.unwrap().is_empty());
}

#[tokio::test]
async fn app_installed_toast_expires() {
    let (runtime, mut rx) = page_runtime(site(), MemoryStore::new());
    runtime.start(false).await.unwrap();

    let shown = runtime.dispatch(PageEvent::AppInstalled).await.unwrap();
    assert!(shown.contains(&PageEffect::ShowInstallSuccess));
    assert!(runtime.is_installed().await);

    let expired = next_event(&mut rx).await;
    assert_eq!(
        runtime.dispatch(expired).await.unwrap(),
        vec![PageEffect::HideInstallSuccess]
    );
}

#[tokio::test]
async fn clear_cache_empties_every_partition() {
    let (runtime, _rx) = page_runtime(site(), MemoryStore::new());
    runtime.start(false).await.unwrap();
    assert!(!runtime.container().caches().keys().await.is_empty());

    runtime.clear_cache().await.unwrap();

    assert!(runtime.container().caches().keys().await.is_empty());
}

#[tokio::test]
async fn offline_first_visit_fails_quietly() {
    let network = site();
    network.set_online(false);
    let (runtime, _rx) = page_runtime(network, MemoryStore::new());

    let effects = runtime.start(false).await.unwrap();

    assert!(effects.is_empty());
    assert!(!runtime.container().has_controller().await);
}

#[tokio::test]
async fn update_polling_ticks_immediately() {
    let (runtime, mut rx) = page_runtime(site(), MemoryStore::new());
    let poller = runtime.spawn_update_checks();

    assert_eq!(next_event(&mut rx).await, PageEvent::UpdateTick);
    assert_eq!(next_event(&mut rx).await, PageEvent::UpdateTick);
    poller.abort();
}

#[tokio::test]
async fn reload_under_existing_controller_reloads_on_update() {
    let (container, worker_events) = container_with_history(site()).await;
    let runtime = reload_page(container, worker_events);

    assert!(runtime.start(false).await.unwrap().is_empty());
    assert!(runtime.manager().lock().await.is_controlled());

    runtime.container().deploy(cache_config("v2")).await;
    assert_eq!(
        runtime.check_for_updates_now().await.unwrap(),
        vec![PageEffect::ShowUpdateNotice]
    );
    assert_eq!(
        runtime.dispatch(PageEvent::UpdateAccepted).await.unwrap(),
        vec![PageEffect::HideUpdateNotice, PageEffect::Reload]
    );
    assert_eq!(
        runtime.container().controller_version().await.as_deref(),
        Some("v2")
    );
}

#[tokio::test]
async fn clear_cache_works_after_reload() {
    let (container, worker_events) = container_with_history(site()).await;
    let runtime = reload_page(container, worker_events);
    runtime.start(false).await.unwrap();

    runtime.clear_cache().await.unwrap();

    assert!(runtime.container().caches().keys().await.is_empty());
}

#[tokio::test]
async fn waiting_update_is_offered_again_on_next_load() {
    let (container, mut worker_events) = container_with_history(site()).await;
    container.deploy(cache_config("v2")).await;
    assert!(matches!(
        container.update().await.unwrap(),
        UpdateResult::Installed(_)
    ));
    while worker_events.try_recv().is_ok() {}

    let runtime = reload_page(Arc::clone(&container), worker_events);
    let effects = runtime.start(false).await.unwrap();

    assert_eq!(effects, vec![PageEffect::ShowUpdateNotice]);
    assert_eq!(
        runtime.container().controller_version().await.as_deref(),
        Some("v1")
    );
}

#[tokio::test]
async fn site_runtime_reads_flags_from_storage_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flags.json");
    let mut seeded = FileStore::load(&path);
    seeded.set(INSTALL_PROMPT_DISMISSED, "true").unwrap();

    let mut site_config = SiteConfig::default();
    site_config.cache = cache_config("v1");
    site_config.pwa = PwaConfig {
        debug: false,
        storage_path: Some(path.clone()),
        ..pwa_config()
    };

    let (runtime, _rx) = PwaRuntime::for_site(site_config, site()).unwrap();
    runtime.start(false).await.unwrap();

    let manager = runtime.manager().lock().await;
    assert_eq!(manager.store().path(), path.as_path());
    assert!(manager.install_flow().was_dismissed());
}
