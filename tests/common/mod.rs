//! Shared scaffolding for integration tests: an in-process Finder on an
//! ephemeral port plus routers pointed at it.

use switchyard::config::FabricConfig;
use switchyard::context::ProcessContext;
use switchyard::domain_types::{ClassName, TargetName};
use switchyard::finder::Finder;
use switchyard::router::XrlRouter;

/// Binds a Finder on an ephemeral loopback port, spawns it, and returns a
/// config routers can use to reach it.
pub async fn spawn_finder() -> FabricConfig {
    let config = FabricConfig::testing();
    let finder = Finder::bind(config.clone(), ProcessContext::local())
        .await
        .expect("bind finder");
    let endpoint = finder.local_addr();
    tokio::spawn(finder.run());

    FabricConfig::builder()
        .finder_endpoint(endpoint)
        .payload_limit(config.payload_limit)
        .writer_queue_capacity(config.writer_queue_capacity)
        .request_timeout(config.request_timeout)
        .hello_interval(config.hello_interval)
        .reconnect_delay(config.reconnect_delay)
        .build()
        .expect("valid test config")
}

/// Starts a router registered as `instance` in `class` and waits for its
/// registration handshake to finish.
pub async fn ready_router(config: &FabricConfig, instance: &str, class: &str) -> XrlRouter {
    let router = XrlRouter::new(
        config.clone(),
        ProcessContext::local(),
        TargetName::try_new(instance).expect("valid instance name"),
        ClassName::try_new(class).expect("valid class name"),
        false,
    )
    .await
    .expect("start router");
    router.wait_until_ready().await;
    router
}
