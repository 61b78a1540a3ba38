//! A route sink that only logs. Stands in for platforms without a FIB backend (spec's route-sink
//! module note: a second backend beyond Linux isn't required to satisfy the trait boundary) and
//! is what tests wire the DUAL engine to so successor changes can be asserted without a kernel.

use crate::{
    FibRoute,
    Keychain,
    KeychainSource,
    RouteError,
    RouteSink,
};
use eigrp_common::Ipv4Prefix;
use log::info;
use std::{
    future::Future,
    sync::Mutex,
};

#[derive(Default)]
pub struct NullRouteSink {
    installed: Mutex<Vec<FibRoute>>,
}

impl NullRouteSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything currently considered installed, for test assertions.
    pub fn installed(&self) -> Vec<FibRoute> {
        self.installed.lock().expect("lock poisoned").clone()
    }
}

impl RouteSink for NullRouteSink {
    fn install(&self, route: FibRoute) -> impl Future<Output = Result<(), RouteError>> + Send {
        async move {
            let mut installed = self.installed.lock().expect("lock poisoned");
            if !installed.contains(&route) {
                info!("fib install {} via {} metric {}", route.prefix, route.next_hop, route.metric);
                installed.retain(|existing| existing.prefix != route.prefix);
                installed.push(route);
            }
            Ok(())
        }
    }

    fn withdraw(&self, prefix: Ipv4Prefix) -> impl Future<Output = Result<(), RouteError>> + Send {
        async move {
            let mut installed = self.installed.lock().expect("lock poisoned");
            let before = installed.len();
            installed.retain(|existing| existing.prefix != prefix);
            if installed.len() != before {
                info!("fib withdraw {}", prefix);
            }
            Ok(())
        }
    }
}

/// A keychain source with nothing configured in it. Every lookup fails, so an interface whose
/// `AuthConfig` names a keychain falls back to sending unauthenticated (logged) rather than
/// panicking on a missing backend; standing in the same way `NullRouteSink` stands in for a
/// missing FIB backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKeychainSource;

impl KeychainSource for NullKeychainSource {
    fn lookup(&self, _name: &str) -> Option<&dyn Keychain> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn route(octet: u8, metric: u32) -> FibRoute {
        FibRoute {
            prefix: Ipv4Prefix::new(Ipv4Addr::new(10, 0, octet, 0), 24).unwrap(),
            next_hop: Ipv4Addr::new(192, 168, 1, octet),
            metric,
        }
    }

    #[tokio::test]
    async fn repeated_install_is_idempotent() {
        let sink = NullRouteSink::new();
        sink.install(route(0, 100)).await.unwrap();
        sink.install(route(0, 100)).await.unwrap();
        assert_eq!(sink.installed().len(), 1);
    }

    #[tokio::test]
    async fn install_replaces_prior_route_for_same_prefix() {
        let sink = NullRouteSink::new();
        sink.install(route(0, 100)).await.unwrap();
        sink.install(route(0, 150)).await.unwrap();
        let installed = sink.installed();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].metric, 150);
    }

    #[tokio::test]
    async fn withdraw_removes_the_route() {
        let sink = NullRouteSink::new();
        sink.install(route(0, 100)).await.unwrap();
        sink.withdraw(route(0, 100).prefix).await.unwrap();
        assert!(sink.installed().is_empty());
    }
}
