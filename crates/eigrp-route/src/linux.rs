//! A [`RouteSink`] backed by the Linux kernel's routing table via `rtnetlink`, extending the
//! donor's read-only `route().get()` enumeration with the `add`/`del` calls a speaker actually
//! needs to drive the FIB.

use crate::{
    FibRoute,
    RouteError,
    RouteSink,
};
use eigrp_common::Ipv4Prefix;
use netlink_packet_route::route::RouteProtocol;
use rtnetlink::{
    new_connection,
    Handle,
    IpVersion,
};
use std::{
    future::Future,
    net::Ipv4Addr,
    sync::Mutex,
};
use tokio::task::JoinHandle;

/// EIGRP's own route-origin tag, so installs from this process are distinguishable from
/// statically configured or otherwise-sourced routes when the kernel table is inspected.
const RTPROT_EIGRP: u8 = 192;

pub struct NetlinkRouteSink {
    handle: Handle,
    _connection_thread: JoinHandle<()>,
    installed: Mutex<Vec<FibRoute>>,
}

impl NetlinkRouteSink {
    pub fn new() -> Result<Self, RouteError> {
        let (connection, handle, _) = new_connection()?;
        let connection_thread = tokio::spawn(connection);
        Ok(Self {
            handle,
            _connection_thread: connection_thread,
            installed: Mutex::new(Vec::new()),
        })
    }
}

impl RouteSink for NetlinkRouteSink {
    fn install(&self, route: FibRoute) -> impl Future<Output = Result<(), RouteError>> + Send {
        async move {
            {
                let installed = self.installed.lock().expect("lock poisoned");
                if installed.contains(&route) {
                    return Ok(());
                }
            }

            if let Err(error) = self.delete_existing(route.prefix).await {
                log::warn!("could not clear prior route for {} before reinstall: {error}", route.prefix);
            }

            self.handle
                .route()
                .add()
                .v4()
                .destination_prefix(route.prefix.address, route.prefix.prefix_len)
                .gateway(route.next_hop)
                .protocol(RouteProtocol::Other(RTPROT_EIGRP))
                .priority(route.metric)
                .execute()
                .await?;

            let mut installed = self.installed.lock().expect("lock poisoned");
            installed.retain(|existing| existing.prefix != route.prefix);
            installed.push(route);
            Ok(())
        }
    }

    fn withdraw(&self, prefix: Ipv4Prefix) -> impl Future<Output = Result<(), RouteError>> + Send {
        async move {
            self.delete_existing(prefix).await?;
            let mut installed = self.installed.lock().expect("lock poisoned");
            installed.retain(|existing| existing.prefix != prefix);
            Ok(())
        }
    }
}

impl NetlinkRouteSink {
    async fn delete_existing(&self, prefix: Ipv4Prefix) -> Result<(), RouteError> {
        use futures_util::TryStreamExt;

        let mut routes = self.handle.route().get(IpVersion::V4).execute();
        while let Some(route) = routes.try_next().await? {
            if route.header.destination_prefix_length == prefix.prefix_len && route_destination_matches(&route, prefix.address) {
                self.handle.route().del(route).execute().await?;
            }
        }
        Ok(())
    }
}

fn route_destination_matches(route: &netlink_packet_route::route::RouteMessage, address: Ipv4Addr) -> bool {
    use eigrp_common::next_enum_of;
    use netlink_packet_route::route::{
        RouteAddress,
        RouteAttribute,
    };

    next_enum_of!(route.attributes, RouteAttribute::Destination(value) => value)
        .map(|value| matches!(value, RouteAddress::Inet(addr) if *addr == address))
        .unwrap_or(address == Ipv4Addr::UNSPECIFIED)
}
