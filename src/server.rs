//! HTTP listener for a [`Gateway`], built on hyper.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};

use crate::errors::GatewayResult;
use crate::Gateway;

/// Bind `addr` and return the bound address together with the server
/// future. Every connection gets its own task; the server stops
/// accepting when `shutdown` completes.
pub fn bind<F>(
    gateway: Gateway,
    addr: &SocketAddr,
    shutdown: F,
) -> GatewayResult<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    let make_service = make_service_fn(move |conn: &AddrStream| {
        let gateway = gateway.clone();
        let client = conn.remote_addr();
        async move {
            let func = move |req: hyper::Request<hyper::Body>| {
                let gateway = gateway.clone();
                async move { Ok::<_, Infallible>(gateway.handle_with(req, Some(client)).await) }
            };
            Ok::<_, Infallible>(service_fn(func))
        }
    });

    let server = hyper::Server::try_bind(addr)?.serve(make_service);
    let local_addr = server.local_addr();
    Ok((local_addr, server.with_graceful_shutdown(shutdown)))
}

/// Serve until Ctrl-C.
pub async fn serve(gateway: Gateway, addr: SocketAddr) -> GatewayResult<()> {
    let (local_addr, server) = bind(gateway, &addr, async {
        let _ = tokio::signal::ctrl_c().await;
    })?;
    info!("listen webdav on {local_addr}");
    server.await?;
    Ok(())
}
