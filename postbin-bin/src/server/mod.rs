use std::{net::Ipv4Addr, path::Path, sync::Arc};

use rama::{
    Layer as _,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        HeaderValue,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
    },
    net::{address::SocketAddress, socket::Interface},
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use postbin_lib::{
    dispatch::{PostbinService, ServiceConfig},
    utils,
};

use crate::Args;

/// Serves postbin over HTTP/1.1 (and h2) until the guard is cancelled.
pub async fn run_http_server(
    args: Args,
    guard: ShutdownGuard,
    service_config: ServiceConfig,
) -> Result<(), BoxError> {
    let interface = match args.bind {
        Some(interface) => interface,
        None => default_interface()?,
    };

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(utils::env::server_identifier())),
    )
        .into_layer(Arc::new(PostbinService::new(service_config)));

    let exec = Executor::graceful(guard);
    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));

    let tcp_listener = TcpListener::bind(interface, exec)
        .await
        .context("bind postbin http server")?;

    let server_addr = tcp_listener
        .local_addr()
        .context("get bound address for postbin http server")?;

    tracing::info!("postbin http server listening on: {server_addr}");
    if let Some(data) = args.data.as_deref() {
        write_server_socket_address_as_file(data, "postbin", server_addr.into()).await?;
    }

    tcp_listener.serve(http_server).await;

    Ok(())
}

fn default_interface() -> Result<Interface, BoxError> {
    let port = utils::env::compute_listen_port();
    format!("{}:{port}", Ipv4Addr::UNSPECIFIED)
        .parse()
        .context("parse default interface")
        .context_field("port", port)
}

async fn write_server_socket_address_as_file(
    dir: &Path,
    name: &str,
    addr: SocketAddress,
) -> Result<(), BoxError> {
    let path = dir.join(format!("{name}.addr.txt"));
    tokio::fs::write(&path, addr.to_string())
        .await
        .context("write server's socket address to file")
        .context_field("address", addr)
        .with_context_debug_field("path", || path.to_owned())
}
