use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use warp::http::StatusCode;
use warp::Filter;

use booking_chat::config::Config;
use booking_chat::directory::InMemoryDirectory;
use booking_chat::protocol::NotifyRequest;
use booking_chat::server::Server;
use booking_chat::store::InMemoryStore;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Config::load();
    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid bind address {}: {e}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let server = Server::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryDirectory::new()),
        &config,
    );

    let ws_server = server.clone();
    let ws_route = warp::path("ws").and(warp::ws()).map(move |ws: warp::ws::Ws| {
        let server = ws_server.clone();
        ws.on_upgrade(move |socket| async move {
            server.handle_connection(socket).await;
        })
    });

    // Surrounding-system hook: push a generic notification at a user.
    let notify_server = server.clone();
    let notify_route = warp::path("notify")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |req: NotifyRequest| {
            let server = notify_server.clone();
            async move {
                server.notify(req.into_notification()).await;
                Ok::<_, warp::Rejection>(warp::reply::with_status("accepted", StatusCode::ACCEPTED))
            }
        });

    let routes = ws_route
        .or(notify_route)
        .with(warp::cors().allow_any_origin());

    let tls_ready =
        Path::new(&config.tls_cert_path).exists() && Path::new(&config.tls_key_path).exists();
    if tls_ready {
        info!("serving wss on {addr}");
        warp::serve(routes)
            .tls()
            .cert_path(&config.tls_cert_path)
            .key_path(&config.tls_key_path)
            .run(addr)
            .await;
    } else {
        info!("no TLS material found, serving plain ws on {addr}");
        warp::serve(routes).run(addr).await;
    }
}
