// Server loop module
// Accepts connections until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::{accept_connection, Transport};
use crate::config::AppState;
use crate::logger;

/// Accept loop. Returns once `shutdown` resolves; connections still in
/// flight keep running in their own tasks.
pub async fn start_server_loop<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    transport: Transport,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &transport);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = &mut shutdown => {
                logger::log_note("No longer accepting connections");
                break;
            }
        }
    }
}
