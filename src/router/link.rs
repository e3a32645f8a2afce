//! The router's Finder link: connect, register, advertise, stay alive,
//! reconnect on loss.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::carrier::spawn_carrier;
use crate::domain_types::CommandName;
use crate::error::{XrlError, XrlErrorCode};
use crate::messenger::{MessengerHandle, spawn_messenger};
use crate::router::RouterShared;
use crate::xrl::{AtomValue, Xrl, XrlArgs};

/// Issues one request against the Finder messenger with `finder` as the
/// target, folding application-level failure codes into `Err`.
pub(crate) async fn finder_request(
    finder: &MessengerHandle,
    command: &str,
    args: XrlArgs,
) -> Result<XrlArgs, XrlError> {
    let xrl = Xrl::parse_parts("finder", command, args)
        .map_err(|e| XrlError::new(XrlErrorCode::InternalError, e.to_string()))?;
    let envelope = finder.request(&xrl).await?;
    if envelope.error.is_okay() {
        Ok(envelope.args)
    } else {
        Err(envelope.error)
    }
}

/// Advertises one command: `add_xrl` at the Finder, then alias the suffixed
/// method name to the same local handler.
pub(crate) async fn advertise_command(
    shared: &Arc<RouterShared>,
    finder: &MessengerHandle,
    command: &CommandName,
) -> Result<(), XrlError> {
    let unresolved = format!("{}/{}", shared.name, command);
    let args = XrlArgs::new()
        .with("xrl", AtomValue::Text(unresolved))
        .with("protocol", AtomValue::Text("stcp".to_string()))
        .with("address", AtomValue::Text(shared.listener_addr.to_string()));
    let reply = finder_request(finder, "add_xrl", args).await?;

    let resolved_text = reply
        .get_text("resolved")
        .ok_or_else(|| XrlError::new(XrlErrorCode::InternalError, "add_xrl reply missing body"))?;
    let resolved: crate::xrl::ResolvedXrl = resolved_text
        .parse()
        .map_err(|e| XrlError::new(XrlErrorCode::InternalError, format!("{e}")))?;

    // Re-advertisement hands back the same suffixed name; the alias may
    // already be installed.
    let _ = shared
        .commands
        .alias(command.as_str(), resolved.command().to_string());
    Ok(())
}

/// The connect/register/advertise/monitor loop. Runs until shutdown.
pub(crate) async fn run_finder_link(shared: Arc<RouterShared>) {
    let mut stop = shared.shutdown_tx.subscribe();
    loop {
        if *stop.borrow() {
            return;
        }

        match connect_once(&shared).await {
            Ok(mut death_rx) => {
                info!(router = %shared.name, "registered with finder");
                shared.ready_tx.send_replace(true);
                // Hold until the finder messenger dies or we shut down.
                tokio::select! {
                    _ = stop.wait_for(|&v| v) => return,
                    _ = death_rx.recv() => {}
                }
                shared.ready_tx.send_replace(false);
                *shared.finder.write().expect("finder slot lock") = None;
                warn!(router = %shared.name, "lost finder connection, reconnecting");
            }
            Err(e) => {
                debug!(router = %shared.name, "finder connect attempt failed: {e}");
            }
        }

        let delay = shared.config.reconnect_delay.as_duration();
        tokio::select! {
            _ = stop.wait_for(|&v| v) => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// One connection attempt: TCP connect, messenger, registration handshake.
/// On success the Finder slot is populated and the death receiver returned.
async fn connect_once(
    shared: &Arc<RouterShared>,
) -> Result<mpsc::UnboundedReceiver<crate::messenger::MessengerDeath>, XrlError> {
    let stream = tokio::net::TcpStream::connect(shared.config.finder_endpoint)
        .await
        .map_err(|e| XrlError::new(XrlErrorCode::NoFinder, e.to_string()))?;
    let (carrier, inbox) = spawn_carrier(
        stream,
        shared.config.payload_limit,
        shared.config.writer_queue_capacity,
    )
    .map_err(|e| XrlError::new(XrlErrorCode::NoFinder, e.to_string()))?;

    let (death_tx, death_rx) = mpsc::unbounded_channel();
    let finder = spawn_messenger(
        carrier,
        inbox,
        Arc::clone(&shared.commands),
        shared.config.request_timeout.as_duration(),
        death_tx,
    );

    // Register.
    let args = XrlArgs::new()
        .with("target", AtomValue::Text(shared.name.to_string()))
        .with("class", AtomValue::Text(shared.class.to_string()))
        .with("singleton", AtomValue::Bool(shared.singleton));
    let reply = finder_request(&finder, "register_client", args).await?;
    if reply.get_text("cookie").is_none() {
        finder.close();
        return Err(XrlError::new(
            XrlErrorCode::InternalError,
            "register reply missing cookie",
        ));
    }

    // Advertise every command registered so far. The messenger matches
    // replies by seqno, so the advertisements can all be in flight at once.
    let advertised: Vec<CommandName> = shared
        .advertised
        .lock()
        .expect("advertised lock")
        .clone();
    let results = futures::future::join_all(
        advertised
            .iter()
            .map(|command| advertise_command(shared, &finder, command)),
    )
    .await;
    if let Some(e) = results.into_iter().find_map(Result::err) {
        finder.close();
        return Err(e);
    }

    // Announce readiness.
    let args = XrlArgs::new()
        .with("target", AtomValue::Text(shared.name.to_string()))
        .with("enabled", AtomValue::Bool(true));
    if let Err(e) = finder_request(&finder, "set_client_enabled", args).await {
        finder.close();
        return Err(e);
    }

    *shared.finder.write().expect("finder slot lock") = Some(finder);
    Ok(death_rx)
}
