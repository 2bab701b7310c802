//! area-egl-loopback: drives the buffer exchange against a compositor
//!
//! Without `--socket` an in-process loopback compositor serves the surface
//! protocol on a socket pair; with it the binary connects to a running
//! compositor at the given path (or the default socket for `--socket -`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use area_egl::config::{Config, LoopbackProtocol};
use area_egl::{
    Attachment, AttachmentRequest, Display, HeadlessDriverFactory, NativeDisplay, RemoteWindow,
};
use area_ipc::transport::seqpacket_pair;
use area_ipc::{CompositorConnection, LoopbackCompositor, LoopbackOptions};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SURFACE: u32 = 1;

struct Args {
    frames: Option<u32>,
    protocol: Option<LoopbackProtocol>,
    socket: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        frames: None,
        protocol: None,
        socket: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--frames" | "-n" => {
                let value = iter.next().context("--frames needs a value")?;
                args.frames = Some(value.parse().context("Invalid frame count")?);
            }
            "--protocol" | "-p" => {
                args.protocol = Some(match iter.next().as_deref() {
                    Some("name") => LoopbackProtocol::Name,
                    Some("prime") => LoopbackProtocol::Prime,
                    other => bail!("--protocol expects name or prime, got {:?}", other),
                });
            }
            "--socket" | "-s" => {
                let value = iter.next().context("--socket needs a path")?;
                args.socket = Some(if value == "-" {
                    area_ipc::socket_path()
                } else {
                    PathBuf::from(value)
                });
            }
            other => bail!("Unknown argument {:?}", other),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let mut config = Config::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(frames) = args.frames {
        config.loopback.frames = frames;
    }
    if let Some(protocol) = args.protocol {
        config.loopback.protocol = protocol;
    }
    let loopback = config.loopback.clone();

    let (connection, server) = match &args.socket {
        Some(path) => {
            let connection = CompositorConnection::connect(path)
                .with_context(|| format!("Failed to connect to {:?}", path))?;
            (connection, None)
        }
        None => {
            let (client, server) = seqpacket_pair().context("Failed to create socket pair")?;
            let mut compositor = LoopbackCompositor::new(
                server,
                LoopbackOptions {
                    protocol: loopback.protocol.into(),
                    omit_geometry: loopback.omit_geometry,
                    ..LoopbackOptions::default()
                },
            )?;
            compositor.add_surface(SURFACE, loopback.width, loopback.height)?;
            if let Some(resize) = loopback.resize {
                compositor.schedule_resize(SURFACE, resize.after, resize.width, resize.height);
            }
            info!(
                "Loopback compositor serving {:?} buffers at {}x{}",
                loopback.protocol, loopback.width, loopback.height
            );
            (CompositorConnection::from_fd(client), Some(compositor.spawn()))
        }
    };

    let connection = Arc::new(connection);
    let factory = HeadlessDriverFactory::default();
    let mut display = Display::initialize(
        Arc::clone(&connection) as Arc<dyn NativeDisplay>,
        &factory,
        None,
        &config,
    )
    .context("Failed to initialize display")?;

    let surface = display
        .create_window_surface(Arc::new(RemoteWindow::new(Arc::clone(&connection), SURFACE)))
        .context("Failed to create window surface")?;

    let requests = [
        AttachmentRequest::new(Attachment::BackLeft, config.surface.bits_per_pixel),
        AttachmentRequest::new(Attachment::Depth, 24),
    ];
    let mut presented = 0;
    for frame in 0..loopback.frames {
        let buffers = display
            .get_buffers_with_format(surface, &requests)
            .context("Buffer request failed")?;
        debug!(
            "Frame {}: {} buffers at {}",
            frame,
            buffers.len(),
            buffers.geometry()
        );

        match display.swap_buffers(surface) {
            Ok(()) => presented += 1,
            Err(e) => warn!("Frame {} not displayed: {}", frame, e),
        }
    }

    let geometry = display.surface(surface).map(|s| s.geometry());
    display.destroy_surface(surface)?;
    let events = factory.log.events().len();
    drop(display);
    drop(connection);

    if let Some(server) = server {
        let stats = server
            .join()
            .map_err(|_| anyhow::anyhow!("Loopback compositor thread panicked"))?
            .context("Loopback compositor failed")?;
        info!(
            "Compositor served {} requests, {} advances, {} refused",
            stats.requests, stats.advances, stats.refused
        );
    }

    info!(
        "Presented {}/{} frames, final geometry {:?}, {} driver events",
        presented, loopback.frames, geometry, events
    );
    Ok(())
}
