//! Sumi - color-smudge brush engine with a precision-preserving pixel
//! pipeline
//!
//! The crate implements the paint operation that drags and mixes existing
//! canvas content along a stroke: per-stamp dab compositing (smearing and
//! dulling), a 16-bit read-through cache over the 8-bit canvas, overlay
//! reads from a live image projection, mirrored painting and
//! selection-masked output. Brush-tip rasterization is a pluggable
//! collaborator; a soft elliptical tip is bundled.

pub mod brush;
pub mod color;
pub mod device;
pub mod errors;
pub mod geom;
pub mod paint;
pub mod smudge;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::smudge::ColorSmudgeOp;

/// Set up logging for binaries, benches and examples embedding the engine
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sumi=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sumi engine logging initialized");
}
