// ============================================================================
// retouch — raster image-editing core
// ============================================================================
//
// A headless editing engine: tonal adjustment chain, separable blur, film
// grain, speed-adaptive brush strokes, stamps, and a wgpu render pipeline
// that mirrors the CPU operators.  The host (GUI shell or the bundled CLI)
// owns the event loop and undo stack; this crate is a pure function of the
// source pixels plus an `EditState`.

pub mod logger;

pub mod brush;
pub mod compositor;
pub mod coords;
pub mod error;
pub mod gpu;
pub mod ops;
pub mod stamps;
pub mod state;

pub use compositor::{Compositor, ExportFormat, RenderScheduler};
pub use error::{Error, Result};
pub use state::EditState;
