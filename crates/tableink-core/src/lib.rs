//! TableInk Core Library
//!
//! Platform-agnostic map engine for the TableInk virtual tabletop: viewport,
//! grid, fog of war, lighting, tokens, temporary annotations and the store
//! interface that keeps clients in sync.

pub mod color;
pub mod config;
pub mod debounce;
pub mod ephemeral;
pub mod error;
pub mod fog;
pub mod grid;
pub mod input;
pub mod layers;
pub mod lighting;
pub mod map;
pub mod preview;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod tokens;
pub mod tools;
pub mod viewport;

/// Milliseconds on the host's wall clock.
pub type Millis = u64;

pub use color::Rgba8;
pub use config::{ConfigError, EngineConfig};
pub use ephemeral::{Annotations, Drawing, Ping, Shape, ShapeGeometry, ShapeKind, Visibility};
pub use error::{InteractionError, InteractionResult};
pub use fog::{FogBrush, FogData};
pub use grid::{Grid, GridCell, snap_point};
pub use input::{Action, InputState, KeyBindings, KeyEvent, Modifiers, MouseButton, PointerEvent};
pub use layers::{Layer, LayerVisibility};
pub use lighting::{GlobalLighting, Light, LightSet, LightingFrame};
pub use map::{MapId, MapPatch, MapSettings, Role, UserId};
pub use preview::{PreviewBus, ShapePreview};
pub use session::{RemoteUpdate, TableSession, subscribe_updates};
pub use store::{MapStore, MemoryStore, StoreCommand, StoreError, Subscription};
pub use tokens::{Token, TokenController, TokenKind, TokenSet};
pub use tools::{ToolKind, ToolManager};
pub use viewport::Viewport;
