//! Interface to the real-time map store.
//!
//! The store itself is external; the engine only talks to it through
//! [`MapStore`]. Delivery is eventual and at-least-once, so every
//! subscription hands over a full snapshot of its collection and every
//! delete is idempotent.

mod memory;
mod subscription;

pub use memory::MemoryStore;
pub use subscription::{Callback, SubscriberSet, Subscription};

use crate::ephemeral::{Drawing, DrawingId, Ping, PingId, Shape, ShapeId};
use crate::fog::FogData;
use crate::grid::GridCell;
use crate::lighting::{GlobalLighting, Light, LightId};
use crate::map::{MapId, MapPatch, MapSettings, UserId};
use crate::preview::ShapePreview;
use crate::tokens::{Token, TokenId};
use kurbo::Point;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for async store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A real-time document store holding every map's shared state.
///
/// All operations are scoped by map id. Subscriptions deliver the current
/// snapshot immediately when there is one, then again after every change.
/// Subscribing to a map the store does not know yields an inactive
/// [`Subscription`].
pub trait MapStore: Send + Sync {
    fn create_map(&self, map: &MapSettings) -> BoxFuture<'_, StoreResult<()>>;
    fn update_map(&self, map: MapId, patch: &MapPatch) -> BoxFuture<'_, StoreResult<()>>;
    fn subscribe_map(&self, map: MapId, callback: Callback<MapSettings>) -> Subscription;

    fn subscribe_tokens(&self, map: MapId, callback: Callback<Vec<Token>>) -> Subscription;
    fn create_token(&self, map: MapId, token: &Token) -> BoxFuture<'_, StoreResult<()>>;
    fn update_token_position(&self, map: MapId, id: TokenId, position: Point) -> BoxFuture<'_, StoreResult<()>>;
    fn update_token(&self, map: MapId, token: &Token) -> BoxFuture<'_, StoreResult<()>>;
    fn update_hp(&self, map: MapId, id: TokenId, hp: i32) -> BoxFuture<'_, StoreResult<()>>;
    fn add_status_effect(&self, map: MapId, id: TokenId, effect: &str) -> BoxFuture<'_, StoreResult<()>>;
    fn remove_status_effect(&self, map: MapId, id: TokenId, effect: &str) -> BoxFuture<'_, StoreResult<()>>;
    fn delete_token(&self, map: MapId, id: TokenId) -> BoxFuture<'_, StoreResult<()>>;

    fn subscribe_fog(&self, map: MapId, callback: Callback<FogData>) -> Subscription;
    fn update_fog(&self, map: MapId, fog: &FogData) -> BoxFuture<'_, StoreResult<()>>;
    /// Reveal around a map cell on the stored fog.
    fn reveal_area(&self, map: MapId, center: GridCell, radius: u32) -> BoxFuture<'_, StoreResult<()>>;

    fn subscribe_shapes(&self, map: MapId, callback: Callback<Vec<Shape>>) -> Subscription;
    fn create_shape(&self, map: MapId, shape: &Shape) -> BoxFuture<'_, StoreResult<()>>;
    fn delete_shape(&self, map: MapId, id: ShapeId) -> BoxFuture<'_, StoreResult<()>>;

    fn subscribe_drawings(&self, map: MapId, callback: Callback<Vec<Drawing>>) -> Subscription;
    fn create_drawing(&self, map: MapId, drawing: &Drawing) -> BoxFuture<'_, StoreResult<()>>;
    fn delete_drawing(&self, map: MapId, id: DrawingId) -> BoxFuture<'_, StoreResult<()>>;

    fn subscribe_pings(&self, map: MapId, callback: Callback<Vec<Ping>>) -> Subscription;
    fn create_ping(&self, map: MapId, ping: &Ping) -> BoxFuture<'_, StoreResult<()>>;
    fn delete_ping(&self, map: MapId, id: PingId) -> BoxFuture<'_, StoreResult<()>>;

    fn subscribe_previews(&self, map: MapId, callback: Callback<Vec<ShapePreview>>) -> Subscription;
    fn upsert_preview(&self, map: MapId, preview: &ShapePreview) -> BoxFuture<'_, StoreResult<()>>;
    fn delete_preview(&self, map: MapId, user: &UserId) -> BoxFuture<'_, StoreResult<()>>;

    /// Delete every non-persistent shape and all drawings and pings.
    fn clear_temporary(&self, map: MapId) -> BoxFuture<'_, StoreResult<()>>;
    /// Delete every shape, drawing and ping.
    fn clear_all(&self, map: MapId) -> BoxFuture<'_, StoreResult<()>>;
    /// Delete every annotation created by one user.
    fn clear_by_user(&self, map: MapId, user: &UserId) -> BoxFuture<'_, StoreResult<()>>;

    fn subscribe_lights(&self, map: MapId, callback: Callback<Vec<Light>>) -> Subscription;
    fn create_light(&self, map: MapId, light: &Light) -> BoxFuture<'_, StoreResult<()>>;
    fn update_light(&self, map: MapId, light: &Light) -> BoxFuture<'_, StoreResult<()>>;
    fn delete_light(&self, map: MapId, id: LightId) -> BoxFuture<'_, StoreResult<()>>;
    fn subscribe_global_lighting(&self, map: MapId, callback: Callback<GlobalLighting>) -> Subscription;
    fn update_global_lighting(&self, map: MapId, lighting: &GlobalLighting) -> BoxFuture<'_, StoreResult<()>>;
}

/// A write the engine wants performed. Sessions queue these; the host
/// drains the queue and runs them against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    UpdateMap { patch: MapPatch },
    CreateToken { token: Token },
    UpdateTokenPosition { id: TokenId, position: Point },
    UpdateToken { token: Token },
    UpdateHp { id: TokenId, hp: i32 },
    AddStatusEffect { id: TokenId, effect: String },
    RemoveStatusEffect { id: TokenId, effect: String },
    DeleteToken { id: TokenId },
    UpdateFog { fog: FogData },
    RevealArea { center: GridCell, radius: u32 },
    CreateShape { shape: Shape },
    DeleteShape { id: ShapeId },
    CreateDrawing { drawing: Drawing },
    DeleteDrawing { id: DrawingId },
    CreatePing { ping: Ping },
    DeletePing { id: PingId },
    UpsertPreview { preview: ShapePreview },
    DeletePreview { user_id: UserId },
    ClearTemporary,
    ClearAll,
    ClearByUser { user_id: UserId },
    CreateLight { light: Light },
    UpdateLight { light: Light },
    DeleteLight { id: LightId },
    UpdateGlobalLighting { lighting: GlobalLighting },
}

impl StoreCommand {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::UpdateMap { .. } => "updateMap",
            StoreCommand::CreateToken { .. } => "createToken",
            StoreCommand::UpdateTokenPosition { .. } => "updateTokenPosition",
            StoreCommand::UpdateToken { .. } => "updateToken",
            StoreCommand::UpdateHp { .. } => "updateHP",
            StoreCommand::AddStatusEffect { .. } => "addStatusEffect",
            StoreCommand::RemoveStatusEffect { .. } => "removeStatusEffect",
            StoreCommand::DeleteToken { .. } => "deleteToken",
            StoreCommand::UpdateFog { .. } => "updateFogOfWar",
            StoreCommand::RevealArea { .. } => "revealArea",
            StoreCommand::CreateShape { .. } => "createShape",
            StoreCommand::DeleteShape { .. } => "deleteShape",
            StoreCommand::CreateDrawing { .. } => "createDrawing",
            StoreCommand::DeleteDrawing { .. } => "deleteDrawing",
            StoreCommand::CreatePing { .. } => "createPing",
            StoreCommand::DeletePing { .. } => "deletePing",
            StoreCommand::UpsertPreview { .. } => "upsertShapePreview",
            StoreCommand::DeletePreview { .. } => "deleteShapePreview",
            StoreCommand::ClearTemporary => "clearTemporary",
            StoreCommand::ClearAll => "clearAll",
            StoreCommand::ClearByUser { .. } => "clearByUser",
            StoreCommand::CreateLight { .. } => "createLight",
            StoreCommand::UpdateLight { .. } => "updateLight",
            StoreCommand::DeleteLight { .. } => "deleteLight",
            StoreCommand::UpdateGlobalLighting { .. } => "updateGlobalLighting",
        }
    }

    /// Run the write against a store.
    pub fn execute<'a>(&'a self, store: &'a dyn MapStore, map: MapId) -> BoxFuture<'a, StoreResult<()>> {
        match self {
            StoreCommand::UpdateMap { patch } => store.update_map(map, patch),
            StoreCommand::CreateToken { token } => store.create_token(map, token),
            StoreCommand::UpdateTokenPosition { id, position } => store.update_token_position(map, *id, *position),
            StoreCommand::UpdateToken { token } => store.update_token(map, token),
            StoreCommand::UpdateHp { id, hp } => store.update_hp(map, *id, *hp),
            StoreCommand::AddStatusEffect { id, effect } => store.add_status_effect(map, *id, effect),
            StoreCommand::RemoveStatusEffect { id, effect } => store.remove_status_effect(map, *id, effect),
            StoreCommand::DeleteToken { id } => store.delete_token(map, *id),
            StoreCommand::UpdateFog { fog } => store.update_fog(map, fog),
            StoreCommand::RevealArea { center, radius } => store.reveal_area(map, *center, *radius),
            StoreCommand::CreateShape { shape } => store.create_shape(map, shape),
            StoreCommand::DeleteShape { id } => store.delete_shape(map, *id),
            StoreCommand::CreateDrawing { drawing } => store.create_drawing(map, drawing),
            StoreCommand::DeleteDrawing { id } => store.delete_drawing(map, *id),
            StoreCommand::CreatePing { ping } => store.create_ping(map, ping),
            StoreCommand::DeletePing { id } => store.delete_ping(map, *id),
            StoreCommand::UpsertPreview { preview } => store.upsert_preview(map, preview),
            StoreCommand::DeletePreview { user_id } => store.delete_preview(map, user_id),
            StoreCommand::ClearTemporary => store.clear_temporary(map),
            StoreCommand::ClearAll => store.clear_all(map),
            StoreCommand::ClearByUser { user_id } => store.clear_by_user(map, user_id),
            StoreCommand::CreateLight { light } => store.create_light(map, light),
            StoreCommand::UpdateLight { light } => store.update_light(map, light),
            StoreCommand::DeleteLight { id } => store.delete_light(map, *id),
            StoreCommand::UpdateGlobalLighting { lighting } => store.update_global_lighting(map, lighting),
        }
    }
}

/// Run queued writes in order. Failures are logged and skipped; nothing is
/// retried or rolled back. Returns the number of failed writes.
pub async fn flush(store: &dyn MapStore, map: MapId, commands: Vec<StoreCommand>) -> usize {
    let mut failures = 0;
    for command in &commands {
        if let Err(e) = command.execute(store, map).await {
            log::warn!("Store write {} failed: {}", command.name(), e);
            failures += 1;
        }
    }
    failures
}
