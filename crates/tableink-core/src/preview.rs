//! In-progress shape previews shared between clients.
//!
//! Each user owns at most one preview, keyed by user id and overwritten on
//! every pointer move. Previews carry their own expiry so a client that
//! vanished mid-gesture does not leave a ghost behind.

use crate::Millis;
use crate::color::Rgba8;
use crate::config::PreviewConfig;
use crate::ephemeral::ShapeGeometry;
use crate::map::UserId;
use crate::store::StoreCommand;
use serde::{Deserialize, Serialize};

/// A user's shape while it is being drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapePreview {
    pub user_id: UserId,
    pub geometry: ShapeGeometry,
    pub color: Rgba8,
    pub opacity: f64,
    pub updated_at: Millis,
    pub expires_at: Millis,
}

impl ShapePreview {
    pub fn is_live(&self, now: Millis) -> bool {
        self.expires_at > now
    }
}

/// Tracks the local preview and the previews of everyone else.
#[derive(Debug)]
pub struct PreviewBus {
    user_id: UserId,
    config: PreviewConfig,
    own: Option<ShapePreview>,
    remote: Vec<ShapePreview>,
}

impl PreviewBus {
    pub fn new(user_id: UserId, config: PreviewConfig) -> Self {
        Self {
            user_id,
            config,
            own: None,
            remote: Vec::new(),
        }
    }

    /// Publish the local in-progress shape.
    pub fn broadcast(&mut self, geometry: ShapeGeometry, color: Rgba8, opacity: f64, now: Millis) -> StoreCommand {
        let preview = ShapePreview {
            user_id: self.user_id.clone(),
            geometry,
            color,
            opacity,
            updated_at: now,
            expires_at: now + self.config.ttl_ms,
        };
        self.own = Some(preview.clone());
        StoreCommand::UpsertPreview { preview }
    }

    /// Withdraw the local preview, if one was published.
    pub fn clear_own(&mut self) -> Option<StoreCommand> {
        self.own.take().map(|_| StoreCommand::DeletePreview {
            user_id: self.user_id.clone(),
        })
    }

    pub fn own(&self) -> Option<&ShapePreview> {
        self.own.as_ref()
    }

    /// Replace remote previews from a store snapshot, ignoring our own echo.
    pub fn replace_remote(&mut self, previews: Vec<ShapePreview>) {
        self.remote = previews.into_iter().filter(|p| p.user_id != self.user_id).collect();
        self.remote.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    }

    /// Other users' live previews, with the display opacity applied.
    pub fn visible(&self, now: Millis) -> Vec<ShapePreview> {
        self.remote
            .iter()
            .filter(|p| p.is_live(now))
            .map(|p| ShapePreview {
                opacity: p.opacity * self.config.opacity_factor,
                ..p.clone()
            })
            .collect()
    }

    pub fn has_live(&self, now: Millis) -> bool {
        self.remote.iter().any(|p| p.is_live(now))
    }
}
