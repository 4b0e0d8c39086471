//! Tokens and the drag controller that moves them.

use crate::error::{InteractionError, InteractionResult};
use crate::grid::GridCell;
use crate::map::{MapSettings, Role, UserId};
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for tokens.
pub type TokenId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Player,
    Npc,
    Monster,
    Object,
}

/// A creature or object on the map. `position` is the pixel-space center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub position: Point,
    pub size: Size,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub status_effects: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
    /// Prepared by the DM but not yet placed on the board.
    #[serde(default)]
    pub staged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
}

impl Token {
    pub fn new(kind: TokenKind, position: Point, size: Size) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            position,
            size,
            kind,
            hp: 10,
            max_hp: 10,
            status_effects: Vec::new(),
            hidden: false,
            staged: false,
            owner_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<UserId>) -> Self {
        self.owner_id = Some(owner.into());
        self
    }

    pub fn with_hp(mut self, hp: i32, max_hp: i32) -> Self {
        self.max_hp = max_hp.max(0);
        self.set_hp(hp);
        self
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_center_size(self.position, self.size)
    }

    pub fn contains(&self, p: Point) -> bool {
        self.bounds().contains(p)
    }

    pub fn is_player(&self) -> bool {
        self.kind == TokenKind::Player
    }

    /// Set hit points, clamped to `[0, max_hp]`. Returns the stored value.
    pub fn set_hp(&mut self, hp: i32) -> i32 {
        self.hp = hp.clamp(0, self.max_hp.max(0));
        self.hp
    }

    /// Add a status effect; returns false if it was already present.
    pub fn add_status_effect(&mut self, effect: &str) -> bool {
        if self.status_effects.iter().any(|e| e == effect) {
            return false;
        }
        self.status_effects.push(effect.to_string());
        true
    }

    pub fn remove_status_effect(&mut self, effect: &str) -> bool {
        let before = self.status_effects.len();
        self.status_effects.retain(|e| e != effect);
        self.status_effects.len() != before
    }

    /// Whether the token is drawn for the given role.
    pub fn is_visible_to(&self, role: Role) -> bool {
        role.is_dm() || !(self.hidden || self.staged)
    }

    /// Whether the user may drag this token.
    pub fn can_move(&self, user: &UserId, role: Role) -> bool {
        role.is_dm() || (!self.staged && self.owner_id.as_ref() == Some(user))
    }
}

/// Clamp a token center so the whole footprint stays on the map. A token
/// larger than the map on some axis is centered on that axis.
pub fn clamp_position(p: Point, size: Size, map: Size) -> Point {
    let axis = |value: f64, extent: f64, dimension: f64| {
        let lo = extent / 2.0;
        let hi = dimension - extent / 2.0;
        if lo > hi { dimension / 2.0 } else { value.clamp(lo, hi) }
    };
    Point::new(
        axis(p.x, size.width, map.width),
        axis(p.y, size.height, map.height),
    )
}

/// Whether a drop point lies beyond the off-limits margin around the map.
pub fn is_off_limits(p: Point, map_bounds: Rect, margin: f64) -> bool {
    !map_bounds.inflate(margin, margin).contains(p)
}

/// Local cache of the map's tokens.
#[derive(Debug, Default)]
pub struct TokenSet {
    tokens: HashMap<TokenId, Token>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, tokens: Vec<Token>) {
        self.tokens = tokens.into_iter().map(|t| (t.id, t)).collect();
    }

    pub fn insert(&mut self, token: Token) {
        self.tokens.insert(token.id, token);
    }

    pub fn remove(&mut self, id: TokenId) -> Option<Token> {
        self.tokens.remove(&id)
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        let mut tokens: Vec<&Token> = self.tokens.values().collect();
        tokens.sort_by_key(|t| t.id);
        tokens.into_iter()
    }

    /// Tokens the role may see.
    pub fn visible(&self, role: Role) -> impl Iterator<Item = &Token> {
        self.iter().filter(move |t| t.is_visible_to(role))
    }

    /// Visible token under a point, preferring the one whose center is closest.
    pub fn hit_test(&self, p: Point, role: Role) -> Option<TokenId> {
        self.visible(role)
            .filter(|t| t.contains(p))
            .min_by(|a, b| a.position.distance(p).total_cmp(&b.position.distance(p)))
            .map(|t| t.id)
    }

    /// Centers of placed tokens the role can see, for point snapping.
    pub fn centers(&self, exclude: Option<TokenId>, role: Role) -> Vec<(TokenId, Point)> {
        self.visible(role)
            .filter(|t| !t.staged && Some(t.id) != exclude)
            .map(|t| (t.id, t.position))
            .collect()
    }

    /// Positions of player tokens on the board.
    pub fn player_positions(&self) -> Vec<Point> {
        self.iter()
            .filter(|t| t.is_player() && !t.staged)
            .map(|t| t.position)
            .collect()
    }
}

/// Token drag state machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        token: TokenId,
        kind: TokenKind,
        size: Size,
        /// Position before the drag, restored on a rejected drop.
        origin: Point,
        /// Pointer offset from the token center at grab time.
        grab_offset: Vec2,
        current: Point,
    },
    /// Drop accepted, write not yet queued.
    Committing { token: TokenId, position: Point },
}

/// Result of releasing a dragged token.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Moved {
        token: TokenId,
        position: Point,
        /// Fog cell to reveal around, for player tokens on fogged maps.
        reveal: Option<GridCell>,
    },
    /// Dropped off limits; the token goes back to where it started.
    Reverted { token: TokenId, position: Point },
}

/// Drives token drags from pointer events.
#[derive(Debug, Default)]
pub struct TokenController {
    state: DragState,
}

impl TokenController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn dragged_token(&self) -> Option<TokenId> {
        match self.state {
            DragState::Dragging { token, .. } | DragState::Committing { token, .. } => Some(token),
            DragState::Idle => None,
        }
    }

    /// Start dragging `token` from a map-space pointer position.
    pub fn begin_drag(&mut self, token: &Token, pointer: Point, user: &UserId, role: Role) -> InteractionResult<()> {
        if !token.can_move(user, role) {
            return Err(InteractionError::NotPermitted(format!(
                "user {} may not move token {}",
                user, token.id
            )));
        }
        self.state = DragState::Dragging {
            token: token.id,
            kind: token.kind,
            size: token.size,
            origin: token.position,
            grab_offset: pointer - token.position,
            current: token.position,
        };
        Ok(())
    }

    /// Follow the pointer; returns the live (unsnapped) center.
    pub fn drag_to(&mut self, pointer: Point) -> Option<(TokenId, Point)> {
        match &mut self.state {
            DragState::Dragging {
                token,
                grab_offset,
                current,
                ..
            } => {
                *current = pointer - *grab_offset;
                Some((*token, *current))
            }
            _ => None,
        }
    }

    /// Release the token: snap, clamp and decide whether to commit.
    pub fn end_drag(
        &mut self,
        pointer: Point,
        map: &MapSettings,
        snap: bool,
        off_limits_margin: f64,
    ) -> InteractionResult<DropOutcome> {
        let DragState::Dragging {
            token,
            kind,
            size,
            origin,
            grab_offset,
            ..
        } = self.state
        else {
            return Err(InteractionError::NoActiveGesture);
        };

        let raw = pointer - grab_offset;
        if is_off_limits(raw, map.bounds(), off_limits_margin) {
            log::debug!("Token {} dropped off limits at ({:.1}, {:.1})", token, raw.x, raw.y);
            self.state = DragState::Idle;
            return Ok(DropOutcome::Reverted {
                token,
                position: origin,
            });
        }

        let grid = map.grid();
        let snapped = if snap && map.grid_enabled {
            grid.snap_token_center(raw, size)
        } else {
            raw
        };
        let position = clamp_position(snapped, size, map.size());
        let reveal = (kind == TokenKind::Player && map.fog_active()).then(|| grid.cell_at(position));

        self.state = DragState::Committing { token, position };
        Ok(DropOutcome::Moved {
            token,
            position,
            reveal,
        })
    }

    /// Mark the committed move as written.
    pub fn finish_commit(&mut self) {
        if matches!(self.state, DragState::Committing { .. }) {
            self.state = DragState::Idle;
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}
