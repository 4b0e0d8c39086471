//! One client's view of one map.
//!
//! A [`TableSession`] owns the local caches of every shared collection, the
//! interaction state machines and the queue of writes waiting for the host.
//! The host feeds it pointer and key events, store snapshots and clock
//! ticks; it never talks to the store itself. Writes pile up in an outgoing
//! queue that the host drains with [`TableSession::take_outgoing`] and runs
//! through [`crate::store::flush`].

use crate::Millis;
use crate::config::EngineConfig;
use crate::debounce::MapPatchDebouncer;
use crate::ephemeral::{Annotations, Drawing, Ping, Shape, ShapeGeometry, ShapeKind, Visibility};
use crate::error::{InteractionError, InteractionResult};
use crate::fog::{BrushMode, FogBrush, FogData, reveal_for_vision, token_reveal_radius};
use crate::grid::{GridCell, Measurement, snap_active, snap_point};
use crate::input::{Action, InputState, KeyBindings, KeyEvent, Modifiers, MouseButton, PointerEvent};
use crate::layers::LayerVisibility;
use crate::lighting::{GlobalLighting, Light, LightId, LightSet, LightingFrame};
use crate::map::{MapId, MapPatch, MapSettings, Role, UserId};
use crate::preview::{PreviewBus, ShapePreview};
use crate::scheduler::{AnimationScheduler, CleanupTimers};
use crate::store::{Callback, MapStore, StoreCommand, Subscription};
use crate::tokens::{DragState, DropOutcome, Token, TokenController, TokenId, TokenSet, clamp_position};
use crate::tools::{ToolEvent, ToolKind, ToolManager};
use crate::viewport::Viewport;
use kurbo::{Point, Size};
use std::sync::mpsc::Sender;

/// Radius, in map pixels, of a light placed with the light tool.
pub const DEFAULT_LIGHT_RADIUS: f64 = 150.0;

/// How close, in map pixels, a light-tool click must be to pick an existing light.
const LIGHT_HIT_THRESHOLD: f64 = 20.0;

/// Screen padding kept around the map by fit-to-map.
const FIT_PADDING: f64 = 40.0;

/// A fresh snapshot of one shared collection.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteUpdate {
    Map(MapSettings),
    Tokens(Vec<Token>),
    Fog(FogData),
    Shapes(Vec<Shape>),
    Drawings(Vec<Drawing>),
    Pings(Vec<Ping>),
    Previews(Vec<ShapePreview>),
    Lights(Vec<Light>),
    GlobalLighting(GlobalLighting),
}

/// Subscribe to every collection of `map`, forwarding each snapshot into
/// `sink` for the host to feed into [`TableSession::apply_remote`].
pub fn subscribe_updates(store: &dyn MapStore, map: MapId, sink: &Sender<RemoteUpdate>) -> Vec<Subscription> {
    fn forward<T: Clone + 'static>(sink: &Sender<RemoteUpdate>, wrap: fn(T) -> RemoteUpdate) -> Callback<T> {
        let sink = sink.clone();
        Box::new(move |value: &T| {
            if sink.send(wrap(value.clone())).is_err() {
                log::debug!("Session closed, dropping update");
            }
        })
    }

    vec![
        store.subscribe_map(map, forward(sink, RemoteUpdate::Map)),
        store.subscribe_tokens(map, forward(sink, RemoteUpdate::Tokens)),
        store.subscribe_fog(map, forward(sink, RemoteUpdate::Fog)),
        store.subscribe_shapes(map, forward(sink, RemoteUpdate::Shapes)),
        store.subscribe_drawings(map, forward(sink, RemoteUpdate::Drawings)),
        store.subscribe_pings(map, forward(sink, RemoteUpdate::Pings)),
        store.subscribe_previews(map, forward(sink, RemoteUpdate::Previews)),
        store.subscribe_lights(map, forward(sink, RemoteUpdate::Lights)),
        store.subscribe_global_lighting(map, forward(sink, RemoteUpdate::GlobalLighting)),
    ]
}

/// An in-progress or finished ruler measurement, in map space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ruler {
    pub from: Point,
    pub to: Point,
    pub measurement: Measurement,
}

pub struct TableSession {
    config: EngineConfig,
    user_id: UserId,
    role: Role,
    map: Option<MapSettings>,

    viewport: Viewport,
    screen_size: Option<Size>,
    input: InputState,
    bindings: KeyBindings,
    /// Current tool, its gesture and the styling of new annotations.
    pub tools: ToolManager,
    pub layers: LayerVisibility,
    snap_enabled: bool,

    tokens: TokenSet,
    controller: TokenController,
    fog: Option<FogData>,
    brush: FogBrush,
    lights: LightSet,
    global_lighting: GlobalLighting,
    annotations: Annotations,
    previews: PreviewBus,
    ruler: Option<Ruler>,

    debouncer: MapPatchDebouncer,
    scheduler: AnimationScheduler,
    timers: CleanupTimers,
    /// Player token or light positions changed since fog was last revealed.
    vision_dirty: bool,

    outgoing: Vec<StoreCommand>,
    now: Millis,
    torn_down: bool,
}

impl TableSession {
    pub fn new(user_id: impl Into<UserId>, role: Role, config: EngineConfig) -> Self {
        let user_id = user_id.into();
        log::info!("Opening session for {} as {:?}", user_id, role);
        Self {
            viewport: Viewport::from_config(&config.viewport),
            screen_size: None,
            input: InputState::new(),
            bindings: KeyBindings::default(),
            tools: ToolManager::new(),
            layers: LayerVisibility::default(),
            snap_enabled: config.snap.enabled_by_default,
            tokens: TokenSet::new(),
            controller: TokenController::new(),
            fog: None,
            brush: FogBrush::new(config.fog.default_brush_size, BrushMode::Reveal),
            lights: LightSet::new(),
            global_lighting: GlobalLighting::default(),
            annotations: Annotations::new(),
            previews: PreviewBus::new(user_id.clone(), config.preview.clone()),
            ruler: None,
            debouncer: MapPatchDebouncer::new(config.interaction.map_edit_debounce_ms),
            scheduler: AnimationScheduler::new(),
            timers: CleanupTimers::new(),
            vision_dirty: false,
            outgoing: Vec::new(),
            now: 0,
            torn_down: false,
            map: None,
            user_id,
            role,
            config,
        }
    }

    /// Replace the key table.
    pub fn with_bindings(mut self, bindings: KeyBindings) -> Self {
        self.bindings = bindings;
        self
    }

    // --- Accessors -------------------------------------------------------

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn map(&self) -> Option<&MapSettings> {
        self.map.as_ref()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn fog(&self) -> Option<&FogData> {
        self.fog.as_ref()
    }

    pub fn brush(&self) -> &FogBrush {
        &self.brush
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.brush.size = size.max(1);
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    pub fn global_lighting(&self) -> &GlobalLighting {
        &self.global_lighting
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn ruler(&self) -> Option<&Ruler> {
        self.ruler.as_ref()
    }

    pub fn snap_enabled(&self) -> bool {
        self.snap_enabled
    }

    /// Time of the last event or tick.
    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Animation time in seconds.
    pub fn animation_time(&self) -> f64 {
        self.scheduler.time()
    }

    /// Where to draw a token: the live drag position while it is dragged.
    pub fn token_position(&self, token: &Token) -> Point {
        match *self.controller.state() {
            DragState::Dragging { token: id, current, .. } if id == token.id => current,
            DragState::Committing { token: id, position } if id == token.id => position,
            _ => token.position,
        }
    }

    pub fn dragged_token(&self) -> Option<TokenId> {
        self.controller.dragged_token()
    }

    /// The local user's in-progress shape.
    pub fn own_preview(&self) -> Option<&ShapePreview> {
        self.previews.own()
    }

    /// Other users' live previews, display opacity applied.
    pub fn remote_previews(&self) -> Vec<ShapePreview> {
        self.previews.visible(self.now)
    }

    /// Lighting to draw this frame, or `None` when lighting is off.
    pub fn lighting_frame(&self) -> Option<LightingFrame> {
        let players: Vec<Point> = self
            .tokens
            .visible(self.role)
            .filter(|t| t.is_player())
            .map(|t| self.token_position(t))
            .collect();
        LightingFrame::compose(
            &self.global_lighting,
            &self.lights,
            &players,
            self.scheduler.time(),
            &self.config.vision,
        )
    }

    /// Drain the queued writes.
    pub fn take_outgoing(&mut self) -> Vec<StoreCommand> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Remote state ----------------------------------------------------

    /// Replace one local cache with a store snapshot.
    pub fn apply_remote(&mut self, update: RemoteUpdate) {
        if self.torn_down {
            return;
        }
        if let RemoteUpdate::Map(map) = &update {
            if !map.is_well_formed() {
                log::warn!(
                    "Ignoring map {} with size {}x{} and grid {}",
                    map.id,
                    map.width,
                    map.height,
                    map.grid_size
                );
                return;
            }
        }
        let before = self.vision_sources();
        match update {
            RemoteUpdate::Map(mut map) => {
                // Edits still waiting for the debouncer win over the echo.
                if let Some(pending) = self.debouncer.pending() {
                    map.apply(pending);
                }
                let was_active = self.map.as_ref().is_some_and(MapSettings::fog_active);
                if !was_active && map.fog_active() {
                    self.vision_dirty = true;
                }
                let first = self.map.is_none();
                self.map = Some(map);
                if first {
                    self.fit_to_screen();
                }
            }
            RemoteUpdate::Tokens(tokens) => self.tokens.replace(tokens),
            RemoteUpdate::Fog(fog) => self.fog = Some(fog),
            RemoteUpdate::Shapes(shapes) => self.annotations.replace_shapes(shapes),
            RemoteUpdate::Drawings(drawings) => self.annotations.replace_drawings(drawings),
            RemoteUpdate::Pings(pings) => self.annotations.replace_pings(pings),
            RemoteUpdate::Previews(previews) => self.previews.replace_remote(previews),
            RemoteUpdate::Lights(lights) => self.lights.replace(lights),
            RemoteUpdate::GlobalLighting(lighting) => self.global_lighting = lighting,
        }
        if self.vision_sources() != before {
            self.vision_dirty = true;
        }
        self.auto_reveal();
    }

    fn vision_sources(&self) -> (Vec<Point>, Vec<(Point, f64)>) {
        (self.tokens.player_positions(), self.lights.positions())
    }

    /// Reveal around player tokens and lights once their positions changed.
    /// Waits for the fog snapshot when it has not arrived yet.
    fn auto_reveal(&mut self) {
        if !self.vision_dirty {
            return;
        }
        let Some(map) = &self.map else {
            return;
        };
        if !map.fog_active() {
            self.vision_dirty = false;
            return;
        }
        let Some(fog) = self.fog.as_mut() else {
            return;
        };
        self.vision_dirty = false;
        let players = self.tokens.player_positions();
        let lights = self.lights.positions();
        if reveal_for_vision(fog, &map.grid(), &players, &lights, &self.config.fog) {
            log::debug!("Vision revealed {} cells in total", fog.revealed_count());
            self.outgoing.push(StoreCommand::UpdateFog { fog: fog.clone() });
        }
    }

    // --- Pointer input ---------------------------------------------------

    /// Tell the session how large the screen is, for fit-to-map.
    pub fn set_screen_size(&mut self, size: Size) {
        self.screen_size = Some(size);
    }

    fn fit_to_screen(&mut self) {
        if let (Some(map), Some(screen)) = (&self.map, self.screen_size) {
            self.viewport.fit_to_map(map.size(), screen, FIT_PADDING);
        }
    }

    /// Handle a pointer event in screen coordinates.
    pub fn handle_pointer(&mut self, event: PointerEvent, now: Millis) -> InteractionResult<()> {
        self.now = now;
        if self.torn_down {
            return Ok(());
        }
        self.input.handle_pointer_event(&event);
        let result = match event {
            PointerEvent::Scroll { position, delta } => {
                self.viewport.wheel(position, delta.y);
                Ok(())
            }
            PointerEvent::Down {
                position,
                button: MouseButton::Middle,
            } => {
                self.viewport.begin_drag(position);
                Ok(())
            }
            PointerEvent::Down {
                button: MouseButton::Right,
                ..
            } => {
                self.cancel_gesture();
                Ok(())
            }
            PointerEvent::Down {
                position,
                button: MouseButton::Left,
            } => self.pointer_down(position, now),
            PointerEvent::Move { position } => self.pointer_move(position, now),
            PointerEvent::Up {
                position,
                button: MouseButton::Left,
            } => self.pointer_up(position, now),
            PointerEvent::Up {
                button: MouseButton::Middle,
                ..
            } => {
                self.viewport.end_drag();
                Ok(())
            }
            PointerEvent::Up { .. } => Ok(()),
        };
        if let Err(e) = &result {
            log::debug!("Rejected pointer interaction: {}", e);
        }
        result
    }

    fn pointer_down(&mut self, screen: Point, now: Millis) -> InteractionResult<()> {
        let tool = self.tools.current_tool;
        if tool == ToolKind::Pan {
            self.viewport.begin_drag(screen);
            return Ok(());
        }
        let point = self.viewport.screen_to_map(screen);
        if tool == ToolKind::Select {
            let hit = self.tokens.hit_test(point, self.role).and_then(|id| self.tokens.get(id));
            if let Some(token) = hit {
                match self.controller.begin_drag(token, point, &self.user_id, self.role) {
                    Ok(()) => return Ok(()),
                    Err(e) => log::debug!("{}, panning instead", e),
                }
            }
            self.viewport.begin_drag(screen);
            return Ok(());
        }
        if tool.is_dm_only() && !self.role.is_dm() {
            return Err(InteractionError::NotPermitted(format!("{:?} is a DM tool", tool)));
        }
        self.require_map()?;
        let event = self.tools.press(point, now);
        self.on_tool_event(event, now)
    }

    fn pointer_move(&mut self, screen: Point, now: Millis) -> InteractionResult<()> {
        if self.viewport.is_dragging() {
            self.viewport.drag_to(screen);
            return Ok(());
        }
        let point = self.viewport.screen_to_map(screen);
        if self.controller.is_dragging() {
            self.controller.drag_to(point);
            return Ok(());
        }
        if self.map.is_none() {
            return Ok(());
        }
        let event = self.tools.motion(point, now);
        self.on_tool_event(event, now)
    }

    fn pointer_up(&mut self, screen: Point, now: Millis) -> InteractionResult<()> {
        if self.viewport.is_dragging() {
            self.viewport.end_drag();
            return Ok(());
        }
        let point = self.viewport.screen_to_map(screen);
        if self.controller.is_dragging() {
            return self.drop_token(point);
        }
        if self.map.is_none() {
            return Ok(());
        }
        let event = self.tools.release(point, now);
        self.on_tool_event(event, now)
    }

    fn drop_token(&mut self, pointer: Point) -> InteractionResult<()> {
        let snap = self.snap_is_active();
        let Some(map) = &self.map else {
            self.controller.cancel();
            return Err(InteractionError::NoActiveMap);
        };
        let outcome = self
            .controller
            .end_drag(pointer, map, snap, self.config.interaction.off_limits_margin)?;
        match outcome {
            DropOutcome::Reverted { token, .. } => {
                log::debug!("Token {} returned to its start", token);
            }
            DropOutcome::Moved {
                token,
                position,
                reveal,
            } => {
                if let Some(t) = self.tokens.get_mut(token) {
                    t.position = position;
                }
                self.outgoing
                    .push(StoreCommand::UpdateTokenPosition { id: token, position });
                if let Some(cell) = reveal {
                    self.reveal_around_token(position, cell);
                }
                self.controller.finish_commit();
            }
        }
        Ok(())
    }

    fn reveal_around_token(&mut self, position: Point, cell: GridCell) {
        let radius = token_reveal_radius(
            position,
            self.lights.iter().map(|l| l.position),
            &self.config.fog,
        );
        // The store applies the same circle, so only the area goes over the wire.
        if let Some(fog) = self.fog.as_mut() {
            if fog.reveal_area(cell, radius) {
                self.outgoing.push(StoreCommand::RevealArea { center: cell, radius });
            }
        }
    }

    fn snap_is_active(&self) -> bool {
        let grid_on = self.map.as_ref().is_some_and(|m| m.grid_enabled);
        grid_on && snap_active(self.snap_enabled, self.bindings.snap_inverted(self.input.modifiers))
    }

    /// Snap a free point to a nearby token center or grid intersection.
    fn snap(&self, p: Point) -> Point {
        let Some(map) = &self.map else {
            return p;
        };
        snap_point(
            p,
            &map.grid(),
            self.snap_is_active(),
            self.tokens.centers(self.controller.dragged_token(), self.role),
            self.config.snap.token_snap_threshold,
        )
        .point
    }

    /// Apply a tool event. A rejected event drops the whole gesture.
    fn on_tool_event(&mut self, event: ToolEvent, now: Millis) -> InteractionResult<()> {
        let result = self.dispatch_tool_event(event, now);
        if result.is_err() {
            self.cancel_gesture();
        }
        result
    }

    fn dispatch_tool_event(&mut self, event: ToolEvent, now: Millis) -> InteractionResult<()> {
        let tool = self.tools.current_tool;
        match (tool, event) {
            (_, ToolEvent::Nothing) => Ok(()),
            (ToolKind::Ping, ToolEvent::Click(p)) => self.place_ping(p, now),
            (ToolKind::Light, ToolEvent::Click(p)) => self.toggle_light_at(p),
            (
                ToolKind::FogReveal | ToolKind::FogHide,
                ToolEvent::Started(p) | ToolEvent::Moved { current: p, .. },
            ) => self.paint_fog(tool, p),
            (ToolKind::FogReveal | ToolKind::FogHide, ToolEvent::StrokeFinished(_)) => {
                self.brush.end_stroke();
                Ok(())
            }
            (ToolKind::Shape(kind), ToolEvent::Moved { start, current }) => {
                let geometry = ShapeGeometry::from_drag(kind, self.snap(start), self.snap(current));
                let command = self
                    .previews
                    .broadcast(geometry, self.tools.color, 0.5, now);
                self.outgoing.push(command);
                Ok(())
            }
            (ToolKind::Shape(kind), ToolEvent::Completed { start, end }) => self.place_shape(kind, start, end, now),
            (ToolKind::Ruler, ToolEvent::Started(p)) => {
                self.measure(p, p);
                Ok(())
            }
            (
                ToolKind::Ruler,
                ToolEvent::Moved { start, current: end } | ToolEvent::Completed { start, end },
            ) => {
                self.measure(start, end);
                Ok(())
            }
            (ToolKind::Pen, ToolEvent::StrokeFinished(points)) => {
                if points.len() < 2 {
                    return Ok(());
                }
                self.require_in_bounds(&points)?;
                let drawing = Drawing::pen(points, self.tools.color, self.user_id.clone(), now);
                self.place_drawing(drawing);
                Ok(())
            }
            (ToolKind::Arrow, ToolEvent::Completed { start, end }) => {
                if start == end {
                    return Ok(());
                }
                self.require_in_bounds(&[start, end])?;
                let drawing = Drawing::arrow(start, end, self.tools.color, self.user_id.clone(), now);
                self.place_drawing(drawing);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn measure(&mut self, from: Point, to: Point) {
        let Some(map) = &self.map else {
            return;
        };
        let (from, to) = (self.snap(from), self.snap(to));
        self.ruler = Some(Ruler {
            from,
            to,
            measurement: map.grid().measure(from, to, map.scale_in_feet),
        });
    }

    fn paint_fog(&mut self, tool: ToolKind, pointer: Point) -> InteractionResult<()> {
        let map = self.map.as_ref().ok_or(InteractionError::NoActiveMap)?;
        if !map.fog_active() {
            return Ok(());
        }
        let Some(fog) = self.fog.as_mut() else {
            return Ok(());
        };
        self.brush.mode = if tool == ToolKind::FogHide {
            BrushMode::Hide
        } else {
            BrushMode::Reveal
        };
        if self.brush.paint(fog, &map.grid(), pointer) {
            self.outgoing.push(StoreCommand::UpdateFog { fog: fog.clone() });
        }
        Ok(())
    }

    fn place_ping(&mut self, position: Point, now: Millis) -> InteractionResult<()> {
        self.require_in_bounds(&[position])?;
        let ping = Ping::new(position, self.tools.color, self.user_id.clone(), now);
        self.timers.schedule(
            now + self.config.ping.fade_end_ms,
            StoreCommand::DeletePing { id: ping.id },
        );
        self.annotations.insert_ping(ping.clone());
        self.outgoing.push(StoreCommand::CreatePing { ping });
        Ok(())
    }

    fn place_shape(&mut self, kind: ShapeKind, start: Point, end: Point, now: Millis) -> InteractionResult<()> {
        self.require_in_bounds(&[start, end])?;
        if let Some(command) = self.previews.clear_own() {
            self.outgoing.push(command);
        }
        let (start, end) = (self.snap(start), self.snap(end));
        if start == end {
            log::debug!("Ignoring zero-size {:?}", kind);
            return Ok(());
        }
        let visibility = if self.role.is_dm() {
            self.tools.shape_visibility
        } else {
            Visibility::All
        };
        let shape = Shape::new(
            ShapeGeometry::from_drag(kind, start, end),
            self.tools.color,
            self.user_id.clone(),
            now,
        )
        .with_persistent(self.tools.persistent_shapes, &self.config.lifecycle.shape_fade)
        .with_visibility(visibility);
        if let Some(at) = shape.expires_at {
            self.timers.schedule(at, StoreCommand::DeleteShape { id: shape.id });
        }
        self.annotations.insert_shape(shape.clone());
        self.outgoing.push(StoreCommand::CreateShape { shape });
        Ok(())
    }

    fn place_drawing(&mut self, drawing: Drawing) {
        self.timers.schedule(
            drawing.created_at + drawing.hard_delete_ms(&self.config.lifecycle),
            StoreCommand::DeleteDrawing { id: drawing.id },
        );
        self.annotations.insert_drawing(drawing.clone());
        self.outgoing.push(StoreCommand::CreateDrawing { drawing });
    }

    /// Light tool click: remove the light under the pointer, or place one.
    fn toggle_light_at(&mut self, p: Point) -> InteractionResult<()> {
        match self.lights.hit_test(p, LIGHT_HIT_THRESHOLD) {
            Some(id) => self.delete_light(id),
            None => {
                self.require_in_bounds(&[p])?;
                let position = self.snap(p);
                self.create_light(Light::new(position, DEFAULT_LIGHT_RADIUS))
            }
        }
    }

    /// Drop pending preview, brush and ruler state after a gesture ends early.
    fn gesture_dropped(&mut self) {
        if let Some(command) = self.previews.clear_own() {
            self.outgoing.push(command);
        }
        self.brush.end_stroke();
        self.ruler = None;
    }

    pub fn cancel_gesture(&mut self) {
        self.tools.cancel();
        self.controller.cancel();
        self.viewport.end_drag();
        self.gesture_dropped();
    }

    pub fn select_tool(&mut self, tool: ToolKind) -> InteractionResult<()> {
        if tool.is_dm_only() && !self.role.is_dm() {
            return Err(InteractionError::NotPermitted(format!("{:?} is a DM tool", tool)));
        }
        if self.tools.set_tool(tool) {
            log::debug!("Tool changed to {:?}", tool);
            self.gesture_dropped();
        }
        Ok(())
    }

    // --- Keyboard --------------------------------------------------------

    /// Handle a key event. Returns the action a fresh press triggered.
    pub fn handle_key(
        &mut self,
        event: KeyEvent,
        modifiers: Modifiers,
        now: Millis,
    ) -> InteractionResult<Option<Action>> {
        self.now = now;
        self.input.set_modifiers(modifiers);
        let fresh = self.input.handle_key_event(&event);
        if self.torn_down || !fresh {
            return Ok(None);
        }
        let KeyEvent::Pressed(key) = &event else {
            return Ok(None);
        };
        let Some(action) = self.bindings.action_for(key, modifiers) else {
            return Ok(None);
        };
        self.apply_action(action, now)?;
        Ok(Some(action))
    }

    /// Modifier changes without a key press, such as the snap invert key.
    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.input.set_modifiers(modifiers);
    }

    pub fn apply_action(&mut self, action: Action, _now: Millis) -> InteractionResult<()> {
        log::debug!("Applying {:?}", action);
        match action {
            Action::SelectTool(tool) => self.select_tool(tool),
            Action::ToggleSnap => {
                self.snap_enabled = !self.snap_enabled;
                Ok(())
            }
            Action::ToggleLayer(layer) => {
                self.layers.toggle(layer);
                Ok(())
            }
            Action::CancelGesture => {
                self.cancel_gesture();
                Ok(())
            }
            Action::ResetView => {
                self.viewport.reset();
                Ok(())
            }
            Action::FitToMap => {
                self.require_map()?;
                self.fit_to_screen();
                Ok(())
            }
            Action::ClearTemporary => self.clear_temporary(),
            Action::ClearMine => self.clear_mine(),
            Action::ClearAll => self.clear_all(),
            Action::RevealAllFog => self.reveal_all_fog(),
            Action::HideAllFog => self.hide_all_fog(),
        }
    }

    // --- DM and owner operations -----------------------------------------

    fn require_map(&self) -> InteractionResult<&MapSettings> {
        self.map.as_ref().ok_or(InteractionError::NoActiveMap)
    }

    /// Every point must lie on the map, edges included.
    fn require_in_bounds(&self, points: &[Point]) -> InteractionResult<()> {
        let bounds = self.require_map()?.bounds();
        let outside = points.iter().find(|p| {
            !(bounds.x0..=bounds.x1).contains(&p.x) || !(bounds.y0..=bounds.y1).contains(&p.y)
        });
        match outside {
            Some(p) => Err(InteractionError::OutOfBounds { x: p.x, y: p.y }),
            None => Ok(()),
        }
    }

    fn require_dm(&self, what: &str) -> InteractionResult<()> {
        if self.role.is_dm() {
            Ok(())
        } else {
            Err(InteractionError::NotPermitted(format!("only the DM may {}", what)))
        }
    }

    fn require_owner(&self, id: TokenId) -> InteractionResult<&Token> {
        let token = self
            .tokens
            .get(id)
            .ok_or_else(|| InteractionError::NotPermitted(format!("unknown token {}", id)))?;
        if self.role.is_dm() || token.owner_id.as_ref() == Some(&self.user_id) {
            Ok(token)
        } else {
            Err(InteractionError::NotPermitted(format!(
                "{} does not own token {}",
                self.user_id, id
            )))
        }
    }

    /// Edit map settings: applied at once, persisted after a quiet period.
    pub fn update_map(&mut self, patch: MapPatch, now: Millis) -> InteractionResult<()> {
        self.require_dm("edit the map")?;
        let map = self.map.as_mut().ok_or(InteractionError::NoActiveMap)?;
        let was_active = map.fog_active();
        let dims = map.grid_dimensions();
        map.apply(&patch);
        let new_dims = map.grid_dimensions();
        if new_dims != dims {
            if let Some(fog) = self.fog.as_mut() {
                fog.resize(new_dims.0, new_dims.1);
            }
        }
        if !was_active && map.fog_active() {
            self.vision_dirty = true;
        }
        self.now = now;
        self.debouncer.push(patch, now);
        self.auto_reveal();
        Ok(())
    }

    pub fn reveal_all_fog(&mut self) -> InteractionResult<()> {
        self.require_dm("reveal the map")?;
        let fog = self.fog.as_mut().ok_or(InteractionError::NoActiveMap)?;
        fog.reveal_all();
        self.outgoing.push(StoreCommand::UpdateFog { fog: fog.clone() });
        Ok(())
    }

    pub fn hide_all_fog(&mut self) -> InteractionResult<()> {
        self.require_dm("hide the map")?;
        let fog = self.fog.as_mut().ok_or(InteractionError::NoActiveMap)?;
        fog.hide_all();
        self.outgoing.push(StoreCommand::UpdateFog { fog: fog.clone() });
        Ok(())
    }

    /// Place a new token, clamped inside the map.
    pub fn create_token(&mut self, mut token: Token) -> InteractionResult<()> {
        self.require_dm("create tokens")?;
        let map = self.require_map()?;
        if !map.bounds().contains(token.position) {
            return Err(InteractionError::OutOfBounds {
                x: token.position.x,
                y: token.position.y,
            });
        }
        token.position = clamp_position(token.position, token.size, map.size());
        self.tokens.insert(token.clone());
        self.outgoing.push(StoreCommand::CreateToken { token });
        self.vision_dirty = true;
        self.auto_reveal();
        Ok(())
    }

    pub fn delete_token(&mut self, id: TokenId) -> InteractionResult<()> {
        self.require_dm("delete tokens")?;
        if self.tokens.remove(id).is_some() {
            self.outgoing.push(StoreCommand::DeleteToken { id });
        }
        Ok(())
    }

    /// Set a token's HP, clamped to `[0, max_hp]`.
    pub fn update_hp(&mut self, id: TokenId, hp: i32) -> InteractionResult<i32> {
        self.require_owner(id)?;
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| InteractionError::NotPermitted(format!("unknown token {}", id)))?;
        let hp = token.set_hp(hp);
        self.outgoing.push(StoreCommand::UpdateHp { id, hp });
        Ok(hp)
    }

    pub fn add_status_effect(&mut self, id: TokenId, effect: &str) -> InteractionResult<()> {
        self.require_owner(id)?;
        let changed = self
            .tokens
            .get_mut(id)
            .is_some_and(|t| t.add_status_effect(effect));
        if changed {
            self.outgoing.push(StoreCommand::AddStatusEffect {
                id,
                effect: effect.to_string(),
            });
        }
        Ok(())
    }

    pub fn remove_status_effect(&mut self, id: TokenId, effect: &str) -> InteractionResult<()> {
        self.require_owner(id)?;
        let changed = self
            .tokens
            .get_mut(id)
            .is_some_and(|t| t.remove_status_effect(effect));
        if changed {
            self.outgoing.push(StoreCommand::RemoveStatusEffect {
                id,
                effect: effect.to_string(),
            });
        }
        Ok(())
    }

    fn update_token_with(&mut self, id: TokenId, edit: impl FnOnce(&mut Token)) -> InteractionResult<()> {
        let token = self
            .tokens
            .get_mut(id)
            .ok_or_else(|| InteractionError::NotPermitted(format!("unknown token {}", id)))?;
        edit(token);
        let token = token.clone();
        self.outgoing.push(StoreCommand::UpdateToken { token });
        Ok(())
    }

    pub fn set_token_hidden(&mut self, id: TokenId, hidden: bool) -> InteractionResult<()> {
        self.require_dm("hide tokens")?;
        self.update_token_with(id, |t| t.hidden = hidden)
    }

    /// Stage or un-stage a token. Staged tokens are off the board for players.
    pub fn set_token_staged(&mut self, id: TokenId, staged: bool) -> InteractionResult<()> {
        self.require_dm("stage tokens")?;
        self.update_token_with(id, |t| t.staged = staged)?;
        self.vision_dirty = true;
        self.auto_reveal();
        Ok(())
    }

    pub fn create_light(&mut self, light: Light) -> InteractionResult<()> {
        self.require_dm("place lights")?;
        self.require_in_bounds(&[light.position])?;
        self.lights.insert(light.clone());
        self.outgoing.push(StoreCommand::CreateLight { light });
        self.vision_dirty = true;
        self.auto_reveal();
        Ok(())
    }

    pub fn update_light(&mut self, light: Light) -> InteractionResult<()> {
        self.require_dm("edit lights")?;
        if self.lights.get(light.id).is_none() {
            return Err(InteractionError::NotPermitted(format!("unknown light {}", light.id)));
        }
        self.lights.insert(light.clone());
        self.outgoing.push(StoreCommand::UpdateLight { light });
        self.vision_dirty = true;
        self.auto_reveal();
        Ok(())
    }

    pub fn delete_light(&mut self, id: LightId) -> InteractionResult<()> {
        self.require_dm("remove lights")?;
        if self.lights.remove(id).is_some() {
            self.outgoing.push(StoreCommand::DeleteLight { id });
        }
        Ok(())
    }

    pub fn set_global_lighting(&mut self, lighting: GlobalLighting) -> InteractionResult<()> {
        self.require_dm("change the lighting")?;
        let lighting = GlobalLighting {
            time_of_day: lighting.time_of_day.rem_euclid(24.0),
            ambient_light: lighting.ambient_light.clamp(0.0, 1.0),
            ..lighting
        };
        self.global_lighting = lighting.clone();
        self.outgoing.push(StoreCommand::UpdateGlobalLighting { lighting });
        Ok(())
    }

    pub fn clear_temporary(&mut self) -> InteractionResult<()> {
        self.require_dm("clear annotations")?;
        self.annotations.clear_temporary();
        self.outgoing.push(StoreCommand::ClearTemporary);
        Ok(())
    }

    pub fn clear_all(&mut self) -> InteractionResult<()> {
        self.require_dm("clear annotations")?;
        self.annotations.clear_all();
        self.outgoing.push(StoreCommand::ClearAll);
        Ok(())
    }

    /// Remove every annotation the local user created.
    pub fn clear_mine(&mut self) -> InteractionResult<()> {
        self.annotations.clear_by_user(&self.user_id);
        self.outgoing.push(StoreCommand::ClearByUser {
            user_id: self.user_id.clone(),
        });
        Ok(())
    }

    // --- Clock -----------------------------------------------------------

    /// Advance the session clock. Returns whether a redraw is needed.
    pub fn tick(&mut self, now: Millis) -> bool {
        self.now = now;
        if self.torn_down {
            return false;
        }

        if self
            .tools
            .expire(now, self.config.interaction.gesture_timeout_ms)
        {
            self.gesture_dropped();
        }

        for command in self.timers.take_due(now) {
            let claimed = match &command {
                StoreCommand::DeleteShape { id }
                | StoreCommand::DeleteDrawing { id }
                | StoreCommand::DeletePing { id } => self.annotations.claim_delete(*id),
                _ => true,
            };
            if claimed {
                self.outgoing.push(command);
            }
        }
        let swept = self
            .annotations
            .sweep(now, &self.config.lifecycle, &self.config.ping);
        self.outgoing.extend(swept);

        if let Some(patch) = self.debouncer.poll(now) {
            log::debug!("Persisting map edits");
            self.outgoing.push(StoreCommand::UpdateMap { patch });
        }

        let animating = self.lights.needs_animation(&self.global_lighting);
        let frame = self.scheduler.tick(now, animating).is_some();
        frame
            || self.annotations.has_animated()
            || self.previews.has_live(now)
            || self.controller.is_dragging()
    }

    /// Stop animating and drop all transient local state. Queues the
    /// withdrawal of the local preview and any unsaved map edits; pending
    /// cleanup timers are dropped.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.scheduler.stop();
        self.tools.cancel();
        self.controller.cancel();
        self.viewport.end_drag();
        self.input.reset();
        self.gesture_dropped();
        if let Some(patch) = self.debouncer.flush() {
            self.outgoing.push(StoreCommand::UpdateMap { patch });
        }
        let dropped = self.timers.len();
        self.timers.clear();
        log::info!(
            "Closed session for {} ({} cleanup timers dropped)",
            self.user_id,
            dropped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenKind;
    use kurbo::Vec2;

    fn map() -> MapSettings {
        let mut map = MapSettings::new(500.0, 400.0);
        map.grid_size = 50.0;
        map
    }

    fn fogged_map() -> MapSettings {
        let mut map = map();
        map.fog_enabled = true;
        map
    }

    fn session(user: &str, role: Role, map: MapSettings) -> TableSession {
        let mut session = TableSession::new(user, role, EngineConfig::default());
        session.apply_remote(RemoteUpdate::Fog(FogData::for_map(&map)));
        session.apply_remote(RemoteUpdate::Map(map));
        session
    }

    fn down(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Down {
            position: Point::new(x, y),
            button: MouseButton::Left,
        }
    }

    fn up(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Up {
            position: Point::new(x, y),
            button: MouseButton::Left,
        }
    }

    fn moved(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move {
            position: Point::new(x, y),
        }
    }

    fn click(session: &mut TableSession, x: f64, y: f64, now: Millis) {
        session.handle_pointer(down(x, y), now).unwrap();
        session.handle_pointer(up(x, y), now).unwrap();
    }

    fn names(commands: &[StoreCommand]) -> Vec<&'static str> {
        commands.iter().map(StoreCommand::name).collect()
    }

    #[test]
    fn test_temporary_shape_deleted_once() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Shape(ShapeKind::Circle)).unwrap();
        click(&mut dm, 100.0, 100.0, 1000);
        dm.handle_pointer(moved(150.0, 100.0), 1100).unwrap();
        click(&mut dm, 150.0, 100.0, 1200);

        let created = dm.take_outgoing();
        assert_eq!(names(&created), vec!["upsertShapePreview", "deleteShapePreview", "createShape"]);
        let StoreCommand::CreateShape { shape } = &created[2] else {
            panic!("expected a shape");
        };
        assert_eq!(shape.expires_at, Some(6200));
        let id = shape.id;

        dm.tick(4200);
        assert!(dm.take_outgoing().is_empty());
        dm.tick(6200);
        assert_eq!(dm.take_outgoing(), vec![StoreCommand::DeleteShape { id }]);
        dm.tick(7000);
        assert!(dm.take_outgoing().is_empty());
    }

    #[test]
    fn test_players_cannot_use_dm_tools() {
        let mut player = session("p1", Role::Player, fogged_map());
        assert!(matches!(
            player.select_tool(ToolKind::FogReveal),
            Err(InteractionError::NotPermitted(_))
        ));
        assert_eq!(player.tools.current_tool, ToolKind::Select);
        assert!(player.reveal_all_fog().is_err());
        assert!(player.update_map(MapPatch::default(), 0).is_err());
        assert!(player.take_outgoing().is_empty());
    }

    #[test]
    fn test_player_drag_reveals_fog() {
        let mut player = session("p1", Role::Player, fogged_map());
        let hero = Token::new(TokenKind::Player, Point::new(125.0, 125.0), Size::new(50.0, 50.0)).with_owner("p1");
        let id = hero.id;
        player.apply_remote(RemoteUpdate::Tokens(vec![hero]));
        // Initial vision reveal on arrival.
        assert_eq!(names(&player.take_outgoing()), vec!["updateFogOfWar"]);

        player.handle_pointer(down(125.0, 125.0), 0).unwrap();
        player.handle_pointer(moved(160.0, 130.0), 10).unwrap();
        player.handle_pointer(up(182.0, 131.0), 20).unwrap();

        let out = player.take_outgoing();
        assert_eq!(
            out[0],
            StoreCommand::UpdateTokenPosition {
                id,
                position: Point::new(175.0, 125.0),
            }
        );
        assert!(matches!(
            out[1],
            StoreCommand::RevealArea {
                center: GridCell { x: 3, y: 2 },
                ..
            }
        ));
        assert_eq!(out.len(), 2);
        assert!(player.fog().unwrap().is_revealed(GridCell::new(6, 2)));
        assert_eq!(player.tokens().get(id).unwrap().position, Point::new(175.0, 125.0));

        // The store echo changes nothing further.
        let echoed = player.tokens().iter().cloned().collect();
        player.apply_remote(RemoteUpdate::Tokens(echoed));
        assert!(player.take_outgoing().is_empty());
    }

    #[test]
    fn test_player_cannot_drag_others_token() {
        let mut player = session("p1", Role::Player, map());
        let other = Token::new(TokenKind::Player, Point::new(125.0, 125.0), Size::new(50.0, 50.0)).with_owner("p2");
        player.apply_remote(RemoteUpdate::Tokens(vec![other]));
        player.handle_pointer(down(125.0, 125.0), 0).unwrap();
        assert!(player.dragged_token().is_none());
        player.handle_pointer(up(200.0, 125.0), 10).unwrap();
        assert!(player.take_outgoing().is_empty());
    }

    #[test]
    fn test_map_edits_are_debounced() {
        let mut dm = session("dm", Role::Dm, fogged_map());
        let patch = |size: f64| MapPatch {
            grid_size: Some(size),
            ..Default::default()
        };
        dm.update_map(patch(40.0), 0).unwrap();
        dm.update_map(patch(25.0), 100).unwrap();
        assert_eq!(dm.map().unwrap().grid_size, 25.0);
        assert_eq!(dm.fog().unwrap().grid_width, 20);

        // A stale echo does not undo the unsaved edit.
        dm.apply_remote(RemoteUpdate::Map(fogged_map()));
        assert_eq!(dm.map().unwrap().grid_size, 25.0);

        dm.tick(200);
        assert!(dm.take_outgoing().is_empty());
        dm.tick(280);
        assert_eq!(
            dm.take_outgoing(),
            vec![StoreCommand::UpdateMap { patch: patch(25.0) }]
        );
    }

    #[test]
    fn test_tool_change_withdraws_preview() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Shape(ShapeKind::Rectangle)).unwrap();
        click(&mut dm, 10.0, 10.0, 0);
        dm.handle_pointer(moved(60.0, 60.0), 10).unwrap();
        assert!(dm.own_preview().is_some());
        dm.select_tool(ToolKind::Ping).unwrap();
        assert!(dm.own_preview().is_none());
        assert_eq!(names(&dm.take_outgoing()), vec!["upsertShapePreview", "deleteShapePreview"]);
    }

    #[test]
    fn test_idle_two_click_gesture_expires() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Shape(ShapeKind::Circle)).unwrap();
        click(&mut dm, 10.0, 10.0, 0);
        dm.handle_pointer(moved(60.0, 10.0), 1000).unwrap();
        dm.take_outgoing();
        dm.tick(31_000);
        assert!(!dm.tools.is_active());
        assert_eq!(names(&dm.take_outgoing()), vec!["deleteShapePreview"]);
    }

    #[test]
    fn test_ping_without_map_is_rejected() {
        let mut player = TableSession::new("p1", Role::Player, EngineConfig::default());
        player.select_tool(ToolKind::Ping).unwrap();
        assert_eq!(
            player.handle_pointer(down(10.0, 10.0), 0),
            Err(InteractionError::NoActiveMap)
        );
        assert!(player.take_outgoing().is_empty());
    }

    #[test]
    fn test_ping_hard_delete_timer() {
        let mut player = session("p1", Role::Player, map());
        player.select_tool(ToolKind::Ping).unwrap();
        click(&mut player, 30.0, 40.0, 1000);
        let out = player.take_outgoing();
        let StoreCommand::CreatePing { ping } = &out[0] else {
            panic!("expected a ping");
        };
        player.tick(4499);
        assert!(player.take_outgoing().is_empty());
        player.tick(4500);
        assert_eq!(player.take_outgoing(), vec![StoreCommand::DeletePing { id: ping.id }]);
    }

    #[test]
    fn test_fog_brush_stroke() {
        let mut dm = session("dm", Role::Dm, fogged_map());
        dm.select_tool(ToolKind::FogReveal).unwrap();
        dm.handle_pointer(down(120.0, 120.0), 0).unwrap();
        dm.handle_pointer(moved(130.0, 125.0), 5).unwrap();
        dm.handle_pointer(up(130.0, 125.0), 10).unwrap();
        assert_eq!(names(&dm.take_outgoing()), vec!["updateFogOfWar"]);
        assert!(dm.fog().unwrap().is_revealed(GridCell::new(2, 2)));
    }

    #[test]
    fn test_key_press_is_not_repeated() {
        let mut dm = session("dm", Role::Dm, map());
        let mods = Modifiers::default();
        assert!(dm.snap_enabled());
        let press = || KeyEvent::Pressed("S".to_string());
        assert_eq!(dm.handle_key(press(), mods, 0), Ok(Some(Action::ToggleSnap)));
        assert_eq!(dm.handle_key(press(), mods, 10), Ok(None));
        assert!(!dm.snap_enabled());
        dm.handle_key(KeyEvent::Released("S".to_string()), mods, 20).unwrap();
        dm.handle_key(press(), mods, 30).unwrap();
        assert!(dm.snap_enabled());
    }

    #[test]
    fn test_light_tool_places_and_removes() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Light).unwrap();
        click(&mut dm, 102.0, 98.0, 0);
        assert_eq!(dm.lights().len(), 1);
        let light = dm.lights().iter().next().unwrap().clone();
        assert_eq!(light.position, Point::new(100.0, 100.0));
        click(&mut dm, 105.0, 105.0, 10);
        assert!(dm.lights().is_empty());
        assert_eq!(names(&dm.take_outgoing()), vec!["createLight", "deleteLight"]);
    }

    #[test]
    fn test_animation_runs_only_for_animated_lights() {
        let mut dm = session("dm", Role::Dm, map());
        dm.apply_remote(RemoteUpdate::Lights(vec![
            Light::new(Point::new(50.0, 50.0), 100.0).with_flicker(0.3),
        ]));
        assert!(!dm.tick(0));
        dm.apply_remote(RemoteUpdate::GlobalLighting(GlobalLighting {
            enabled: true,
            ..Default::default()
        }));
        assert!(dm.tick(100));
        assert!(dm.tick(600));
        assert_eq!(dm.animation_time(), 0.5);
        assert!(dm.lighting_frame().is_some());
    }

    #[test]
    fn test_teardown_flushes_and_stops() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Ping).unwrap();
        click(&mut dm, 10.0, 10.0, 0);
        dm.update_map(
            MapPatch {
                grid_opacity: Some(0.2),
                ..Default::default()
            },
            5,
        )
        .unwrap();
        dm.take_outgoing();

        dm.teardown();
        assert_eq!(names(&dm.take_outgoing()), vec!["updateMap"]);
        assert!(!dm.tick(10_000));
        assert!(dm.take_outgoing().is_empty());
        dm.apply_remote(RemoteUpdate::Map(map()));
        assert_eq!(dm.map().unwrap().grid_opacity, 0.2);
    }

    #[test]
    fn test_hp_requires_owner() {
        let mut player = session("p1", Role::Player, map());
        let mine = Token::new(TokenKind::Player, Point::new(75.0, 75.0), Size::new(50.0, 50.0))
            .with_owner("p1")
            .with_hp(10, 12);
        let theirs = Token::new(TokenKind::Monster, Point::new(175.0, 75.0), Size::new(50.0, 50.0));
        let (mine_id, theirs_id) = (mine.id, theirs.id);
        player.apply_remote(RemoteUpdate::Tokens(vec![mine, theirs]));

        assert_eq!(player.update_hp(mine_id, 20), Ok(12));
        assert!(player.update_hp(theirs_id, 0).is_err());
        assert_eq!(player.take_outgoing(), vec![StoreCommand::UpdateHp { id: mine_id, hp: 12 }]);
    }

    #[test]
    fn test_wheel_zooms_around_pointer() {
        let mut dm = session("dm", Role::Dm, map());
        let pointer = Point::new(200.0, 150.0);
        let before = dm.viewport().screen_to_map(pointer);
        dm.handle_pointer(
            PointerEvent::Scroll {
                position: pointer,
                delta: Vec2::new(0.0, -1.0),
            },
            0,
        )
        .unwrap();
        assert!(dm.viewport().scale() > 1.0);
        let after = dm.viewport().screen_to_map(pointer);
        assert!((before - after).hypot() < 1e-9);
    }

    #[test]
    fn test_player_snap_skips_hidden_tokens() {
        let mut lurker = Token::new(TokenKind::Monster, Point::new(112.0, 112.0), Size::new(50.0, 50.0));
        lurker.hidden = true;
        let circle_center = |role: Role| {
            let mut s = session("u", role, map());
            s.apply_remote(RemoteUpdate::Tokens(vec![lurker.clone()]));
            s.select_tool(ToolKind::Shape(ShapeKind::Circle)).unwrap();
            click(&mut s, 108.0, 108.0, 0);
            s.handle_pointer(moved(160.0, 108.0), 10).unwrap();
            click(&mut s, 160.0, 108.0, 20);
            let shape = s.annotations().shapes().next().unwrap().clone();
            let ShapeGeometry::Circle { center, .. } = shape.geometry else {
                panic!("expected a circle");
            };
            center
        };
        assert_eq!(circle_center(Role::Player), Point::new(100.0, 100.0));
        assert_eq!(circle_center(Role::Dm), Point::new(112.0, 112.0));
    }

    #[test]
    fn test_off_map_ping_is_rejected() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Ping).unwrap();
        assert_eq!(
            dm.handle_pointer(down(-500.0, -500.0), 0),
            Err(InteractionError::OutOfBounds { x: -500.0, y: -500.0 })
        );
        assert!(dm.take_outgoing().is_empty());
        // The far edge still counts as on the map.
        click(&mut dm, 500.0, 400.0, 10);
        assert_eq!(names(&dm.take_outgoing()), vec!["createPing"]);
    }

    #[test]
    fn test_off_map_shape_is_rejected() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Shape(ShapeKind::Rectangle)).unwrap();
        click(&mut dm, 10.0, 10.0, 0);
        dm.handle_pointer(moved(600.0, 10.0), 10).unwrap();
        assert_eq!(
            dm.handle_pointer(down(600.0, 10.0), 20),
            Err(InteractionError::OutOfBounds { x: 600.0, y: 10.0 })
        );
        assert!(!dm.tools.is_active());
        assert!(dm.own_preview().is_none());
        assert_eq!(names(&dm.take_outgoing()), vec!["upsertShapePreview", "deleteShapePreview"]);
    }

    #[test]
    fn test_off_map_pen_stroke_is_rejected() {
        let mut player = session("p1", Role::Player, map());
        player.select_tool(ToolKind::Pen).unwrap();
        player.handle_pointer(down(480.0, 50.0), 0).unwrap();
        player.handle_pointer(moved(520.0, 50.0), 10).unwrap();
        assert_eq!(
            player.handle_pointer(up(540.0, 50.0), 20),
            Err(InteractionError::OutOfBounds { x: 520.0, y: 50.0 })
        );
        assert!(!player.tools.is_active());
        assert!(player.annotations().is_empty());
        assert!(player.take_outgoing().is_empty());
    }

    #[test]
    fn test_off_map_arrow_is_rejected() {
        let mut player = session("p1", Role::Player, map());
        player.select_tool(ToolKind::Arrow).unwrap();
        click(&mut player, 100.0, 100.0, 0);
        assert_eq!(
            player.handle_pointer(down(100.0, -20.0), 10),
            Err(InteractionError::OutOfBounds { x: 100.0, y: -20.0 })
        );
        assert!(!player.tools.is_active());
        assert!(player.take_outgoing().is_empty());
    }

    #[test]
    fn test_off_map_light_is_rejected() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::Light).unwrap();
        assert_eq!(
            dm.handle_pointer(down(510.0, 100.0), 0),
            Err(InteractionError::OutOfBounds { x: 510.0, y: 100.0 })
        );
        assert!(dm.create_light(Light::new(Point::new(-1.0, 0.0), 100.0)).is_err());
        assert!(dm.lights().is_empty());
        assert!(dm.take_outgoing().is_empty());
    }

    #[test]
    fn test_arrow_is_two_clicks() {
        let mut player = session("p1", Role::Player, map());
        player.select_tool(ToolKind::Arrow).unwrap();
        click(&mut player, 100.0, 100.0, 0);
        player.handle_pointer(moved(200.0, 100.0), 10).unwrap();
        assert!(player.take_outgoing().is_empty());
        click(&mut player, 200.0, 100.0, 20);
        assert_eq!(names(&player.take_outgoing()), vec!["createDrawing"]);
    }

    #[test]
    fn test_unfinished_arrow_expires() {
        let mut player = session("p1", Role::Player, map());
        player.select_tool(ToolKind::Arrow).unwrap();
        click(&mut player, 100.0, 100.0, 1000);
        player.tick(30_999);
        assert!(player.tools.is_active());
        player.tick(31_000);
        assert!(!player.tools.is_active());
        // A later click starts over instead of finishing the old arrow.
        click(&mut player, 200.0, 100.0, 31_500);
        assert!(player.take_outgoing().is_empty());
        assert!(player.annotations().is_empty());
    }

    #[test]
    fn test_fog_brush_is_inert_without_fog() {
        let mut dm = session("dm", Role::Dm, map());
        dm.select_tool(ToolKind::FogReveal).unwrap();
        dm.handle_pointer(down(120.0, 120.0), 0).unwrap();
        dm.handle_pointer(up(120.0, 120.0), 10).unwrap();
        assert!(dm.take_outgoing().is_empty());
        assert_eq!(dm.fog().unwrap().revealed_count(), 0);
    }

    #[test]
    fn test_malformed_remote_map_is_ignored() {
        let mut dm = session("dm", Role::Dm, map());
        let mut broken = map();
        broken.grid_size = 0.0;
        dm.apply_remote(RemoteUpdate::Map(broken));
        assert_eq!(dm.map().unwrap().grid_size, 50.0);

        let mut fresh = TableSession::new("p1", Role::Player, EngineConfig::default());
        let mut broken = map();
        broken.width = f64::NAN;
        fresh.apply_remote(RemoteUpdate::Map(broken));
        assert!(fresh.map().is_none());
    }
}
