//! In-memory store implementation.

use super::{BoxFuture, Callback, MapStore, StoreError, StoreResult, SubscriberSet, Subscription};
use crate::ephemeral::{Drawing, DrawingId, Ping, PingId, Shape, ShapeId};
use crate::fog::FogData;
use crate::grid::GridCell;
use crate::lighting::{GlobalLighting, Light, LightId};
use crate::map::{MapId, MapPatch, MapSettings, UserId};
use crate::preview::ShapePreview;
use crate::tokens::{Token, TokenId};
use kurbo::Point;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Clone, Copy)]
enum Topic {
    Map,
    Tokens,
    Fog,
    Shapes,
    Drawings,
    Pings,
    Previews,
    Lights,
    Global,
}

enum Snapshot {
    Map(MapSettings),
    Tokens(Vec<Token>),
    Fog(FogData),
    Shapes(Vec<Shape>),
    Drawings(Vec<Drawing>),
    Pings(Vec<Ping>),
    Previews(Vec<ShapePreview>),
    Lights(Vec<Light>),
    Global(GlobalLighting),
}

#[derive(Default, Clone)]
struct Topics {
    map: SubscriberSet<MapSettings>,
    tokens: SubscriberSet<Vec<Token>>,
    fog: SubscriberSet<FogData>,
    shapes: SubscriberSet<Vec<Shape>>,
    drawings: SubscriberSet<Vec<Drawing>>,
    pings: SubscriberSet<Vec<Ping>>,
    previews: SubscriberSet<Vec<ShapePreview>>,
    lights: SubscriberSet<Vec<Light>>,
    global: SubscriberSet<GlobalLighting>,
}

impl Topics {
    fn publish(&self, snapshot: &Snapshot) {
        match snapshot {
            Snapshot::Map(v) => self.map.notify(v),
            Snapshot::Tokens(v) => self.tokens.notify(v),
            Snapshot::Fog(v) => self.fog.notify(v),
            Snapshot::Shapes(v) => self.shapes.notify(v),
            Snapshot::Drawings(v) => self.drawings.notify(v),
            Snapshot::Pings(v) => self.pings.notify(v),
            Snapshot::Previews(v) => self.previews.notify(v),
            Snapshot::Lights(v) => self.lights.notify(v),
            Snapshot::Global(v) => self.global.notify(v),
        }
    }
}

/// Everything stored for one map.
struct Room {
    map: MapSettings,
    tokens: HashMap<TokenId, Token>,
    fog: FogData,
    shapes: HashMap<ShapeId, Shape>,
    drawings: HashMap<DrawingId, Drawing>,
    pings: HashMap<PingId, Ping>,
    previews: HashMap<UserId, ShapePreview>,
    lights: HashMap<LightId, Light>,
    global: GlobalLighting,
    topics: Topics,
}

fn sorted_by<T: Clone, K: Ord>(values: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut values: Vec<T> = values.collect();
    values.sort_by_key(|v| key(v));
    values
}

impl Room {
    fn new(map: MapSettings) -> Self {
        Self {
            fog: FogData::for_map(&map),
            map,
            tokens: HashMap::new(),
            shapes: HashMap::new(),
            drawings: HashMap::new(),
            pings: HashMap::new(),
            previews: HashMap::new(),
            lights: HashMap::new(),
            global: GlobalLighting::default(),
            topics: Topics::default(),
        }
    }

    fn tokens(&self) -> Vec<Token> {
        sorted_by(self.tokens.values().cloned(), |t| t.id)
    }

    fn shapes(&self) -> Vec<Shape> {
        sorted_by(self.shapes.values().cloned(), |s| (s.created_at, s.id))
    }

    fn drawings(&self) -> Vec<Drawing> {
        sorted_by(self.drawings.values().cloned(), |d| (d.created_at, d.id))
    }

    fn pings(&self) -> Vec<Ping> {
        sorted_by(self.pings.values().cloned(), |p| (p.created_at, p.id))
    }

    fn previews(&self) -> Vec<ShapePreview> {
        sorted_by(self.previews.values().cloned(), |p| p.user_id.clone())
    }

    fn lights(&self) -> Vec<Light> {
        sorted_by(self.lights.values().cloned(), |l| l.id)
    }

    fn snapshot(&self, topic: Topic) -> Snapshot {
        match topic {
            Topic::Map => Snapshot::Map(self.map.clone()),
            Topic::Tokens => Snapshot::Tokens(self.tokens()),
            Topic::Fog => Snapshot::Fog(self.fog.clone()),
            Topic::Shapes => Snapshot::Shapes(self.shapes()),
            Topic::Drawings => Snapshot::Drawings(self.drawings()),
            Topic::Pings => Snapshot::Pings(self.pings()),
            Topic::Previews => Snapshot::Previews(self.previews()),
            Topic::Lights => Snapshot::Lights(self.lights()),
            Topic::Global => Snapshot::Global(self.global.clone()),
        }
    }

    fn token_mut(&mut self, id: TokenId) -> StoreResult<&mut Token> {
        self.tokens
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("token {}", id)))
    }
}

/// In-memory store for tests and the headless host.
///
/// Subscribers are notified synchronously from the writing call, after the
/// store lock has been released.
#[derive(Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<MapId, Room>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of writes accepted so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current stored map document.
    pub fn map(&self, map: MapId) -> Option<MapSettings> {
        self.read_room(map, |room| room.map.clone())
    }

    pub fn fog(&self, map: MapId) -> Option<FogData> {
        self.read_room(map, |room| room.fog.clone())
    }

    pub fn tokens(&self, map: MapId) -> Vec<Token> {
        self.read_room(map, Room::tokens).unwrap_or_default()
    }

    pub fn shapes(&self, map: MapId) -> Vec<Shape> {
        self.read_room(map, Room::shapes).unwrap_or_default()
    }

    pub fn drawings(&self, map: MapId) -> Vec<Drawing> {
        self.read_room(map, Room::drawings).unwrap_or_default()
    }

    pub fn pings(&self, map: MapId) -> Vec<Ping> {
        self.read_room(map, Room::pings).unwrap_or_default()
    }

    pub fn previews(&self, map: MapId) -> Vec<ShapePreview> {
        self.read_room(map, Room::previews).unwrap_or_default()
    }

    pub fn lights(&self, map: MapId) -> Vec<Light> {
        self.read_room(map, Room::lights).unwrap_or_default()
    }

    fn read_room<R>(&self, map: MapId, f: impl FnOnce(&Room) -> R) -> Option<R> {
        let rooms = self.rooms.read().ok()?;
        rooms.get(&map).map(f)
    }

    /// Apply a mutation to one map and notify the topics it reports as changed.
    fn write<F>(&self, map: MapId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Room) -> StoreResult<Vec<Topic>>,
    {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        let (topics, snapshots) = {
            let mut rooms = self
                .rooms
                .write()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            let room = rooms
                .get_mut(&map)
                .ok_or_else(|| StoreError::NotFound(format!("map {}", map)))?;
            let changed = f(room)?;
            let snapshots: Vec<Snapshot> = changed.into_iter().map(|t| room.snapshot(t)).collect();
            (room.topics.clone(), snapshots)
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        for snapshot in &snapshots {
            topics.publish(snapshot);
        }
        Ok(())
    }

    fn subscribe<T: 'static>(
        &self,
        map: MapId,
        callback: Callback<T>,
        pick: impl FnOnce(&Room) -> (SubscriberSet<T>, T),
    ) -> Subscription {
        let Some((set, current)) = self.read_room(map, pick) else {
            log::debug!("Subscription to unknown map {} ignored", map);
            return Subscription::inactive();
        };
        set.subscribe(callback, Some(&current))
    }
}

impl MapStore for MemoryStore {
    fn create_map(&self, map: &MapSettings) -> BoxFuture<'_, StoreResult<()>> {
        let map = map.clone();
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store is offline".to_string()));
            }
            {
                let mut rooms = self
                    .rooms
                    .write()
                    .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
                if rooms.contains_key(&map.id) {
                    return Err(StoreError::Other(format!("map {} already exists", map.id)));
                }
                rooms.insert(map.id, Room::new(map));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn update_map(&self, map: MapId, patch: &MapPatch) -> BoxFuture<'_, StoreResult<()>> {
        let patch = patch.clone();
        Box::pin(async move {
            self.write(map, |room| {
                let before = room.map.grid_dimensions();
                room.map.apply(&patch);
                let (w, h) = room.map.grid_dimensions();
                if (w, h) != before {
                    room.fog.resize(w, h);
                    return Ok(vec![Topic::Map, Topic::Fog]);
                }
                Ok(vec![Topic::Map])
            })
        })
    }

    fn subscribe_map(&self, map: MapId, callback: Callback<MapSettings>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.map.clone(), room.map.clone()))
    }

    fn subscribe_tokens(&self, map: MapId, callback: Callback<Vec<Token>>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.tokens.clone(), room.tokens()))
    }

    fn create_token(&self, map: MapId, token: &Token) -> BoxFuture<'_, StoreResult<()>> {
        let token = token.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.tokens.insert(token.id, token);
                Ok(vec![Topic::Tokens])
            })
        })
    }

    fn update_token_position(&self, map: MapId, id: TokenId, position: Point) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                room.token_mut(id)?.position = position;
                Ok(vec![Topic::Tokens])
            })
        })
    }

    fn update_token(&self, map: MapId, token: &Token) -> BoxFuture<'_, StoreResult<()>> {
        let token = token.clone();
        Box::pin(async move {
            let id = token.id;
            self.write(map, |room| {
                *room.token_mut(id)? = token;
                Ok(vec![Topic::Tokens])
            })
        })
    }

    fn update_hp(&self, map: MapId, id: TokenId, hp: i32) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                room.token_mut(id)?.set_hp(hp);
                Ok(vec![Topic::Tokens])
            })
        })
    }

    fn add_status_effect(&self, map: MapId, id: TokenId, effect: &str) -> BoxFuture<'_, StoreResult<()>> {
        let effect = effect.to_string();
        Box::pin(async move {
            self.write(map, |room| {
                let changed = room.token_mut(id)?.add_status_effect(&effect);
                Ok(if changed { vec![Topic::Tokens] } else { Vec::new() })
            })
        })
    }

    fn remove_status_effect(&self, map: MapId, id: TokenId, effect: &str) -> BoxFuture<'_, StoreResult<()>> {
        let effect = effect.to_string();
        Box::pin(async move {
            self.write(map, |room| {
                let changed = room.token_mut(id)?.remove_status_effect(&effect);
                Ok(if changed { vec![Topic::Tokens] } else { Vec::new() })
            })
        })
    }

    fn delete_token(&self, map: MapId, id: TokenId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                Ok(match room.tokens.remove(&id) {
                    Some(_) => vec![Topic::Tokens],
                    None => Vec::new(),
                })
            })
        })
    }

    fn subscribe_fog(&self, map: MapId, callback: Callback<FogData>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.fog.clone(), room.fog.clone()))
    }

    fn update_fog(&self, map: MapId, fog: &FogData) -> BoxFuture<'_, StoreResult<()>> {
        let fog = fog.clone();
        Box::pin(async move {
            if !fog.is_well_formed() {
                return Err(StoreError::Serialization(format!(
                    "fog grid does not match its {}x{} dimensions",
                    fog.grid_width, fog.grid_height
                )));
            }
            self.write(map, |room| {
                room.fog = fog;
                Ok(vec![Topic::Fog])
            })
        })
    }

    fn reveal_area(&self, map: MapId, center: GridCell, radius: u32) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                Ok(if room.fog.reveal_area(center, radius) {
                    vec![Topic::Fog]
                } else {
                    Vec::new()
                })
            })
        })
    }

    fn subscribe_shapes(&self, map: MapId, callback: Callback<Vec<Shape>>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.shapes.clone(), room.shapes()))
    }

    fn create_shape(&self, map: MapId, shape: &Shape) -> BoxFuture<'_, StoreResult<()>> {
        let shape = shape.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.shapes.insert(shape.id, shape);
                Ok(vec![Topic::Shapes])
            })
        })
    }

    fn delete_shape(&self, map: MapId, id: ShapeId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                Ok(match room.shapes.remove(&id) {
                    Some(_) => vec![Topic::Shapes],
                    None => Vec::new(),
                })
            })
        })
    }

    fn subscribe_drawings(&self, map: MapId, callback: Callback<Vec<Drawing>>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.drawings.clone(), room.drawings()))
    }

    fn create_drawing(&self, map: MapId, drawing: &Drawing) -> BoxFuture<'_, StoreResult<()>> {
        let drawing = drawing.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.drawings.insert(drawing.id, drawing);
                Ok(vec![Topic::Drawings])
            })
        })
    }

    fn delete_drawing(&self, map: MapId, id: DrawingId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                Ok(match room.drawings.remove(&id) {
                    Some(_) => vec![Topic::Drawings],
                    None => Vec::new(),
                })
            })
        })
    }

    fn subscribe_pings(&self, map: MapId, callback: Callback<Vec<Ping>>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.pings.clone(), room.pings()))
    }

    fn create_ping(&self, map: MapId, ping: &Ping) -> BoxFuture<'_, StoreResult<()>> {
        let ping = ping.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.pings.insert(ping.id, ping);
                Ok(vec![Topic::Pings])
            })
        })
    }

    fn delete_ping(&self, map: MapId, id: PingId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                Ok(match room.pings.remove(&id) {
                    Some(_) => vec![Topic::Pings],
                    None => Vec::new(),
                })
            })
        })
    }

    fn subscribe_previews(&self, map: MapId, callback: Callback<Vec<ShapePreview>>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.previews.clone(), room.previews()))
    }

    fn upsert_preview(&self, map: MapId, preview: &ShapePreview) -> BoxFuture<'_, StoreResult<()>> {
        let preview = preview.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.previews.insert(preview.user_id.clone(), preview);
                Ok(vec![Topic::Previews])
            })
        })
    }

    fn delete_preview(&self, map: MapId, user: &UserId) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.clone();
        Box::pin(async move {
            self.write(map, |room| {
                Ok(match room.previews.remove(&user) {
                    Some(_) => vec![Topic::Previews],
                    None => Vec::new(),
                })
            })
        })
    }

    fn clear_temporary(&self, map: MapId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                room.shapes.retain(|_, s| s.persistent);
                room.drawings.clear();
                room.pings.clear();
                Ok(vec![Topic::Shapes, Topic::Drawings, Topic::Pings])
            })
        })
    }

    fn clear_all(&self, map: MapId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                room.shapes.clear();
                room.drawings.clear();
                room.pings.clear();
                Ok(vec![Topic::Shapes, Topic::Drawings, Topic::Pings])
            })
        })
    }

    fn clear_by_user(&self, map: MapId, user: &UserId) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.shapes.retain(|_, s| s.created_by != user);
                room.drawings.retain(|_, d| d.created_by != user);
                room.pings.retain(|_, p| p.created_by != user);
                Ok(vec![Topic::Shapes, Topic::Drawings, Topic::Pings])
            })
        })
    }

    fn subscribe_lights(&self, map: MapId, callback: Callback<Vec<Light>>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.lights.clone(), room.lights()))
    }

    fn create_light(&self, map: MapId, light: &Light) -> BoxFuture<'_, StoreResult<()>> {
        let light = light.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.lights.insert(light.id, light);
                Ok(vec![Topic::Lights])
            })
        })
    }

    fn update_light(&self, map: MapId, light: &Light) -> BoxFuture<'_, StoreResult<()>> {
        let light = light.clone();
        Box::pin(async move {
            self.write(map, |room| {
                let stored = room
                    .lights
                    .get_mut(&light.id)
                    .ok_or_else(|| StoreError::NotFound(format!("light {}", light.id)))?;
                *stored = light;
                Ok(vec![Topic::Lights])
            })
        })
    }

    fn delete_light(&self, map: MapId, id: LightId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.write(map, |room| {
                Ok(match room.lights.remove(&id) {
                    Some(_) => vec![Topic::Lights],
                    None => Vec::new(),
                })
            })
        })
    }

    fn subscribe_global_lighting(&self, map: MapId, callback: Callback<GlobalLighting>) -> Subscription {
        self.subscribe(map, callback, |room| (room.topics.global.clone(), room.global.clone()))
    }

    fn update_global_lighting(&self, map: MapId, lighting: &GlobalLighting) -> BoxFuture<'_, StoreResult<()>> {
        let lighting = lighting.clone();
        Box::pin(async move {
            self.write(map, |room| {
                room.global = lighting;
                Ok(vec![Topic::Global])
            })
        })
    }
}
