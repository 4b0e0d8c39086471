//! One connected user: a session plus its store subscriptions.

use kurbo::{Point, Size};
use std::sync::mpsc::{Receiver, channel};
use tableink_core::input::{MouseButton, PointerEvent};
use tableink_core::store::flush;
use tableink_core::{
    EngineConfig, InteractionResult, MapId, MapStore, Millis, RemoteUpdate, Role, Subscription, TableSession,
    subscribe_updates,
};

pub struct Client {
    pub session: TableSession,
    updates: Receiver<RemoteUpdate>,
    subscriptions: Vec<Subscription>,
}

impl Client {
    /// Join `map` as `user`, taking the initial snapshots right away.
    pub fn join(store: &dyn MapStore, map: MapId, user: &str, role: Role, config: EngineConfig, screen: Size) -> Self {
        let (tx, rx) = channel();
        let mut session = TableSession::new(user, role, config);
        session.set_screen_size(screen);
        let subscriptions = subscribe_updates(store, map, &tx);
        let mut client = Self {
            session,
            updates: rx,
            subscriptions,
        };
        client.drain();
        log::info!("{} joined map {} as {:?}", user, map, role);
        client
    }

    /// Apply every update the store has delivered so far.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates.try_recv() {
            self.session.apply_remote(update);
            applied += 1;
        }
        applied
    }

    /// Send queued writes. Returns how many failed.
    pub async fn flush(&mut self, store: &dyn MapStore, map: MapId) -> usize {
        let commands = self.session.take_outgoing();
        if commands.is_empty() {
            return 0;
        }
        flush(store, map, commands).await
    }

    pub fn press(&mut self, at: Point, now: Millis) -> InteractionResult<()> {
        let position = self.session.viewport().map_to_screen(at);
        self.session.handle_pointer(
            PointerEvent::Down {
                position,
                button: MouseButton::Left,
            },
            now,
        )
    }

    pub fn release(&mut self, at: Point, now: Millis) -> InteractionResult<()> {
        let position = self.session.viewport().map_to_screen(at);
        self.session.handle_pointer(
            PointerEvent::Up {
                position,
                button: MouseButton::Left,
            },
            now,
        )
    }

    pub fn move_to(&mut self, at: Point, now: Millis) -> InteractionResult<()> {
        let position = self.session.viewport().map_to_screen(at);
        self.session.handle_pointer(PointerEvent::Move { position }, now)
    }

    pub fn click(&mut self, at: Point, now: Millis) -> InteractionResult<()> {
        self.press(at, now)?;
        self.release(at, now)
    }

    /// Tear the session down and drop the subscriptions.
    pub fn leave(&mut self) {
        self.session.teardown();
        self.subscriptions.clear();
    }
}
