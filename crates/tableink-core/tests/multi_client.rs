//! Several clients sharing one map through the in-memory store.

use kurbo::{Point, Size};
use std::sync::mpsc::{Receiver, channel};
use tableink_core::config::EngineConfig;
use tableink_core::ephemeral::{ShapeGeometry, ShapeKind};
use tableink_core::grid::GridCell;
use tableink_core::input::{MouseButton, PointerEvent};
use tableink_core::lighting::{GlobalLighting, Light};
use tableink_core::map::{MapId, MapSettings, Role};
use tableink_core::session::{RemoteUpdate, TableSession, subscribe_updates};
use tableink_core::store::{MapStore, MemoryStore, Subscription, flush};
use tableink_core::tokens::{Token, TokenKind};
use tableink_core::tools::ToolKind;
use tableink_core::{InteractionError, Millis, StoreCommand};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);
    loop {
        if let Poll::Ready(v) = f.as_mut().poll(&mut cx) {
            return v;
        }
    }
}

struct Client {
    session: TableSession,
    updates: Receiver<RemoteUpdate>,
    _subscriptions: Vec<Subscription>,
}

impl Client {
    fn join(store: &MemoryStore, map: MapId, user: &str, role: Role) -> Self {
        let (tx, rx) = channel();
        let subscriptions = subscribe_updates(store, map, &tx);
        let mut client = Self {
            session: TableSession::new(user, role, EngineConfig::default()),
            updates: rx,
            _subscriptions: subscriptions,
        };
        client.drain();
        client
    }

    fn drain(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            self.session.apply_remote(update);
        }
    }

    fn click(&mut self, p: Point, now: Millis) {
        self.down(p, now);
        self.up(p, now);
    }

    fn down(&mut self, position: Point, now: Millis) {
        self.session
            .handle_pointer(
                PointerEvent::Down {
                    position,
                    button: MouseButton::Left,
                },
                now,
            )
            .unwrap();
    }

    fn up(&mut self, position: Point, now: Millis) {
        self.session
            .handle_pointer(
                PointerEvent::Up {
                    position,
                    button: MouseButton::Left,
                },
                now,
            )
            .unwrap();
    }

    fn move_to(&mut self, position: Point, now: Millis) {
        self.session
            .handle_pointer(PointerEvent::Move { position }, now)
            .unwrap();
    }
}

/// Deliver updates and run queued writes until nobody has anything left.
fn settle(store: &MemoryStore, map: MapId, clients: &mut [&mut Client]) {
    for _ in 0..10 {
        let mut wrote = false;
        for client in clients.iter_mut() {
            client.drain();
            let commands = client.session.take_outgoing();
            if !commands.is_empty() {
                wrote = true;
                assert_eq!(block_on(flush(store, map, commands)), 0);
            }
        }
        if !wrote {
            return;
        }
    }
    panic!("clients kept writing");
}

fn setup() -> (MemoryStore, MapId, Client, Client) {
    let store = MemoryStore::new();
    let mut map = MapSettings::new(500.0, 400.0);
    map.grid_size = 50.0;
    map.fog_enabled = true;
    let id = map.id;
    block_on(store.create_map(&map)).unwrap();
    let dm = Client::join(&store, id, "dm", Role::Dm);
    let player = Client::join(&store, id, "p1", Role::Player);
    (store, id, dm, player)
}

#[test]
fn token_move_reveals_fog_for_everyone() {
    let (store, map, mut dm, mut player) = setup();
    settle(&store, map, &mut [&mut dm, &mut player]);

    let hero = Token::new(TokenKind::Player, Point::new(125.0, 125.0), Size::new(50.0, 50.0)).with_owner("p1");
    let id = hero.id;
    dm.session.create_token(hero).unwrap();
    settle(&store, map, &mut [&mut dm, &mut player]);
    assert!(store.fog(map).unwrap().is_revealed(GridCell::new(2, 2)));
    assert!(!store.fog(map).unwrap().is_revealed(GridCell::new(6, 2)));
    assert_eq!(player.session.tokens().len(), 1);

    player.down(Point::new(125.0, 125.0), 0);
    player.move_to(Point::new(170.0, 130.0), 10);
    player.up(Point::new(182.0, 131.0), 20);
    settle(&store, map, &mut [&mut dm, &mut player]);

    let stored = store.tokens(map);
    assert_eq!(stored[0].position, Point::new(175.0, 125.0));
    assert_eq!(dm.session.tokens().get(id).unwrap().position, Point::new(175.0, 125.0));
    assert!(store.fog(map).unwrap().is_revealed(GridCell::new(6, 2)));
    assert!(dm.session.fog().unwrap().is_revealed(GridCell::new(6, 2)));
}

#[test]
fn temporary_shape_fades_and_is_deleted() {
    let (store, map, mut dm, mut player) = setup();
    dm.session
        .select_tool(ToolKind::Shape(ShapeKind::Circle))
        .unwrap();
    dm.click(Point::new(100.0, 100.0), 1000);
    dm.move_to(Point::new(150.0, 100.0), 1100);
    dm.click(Point::new(150.0, 100.0), 1200);
    settle(&store, map, &mut [&mut dm, &mut player]);

    assert!(player.session.remote_previews().is_empty());
    let fade = EngineConfig::default().lifecycle.shape_fade;
    let shapes = player.session.annotations().visible_shapes(Role::Player);
    assert_eq!(shapes.len(), 1);
    let shape = shapes[0].clone();
    assert_eq!(shape.current_opacity(1200 + 2999, &fade), shape.opacity);
    assert_eq!(shape.current_opacity(1200 + 4000, &fade), shape.opacity * 0.5);

    player.session.tick(6200);
    dm.session.tick(6200);
    settle(&store, map, &mut [&mut dm, &mut player]);
    assert!(store.shapes(map).is_empty());
    assert!(player.session.annotations().is_empty());
    assert!(dm.session.annotations().is_empty());
}

#[test]
fn fog_brush_stroke_is_one_write() {
    let (store, map, mut dm, mut player) = setup();
    settle(&store, map, &mut [&mut dm, &mut player]);
    let before = store.write_count();

    dm.session.select_tool(ToolKind::FogReveal).unwrap();
    dm.down(Point::new(110.0, 110.0), 0);
    dm.move_to(Point::new(120.0, 115.0), 5);
    dm.move_to(Point::new(135.0, 140.0), 10);
    dm.up(Point::new(140.0, 140.0), 15);
    settle(&store, map, &mut [&mut dm, &mut player]);

    assert_eq!(store.write_count(), before + 1);
    assert!(player.session.fog().unwrap().is_revealed(GridCell::new(2, 2)));
}

#[test]
fn previews_follow_the_gesture() {
    let (store, map, mut dm, mut player) = setup();
    dm.session
        .select_tool(ToolKind::Shape(ShapeKind::Rectangle))
        .unwrap();
    dm.click(Point::new(50.0, 50.0), 0);
    dm.move_to(Point::new(150.0, 150.0), 10);
    settle(&store, map, &mut [&mut dm, &mut player]);

    let previews = player.session.remote_previews();
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].user_id, "dm");
    assert!((previews[0].opacity - 0.3).abs() < 1e-9);
    assert!(dm.session.remote_previews().is_empty());

    dm.session.select_tool(ToolKind::Ping).unwrap();
    settle(&store, map, &mut [&mut dm, &mut player]);
    assert!(player.session.remote_previews().is_empty());
    assert!(store.previews(map).is_empty());
}

#[test]
fn failed_writes_are_not_fatal() {
    let (store, map, mut dm, _player) = setup();
    dm.session.select_tool(ToolKind::Ping).unwrap();
    store.set_unavailable(true);
    dm.click(Point::new(20.0, 20.0), 0);
    let commands = dm.session.take_outgoing();
    assert!(matches!(commands[0], StoreCommand::CreatePing { .. }));
    assert_eq!(block_on(flush(&store, map, commands)), 1);

    store.set_unavailable(false);
    dm.click(Point::new(30.0, 30.0), 10);
    assert_eq!(block_on(flush(&store, map, dm.session.take_outgoing())), 0);
    assert_eq!(store.pings(map).len(), 1);
}

#[test]
fn lighting_reaches_players() {
    let (store, map, mut dm, mut player) = setup();
    dm.session
        .set_global_lighting(GlobalLighting {
            enabled: true,
            time_of_day: 0.0,
            ambient_light: 0.5,
        })
        .unwrap();
    dm.session
        .create_light(Light::new(Point::new(250.0, 200.0), 150.0).with_flicker(0.3))
        .unwrap();
    settle(&store, map, &mut [&mut dm, &mut player]);

    let frame = player.session.lighting_frame().unwrap();
    assert!(frame.ambient.is_night());
    assert_eq!(frame.lights.len(), 1);
    assert!(player.session.tick(0));
    // Lights reveal fog around themselves.
    assert!(store.fog(map).unwrap().is_revealed(GridCell::new(5, 4)));
}

#[test]
fn hidden_tokens_stay_hidden_from_players() {
    let (store, map, mut dm, mut player) = setup();
    let mut lurker = Token::new(TokenKind::Monster, Point::new(300.0, 300.0), Size::new(50.0, 50.0));
    lurker.hidden = true;
    dm.session.create_token(lurker).unwrap();
    settle(&store, map, &mut [&mut dm, &mut player]);

    assert_eq!(player.session.tokens().len(), 1);
    assert_eq!(player.session.tokens().visible(Role::Player).count(), 0);
    assert_eq!(dm.session.tokens().visible(Role::Dm).count(), 1);
}

#[test]
fn off_map_marks_never_reach_the_store() {
    let (store, map, mut dm, mut player) = setup();
    settle(&store, map, &mut [&mut dm, &mut player]);
    let before = store.write_count();
    let down = |position| PointerEvent::Down {
        position,
        button: MouseButton::Left,
    };

    dm.session.select_tool(ToolKind::Ping).unwrap();
    assert_eq!(
        dm.session.handle_pointer(down(Point::new(-500.0, -500.0)), 0),
        Err(InteractionError::OutOfBounds { x: -500.0, y: -500.0 })
    );
    dm.session.select_tool(ToolKind::Light).unwrap();
    assert!(dm.session.handle_pointer(down(Point::new(250.0, 450.0)), 10).is_err());
    player.session.select_tool(ToolKind::Arrow).unwrap();
    player.click(Point::new(100.0, 100.0), 20);
    assert!(player
        .session
        .handle_pointer(down(Point::new(700.0, 100.0)), 30)
        .is_err());
    settle(&store, map, &mut [&mut dm, &mut player]);

    assert_eq!(store.write_count(), before);
    assert!(store.pings(map).is_empty());
    assert!(store.lights(map).is_empty());
    assert!(store.drawings(map).is_empty());
}

#[test]
fn player_shapes_do_not_snap_to_hidden_tokens() {
    let (store, map, mut dm, mut player) = setup();
    let mut lurker = Token::new(TokenKind::Monster, Point::new(112.0, 112.0), Size::new(50.0, 50.0));
    lurker.hidden = true;
    dm.session.create_token(lurker).unwrap();
    settle(&store, map, &mut [&mut dm, &mut player]);

    player
        .session
        .select_tool(ToolKind::Shape(ShapeKind::Circle))
        .unwrap();
    player.click(Point::new(108.0, 108.0), 0);
    player.move_to(Point::new(160.0, 108.0), 10);
    player.click(Point::new(160.0, 108.0), 20);
    settle(&store, map, &mut [&mut dm, &mut player]);

    let shapes = store.shapes(map);
    assert_eq!(shapes.len(), 1);
    assert_eq!(
        shapes[0].geometry,
        ShapeGeometry::Circle {
            center: Point::new(100.0, 100.0),
            radius: 50.0,
        }
    );
}
