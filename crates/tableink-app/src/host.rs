//! Headless host: owns the store, runs clients and renders their frames.

use crate::client::Client;
use kurbo::{Point, Size};
use serde::Serialize;
use tableink_core::lighting::{GlobalLighting, Light};
use tableink_core::{
    EngineConfig, InteractionError, MapId, MapSettings, MapStore, MemoryStore, Millis, Role, ShapeKind, StoreError,
    Token, TokenKind, ToolKind,
};
use tableink_render::{DisplayListRenderer, RenderContext, Renderer, RendererError};
use thiserror::Error;

/// Rounds of deliver-and-flush before giving up on clients settling.
const MAX_SETTLE_ROUNDS: usize = 16;

/// Host errors.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Interaction rejected: {0}")]
    Interaction(#[from] InteractionError),
    #[error("Render error: {0}")]
    Render(#[from] RendererError),
}

/// Host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub engine: EngineConfig,
    /// Screen size every client renders at.
    pub screen: Size,
    pub map_size: Size,
    pub grid_size: f64,
    /// Clock step between ticks.
    pub frame_ms: Millis,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            screen: Size::new(1280.0, 800.0),
            map_size: Size::new(1000.0, 800.0),
            grid_size: 50.0,
            frame_ms: 50,
        }
    }
}

/// What one client drew on its last frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub user: String,
    pub commands: usize,
    pub layers: Vec<String>,
    pub tokens_drawn: usize,
}

/// Summary of a demo run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoReport {
    pub map_id: String,
    pub writes: usize,
    pub failed_writes: usize,
    pub tokens: usize,
    pub revealed_cells: usize,
    pub shapes_left: usize,
    pub pings_left: usize,
    pub frames: Vec<FrameReport>,
}

pub struct Host {
    config: HostConfig,
    store: MemoryStore,
    failed_writes: usize,
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            store: MemoryStore::new(),
            failed_writes: 0,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn join(&self, map: MapId, user: &str, role: Role) -> Client {
        Client::join(&self.store, map, user, role, self.config.engine.clone(), self.config.screen)
    }

    /// Deliver updates and flush writes until no client has anything queued.
    pub async fn settle(&mut self, map: MapId, clients: &mut [&mut Client]) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let mut wrote = false;
            for client in clients.iter_mut() {
                client.drain();
                if client.session.has_outgoing() {
                    wrote = true;
                    self.failed_writes += client.flush(&self.store, map).await;
                }
            }
            if !wrote {
                return;
            }
        }
        log::warn!("Clients still writing after {} rounds", MAX_SETTLE_ROUNDS);
    }

    /// Advance every client's clock to `until` in frame steps.
    pub async fn advance(&mut self, map: MapId, clients: &mut [&mut Client], from: Millis, until: Millis) {
        let mut now = from;
        while now < until {
            now = (now + self.config.frame_ms.max(1)).min(until);
            for client in clients.iter_mut() {
                client.session.tick(now);
            }
            self.settle(map, clients).await;
        }
    }

    /// Render one client's view.
    pub fn render(&self, client: &Client) -> Result<FrameReport, HostError> {
        let mut renderer = DisplayListRenderer::new();
        let ctx = RenderContext::new(&client.session, self.config.screen);
        renderer.build_scene(&ctx)?;
        let list = renderer.display_list();
        let tokens_drawn = list
            .layer_commands(tableink_core::Layer::Tokens)
            .iter()
            .filter(|c| matches!(c, tableink_render::DrawCommand::Stroke { .. }))
            .count();
        Ok(FrameReport {
            user: client.session.user_id().clone(),
            commands: list.len(),
            layers: list.layers().iter().map(|l| l.name().to_string()).collect(),
            tokens_drawn,
        })
    }

    /// Play a short scripted session: a DM sets the scene, a player moves
    /// their token through the fog, and temporary marks fade away.
    pub async fn run_demo(mut self) -> Result<DemoReport, HostError> {
        let mut settings = MapSettings::new(self.config.map_size.width, self.config.map_size.height);
        settings.grid_size = self.config.grid_size;
        settings.fog_enabled = true;
        let map = settings.id;
        self.store.create_map(&settings).await?;

        let mut dm = self.join(map, "dm", Role::Dm);
        let mut player = self.join(map, "player", Role::Player);

        let grid = self.config.grid_size;
        let size = Size::new(grid, grid);
        let cell = move |x: f64, y: f64| Point::new((x + 0.5) * grid, (y + 0.5) * grid);
        let start = cell(2.0, 2.0);
        dm.session.create_token(
            Token::new(TokenKind::Player, start, size)
                .with_name("Aria")
                .with_owner("player")
                .with_hp(24, 24),
        )?;
        dm.session
            .create_token(Token::new(TokenKind::Monster, cell(12.0, 8.0), size).with_name("Goblin"))?;
        let mut lurker = Token::new(TokenKind::Monster, cell(16.0, 12.0), size).with_name("Bandit");
        lurker.hidden = true;
        dm.session.create_token(lurker)?;
        self.settle(map, &mut [&mut dm, &mut player]).await;

        let target = cell(6.0, 4.0);
        player.press(start, 100)?;
        player.move_to(start.midpoint(target), 150)?;
        player.release(target, 200)?;
        self.settle(map, &mut [&mut dm, &mut player]).await;

        dm.session.select_tool(ToolKind::Ping)?;
        dm.click(cell(12.0, 8.0), 300)?;
        dm.session.select_tool(ToolKind::Shape(ShapeKind::Circle))?;
        dm.click(cell(12.0, 8.0), 400)?;
        dm.move_to(cell(14.0, 8.0), 450)?;
        dm.click(cell(14.0, 8.0), 500)?;
        dm.session.set_global_lighting(GlobalLighting {
            enabled: true,
            time_of_day: 22.0,
            ambient_light: 0.4,
        })?;
        dm.session
            .create_light(Light::new(cell(12.0, 8.0), 4.0 * grid).with_flicker(0.3))?;
        self.settle(map, &mut [&mut dm, &mut player]).await;

        let until = 500 + self.config.engine.lifecycle.shape_fade.end_ms() + 1000;
        self.advance(map, &mut [&mut dm, &mut player], 500, until).await;

        let frames = vec![self.render(&dm)?, self.render(&player)?];

        dm.leave();
        player.leave();
        self.settle(map, &mut [&mut dm, &mut player]).await;

        let report = DemoReport {
            map_id: map.to_string(),
            writes: self.store.write_count(),
            failed_writes: self.failed_writes,
            tokens: self.store.tokens(map).len(),
            revealed_cells: self.store.fog(map).map(|f| f.revealed_count()).unwrap_or(0),
            shapes_left: self.store.shapes(map).len(),
            pings_left: self.store.pings(map).len(),
            frames,
        };
        log::info!(
            "Demo finished: {} writes, {} failed, {} cells revealed",
            report.writes,
            report.failed_writes,
            report.revealed_cells
        );
        Ok(report)
    }
}
