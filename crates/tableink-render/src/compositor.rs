//! Layer compositor: turns a session's state into a display list.
//!
//! Layers are drawn bottom to top in [`Layer::ALL`] order and skipped when
//! toggled off. Everything is filtered for the session's role, so a player's
//! frame never contains hidden tokens, DM-only shapes or what lies under fog.

use crate::display_list::{Blend, DisplayList, DrawCommand};
use crate::renderer::{RenderContext, RenderResult};
use kurbo::{Affine, BezPath, Circle, Point, Rect, Shape as _, Vec2};
use peniko::Color;
use tableink_core::Millis;
use tableink_core::color::Rgba8;
use tableink_core::ephemeral::ShapeGeometry;
use tableink_core::fog::FogData;
use tableink_core::grid::GridCell;
use tableink_core::layers::Layer;
use tableink_core::lighting::LightingFrame;
use tableink_core::map::{MapSettings, Role};
use tableink_core::session::TableSession;
use tableink_core::tokens::{Token, TokenKind};

/// Segments used to approximate circles and cones.
const OUTLINE_SEGMENTS: usize = 48;
const PREVIEW_DASH: [f64; 2] = [8.0, 6.0];
/// Ping radius in screen pixels at glow scale 1.
const PING_RADIUS: f64 = 14.0;
/// Arrowhead length in map pixels.
const ARROW_HEAD: f64 = 18.0;
/// Glow strength of placed lights relative to their intensity.
const GLOW_ALPHA: f64 = 0.35;
const MAP_FILL: Rgba8 = Rgba8::rgb(58, 58, 64);
const REVEALED_OUTLINE_ALPHA: f64 = 0.2;

fn token_color(kind: TokenKind) -> Rgba8 {
    match kind {
        TokenKind::Player => Rgba8::rgb(59, 130, 246),
        TokenKind::Npc => Rgba8::rgb(34, 197, 94),
        TokenKind::Monster => Rgba8::rgb(239, 68, 68),
        TokenKind::Object => Rgba8::rgb(148, 163, 184),
    }
}

/// Build the display list for one frame.
pub fn compose(ctx: &RenderContext, list: &mut DisplayList) -> RenderResult<()> {
    ctx.validate()?;
    list.clear();
    list.set_background(ctx.background_color);

    let Some(map) = ctx.session.map() else {
        log::debug!("No map yet, drawing background only");
        return Ok(());
    };
    let frame = Frame::new(ctx, map);
    for layer in ctx.session.layers.visible_layers() {
        list.begin_layer(layer);
        match layer {
            Layer::Background => frame.background(list),
            Layer::Grid => frame.grid(list),
            Layer::Lighting => frame.lighting(list),
            Layer::Tokens => frame.tokens(list),
            Layer::Fog => frame.fog(list),
            Layer::Annotations => frame.annotations(list),
        }
    }
    list.end_layer();
    Ok(())
}

struct Frame<'a> {
    ctx: &'a RenderContext<'a>,
    session: &'a TableSession,
    map: &'a MapSettings,
    /// Map space to physical pixels.
    transform: Affine,
    /// Physical pixels per map pixel.
    zoom: f64,
    role: Role,
    now: Millis,
    lighting: Option<LightingFrame>,
}

impl<'a> Frame<'a> {
    fn new(ctx: &'a RenderContext<'a>, map: &'a MapSettings) -> Self {
        let session = ctx.session;
        let viewport = session.viewport();
        Self {
            ctx,
            session,
            map,
            transform: Affine::scale(ctx.scale_factor) * viewport.transform(),
            zoom: viewport.scale() * ctx.scale_factor,
            role: session.role(),
            now: session.now(),
            lighting: session.lighting_frame(),
        }
    }

    /// Screen-space stroke width for a width given in logical pixels.
    fn px(&self, width: f64) -> f64 {
        width * self.ctx.scale_factor
    }

    fn polygon(&self, points: &[Point], close: bool) -> BezPath {
        let mut path = BezPath::new();
        let mut iter = points.iter();
        if let Some(first) = iter.next() {
            path.move_to(*first);
            for p in iter {
                path.line_to(*p);
            }
            if close {
                path.close_path();
            }
        }
        self.transform * path
    }

    fn rect(&self, rect: Rect) -> BezPath {
        self.transform * rect.to_path(0.1)
    }

    fn is_fogged(&self, position: Point) -> bool {
        if !self.map.fog_active() {
            return false;
        }
        match self.session.fog() {
            Some(fog) => !fog.is_revealed(self.map.grid().cell_at(position)),
            None => false,
        }
    }

    fn background(&self, list: &mut DisplayList) {
        let bounds = self.map.bounds();
        list.push(DrawCommand::Fill {
            path: self.rect(bounds),
            color: MAP_FILL.to_color(1.0),
            blend: Blend::Over,
        });
        if let Some(source) = &self.map.image_url {
            list.push(DrawCommand::Image {
                source: source.clone(),
                rect: self.transform.transform_rect_bbox(bounds),
            });
        }
    }

    fn grid(&self, list: &mut DisplayList) {
        let map = self.map;
        if !map.grid_enabled || map.grid_size <= 0.0 {
            return;
        }
        let mut path = BezPath::new();
        let mut x = map.grid_offset_x.rem_euclid(map.grid_size);
        while x <= map.width {
            path.move_to(Point::new(x, 0.0));
            path.line_to(Point::new(x, map.height));
            x += map.grid_size;
        }
        let mut y = map.grid_offset_y.rem_euclid(map.grid_size);
        while y <= map.height {
            path.move_to(Point::new(0.0, y));
            path.line_to(Point::new(map.width, y));
            y += map.grid_size;
        }
        list.push(DrawCommand::Stroke {
            path: self.transform * path,
            color: map.grid_color.to_color(map.grid_opacity),
            width: self.px(1.0),
            dash: None,
        });
    }

    fn lighting(&self, list: &mut DisplayList) {
        let Some(frame) = &self.lighting else {
            return;
        };
        list.push(DrawCommand::Fill {
            path: self.rect(self.map.bounds()),
            color: Rgba8::black().to_color(frame.ambient.darkness_opacity),
            blend: Blend::Over,
        });
        for light in &frame.lights {
            list.push(DrawCommand::RadialFill {
                center: self.transform * light.position,
                radius: light.radius * self.zoom,
                inner: Rgba8::black().to_color(light.intensity),
                outer: Color::TRANSPARENT,
                blend: Blend::Erase,
            });
        }
        for light in frame.lights.iter().filter(|l| !l.natural) {
            list.push(DrawCommand::RadialFill {
                center: self.transform * light.position,
                radius: light.radius * self.zoom,
                inner: light.color.to_color(light.intensity * GLOW_ALPHA),
                outer: light.color.to_color(0.0),
                blend: Blend::Add,
            });
        }
    }

    fn can_see_stats(&self, token: &Token) -> bool {
        self.role.is_dm() || token.owner_id.as_ref() == Some(self.session.user_id())
    }

    fn tokens(&self, list: &mut DisplayList) {
        let dragged = self.session.dragged_token();
        for token in self.session.tokens().visible(self.role) {
            if token.staged {
                continue;
            }
            let position = self.session.token_position(token);
            let mine = token.owner_id.as_ref() == Some(self.session.user_id());
            if !self.role.is_dm() && !mine && self.is_fogged(position) {
                continue;
            }

            let alpha = if token.hidden { 0.5 } else { 1.0 };
            let radius = token.size.width.min(token.size.height) / 2.0;
            let body = self.transform * Circle::new(position, radius).to_path(0.1);
            list.push(DrawCommand::Fill {
                path: body.clone(),
                color: token_color(token.kind).to_color(alpha),
                blend: Blend::Over,
            });
            let (ring, width) = if dragged == Some(token.id) {
                (Rgba8::white(), 3.0)
            } else {
                (Rgba8::rgb(15, 15, 20), 2.0)
            };
            list.push(DrawCommand::Stroke {
                path: body,
                color: ring.to_color(alpha),
                width: self.px(width),
                dash: None,
            });

            let half = Vec2::new(token.size.width / 2.0, token.size.height / 2.0);
            if self.can_see_stats(token) && token.max_hp > 0 {
                let top = position.y + half.y + 4.0;
                let bar = Rect::new(position.x - half.x, top, position.x + half.x, top + 6.0);
                let ratio = f64::from(token.hp.max(0)) / f64::from(token.max_hp);
                list.push(DrawCommand::Fill {
                    path: self.rect(bar),
                    color: Rgba8::rgb(30, 30, 30).to_color(0.8),
                    blend: Blend::Over,
                });
                list.push(DrawCommand::Fill {
                    path: self.rect(Rect::new(bar.x0, bar.y0, bar.x0 + bar.width() * ratio, bar.y1)),
                    color: Rgba8::rgb(34, 197, 94).to_color(1.0),
                    blend: Blend::Over,
                });
            }
            if self.ctx.show_labels {
                if let Some(name) = &token.name {
                    list.push(DrawCommand::Label {
                        text: name.clone(),
                        position: self.transform * (position - Vec2::new(0.0, half.y + 6.0)),
                        size: self.px(12.0),
                        color: Color::WHITE,
                    });
                }
            }
        }
    }

    fn fog(&self, list: &mut DisplayList) {
        let Some(fog) = self.session.fog() else {
            return;
        };
        if !self.map.fog_active() {
            if self.map.fog_enabled && self.role.is_dm() {
                self.revealed_outlines(list, fog);
            }
            return;
        }
        let grid = self.map.grid();
        let bounds = self.map.bounds();

        // One subpath per horizontal run of hidden cells.
        let mut path = BezPath::new();
        for gy in 0..fog.grid_height as i64 {
            let mut run: Option<i64> = None;
            for gx in 0..=fog.grid_width as i64 {
                let hidden = gx < fog.grid_width as i64 && !fog.is_revealed(GridCell::new(gx, gy));
                match (hidden, run) {
                    (true, None) => run = Some(gx),
                    (false, Some(start)) => {
                        let from = grid.cell_origin(GridCell::new(start, gy));
                        let to = grid.cell_origin(GridCell::new(gx, gy + 1));
                        let cells = Rect::from_points(from, to).intersect(bounds);
                        if cells.area() > 0.0 {
                            path.extend(cells.path_elements(0.1));
                        }
                        run = None;
                    }
                    _ => {}
                }
            }
        }
        if path.elements().is_empty() {
            return;
        }

        let opacity = if self.role.is_dm() {
            self.ctx.dm_fog_opacity
        } else {
            1.0
        };
        let tint = match &self.lighting {
            Some(frame) => frame.ambient.fog_tint,
            None => Rgba8::from(self.ctx.fog_color),
        };
        list.push(DrawCommand::Fill {
            path: self.transform * path,
            color: tint.to_color(opacity),
            blend: Blend::Over,
        });
    }

    /// Faint outlines of revealed cells, shown to the DM while the grid is off.
    fn revealed_outlines(&self, list: &mut DisplayList, fog: &FogData) {
        let grid = self.map.grid();
        let bounds = self.map.bounds();
        let mut path = BezPath::new();
        for (cell, _) in fog.map_cells().filter(|(_, revealed)| *revealed) {
            let origin = grid.cell_origin(cell);
            let rect = Rect::from_origin_size(origin, (grid.size, grid.size)).intersect(bounds);
            if rect.area() > 0.0 {
                path.extend(rect.path_elements(0.1));
            }
        }
        if !path.elements().is_empty() {
            list.push(DrawCommand::Stroke {
                path: self.transform * path,
                color: Rgba8::white().to_color(REVEALED_OUTLINE_ALPHA),
                width: self.px(1.0),
                dash: None,
            });
        }
    }

    fn geometry(&self, list: &mut DisplayList, geometry: &ShapeGeometry, color: Rgba8, opacity: f64, dash: Option<[f64; 2]>) {
        let outline = self.polygon(&geometry.outline(OUTLINE_SEGMENTS), true);
        list.push(DrawCommand::Fill {
            path: outline.clone(),
            color: color.to_color(opacity),
            blend: Blend::Over,
        });
        list.push(DrawCommand::Stroke {
            path: outline,
            color: color.to_color((opacity * 2.0).min(1.0)),
            width: self.px(2.0),
            dash,
        });
    }

    fn annotations(&self, list: &mut DisplayList) {
        let config = self.session.config();
        let annotations = self.session.annotations();

        for shape in annotations.visible_shapes(self.role) {
            let opacity = shape.current_opacity(self.now, &config.lifecycle.shape_fade);
            if opacity > 0.0 {
                self.geometry(list, &shape.geometry, shape.color, opacity, None);
            }
        }

        for drawing in annotations.drawings() {
            let opacity = drawing.current_opacity(self.now, &config.lifecycle);
            if opacity <= 0.0 {
                continue;
            }
            let color = drawing.color.to_color(opacity);
            list.push(DrawCommand::Stroke {
                path: self.polygon(&drawing.points, false),
                color,
                width: drawing.width * self.zoom,
                dash: None,
            });
            if let Some(head) = drawing.arrow_head(ARROW_HEAD) {
                list.push(DrawCommand::Fill {
                    path: self.polygon(&head, true),
                    color,
                    blend: Blend::Over,
                });
            }
        }

        for ping in annotations.pings() {
            let look = ping.appearance(self.now, &config.ping);
            if look.opacity <= 0.0 {
                continue;
            }
            let center = self.transform * ping.position;
            let radius = self.px(PING_RADIUS * look.glow_scale);
            list.push(DrawCommand::RadialFill {
                center,
                radius: radius * 1.6,
                inner: look.color.to_color(look.opacity * 0.5),
                outer: look.color.to_color(0.0),
                blend: Blend::Add,
            });
            list.push(DrawCommand::Stroke {
                path: Circle::new(center, radius).to_path(0.1),
                color: look.color.to_color(look.opacity),
                width: self.px(3.0),
                dash: None,
            });
        }

        for preview in self.session.remote_previews() {
            self.geometry(list, &preview.geometry, preview.color, preview.opacity, Some(PREVIEW_DASH));
        }
        if let Some(own) = self.session.own_preview() {
            self.geometry(list, &own.geometry, own.color, own.opacity, None);
        }

        if let Some(ruler) = self.session.ruler() {
            list.push(DrawCommand::Stroke {
                path: self.polygon(&[ruler.from, ruler.to], false),
                color: Color::WHITE,
                width: self.px(2.0),
                dash: Some(PREVIEW_DASH),
            });
            list.push(DrawCommand::Label {
                text: format!("{:.0} ft", ruler.measurement.feet),
                position: self.transform * ruler.from.midpoint(ruler.to),
                size: self.px(14.0),
                color: Color::WHITE,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Size;
    use tableink_core::config::EngineConfig;
    use tableink_core::ephemeral::{ShapeGeometry, ShapeKind};
    use tableink_core::preview::ShapePreview;
    use tableink_core::session::RemoteUpdate;

    fn map(fog: bool) -> MapSettings {
        let mut map = MapSettings::new(500.0, 400.0);
        map.fog_enabled = fog;
        map
    }

    fn session(user: &str, role: Role, map: MapSettings) -> TableSession {
        let mut session = TableSession::new(user, role, EngineConfig::default());
        session.apply_remote(RemoteUpdate::Fog(FogData::for_map(&map)));
        session.apply_remote(RemoteUpdate::Map(map));
        session
    }

    fn render(session: &TableSession) -> DisplayList {
        let ctx = RenderContext::new(session, Size::new(800.0, 600.0));
        let mut list = DisplayList::new();
        compose(&ctx, &mut list).unwrap();
        list
    }

    fn strokes(commands: &[DrawCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Stroke { .. }))
            .count()
    }

    #[test]
    fn test_layers_drawn_in_order() {
        let mut dm = session("dm", Role::Dm, map(false));
        let list = render(&dm);
        assert_eq!(list.layers(), Layer::ALL.to_vec());

        dm.layers.set(Layer::Grid, false);
        dm.layers.set(Layer::Fog, false);
        let list = render(&dm);
        assert_eq!(
            list.layers(),
            vec![Layer::Background, Layer::Lighting, Layer::Tokens, Layer::Annotations]
        );
    }

    #[test]
    fn test_no_map_draws_background_only() {
        let session = TableSession::new("dm", Role::Dm, EngineConfig::default());
        let list = render(&session);
        assert!(list.is_empty());
        assert!(list.layers().is_empty());
        assert!(list.background().is_some());
    }

    #[test]
    fn test_invalid_viewport_rejected() {
        let session = session("dm", Role::Dm, map(false));
        let ctx = RenderContext::new(&session, Size::new(0.0, 600.0));
        let mut list = DisplayList::new();
        assert!(compose(&ctx, &mut list).is_err());
    }

    #[test]
    fn test_grid_is_one_batched_stroke() {
        let mut dm = session("dm", Role::Dm, map(false));
        assert_eq!(strokes(render(&dm).layer_commands(Layer::Grid)), 1);

        let mut settings = dm.map().unwrap().clone();
        settings.grid_enabled = false;
        dm.apply_remote(RemoteUpdate::Map(settings));
        assert!(render(&dm).layer_commands(Layer::Grid).is_empty());
    }

    #[test]
    fn test_fog_opaque_for_players_translucent_for_dm() {
        let player = session("p1", Role::Player, map(true));
        let fog = render(&player).layer_commands(Layer::Fog).to_vec();
        assert_eq!(fog.len(), 1);
        let DrawCommand::Fill { color, .. } = &fog[0] else {
            panic!("expected a fill");
        };
        assert_eq!(color.to_rgba8().a, 255);

        let dm = session("dm", Role::Dm, map(true));
        let fog = render(&dm).layer_commands(Layer::Fog).to_vec();
        let DrawCommand::Fill { color, .. } = &fog[0] else {
            panic!("expected a fill");
        };
        assert_eq!(color.to_rgba8().a, 128);
    }

    #[test]
    fn test_fog_off_draws_nothing() {
        let player = session("p1", Role::Player, map(false));
        assert!(render(&player).layer_commands(Layer::Fog).is_empty());
    }

    #[test]
    fn test_gridless_fog_outlines_for_dm_only() {
        let mut settings = map(true);
        settings.grid_enabled = false;
        let mut fog = FogData::for_map(&settings);
        fog.reveal_area(GridCell::new(2, 2), 1);

        let mut dm = TableSession::new("dm", Role::Dm, EngineConfig::default());
        dm.apply_remote(RemoteUpdate::Fog(fog.clone()));
        dm.apply_remote(RemoteUpdate::Map(settings.clone()));
        let list = render(&dm);
        assert_eq!(strokes(list.layer_commands(Layer::Fog)), 1);

        let mut player = TableSession::new("p1", Role::Player, EngineConfig::default());
        player.apply_remote(RemoteUpdate::Fog(fog));
        player.apply_remote(RemoteUpdate::Map(settings));
        assert!(render(&player).layer_commands(Layer::Fog).is_empty());
    }

    #[test]
    fn test_hidden_tokens_only_for_dm() {
        let mut lurker = Token::new(TokenKind::Monster, Point::new(125.0, 125.0), Size::new(50.0, 50.0));
        lurker.hidden = true;

        let mut player = session("p1", Role::Player, map(false));
        player.apply_remote(RemoteUpdate::Tokens(vec![lurker.clone()]));
        assert!(render(&player).layer_commands(Layer::Tokens).is_empty());

        let mut dm = session("dm", Role::Dm, map(false));
        dm.apply_remote(RemoteUpdate::Tokens(vec![lurker]));
        let list = render(&dm);
        let tokens = list.layer_commands(Layer::Tokens);
        let DrawCommand::Fill { color, .. } = &tokens[0] else {
            panic!("expected the token body");
        };
        assert_eq!(color.to_rgba8().a, 128);
    }

    #[test]
    fn test_players_do_not_see_tokens_under_fog() {
        let hero = Token::new(TokenKind::Player, Point::new(125.0, 125.0), Size::new(50.0, 50.0)).with_owner("p1");
        let monster = Token::new(TokenKind::Monster, Point::new(425.0, 325.0), Size::new(50.0, 50.0));
        let tokens = vec![hero, monster];

        let mut player = session("p1", Role::Player, map(true));
        player.apply_remote(RemoteUpdate::Tokens(tokens.clone()));
        assert_eq!(strokes(render(&player).layer_commands(Layer::Tokens)), 1);

        let mut dm = session("dm", Role::Dm, map(true));
        dm.apply_remote(RemoteUpdate::Tokens(tokens));
        assert_eq!(strokes(render(&dm).layer_commands(Layer::Tokens)), 2);
    }

    #[test]
    fn test_staged_tokens_are_not_drawn() {
        let mut bench = Token::new(TokenKind::Npc, Point::new(125.0, 125.0), Size::new(50.0, 50.0));
        bench.staged = true;
        let mut dm = session("dm", Role::Dm, map(false));
        dm.apply_remote(RemoteUpdate::Tokens(vec![bench]));
        assert!(render(&dm).layer_commands(Layer::Tokens).is_empty());
    }

    #[test]
    fn test_remote_previews_are_dashed() {
        let mut player = session("p1", Role::Player, map(false));
        player.apply_remote(RemoteUpdate::Previews(vec![ShapePreview {
            user_id: "dm".into(),
            geometry: ShapeGeometry::from_drag(ShapeKind::Rectangle, Point::new(50.0, 50.0), Point::new(150.0, 150.0)),
            color: Rgba8::rgb(255, 0, 0),
            opacity: 0.5,
            updated_at: 0,
            expires_at: 30_000,
        }]));
        let list = render(&player);
        let dashed = list
            .layer_commands(Layer::Annotations)
            .iter()
            .filter(|c| matches!(c, DrawCommand::Stroke { dash: Some(_), .. }))
            .count();
        assert_eq!(dashed, 1);
    }

    #[test]
    fn test_lighting_cuts_darkness() {
        use tableink_core::lighting::{GlobalLighting, Light};

        let mut player = session("p1", Role::Player, map(false));
        player.apply_remote(RemoteUpdate::GlobalLighting(GlobalLighting {
            enabled: true,
            time_of_day: 0.0,
            ambient_light: 0.5,
        }));
        player.apply_remote(RemoteUpdate::Lights(vec![Light::new(Point::new(250.0, 200.0), 100.0)]));
        let list = render(&player);
        let lighting = list.layer_commands(Layer::Lighting);
        assert!(matches!(lighting[0], DrawCommand::Fill { .. }));
        let erase = lighting
            .iter()
            .filter(|c| matches!(c, DrawCommand::RadialFill { blend: Blend::Erase, .. }))
            .count();
        assert_eq!(erase, 1);
    }
}
