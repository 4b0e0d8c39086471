//! Input state and the key-to-action mapping.
//!
//! Keys never trigger behaviour directly: the host feeds key events in, the
//! [`KeyBindings`] table turns them into [`Action`]s, and the session
//! applies the actions.

use crate::ephemeral::ShapeKind;
use crate::layers::Layer;
use crate::tools::ToolKind;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// Pointer event in screen coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { position: Point, button: MouseButton },
    Up { position: Point, button: MouseButton },
    Move { position: Point },
    Scroll { position: Point, delta: Vec2 },
}

/// Keyboard event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyEvent {
    Pressed(String),
    Released(String),
}

/// Tracks buttons, keys and modifiers across events.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Current pointer position in screen coordinates.
    pub pointer_position: Point,
    pressed_buttons: HashSet<MouseButton>,
    pub modifiers: Modifiers,
    pressed_keys: HashSet<String>,
    /// Screen position where the current left-button drag started.
    pub drag_start: Option<Point>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a pointer event.
    pub fn handle_pointer_event(&mut self, event: &PointerEvent) {
        match *event {
            PointerEvent::Down { position, button } => {
                self.pointer_position = position;
                self.pressed_buttons.insert(button);
                if button == MouseButton::Left && self.drag_start.is_none() {
                    self.drag_start = Some(position);
                }
            }
            PointerEvent::Up { position, button } => {
                self.pointer_position = position;
                self.pressed_buttons.remove(&button);
                if button == MouseButton::Left {
                    self.drag_start = None;
                }
            }
            PointerEvent::Move { position } | PointerEvent::Scroll { position, .. } => {
                self.pointer_position = position;
            }
        }
    }

    /// Process a key event. Returns true for a fresh press (not a repeat).
    pub fn handle_key_event(&mut self, event: &KeyEvent) -> bool {
        match event {
            KeyEvent::Pressed(key) => self.pressed_keys.insert(key.clone()),
            KeyEvent::Released(key) => {
                self.pressed_keys.remove(key);
                false
            }
        }
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_key_pressed(&self, key: &str) -> bool {
        self.pressed_keys.contains(key)
    }

    /// Forget everything held; used on teardown or focus loss.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Something the user asked for through the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    SelectTool(ToolKind),
    ToggleSnap,
    ToggleLayer(Layer),
    CancelGesture,
    ResetView,
    FitToMap,
    ClearTemporary,
    ClearMine,
    ClearAll,
    RevealAllFog,
    HideAllFog,
}

/// A key together with the modifiers that must be held.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyChord {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
}

impl KeyChord {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            shift: false,
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    fn from_event(key: &str, modifiers: Modifiers) -> Self {
        Self {
            key: key.to_string(),
            ctrl: modifiers.ctrl || modifiers.meta,
            shift: modifiers.shift,
        }
    }
}

impl fmt::Display for KeyChord {
    /// Format the chord for display (e.g., "Ctrl+Shift+X").
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Modifier that flips grid snapping while held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapModifier {
    #[default]
    Alt,
    Shift,
    Ctrl,
}

impl SnapModifier {
    pub fn is_held(self, modifiers: Modifiers) -> bool {
        match self {
            SnapModifier::Alt => modifiers.alt,
            SnapModifier::Shift => modifiers.shift,
            SnapModifier::Ctrl => modifiers.ctrl || modifiers.meta,
        }
    }
}

/// Injected key-to-action table.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: HashMap<KeyChord, Action>,
    pub snap_modifier: SnapModifier,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut bindings = Self::empty();
        for (chord, action) in [
            (KeyChord::new("V"), Action::SelectTool(ToolKind::Select)),
            (KeyChord::new("H"), Action::SelectTool(ToolKind::Pan)),
            (KeyChord::new("F"), Action::SelectTool(ToolKind::FogReveal)),
            (KeyChord::new("F").with_shift(), Action::SelectTool(ToolKind::FogHide)),
            (KeyChord::new("C"), Action::SelectTool(ToolKind::Shape(ShapeKind::Circle))),
            (KeyChord::new("R"), Action::SelectTool(ToolKind::Shape(ShapeKind::Rectangle))),
            (KeyChord::new("K"), Action::SelectTool(ToolKind::Shape(ShapeKind::Cone))),
            (KeyChord::new("L"), Action::SelectTool(ToolKind::Shape(ShapeKind::Line))),
            (KeyChord::new("P"), Action::SelectTool(ToolKind::Pen)),
            (KeyChord::new("A"), Action::SelectTool(ToolKind::Arrow)),
            (KeyChord::new("G"), Action::SelectTool(ToolKind::Ping)),
            (KeyChord::new("M"), Action::SelectTool(ToolKind::Ruler)),
            (KeyChord::new("T"), Action::SelectTool(ToolKind::Light)),
            (KeyChord::new("S"), Action::ToggleSnap),
            (KeyChord::new("1"), Action::ToggleLayer(Layer::Grid)),
            (KeyChord::new("2"), Action::ToggleLayer(Layer::Lighting)),
            (KeyChord::new("3"), Action::ToggleLayer(Layer::Tokens)),
            (KeyChord::new("4"), Action::ToggleLayer(Layer::Fog)),
            (KeyChord::new("5"), Action::ToggleLayer(Layer::Annotations)),
            (KeyChord::new("Escape"), Action::CancelGesture),
            (KeyChord::new("0").with_ctrl(), Action::ResetView),
            (KeyChord::new("1").with_ctrl(), Action::FitToMap),
            (KeyChord::new("Delete"), Action::ClearTemporary),
            (KeyChord::new("Delete").with_shift(), Action::ClearMine),
            (KeyChord::new("Delete").with_ctrl().with_shift(), Action::ClearAll),
        ] {
            bindings.bind(chord, action);
        }
        bindings
    }
}

impl KeyBindings {
    /// A table with no bindings.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
            snap_modifier: SnapModifier::default(),
        }
    }

    /// Bind a chord, replacing any previous action for it.
    pub fn bind(&mut self, chord: KeyChord, action: Action) -> Option<Action> {
        self.bindings.insert(chord, action)
    }

    pub fn unbind(&mut self, chord: &KeyChord) -> Option<Action> {
        self.bindings.remove(chord)
    }

    /// Action for a key press under the given modifiers.
    pub fn action_for(&self, key: &str, modifiers: Modifiers) -> Option<Action> {
        self.bindings.get(&KeyChord::from_event(key, modifiers)).copied()
    }

    /// Chords bound to an action, for help screens.
    pub fn chords_for(&self, action: Action) -> Vec<String> {
        let mut chords: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, a)| **a == action)
            .map(|(c, _)| c.to_string())
            .collect();
        chords.sort();
        chords
    }

    pub fn snap_inverted(&self, modifiers: Modifiers) -> bool {
        self.snap_modifier.is_held(modifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_press_and_release() {
        let mut input = InputState::new();
        input.handle_pointer_event(&PointerEvent::Down {
            position: Point::new(100.0, 100.0),
            button: MouseButton::Left,
        });
        assert!(input.is_button_pressed(MouseButton::Left));
        assert_eq!(input.drag_start, Some(Point::new(100.0, 100.0)));

        input.handle_pointer_event(&PointerEvent::Up {
            position: Point::new(120.0, 100.0),
            button: MouseButton::Left,
        });
        assert!(!input.is_button_pressed(MouseButton::Left));
        assert_eq!(input.drag_start, None);
        assert_eq!(input.pointer_position, Point::new(120.0, 100.0));
    }

    #[test]
    fn test_key_repeat_is_not_fresh() {
        let mut input = InputState::new();
        assert!(input.handle_key_event(&KeyEvent::Pressed("F".into())));
        assert!(!input.handle_key_event(&KeyEvent::Pressed("F".into())));
        assert!(input.is_key_pressed("F"));
        input.handle_key_event(&KeyEvent::Released("F".into()));
        assert!(!input.is_key_pressed("F"));
    }

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        let none = Modifiers::default();
        let shift = Modifiers {
            shift: true,
            ..Default::default()
        };
        assert_eq!(
            bindings.action_for("F", none),
            Some(Action::SelectTool(ToolKind::FogReveal))
        );
        assert_eq!(bindings.action_for("F", shift), Some(Action::SelectTool(ToolKind::FogHide)));
        assert_eq!(bindings.action_for("Q", none), None);
    }

    #[test]
    fn test_rebinding() {
        let mut bindings = KeyBindings::empty();
        bindings.bind(KeyChord::new("X"), Action::ToggleSnap);
        assert_eq!(bindings.action_for("X", Modifiers::default()), Some(Action::ToggleSnap));
        assert_eq!(bindings.chords_for(Action::ToggleSnap), vec!["X".to_string()]);
        bindings.unbind(&KeyChord::new("X"));
        assert_eq!(bindings.action_for("X", Modifiers::default()), None);
    }

    #[test]
    fn test_meta_counts_as_ctrl() {
        let bindings = KeyBindings::default();
        let meta = Modifiers {
            meta: true,
            ..Default::default()
        };
        assert_eq!(bindings.action_for("0", meta), Some(Action::ResetView));
    }

    #[test]
    fn test_chord_display() {
        assert_eq!(KeyChord::new("Delete").with_ctrl().with_shift().to_string(), "Ctrl+Shift+Delete");
    }

    #[test]
    fn test_snap_modifier() {
        let bindings = KeyBindings::default();
        let alt = Modifiers {
            alt: true,
            ..Default::default()
        };
        assert!(bindings.snap_inverted(alt));
        assert!(!bindings.snap_inverted(Modifiers::default()));
    }
}
