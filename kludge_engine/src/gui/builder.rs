/// Immediate-mode GUI builder
///
/// A `GuiFrame` is created once per frame from the current input, the
/// widgets are declared in order, and `finish` yields the `DrawList` for
/// the renderer. Only the open/closed state of combos survives between
/// frames, in `GuiState`.

use glam::{Vec2, Vec4};
use rustc_hash::FxHashSet;

use crate::gui::draw_list::{DrawCmd, DrawList, Rect, GLYPH_WIDTH, LINE_HEIGHT};

const PADDING: f32 = 8.0;
const ITEM_SPACING: f32 = 4.0;
const TITLE_HEIGHT: f32 = LINE_HEIGHT + 4.0;

const WINDOW_BG: Vec4 = Vec4::new(0.06, 0.06, 0.06, 0.94);
const TITLE_BG: Vec4 = Vec4::new(0.16, 0.29, 0.48, 1.0);
const FRAME_BG: Vec4 = Vec4::new(0.16, 0.29, 0.48, 0.54);
const FRAME_HOVERED: Vec4 = Vec4::new(0.26, 0.59, 0.98, 0.40);
const SELECTED_BG: Vec4 = Vec4::new(0.26, 0.59, 0.98, 0.31);
const CHECK_MARK: Vec4 = Vec4::new(0.26, 0.59, 0.98, 1.0);
const TEXT: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

/// Input snapshot for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuiInput {
    pub cursor: Vec2,
    /// Primary button went down this frame
    pub clicked: bool,
    pub display_size: Vec2,
    /// Seconds since the previous frame
    pub delta_time: f32,
}

impl Default for GuiInput {
    fn default() -> Self {
        Self {
            cursor: Vec2::splat(-1.0),
            clicked: false,
            display_size: Vec2::ZERO,
            delta_time: 0.0,
        }
    }
}

impl GuiInput {
    pub fn frame_rate(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }
}

/// State kept across frames
#[derive(Debug, Default)]
pub struct GuiState {
    open_combos: FxHashSet<String>,
    frames: u64,
}

impl GuiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_combo_open(&self, id: &str) -> bool {
        self.open_combos.contains(id)
    }
}

struct WindowLayout {
    origin: Vec2,
    cursor_y: f32,
    last_item: Option<Rect>,
    same_line: bool,
    content: Rect,
    background: usize,
}

pub struct GuiFrame<'a> {
    state: &'a mut GuiState,
    input: GuiInput,
    list: DrawList,
    next_window_pos: Option<Vec2>,
    window: Option<WindowLayout>,
    windows_begun: u32,
}

impl<'a> GuiFrame<'a> {
    pub fn new(state: &'a mut GuiState, input: GuiInput) -> Self {
        state.frames += 1;
        Self {
            state,
            input,
            list: DrawList::new(),
            next_window_pos: None,
            window: None,
            windows_begun: 0,
        }
    }

    pub fn input(&self) -> &GuiInput {
        &self.input
    }

    pub fn set_next_window_pos(&mut self, x: f32, y: f32) {
        self.next_window_pos = Some(Vec2::new(x, y));
    }

    /// Open a window; returns whether its content should be declared
    pub fn begin(&mut self, title: &str) -> bool {
        self.open_window(title, false);
        true
    }

    /// Open a window with a close button; clicking it clears `open`
    pub fn begin_closable(&mut self, title: &str, open: &mut bool) -> bool {
        if !*open {
            return false;
        }
        if self.open_window(title, true) {
            *open = false;
        }
        true
    }

    /// Close the current window and size its background to the content
    pub fn end(&mut self) {
        let Some(window) = self.window.take() else { return };
        let rect = Rect::new(window.origin, window.content.max + Vec2::splat(PADDING));
        self.list.patch(window.background, DrawCmd::Rect { rect, color: WINDOW_BG });
    }

    /// Place the next item on the same line as the previous one
    pub fn same_line(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.same_line = true;
        }
    }

    pub fn spacing(&mut self) {
        if let Some(window) = self.window.as_mut() {
            window.cursor_y += ITEM_SPACING * 2.0;
            window.same_line = false;
        }
    }

    pub fn text(&mut self, text: impl Into<String>) {
        let text = text.into();
        let rect = self.place(text_size(&text));
        self.list.text(rect.min, text, TEXT);
    }

    pub fn button(&mut self, label: &str, size: Option<Vec2>) -> bool {
        let size = size.unwrap_or_else(|| text_size(label) + Vec2::splat(ITEM_SPACING * 2.0));
        let rect = self.place(size);
        let hovered = rect.contains(self.input.cursor);
        self.list.rect(rect, if hovered { FRAME_HOVERED } else { FRAME_BG });
        let label_pos = rect.min + (rect.size() - text_size(label)) * 0.5;
        self.list.text(label_pos, label, TEXT);
        hovered && self.input.clicked
    }

    /// Checkbox bound to `value`; returns true when it was toggled this frame
    pub fn checkbox(&mut self, label: &str, value: &mut bool) -> bool {
        let size = Vec2::new(LINE_HEIGHT + ITEM_SPACING, 0.0) + text_size(label);
        let rect = self.place(size);
        let square = Rect::from_size(rect.min, Vec2::splat(LINE_HEIGHT));
        let hovered = rect.contains(self.input.cursor);
        let toggled = hovered && self.input.clicked;
        if toggled {
            *value = !*value;
        }
        self.list.rect(square, if hovered { FRAME_HOVERED } else { FRAME_BG });
        if *value {
            let inset = Rect::new(square.min + Vec2::splat(3.0), square.max - Vec2::splat(3.0));
            self.list.rect(inset, CHECK_MARK);
        }
        self.list
            .text(rect.min + Vec2::new(LINE_HEIGHT + ITEM_SPACING, 0.0), label, TEXT);
        toggled
    }

    /// Selectable row; returns true when clicked
    pub fn selectable(&mut self, label: &str, selected: bool) -> bool {
        let rect = self.place(text_size(label) + Vec2::new(ITEM_SPACING * 2.0, 0.0));
        let hovered = rect.contains(self.input.cursor);
        if selected || hovered {
            self.list.rect(rect, if hovered { FRAME_HOVERED } else { SELECTED_BG });
        }
        self.list.text(rect.min + Vec2::new(ITEM_SPACING, 0.0), label, TEXT);
        hovered && self.input.clicked
    }

    /// Drop-down picker over `items`; returns true when the selection changed
    pub fn combo(&mut self, id: &str, items: &[&str], selected: &mut usize) -> bool {
        let current = items.get(*selected).copied().unwrap_or("");
        let widest = items.iter().map(|item| item.chars().count()).max().unwrap_or(0);
        let size = Vec2::new((widest as f32 + 3.0) * GLYPH_WIDTH, LINE_HEIGHT);
        let header = self.place(size);
        let hovered = header.contains(self.input.cursor);
        self.list.rect(header, if hovered { FRAME_HOVERED } else { FRAME_BG });
        self.list.text(header.min + Vec2::new(ITEM_SPACING, 0.0), current, TEXT);
        self.list.text(
            Vec2::new(header.max.x - GLYPH_WIDTH * 1.5, header.min.y),
            "v",
            TEXT,
        );

        // the click that opens the combo must not also pick an item
        if hovered && self.input.clicked {
            if !self.state.open_combos.remove(id) {
                self.state.open_combos.insert(id.to_string());
            }
            return false;
        }
        if !self.state.open_combos.contains(id) {
            return false;
        }

        let mut changed = false;
        for (i, item) in items.iter().enumerate() {
            if self.selectable(item, i == *selected) {
                changed = i != *selected;
                *selected = i;
                self.state.open_combos.remove(id);
            }
        }
        changed
    }

    /// Always-open list of `items`; returns true when the selection changed
    pub fn list_box(&mut self, items: &[&str], selected: &mut usize) -> bool {
        let mut changed = false;
        for (i, item) in items.iter().enumerate() {
            if self.selectable(item, i == *selected) {
                changed |= i != *selected;
                *selected = i;
            }
        }
        changed
    }

    /// Close any window left open and hand the draw list to the renderer
    pub fn finish(mut self) -> DrawList {
        self.end();
        self.list
    }

    // ===== LAYOUT =====

    /// Returns true when the close button of the new window was clicked
    fn open_window(&mut self, title: &str, closable: bool) -> bool {
        self.end();
        let cascade = 20.0 + 30.0 * self.windows_begun as f32;
        let origin = self.next_window_pos.take().unwrap_or(Vec2::splat(cascade));
        self.windows_begun += 1;

        let background = self.list.rect(Rect::new(origin, origin), WINDOW_BG);
        let title_width = text_size(title).x + PADDING * 2.0 + GLYPH_WIDTH * 2.0;
        let title_bar = Rect::from_size(origin, Vec2::new(title_width, TITLE_HEIGHT));
        self.list.rect(title_bar, TITLE_BG);
        self.list.text(origin + Vec2::new(PADDING, 2.0), title, TEXT);

        let mut closed = false;
        if closable {
            let close = Rect::from_size(
                Vec2::new(title_bar.max.x - GLYPH_WIDTH * 2.0, origin.y + 2.0),
                Vec2::new(GLYPH_WIDTH * 1.5, LINE_HEIGHT),
            );
            self.list.text(close.min, "x", TEXT);
            closed = close.contains(self.input.cursor) && self.input.clicked;
        }

        self.window = Some(WindowLayout {
            origin,
            cursor_y: origin.y + TITLE_HEIGHT + PADDING,
            last_item: None,
            same_line: false,
            content: title_bar,
            background,
        });
        closed
    }

    /// Reserve a rectangle for the next item
    fn place(&mut self, size: Vec2) -> Rect {
        let Some(window) = self.window.as_mut() else {
            // items outside any window flow from the top-left corner
            return Rect::from_size(Vec2::splat(PADDING), size);
        };
        let min = match (window.same_line, window.last_item) {
            (true, Some(last)) => Vec2::new(last.max.x + ITEM_SPACING * 2.0, last.min.y),
            _ => Vec2::new(window.origin.x + PADDING, window.cursor_y),
        };
        let rect = Rect::from_size(min, size);
        window.same_line = false;
        window.last_item = Some(rect);
        window.cursor_y = window.cursor_y.max(rect.max.y + ITEM_SPACING);
        window.content = window.content.union(&rect);
        rect
    }
}

fn text_size(text: &str) -> Vec2 {
    Vec2::new(text.chars().count() as f32 * GLYPH_WIDTH, LINE_HEIGHT)
}
