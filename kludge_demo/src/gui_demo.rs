//! GUI overlay scene

use glam::Vec2;
use kludge_engine::kludge::gui::{DrawList, GuiFrame, GuiInput, GuiState};

const COLORS: [&str; 6] = ["Red", "Green", "Blue", "Cyan", "Magenta", "Yellow"];

#[derive(Debug)]
pub struct GuiDemo {
    state: GuiState,
    show_window: bool,
    checked: bool,
    clicks: u32,
    favorite: usize,
    remembered: usize,
}

impl GuiDemo {
    pub fn new() -> Self {
        Self {
            state: GuiState::new(),
            show_window: true,
            checked: false,
            clicks: 0,
            favorite: 0,
            remembered: 0,
        }
    }

    pub fn build(&mut self, input: GuiInput) -> DrawList {
        let mut ui = GuiFrame::new(&mut self.state, input);

        ui.set_next_window_pos(20.0, 20.0);
        if ui.begin("Gotta go fast") {
            let display = ui.input().display_size;
            let rate = ui.input().frame_rate();
            ui.text(format!("Display: {}x{}", display.x, display.y));
            if rate > 0.0 {
                ui.text(format!("{:.3} ms/frame ({:.1} FPS)", 1000.0 / rate, rate));
            }
            ui.end();
        }

        if self.show_window {
            ui.set_next_window_pos(20.0, 120.0);
            if ui.begin_closable("Dear GUI", &mut self.show_window) {
                ui.text("This is a GUI!");

                ui.checkbox("Yes?", &mut self.checked);
                ui.same_line();
                ui.text(if self.checked { "Check is checked" } else { "Check is not checked" });

                if ui.button("Increment!", Some(Vec2::new(200.0, 60.0))) {
                    self.clicks += 1;
                }
                ui.same_line();
                ui.text(format!("clicked {} times", self.clicks));

                ui.spacing();
                ui.text("What's your favorite color?");
                ui.combo("favorite", &COLORS, &mut self.favorite);

                ui.spacing();
                ui.text("Wait, what's that color again?");
                ui.list_box(&COLORS, &mut self.remembered);
                ui.end();
            }
        }

        ui.finish()
    }
}

#[cfg(test)]
#[path = "gui_demo_tests.rs"]
mod tests;
