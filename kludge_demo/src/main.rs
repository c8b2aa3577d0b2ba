//! Kludge demo driver
//!
//! `kludge_demo [helloworld|depthbuf|texquad|gui|compute]` (default: helloworld)

mod app;
mod compute_demo;
mod gui_demo;
mod texquad_demo;

use std::process::ExitCode;

use kludge_engine::kludge::device::Format;
use glam::Vec4;
use kludge_engine::kludge::{Config, Result, SessionDesc};
use kludge_engine::engine_error;
use winit::event_loop::{ControlFlow, EventLoop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demo {
    HelloWorld,
    DepthBuffer,
    TexQuad,
    Gui,
    Compute,
}

impl Demo {
    fn parse(arg: Option<&str>) -> Option<Self> {
        match arg {
            None | Some("helloworld") => Some(Demo::HelloWorld),
            Some("depthbuf") => Some(Demo::DepthBuffer),
            Some("texquad") => Some(Demo::TexQuad),
            Some("gui") => Some(Demo::Gui),
            Some("compute") => Some(Demo::Compute),
            Some(_) => None,
        }
    }

    /// What the windowed demos draw
    pub fn session_desc(&self) -> Result<SessionDesc> {
        Ok(match self {
            Demo::DepthBuffer => SessionDesc::new("depthbuf", 6).with_depth(Format::D32_SFLOAT),
            Demo::TexQuad => texquad_demo::session_desc(texquad_demo::load_image()?)?,
            Demo::Gui => SessionDesc::new("helloworld", 3).with_gui(),
            Demo::HelloWorld | Demo::Compute => SessionDesc::new("helloworld", 3),
        })
    }

    /// Per-demo tweaks of the shared configuration
    pub fn configure(&self, config: &mut Config) {
        if *self == Demo::TexQuad {
            let [r, g, b] = texquad_demo::BACKGROUND;
            config.clear_color = Vec4::new(r, g, b, 1.0);
        }
    }
}

fn demo_config() -> Config {
    Config {
        app_name: "Kludge Demo".to_string(),
        shader_root: concat!(env!("OUT_DIR"), "/shaders").into(),
        ..Config::default()
    }
}

fn main() -> ExitCode {
    let arg = std::env::args().nth(1);
    let Some(demo) = Demo::parse(arg.as_deref()) else {
        eprintln!("usage: kludge_demo [helloworld|depthbuf|texquad|gui|compute]");
        return ExitCode::from(2);
    };

    let mut config = demo_config();
    demo.configure(&mut config);
    let result = if demo == Demo::Compute {
        compute_demo::run(&config)
    } else {
        run_windowed(demo, config)
    };

    #[cfg(feature = "vulkan-validation")]
    kludge_engine_renderer_vulkan::kludge::print_validation_stats_report();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            engine_error!("kludge_demo", "{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_windowed(demo: Demo, config: Config) -> kludge_engine::kludge::Result<()> {
    let event_loop = EventLoop::new()
        .map_err(|e| kludge_engine::kludge::Error::InitializationFailed(format!("event loop: {}", e)))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = app::App::new(demo, config);
    event_loop
        .run_app(&mut app)
        .map_err(|e| kludge_engine::kludge::Error::BackendError(format!("event loop: {}", e)))?;
    app.into_result()
}
