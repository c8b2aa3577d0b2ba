//! Unit tests for presenter.rs

use crate::config::Config;
use crate::device::mock_device::{MockDevice, MockEvent, MockKind};
use crate::device::types::*;
use crate::error::Error;
use crate::presenter::{FrameStatus, Presenter};
use crate::session::{FrameInput, SessionDesc, SessionShaders, TEXTURE_BINDING};
use crate::shader::{ShaderCode, SPIRV_MAGIC};
use crate::upload::TextureData;
use crate::window::{FixedSurface, SurfaceProvider};
use std::sync::Arc;

fn shaders() -> SessionShaders {
    let code = |stage| ShaderCode::from_words("tri", stage, vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]).unwrap();
    SessionShaders {
        vertex: code(ShaderStage::Vertex),
        fragment: code(ShaderStage::Fragment),
        gui: None,
    }
}

fn presenter(device: &Arc<MockDevice>) -> Presenter<MockDevice> {
    Presenter::new(
        device.clone(),
        Config::default(),
        SessionDesc::new("tri", 3),
        shaders(),
        Extent2D::new(800, 600),
    )
    .unwrap()
}

fn input(width: u32, height: u32) -> FrameInput<'static> {
    FrameInput {
        drawable_extent: Extent2D::new(width, height),
        ..Default::default()
    }
}

fn swapchain_id(presenter: &Presenter<MockDevice>) -> u64 {
    presenter.session().unwrap().swapchain().unwrap().raw().unwrap().id
}

#[test]
fn test_steady_state_frames() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);

    for _ in 0..100 {
        assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Rendered);
    }

    let session = presenter.session().unwrap();
    let sync = session.sync().unwrap();
    let available = device.semaphore(sync.image_available.id);
    let finished = device.semaphore(sync.render_finished.id);
    assert_eq!((available.signals, available.waits, available.pending), (100, 100, false));
    assert_eq!((finished.signals, finished.waits, finished.pending), (100, 100, false));
    assert_eq!(presenter.stats().frames_rendered, 100);
    assert_eq!(presenter.stats().recreations, 0);
    assert!(device.violations().is_empty());
}

#[test]
fn test_submit_waits_and_signals_frame_semaphores() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    presenter.pump_frame(&input(800, 600)).unwrap();

    let sync = presenter.session().unwrap().sync().unwrap();
    let (available, finished) = (sync.image_available.id, sync.render_finished.id);
    let events = device.events();
    let acquire = events.iter().position(|e| matches!(e, MockEvent::Acquire { .. })).unwrap();
    let submit = events.iter().position(|e| matches!(e, MockEvent::Submit { .. })).unwrap();
    let present = events.iter().position(|e| matches!(e, MockEvent::Present { .. })).unwrap();
    assert!(acquire < submit && submit < present);

    match &events[submit] {
        MockEvent::Submit { queue, waits, signals, .. } => {
            assert_eq!(*queue, QueueKind::Graphics);
            assert_eq!(waits, &vec![(available, PipelineStage::COLOR_ATTACHMENT_OUTPUT)]);
            assert_eq!(signals, &vec![finished]);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match &events[present] {
        MockEvent::Present { wait, .. } => assert_eq!(*wait, finished),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_out_of_date_acquire_recreates_session() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    let old_chain = swapchain_id(&presenter);

    device.fail_next_acquire(Error::SwapchainOutOfDate);
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Recreated);

    let new_chain = swapchain_id(&presenter);
    assert_ne!(new_chain, old_chain);
    assert!(!device.is_live(old_chain));

    let created = device
        .position(|e| matches!(e, MockEvent::SwapchainCreated { id, old: Some(hint), .. } if *id == new_chain && *hint == old_chain))
        .unwrap();
    let released = device
        .position(|e| matches!(e, MockEvent::Released { id, .. } if *id == old_chain))
        .unwrap();
    let idle = device.position(|e| matches!(e, MockEvent::WaitIdle)).unwrap();
    assert!(idle < created);
    assert!(created < released);

    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Rendered);
    let image_count = presenter.session().unwrap().swapchain().unwrap().image_count();
    let last_acquired = device
        .events()
        .iter()
        .rev()
        .find_map(|e| match e {
            MockEvent::Acquire { swapchain, image_index, .. } => Some((*swapchain, *image_index)),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_acquired.0, new_chain);
    assert!(last_acquired.1 < image_count);
    assert_eq!(presenter.session().unwrap().generation().unwrap(), 2);
    assert!(device.violations().is_empty());
}

#[test]
fn test_out_of_date_present_recreates_session() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);

    device.fail_next_present(Error::SwapchainOutOfDate);
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Recreated);
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Rendered);
    assert!(device.violations().is_empty());
}

#[test]
fn test_resize_rebuilds_at_new_extent() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    presenter.pump_frame(&input(800, 600)).unwrap();

    device.set_surface_extent(Extent2D::new(1024, 768));
    assert_eq!(presenter.pump_frame(&input(1024, 768)).unwrap(), FrameStatus::Recreated);
    assert_eq!(presenter.session().unwrap().extent(), Extent2D::new(1024, 768));
    assert_eq!(presenter.pump_frame(&input(1024, 768)).unwrap(), FrameStatus::Rendered);
    assert!(device.violations().is_empty());
}

#[test]
fn test_new_session_references_only_live_resources() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    device.set_surface_extent(Extent2D::new(640, 480));
    presenter.pump_frame(&input(640, 480)).unwrap();

    for _ in 0..6 {
        presenter.pump_frame(&input(640, 480)).unwrap();
    }
    let session = presenter.session().unwrap();
    for index in 0..session.framebuffer_count() {
        let cmd = session.command_buffer(index).unwrap();
        for command in device.commands(cmd.id) {
            if let crate::device::mock_device::MockCommand::BeginRenderPass { render_pass, framebuffer, .. } = command {
                assert!(device.is_live(render_pass));
                assert!(device.is_live(framebuffer));
            }
        }
    }
    assert!(device.violations().is_empty());
}

#[test]
fn test_invalidate_forces_rebuild() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    let old_chain = swapchain_id(&presenter);

    presenter.invalidate();
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Rendered);
    assert_ne!(swapchain_id(&presenter), old_chain);
    assert_eq!(presenter.stats().recreations, 1);
}

#[test]
fn test_zero_extent_suspends() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    let before = device.events().len();

    assert_eq!(presenter.pump_frame(&input(0, 600)).unwrap(), FrameStatus::Suspended);
    assert_eq!(presenter.pump_frame(&input(800, 0)).unwrap(), FrameStatus::Suspended);
    assert_eq!(device.events().len(), before);
    assert_eq!(presenter.stats().suspended_frames, 2);
}

#[test]
fn test_failed_rebuild_keeps_old_session() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    let old_chain = swapchain_id(&presenter);
    let live_before = device.live_count();

    device.fail_create(MockKind::Pipeline, 1);
    device.fail_next_acquire(Error::SwapchainOutOfDate);
    assert_eq!(presenter.pump_frame(&input(800, 600)), Err(Error::OutOfMemory));

    assert_eq!(swapchain_id(&presenter), old_chain);
    assert_eq!(device.live_count(), live_before);

    // the old chain is invalidated, so the next pump retries the rebuild
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Recreated);
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Rendered);
    assert!(!presenter.is_failed());
}

#[test]
fn test_retried_rebuild_hands_off_old_chain_once() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    let old_chain = swapchain_id(&presenter);

    device.fail_create(MockKind::Pipeline, 1);
    device.fail_next_acquire(Error::SwapchainOutOfDate);
    assert_eq!(presenter.pump_frame(&input(800, 600)), Err(Error::OutOfMemory));
    assert!(presenter.session().unwrap().swapchain().unwrap().is_handed_off());

    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Recreated);
    assert_eq!(presenter.pump_frame(&input(800, 600)).unwrap(), FrameStatus::Rendered);

    let hinted = |e: &MockEvent| matches!(e, MockEvent::SwapchainCreated { old: Some(hint), .. } if *hint == old_chain);
    assert_eq!(device.count(hinted), 1);
    assert!(!device.is_live(old_chain));
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}

#[test]
fn test_frame_error_poisons_presenter() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    presenter.pump_frame(&input(800, 600)).unwrap();

    device.fail_next_submit(Error::OutOfMemory);
    assert_eq!(presenter.pump_frame(&input(800, 600)), Err(Error::OutOfMemory));
    assert!(presenter.is_failed());

    let acquires = device.count(|e| matches!(e, MockEvent::Acquire { .. }));
    assert!(matches!(
        presenter.pump_frame(&input(800, 600)),
        Err(Error::ContractViolation(_))
    ));
    assert_eq!(device.count(|e| matches!(e, MockEvent::Acquire { .. })), acquires);
    assert!(device.violations().is_empty(), "{:?}", device.violations());

    presenter.shutdown().unwrap();
    assert_eq!(device.live_count(), 0);
}

#[test]
fn test_shutdown_with_frame_in_flight() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    presenter.pump_frame(&input(800, 600)).unwrap();

    device.fail_next_present(Error::DeviceLost);
    assert_eq!(presenter.pump_frame(&input(800, 600)), Err(Error::DeviceLost));

    presenter.shutdown().unwrap();
    assert_eq!(device.live_count(), 0);

    let events = device.events();
    let failed = events.iter().position(|e| matches!(e, MockEvent::PresentFailed { .. })).unwrap();
    let idle = failed + events[failed..].iter().position(|e| matches!(e, MockEvent::WaitIdle)).unwrap();
    let first_release = failed + events[failed..].iter().position(|e| matches!(e, MockEvent::Released { .. })).unwrap();
    assert!(idle < first_release);
    assert!(device.violations().is_empty());
}

#[test]
fn test_shutdown_releases_even_if_wait_fails() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    presenter.pump_frame(&input(800, 600)).unwrap();

    device.fail_next_wait_idle(Error::DeviceLost);
    assert_eq!(presenter.shutdown(), Err(Error::DeviceLost));
    assert_eq!(device.live_count(), 0);
    assert!(presenter.is_shut_down());
}

#[test]
fn test_shutdown_is_idempotent_and_final() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);

    presenter.shutdown().unwrap();
    presenter.shutdown().unwrap();
    assert_eq!(device.count(|e| matches!(e, MockEvent::WaitIdle)), 1);
    assert!(matches!(
        presenter.pump_frame(&input(800, 600)),
        Err(Error::ContractViolation(_))
    ));
}

#[test]
fn test_drop_shuts_down() {
    let device = Arc::new(MockDevice::new());
    {
        let mut presenter = presenter(&device);
        presenter.pump_frame(&input(800, 600)).unwrap();
    }
    assert_eq!(device.live_count(), 0);
    assert_eq!(device.count(|e| matches!(e, MockEvent::WaitIdle)), 1);
}

fn pump_surface(presenter: &mut Presenter<MockDevice>, surface: &impl SurfaceProvider) -> FrameStatus {
    presenter
        .pump_frame(&FrameInput {
            drawable_extent: surface.drawable_extent(),
            ..Default::default()
        })
        .unwrap()
}

#[test]
fn test_fixed_surface_drives_frames() {
    let device = Arc::new(MockDevice::new());
    let mut presenter = presenter(&device);
    let shown = FixedSurface { extent: Extent2D::new(800, 600) };
    let minimized = FixedSurface { extent: Extent2D::new(0, 0) };

    assert!(!shown.should_close());
    assert_eq!(pump_surface(&mut presenter, &shown), FrameStatus::Rendered);
    assert_eq!(pump_surface(&mut presenter, &minimized), FrameStatus::Suspended);
    assert_eq!(pump_surface(&mut presenter, &shown), FrameStatus::Rendered);
    assert_eq!(presenter.stats().frames_rendered, 2);
    assert_eq!(presenter.stats().suspended_frames, 1);
}

#[test]
fn test_texture_outlives_session_rebuilds() {
    let device = Arc::new(MockDevice::new());
    let texture = TextureData::rgba8(Extent2D::new(1, 1), vec![0, 255, 0, 255]).unwrap();
    let mut presenter = Presenter::new(
        device.clone(),
        Config::default(),
        SessionDesc::new("tri", 3).with_texture(texture),
        shaders(),
        Extent2D::new(800, 600),
    )
    .unwrap();
    let set = presenter.session().unwrap().scene_set().unwrap().unwrap().id;
    let (view, _) = device.descriptor_image(set, TEXTURE_BINDING).unwrap();
    let image = device.view_image(view).unwrap();

    presenter.pump_frame(&input(800, 600)).unwrap();
    presenter.invalidate();
    presenter.pump_frame(&input(640, 480)).unwrap();

    let set = presenter.session().unwrap().scene_set().unwrap().unwrap().id;
    assert_eq!(device.descriptor_image(set, TEXTURE_BINDING).map(|(v, _)| v), Some(view));
    assert!(device.is_live(image));
    assert_eq!(device.live_of(MockKind::Image), 1);
    let chain = swapchain_id(&presenter);

    presenter.shutdown().unwrap();
    assert_eq!(device.live_count(), 0);
    let released = device.released();
    let at = |target: u64| released.iter().position(|id| *id == target).unwrap();
    assert!(at(chain) < at(view));
    assert!(at(view) < at(image));
    assert_eq!(device.live_of(MockKind::Sampler), 0);
    assert!(device.violations().is_empty(), "{:?}", device.violations());
}
