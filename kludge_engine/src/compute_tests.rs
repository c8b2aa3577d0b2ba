//! Unit tests for compute.rs

use crate::compute::ComputeJob;
use crate::device::mock_device::{MockCommand, MockDevice, MockEvent, MockKind};
use crate::device::types::*;
use crate::error::Error;
use crate::shader::{ShaderCode, SPIRV_MAGIC};
use std::sync::Arc;

fn kernel() -> ShaderCode {
    ShaderCode::from_words("compute", ShaderStage::Compute, vec![SPIRV_MAGIC, 0x0001_0000, 0, 8, 0]).unwrap()
}

#[test]
fn test_identity_kernel_round_trip() {
    let device = Arc::new(MockDevice::new());
    let mut job = ComputeJob::new(device.clone(), &kernel(), 16 * 4, 16).unwrap();
    let input: Vec<i32> = (0..16).collect();

    let output: Vec<i32> = job.run(&input).unwrap();
    assert_eq!(output, input);
    assert_eq!(job.runs(), 1);
    assert!(device.violations().is_empty());
}

#[test]
fn test_recording_dispatch_barrier_copy() {
    let device = Arc::new(MockDevice::new());
    let mut job = ComputeJob::new(device.clone(), &kernel(), 64, 4).unwrap();
    job.run(&[0u32; 16]).unwrap();

    let cmd = device
        .events()
        .iter()
        .find_map(|e| match e {
            MockEvent::Submit { queue: QueueKind::Compute, cmd, .. } => Some(*cmd),
            _ => None,
        })
        .unwrap();
    let commands = device.commands(cmd);
    let dispatch = commands.iter().position(|c| *c == MockCommand::Dispatch { x: 4, y: 1, z: 1 }).unwrap();
    let barrier = commands.iter().position(|c| matches!(c, MockCommand::Barrier(_))).unwrap();
    let copy = commands.iter().position(|c| matches!(c, MockCommand::CopyBuffer { size: 64, .. })).unwrap();
    assert!(dispatch < barrier && barrier < copy);

    match &commands[barrier] {
        MockCommand::Barrier(b) => {
            assert_eq!(b.src_stage, PipelineStage::COMPUTE_SHADER);
            assert_eq!(b.dst_access, AccessFlags::TRANSFER_READ);
        }
        _ => unreachable!(),
    }
    let idle = device.position(|e| *e == MockEvent::QueueWaitIdle(QueueKind::Compute));
    assert!(idle.is_some());
}

#[test]
fn test_repeated_runs_re_record() {
    let device = Arc::new(MockDevice::new());
    let mut job = ComputeJob::new(device.clone(), &kernel(), 8, 1).unwrap();

    assert_eq!(job.run(&[1u32, 2]).unwrap(), vec![1, 2]);
    assert_eq!(job.run(&[3u32, 4]).unwrap(), vec![3, 4]);
    assert_eq!(job.runs(), 2);
    assert!(device.violations().is_empty());
}

#[test]
fn test_wrong_input_size_rejected() {
    let device = Arc::new(MockDevice::new());
    let mut job = ComputeJob::new(device.clone(), &kernel(), 16, 1).unwrap();

    assert!(matches!(job.run(&[0u32; 3]), Err(Error::InvalidResource(_))));
    assert_eq!(device.count(|e| matches!(e, MockEvent::Submit { .. })), 0);
}

#[test]
fn test_non_compute_shader_rejected() {
    let device = Arc::new(MockDevice::new());
    let vertex = ShaderCode::from_words("tri", ShaderStage::Vertex, vec![SPIRV_MAGIC]).unwrap();

    assert!(matches!(ComputeJob::new(device.clone(), &vertex, 16, 1), Err(Error::InvalidResource(_))));
    assert_eq!(device.live_count(), 0);
}

#[test]
fn test_drop_releases_job_resources() {
    let device = Arc::new(MockDevice::new());
    let job = ComputeJob::new(device.clone(), &kernel(), 16, 1).unwrap();
    assert_eq!(device.live_of(MockKind::Buffer), 3);

    drop(job);
    assert_eq!(device.live_count(), 0);
}

#[test]
fn test_partial_construction_released() {
    let device = Arc::new(MockDevice::new());
    device.fail_create(MockKind::Pipeline, 1);

    assert_eq!(ComputeJob::new(device.clone(), &kernel(), 16, 1).err(), Some(Error::OutOfMemory));
    assert_eq!(device.live_count(), 0);
}
