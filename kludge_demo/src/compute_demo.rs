//! Headless compute: doubles sixteen integers on the GPU

use std::sync::Arc;

use kludge_engine::kludge::device::ShaderStage;
use kludge_engine::kludge::{ComputeJob, Config, Result, ShaderLibrary};
use kludge_engine::engine_info;
use kludge_engine_renderer_vulkan::kludge::VulkanDevice;

const ELEMENTS: u32 = 16;

pub fn run(config: &Config) -> Result<()> {
    let device = Arc::new(VulkanDevice::new_headless(config)?);
    engine_info!("kludge_demo", "Compute on {}", device.device_name());

    let mut library = ShaderLibrary::new(&config.shader_root);
    let shader = library.load("compute", ShaderStage::Compute)?;

    let size = u64::from(ELEMENTS) * std::mem::size_of::<i32>() as u64;
    let mut job = ComputeJob::new(device, &shader, size, ELEMENTS)?;

    let input: Vec<i32> = (0..ELEMENTS as i32).collect();
    let output: Vec<i32> = job.run(&input)?;

    for (i, (a, b)) in input.iter().zip(&output).enumerate() {
        println!("in[{i}] = {a}, out[{i}] = {b}");
    }
    Ok(())
}
