//! wgpu-based GPU compute backend (Metal / Vulkan / DX12).
//!
//! Hosts the two batch kernels: the trajectory grid search and the stamp
//! coadd. NaN does not survive shader compilers portably, so masked values
//! cross the device boundary as the [`GPU_NO_DATA`] sentinel and are
//! restored to NO_DATA on readback.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ndarray::Array2;
use wgpu::util::DeviceExt;

use crate::config::{SearchParameters, SearchRect, StampParameters};
use crate::consts::{GPU_NO_DATA, MAX_GPU_TIMES, MAX_RESULTS_PER_PIXEL, MAX_STAMP_EDGE, NO_DATA};
use crate::error::{DriftscanError, Result};
use crate::image::RawImage;
use crate::psiphi::{PsiPhiArray, PsiPhiPlane};
use crate::search::cpu::reevaluate_candidate;
use crate::stack::ImageStack;
use crate::stamp::{rejected_stamp, stamp_passes_filters};
use crate::trajectory::{compare_trajectories, Trajectory};

use super::ComputeBackend;

// ---------------------------------------------------------------------------
// Uniform / storage structs (must match the WGSL layouts exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SearchUniforms {
    width: u32,
    height: u32,
    num_times: u32,
    num_candidates: u32,
    x_start_min: i32,
    x_start_max: i32,
    y_start_min: i32,
    y_start_max: i32,
    results_per_pixel: u32,
    min_observations: u32,
    min_lh: f32,
    do_sigmag: u32,
    sgl_l: f32,
    sgl_h: f32,
    sigmag_coeff: f32,
    psi_num_bytes: u32,
    phi_num_bytes: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CoaddUniforms {
    width: u32,
    height: u32,
    num_times: u32,
    num_trajectories: u32,
    radius: u32,
    stamp_type: u32,
    has_index_mask: u32,
    _pad0: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuCandidate {
    x: i32,
    y: i32,
    vx: f32,
    vy: f32,
    flux: f32,
    likelihood: f32,
    obs_count: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuTrajectoryIn {
    x: i32,
    y: i32,
    vx: f32,
    vy: f32,
}

const fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

// ---------------------------------------------------------------------------
// WgpuBackend
// ---------------------------------------------------------------------------

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    search_pipeline: wgpu::ComputePipeline,
    coadd_pipeline: wgpu::ComputePipeline,
}

impl WgpuBackend {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| DriftscanError::Gpu(format!("no suitable GPU adapter found: {e}")))?;

        let adapter_name = adapter.get_info().name.clone();
        tracing::info!("GPU adapter: {adapter_name}");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("driftscan"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
        ))
        .map_err(|e| DriftscanError::Gpu(format!("failed to create GPU device: {e}")))?;

        let device: Arc<wgpu::Device> = Arc::new(device);
        let queue: Arc<wgpu::Queue> = Arc::new(queue);

        let mk = |label, src: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.into()),
            })
        };
        let search_mod = mk("psi_phi_search", include_str!("shaders/psi_phi_search.wgsl"));
        let coadd_mod = mk("stamp_coadd", include_str!("shaders/stamp_coadd.wgsl"));

        let pipe = |module: &wgpu::ShaderModule, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: None,
                layout: None,
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Ok(Self {
            adapter_name,
            search_pipeline: pipe(&search_mod, "search_main"),
            coadd_pipeline: pipe(&coadd_mod, "coadd_main"),
            device,
            queue,
        })
    }

    // --- Buffer helpers ---

    fn create_storage(&self, data: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: data,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn create_storage_uninit(&self, byte_size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_uniform<T: Pod>(&self, data: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::bytes_of(data),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn download_bytes(&self, buffer: &wgpu::Buffer) -> Vec<u8> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut enc = self.device.create_command_encoder(&Default::default());
        enc.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(enc.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |r| {
            tx.send(r).ok();
        });
        self.device.poll(wgpu::PollType::wait_indefinitely()).ok();
        rx.recv()
            .expect("GPU channel closed")
            .expect("Buffer mapping failed");

        let data = slice.get_mapped_range();
        let result = data.to_vec();
        drop(data);
        staging.unmap();
        result
    }

    /// Dispatch a single compute pass with one bind group at group(0).
    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        entries: &[wgpu::BindGroupEntry],
        workgroups: u32,
    ) {
        let layout = pipeline.get_bind_group_layout(0);
        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries,
        });
        let mut enc = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = enc.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bg, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.queue.submit(std::iter::once(enc.finish()));
    }
}

/// Pack one psi/phi plane into the 32-bit words the kernel indexes.
///
/// Raw floats have NaN swapped for the GPU sentinel; quantized codes are
/// packed little-end-first with NO_DATA codes padding any tail.
fn plane_words(plane: &PsiPhiPlane) -> Vec<u32> {
    if let Some(values) = plane.as_f32() {
        values
            .iter()
            .map(|&v| (if v.is_nan() { GPU_NO_DATA } else { v }).to_bits())
            .collect()
    } else if let Some(codes) = plane.as_u16() {
        codes
            .chunks(2)
            .map(|c| {
                let lo = c[0] as u32;
                let hi = c.get(1).copied().unwrap_or(u16::MAX) as u32;
                lo | (hi << 16)
            })
            .collect()
    } else if let Some(codes) = plane.as_u8() {
        codes
            .chunks(4)
            .map(|c| {
                let mut word = 0u32;
                for k in 0..4 {
                    let code = c.get(k).copied().unwrap_or(u8::MAX) as u32;
                    word |= code << (8 * k);
                }
                word
            })
            .collect()
    } else {
        Vec::new()
    }
}

/// Per-image (min, scale) pairs; a dummy entry stands in for float planes so
/// the binding is never empty.
fn bounds_words(plane: &PsiPhiPlane) -> Vec<[f32; 2]> {
    if plane.bounds().is_empty() {
        vec![[0.0, 0.0]]
    } else {
        plane.bounds().iter().map(|b| [b.min_val, b.scale]).collect()
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn search(
        &self,
        psi_phi: &PsiPhiArray,
        grid: &[(f32, f32)],
        params: &SearchParameters,
    ) -> Result<Vec<Trajectory>> {
        let rect = params.rect.unwrap_or(SearchRect {
            x_start_min: 0,
            x_start_max: psi_phi.width() as i32,
            y_start_min: 0,
            y_start_max: psi_phi.height() as i32,
        });
        if rect.x_start_min >= rect.x_start_max
            || rect.y_start_min >= rect.y_start_max
            || grid.is_empty()
            || params.results_per_pixel == 0
        {
            return Ok(Vec::new());
        }
        if psi_phi.num_times() > MAX_GPU_TIMES {
            return Err(DriftscanError::Gpu(format!(
                "stack has {} images, GPU search supports at most {MAX_GPU_TIMES}",
                psi_phi.num_times()
            )));
        }
        if params.results_per_pixel > MAX_RESULTS_PER_PIXEL {
            return Err(DriftscanError::Gpu(format!(
                "results_per_pixel {} exceeds the GPU limit {MAX_RESULTS_PER_PIXEL}",
                params.results_per_pixel
            )));
        }

        let num_pixels = (rect.x_start_max - rect.x_start_min) as u32
            * (rect.y_start_max - rect.y_start_min) as u32;

        let uniforms = SearchUniforms {
            width: psi_phi.width() as u32,
            height: psi_phi.height() as u32,
            num_times: psi_phi.num_times() as u32,
            num_candidates: grid.len() as u32,
            x_start_min: rect.x_start_min,
            x_start_max: rect.x_start_max,
            y_start_min: rect.y_start_min,
            y_start_max: rect.y_start_max,
            results_per_pixel: params.results_per_pixel as u32,
            min_observations: params.min_observations as u32,
            min_lh: params.min_lh,
            do_sigmag: (params.do_sigmag_filter && params.gpu_filter) as u32,
            sgl_l: params.sgl_l,
            sgl_h: params.sgl_h,
            sigmag_coeff: params.sigmag_coeff,
            psi_num_bytes: psi_phi.psi_num_bytes() as u32,
            phi_num_bytes: psi_phi.phi_num_bytes() as u32,
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };

        let grid_flat: Vec<[f32; 2]> = grid.iter().map(|&(vx, vy)| [vx, vy]).collect();
        let params_buf = self.create_uniform(&uniforms);
        let times_buf = self.create_storage(bytemuck::cast_slice(psi_phi.zeroed_times()));
        let grid_buf = self.create_storage(bytemuck::cast_slice(&grid_flat));
        let psi_buf = self.create_storage(bytemuck::cast_slice(&plane_words(psi_phi.psi_plane())));
        let phi_buf = self.create_storage(bytemuck::cast_slice(&plane_words(psi_phi.phi_plane())));
        let psi_bounds_buf =
            self.create_storage(bytemuck::cast_slice(&bounds_words(psi_phi.psi_plane())));
        let phi_bounds_buf =
            self.create_storage(bytemuck::cast_slice(&bounds_words(psi_phi.phi_plane())));

        let slot_count = num_pixels as usize * MAX_RESULTS_PER_PIXEL;
        let results_buf = self
            .create_storage_uninit((slot_count * std::mem::size_of::<GpuCandidate>()) as u64);

        self.dispatch(
            &self.search_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: times_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: grid_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: psi_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: phi_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: psi_bounds_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: phi_bounds_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: results_buf.as_entire_binding(),
                },
            ],
            div_ceil(num_pixels, 256),
        );

        let raw = self.download_bytes(&results_buf);
        // pod_collect copes with the unaligned Vec<u8> from the readback.
        let candidates: Vec<GpuCandidate> = bytemuck::pod_collect_to_vec(&raw);

        // With gpu_filter off the kernel returned unfiltered candidates;
        // re-score each on the host with the sigma-G filter and the
        // reporting thresholds applied to the filtered statistics.
        let host_filter = params.do_sigmag_filter && !params.gpu_filter;
        let mut results: Vec<Trajectory> = candidates
            .iter()
            .filter(|c| c.obs_count >= 0)
            .filter_map(|c| {
                if host_filter {
                    reevaluate_candidate(psi_phi, c.x, c.y, c.vx, c.vy, params)
                } else {
                    Some(Trajectory {
                        x: c.x as i16,
                        y: c.y as i16,
                        vx: c.vx,
                        vy: c.vy,
                        flux: c.flux,
                        likelihood: c.likelihood,
                        obs_count: c.obs_count as i16,
                    })
                }
            })
            .collect();
        results.sort_by(compare_trajectories);
        Ok(results)
    }

    fn coadd_stamps(
        &self,
        stack: &ImageStack,
        trajectories: &[Trajectory],
        params: &StampParameters,
        use_index: &[Vec<bool>],
    ) -> Result<Vec<RawImage>> {
        if trajectories.is_empty() {
            return Ok(Vec::new());
        }
        if !use_index.is_empty() && use_index.len() != trajectories.len() {
            return Err(DriftscanError::MaskLengthMismatch {
                expected: trajectories.len(),
                got: use_index.len(),
            });
        }
        if params.radius == 0 || params.radius > MAX_STAMP_EDGE {
            return Err(DriftscanError::InvalidStampRadius {
                radius: params.radius,
                max: MAX_STAMP_EDGE,
            });
        }
        if stack.len() > MAX_GPU_TIMES {
            return Err(DriftscanError::Gpu(format!(
                "stack has {} images, GPU coadd supports at most {MAX_GPU_TIMES}",
                stack.len()
            )));
        }

        let (width, height) = (stack.width(), stack.height());
        let edge = 2 * params.radius + 1;
        let stamp_pixels = edge * edge;

        let mut science = Vec::with_capacity(stack.len() * width * height);
        for image in stack.images() {
            science.extend(
                image
                    .science()
                    .data
                    .iter()
                    .map(|&v| if v.is_nan() { GPU_NO_DATA } else { v }),
            );
        }

        let gpu_trajectories: Vec<GpuTrajectoryIn> = trajectories
            .iter()
            .map(|t| GpuTrajectoryIn {
                x: t.x as i32,
                y: t.y as i32,
                vx: t.vx,
                vy: t.vy,
            })
            .collect();

        let index_mask: Vec<u32> = if use_index.is_empty() {
            vec![0]
        } else {
            let mut flat = Vec::with_capacity(trajectories.len() * stack.len());
            for mask in use_index {
                if mask.len() != stack.len() {
                    return Err(DriftscanError::MaskLengthMismatch {
                        expected: stack.len(),
                        got: mask.len(),
                    });
                }
                flat.extend(mask.iter().map(|&b| b as u32));
            }
            flat
        };

        let uniforms = CoaddUniforms {
            width: width as u32,
            height: height as u32,
            num_times: stack.len() as u32,
            num_trajectories: trajectories.len() as u32,
            radius: params.radius as u32,
            stamp_type: params.stamp_type as u32,
            has_index_mask: (!use_index.is_empty()) as u32,
            _pad0: 0,
        };

        let times = stack.zeroed_times();
        let params_buf = self.create_uniform(&uniforms);
        let times_buf = self.create_storage(bytemuck::cast_slice(&times));
        let science_buf = self.create_storage(bytemuck::cast_slice(&science));
        let traj_buf = self.create_storage(bytemuck::cast_slice(&gpu_trajectories));
        let mask_buf = self.create_storage(bytemuck::cast_slice(&index_mask));
        let stamps_buf = self.create_storage_uninit(
            (trajectories.len() * stamp_pixels * std::mem::size_of::<f32>()) as u64,
        );

        let total_threads = (trajectories.len() * stamp_pixels) as u32;
        self.dispatch(
            &self.coadd_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: times_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: science_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: traj_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: mask_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: stamps_buf.as_entire_binding(),
                },
            ],
            div_ceil(total_threads, 256),
        );

        let raw = self.download_bytes(&stamps_buf);
        let flat: Vec<f32> = bytemuck::pod_collect_to_vec(&raw);

        let mut stamps = Vec::with_capacity(trajectories.len());
        for chunk in flat.chunks(stamp_pixels).take(trajectories.len()) {
            let mut data = Array2::<f32>::zeros((edge, edge));
            for (p, &v) in chunk.iter().enumerate() {
                data[[p / edge, p % edge]] = if v > GPU_NO_DATA + 1.0 { v } else { NO_DATA };
            }
            let stamp = RawImage::new(data);
            if params.do_filtering && !stamp_passes_filters(&stamp, params) {
                stamps.push(rejected_stamp());
            } else {
                stamps.push(stamp);
            }
        }
        Ok(stamps)
    }
}
