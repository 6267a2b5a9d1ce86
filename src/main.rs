#![allow(dead_code, clippy::too_many_arguments, clippy::unnecessary_wraps)]
pub mod app;
pub mod appdata;
pub mod callback;
pub mod camera;
pub mod commands;
pub mod config;
pub mod descriptors;
pub mod device;
pub mod model;
pub mod pipeline;
pub mod swapchain;
pub mod targets;

use std::time::Instant;

use anyhow::Result;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;
use vulkanalia::prelude::v1_0::*;

use crate::app::App;
use crate::camera::Direction;

const MOVE_SPEED: f32 = 1.5;
const LOOK_SPEED: f32 = 1.0;

fn key_direction(key: VirtualKeyCode) -> Option<(Direction, f32)> {
    match key {
        VirtualKeyCode::W => Some((Direction::NegZ, MOVE_SPEED)),
        VirtualKeyCode::S => Some((Direction::PosZ, MOVE_SPEED)),
        VirtualKeyCode::A => Some((Direction::NegX, MOVE_SPEED)),
        VirtualKeyCode::D => Some((Direction::PosX, MOVE_SPEED)),
        VirtualKeyCode::Space => Some((Direction::PosY, MOVE_SPEED)),
        VirtualKeyCode::LShift => Some((Direction::NegY, MOVE_SPEED)),
        VirtualKeyCode::Up => Some((Direction::PosPitch, LOOK_SPEED)),
        VirtualKeyCode::Down => Some((Direction::NegPitch, LOOK_SPEED)),
        VirtualKeyCode::Left => Some((Direction::NegYaw, LOOK_SPEED)),
        VirtualKeyCode::Right => Some((Direction::PosYaw, LOOK_SPEED)),
        _ => None,
    }
}

#[rustfmt::skip]
fn main() -> Result<()> {
    pretty_env_logger::init();

    // Window

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("Point Light Shadows (Rust)")
        .with_inner_size(LogicalSize::new(1024, 768))
        .build(&event_loop)?;

    // App

    let mut app = unsafe { App::create(&window)? };
    let mut destroying = false;
    let mut minimized = false;
    let mut last_tick = Instant::now();
    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            // Render a frame if our Vulkan app is not being destroyed.
            Event::MainEventsCleared if !destroying && !minimized => {
                let time_delta = last_tick.elapsed().as_secs_f32() * 1000.0;
                last_tick = Instant::now();
                app.camera_mut().tick(time_delta);
                if let Err(error) = unsafe { app.render(&window) } {
                    log::error!("Fatal render error: {}", error);
                    destroying = true;
                    *control_flow = ControlFlow::Exit;
                    unsafe { app.device().device_wait_idle().unwrap(); }
                    unsafe { app.destroy(); }
                }
            }
            // A zero-sized framebuffer means the window is minimized; pause
            // rendering until a nonzero resize arrives.
            Event::WindowEvent { event: WindowEvent::Resized(size), .. } => {
                if size.width == 0 || size.height == 0 {
                    minimized = true;
                } else {
                    minimized = false;
                    app.resized = true;
                }
            }
            Event::WindowEvent { event: WindowEvent::KeyboardInput { input, .. }, .. } => {
                if let Some(key) = input.virtual_keycode {
                    if let Some((direction, speed)) = key_direction(key) {
                        match input.state {
                            ElementState::Pressed => app.camera_mut().start_movement(direction, speed),
                            ElementState::Released => app.camera_mut().stop_movement(direction),
                        }
                    }
                }
            }
            // Destroy our Vulkan app.
            Event::WindowEvent { event: WindowEvent::CloseRequested, .. } => {
                destroying = true;
                *control_flow = ControlFlow::Exit;
                unsafe { app.device().device_wait_idle().unwrap(); }
                unsafe { app.destroy(); }
            }
            _ => {}
        }
    });
}
