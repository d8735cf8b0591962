//! Interactive session: input events in, frames out
//!
//! A [`Session`] is what a window or a scripted replay drives. It owns the
//! grid and the renderer and turns [`InputEvent`]s into camera moves, grid
//! edits, mode switches and snapshots.

use crate::camera::RenderMode;
use crate::renderer::Renderer;
use crate::{Error, Result};
use image::RgbImage;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use voxtrace_core::grid::Grid;

/// Distance covered by one forward or backward key press
pub const MOVE_STEP: f32 = 1.0;
/// Walk rotation applied by one left or right key press
pub const TURN_STEP: f32 = 0.1 * PI;

/// Keys the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    ToggleMode,
    Snapshot,
    Quit,
}

/// Input delivered by the render loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Pointer position in image pixels
    PointerMoved { x: f32, y: f32 },
    /// Primary button: build at the camera position
    PointerPressed,
    KeyPressed(Key),
}

impl InputEvent {
    /// Parse a whitespace separated list of event tokens
    pub fn parse_script(script: &str) -> Result<Vec<Self>> {
        script.split_whitespace().map(str::parse).collect()
    }
}

impl FromStr for InputEvent {
    type Err = Error;

    /// Tokens: `up`, `down`, `left`, `right`, `space`, `click`, `s`, `q` and
    /// `look:X,Y`
    fn from_str(token: &str) -> Result<Self> {
        let token = token.trim();
        let event = match token.to_ascii_lowercase().as_str() {
            "up" => Self::KeyPressed(Key::Forward),
            "down" => Self::KeyPressed(Key::Backward),
            "left" => Self::KeyPressed(Key::TurnLeft),
            "right" => Self::KeyPressed(Key::TurnRight),
            "space" => Self::KeyPressed(Key::ToggleMode),
            "s" => Self::KeyPressed(Key::Snapshot),
            "q" => Self::KeyPressed(Key::Quit),
            "click" => Self::PointerPressed,
            other => {
                let coords = other
                    .strip_prefix("look:")
                    .ok_or_else(|| Error::InvalidParameter(format!("unknown input '{token}'")))?;
                let (x, y) = coords.split_once(',').ok_or_else(|| {
                    Error::InvalidParameter(format!("expected look:X,Y, got '{token}'"))
                })?;
                let parse = |value: &str| {
                    value.trim().parse::<f32>().map_err(|e| {
                        Error::InvalidParameter(format!("bad coordinate in '{token}': {e}"))
                    })
                };
                Self::PointerMoved {
                    x: parse(x)?,
                    y: parse(y)?,
                }
            }
        };
        Ok(event)
    }
}

/// What the render loop should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// Grid, renderer and the glue between them
pub struct Session {
    grid: Grid,
    renderer: Renderer,
    snapshot_dir: PathBuf,
}

impl Session {
    /// Prepare the first frame: ray origins, and the surface cache if the
    /// trace uses it
    pub fn new(
        grid: Grid,
        mut renderer: Renderer,
        snapshot_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        renderer.recompute_ray_origins()?;
        if renderer.settings().use_surface_cache {
            renderer.bake_surfaces(&grid)?;
        }
        Ok(Self {
            grid,
            renderer,
            snapshot_dir: snapshot_dir.into(),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn mode(&self) -> RenderMode {
        self.renderer.camera().mode
    }

    /// Apply one input event
    pub fn handle(&mut self, event: InputEvent) -> Result<Control> {
        match event {
            InputEvent::PointerMoved { x, y } => self.renderer.set_view_direction(x, y),
            InputEvent::PointerPressed => self.build_at_camera()?,
            InputEvent::KeyPressed(key) => match key {
                Key::Forward => {
                    self.renderer.move_camera(MOVE_STEP, &self.grid);
                }
                Key::Backward => {
                    self.renderer.move_camera(-MOVE_STEP, &self.grid);
                }
                Key::TurnLeft => self.renderer.rotate_walk_direction(-TURN_STEP),
                Key::TurnRight => self.renderer.rotate_walk_direction(TURN_STEP),
                Key::ToggleMode => {
                    self.renderer.switch_mode();
                }
                Key::Snapshot => {
                    self.snapshot()?;
                }
                Key::Quit => {
                    tracing::info!("quit requested");
                    return Ok(Control::Quit);
                }
            },
        }
        Ok(Control::Continue)
    }

    /// Apply events in order, stopping early on quit
    pub fn replay(&mut self, events: &[InputEvent]) -> Result<Control> {
        for &event in events {
            if self.handle(event)? == Control::Quit {
                return Ok(Control::Quit);
            }
        }
        Ok(Control::Continue)
    }

    /// Render the current mode and read the image back
    pub fn frame(&mut self) -> Result<RgbImage> {
        let mode = self.mode();
        self.renderer.render(&self.grid, mode)
    }

    /// Average `samples` trace dispatches into an image
    pub fn accumulated_frame(&mut self, samples: u32) -> Result<RgbImage> {
        self.renderer.accumulated_image(&self.grid, samples)
    }

    /// Rebake the surface cache from the current grid
    pub fn bake(&mut self) -> Result<()> {
        self.renderer.bake_surfaces(&self.grid)
    }

    /// Write an accumulated snapshot into the snapshot directory
    pub fn snapshot(&mut self) -> Result<PathBuf> {
        let samples = self.renderer.settings().snapshot_samples;
        self.renderer.snapshot(&self.grid, samples, &self.snapshot_dir)
    }

    fn build_at_camera(&mut self) -> Result<()> {
        let position = self.renderer.camera().position;
        match self.grid.build(position) {
            Ok(_) => {
                self.renderer.update_grid_buffer(&self.grid)?;
                if self.renderer.settings().use_surface_cache {
                    self.renderer.bake_surfaces(&self.grid)?;
                }
                Ok(())
            }
            Err(error @ voxtrace_core::Error::OutOfBounds { .. }) => {
                tracing::warn!("cannot build here: {}", error);
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}
