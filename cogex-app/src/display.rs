use anyhow::{anyhow, Result};
use cogex_core::{KeyPress, KeySet, StimulusType};
use cogex_experiment::{Frame, InputError, InputSource, PresentationError, PresentationSurface};
use cogex_render::StimulusCanvas;
use cogex_timing::{ClockReader, TimeSource};
use pixels::{Pixels, SurfaceTexture};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowId};

/// How long to wait for the platform to hand out the window.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Winit-side state, updated while events are pumped.
#[derive(Default)]
struct Shell {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    refresh_hz: Option<f64>,
    keys: VecDeque<(&'static str, Instant)>,
    exited: bool,
    error: Option<String>,
}

impl Shell {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;
        self.refresh_hz = monitor.refresh_rate_millihertz().map(|mhz| mhz as f64 / 1000.0);

        let attributes = Window::default_attributes()
            .with_title("Cogex")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        let texture = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        self.pixels = Some(Pixels::new(size.width, size.height, texture)?);
        window.set_cursor_visible(false);

        info!(
            width = size.width,
            height = size.height,
            scale = window.scale_factor(),
            refresh_hz = ?self.refresh_hz,
            "display opened"
        );
        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for Shell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.open(event_loop) {
            self.error = Some(e.to_string());
            event_loop.exit();
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            // Closing the window reads as a quit key.
            WindowEvent::CloseRequested => self.keys.push_back(("escape", Instant::now())),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(name) = key_name(code) {
                        self.keys.push_back((name, Instant::now()));
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    if let Err(e) = pixels.resize_surface(size.width, size.height) {
                        warn!(error = %e, "surface resize failed");
                    }
                }
            }
            _ => {}
        }
    }
}

struct Display {
    event_loop: EventLoop<()>,
    shell: Shell,
}

impl Display {
    fn pump(&mut self) {
        let Display { event_loop, shell } = self;
        if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), shell) {
            debug!(code, "event loop exited");
            shell.exited = true;
        }
    }
}

/// Opens a borderless fullscreen window and returns its two halves: the
/// presentation surface and the keyboard.
pub fn open() -> Result<(WindowSurface, WindowInput)> {
    let mut display = Display {
        event_loop: EventLoop::new()?,
        shell: Shell::default(),
    };
    let started = Instant::now();
    while display.shell.pixels.is_none() {
        display.pump();
        if let Some(e) = display.shell.error.take() {
            return Err(anyhow!("could not open display: {e}"));
        }
        if display.shell.exited || started.elapsed() > OPEN_TIMEOUT {
            return Err(anyhow!("display did not become ready"));
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let (width, height) = display
        .shell
        .window
        .as_ref()
        .map(|w| (w.inner_size().width, w.inner_size().height))
        .ok_or_else(|| anyhow!("window missing after open"))?;
    let display = Rc::new(RefCell::new(display));
    let surface = WindowSurface {
        display: Rc::clone(&display),
        canvas: StimulusCanvas::new(width, height)?,
    };
    Ok((surface, WindowInput { display }))
}

pub struct WindowSurface {
    display: Rc<RefCell<Display>>,
    canvas: StimulusCanvas,
}

impl WindowSurface {
    /// Rasterizes stimuli ahead of the run.
    pub fn prewarm<'a>(&mut self, stimuli: impl IntoIterator<Item = &'a StimulusType>) -> Result<usize> {
        self.canvas.prewarm(stimuli)
    }

    /// Refresh rate reported by the monitor, if any.
    pub fn refresh_hz(&self) -> Option<f64> {
        self.display.borrow().shell.refresh_hz
    }
}

impl PresentationSurface for WindowSurface {
    type Content = StimulusType;

    fn prepare(&mut self, frame: Frame<'_, StimulusType>) -> Result<(), PresentationError> {
        let drawn = match frame {
            Frame::Stimulus(stimulus) => self.canvas.show(stimulus),
            Frame::Fixation => self.canvas.show_fixation(),
            Frame::Blank => self.canvas.show(&StimulusType::Blank),
        };
        drawn.map_err(|e| PresentationError::Render(e.to_string()))
    }

    /// Uploads the canvas and queues it for the next vertical blank.
    fn commit(&mut self, on_flip: &mut dyn FnMut()) -> Result<(), PresentationError> {
        let mut display = self.display.borrow_mut();
        display.pump();
        if display.shell.exited {
            return Err(PresentationError::Closed);
        }
        let pixels = display.shell.pixels.as_mut().ok_or(PresentationError::Closed)?;
        self.canvas
            .present_into(pixels.frame_mut())
            .map_err(|e| PresentationError::Render(e.to_string()))?;
        pixels
            .render()
            .map_err(|e| PresentationError::SurfaceLost(e.to_string()))?;
        on_flip();
        Ok(())
    }
}

pub struct WindowInput {
    display: Rc<RefCell<Display>>,
}

impl InputSource for WindowInput {
    fn poll<T: TimeSource>(
        &mut self,
        allowed: &KeySet,
        clock: &ClockReader<'_, T>,
        out: &mut Vec<KeyPress>,
    ) -> Result<(), InputError> {
        let mut display = self.display.borrow_mut();
        display.pump();
        if display.shell.exited && display.shell.keys.is_empty() {
            return Err(InputError::Disconnected);
        }
        let now = clock.now();
        for (name, at) in display.shell.keys.drain(..) {
            if let Some(key) = allowed.get(name) {
                out.push(KeyPress {
                    key: key.clone(),
                    time: now - at.elapsed().as_secs_f64(),
                });
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        let mut display = self.display.borrow_mut();
        display.pump();
        display.shell.keys.clear();
    }
}

/// Names used in key configs for the keys a task can listen to.
pub fn key_name(code: KeyCode) -> Option<&'static str> {
    use KeyCode::*;
    Some(match code {
        KeyA => "a",
        KeyB => "b",
        KeyC => "c",
        KeyD => "d",
        KeyE => "e",
        KeyF => "f",
        KeyG => "g",
        KeyH => "h",
        KeyI => "i",
        KeyJ => "j",
        KeyK => "k",
        KeyL => "l",
        KeyM => "m",
        KeyN => "n",
        KeyO => "o",
        KeyP => "p",
        KeyQ => "q",
        KeyR => "r",
        KeyS => "s",
        KeyT => "t",
        KeyU => "u",
        KeyV => "v",
        KeyW => "w",
        KeyX => "x",
        KeyY => "y",
        KeyZ => "z",
        Digit0 | Numpad0 => "0",
        Digit1 | Numpad1 => "1",
        Digit2 | Numpad2 => "2",
        Digit3 | Numpad3 => "3",
        Digit4 | Numpad4 => "4",
        Digit5 | Numpad5 => "5",
        Digit6 | Numpad6 => "6",
        Digit7 | Numpad7 => "7",
        Digit8 | Numpad8 => "8",
        Digit9 | Numpad9 => "9",
        Space => "space",
        Escape => "escape",
        Enter | NumpadEnter => "return",
        Tab => "tab",
        ArrowLeft => "left",
        ArrowRight => "right",
        ArrowUp => "up",
        ArrowDown => "down",
        _ => return None,
    })
}
