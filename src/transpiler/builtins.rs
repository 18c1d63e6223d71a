//! Environment-sourced uniforms (`resX`, `mouseX`, `frame`, ...) and the host
//! context they are sampled from.
//!
//! The registry is an immutable table handed to the compiler; the mutable part
//! (pointer state, frame counter) lives in a [`HostContext`] owned by the host.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::values::UniformValue;

use super::types::{Scalar, WgslType};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerState {
    pub x: f32,
    pub y: f32,
    pub down: bool,
}

/// Surface the host renders into.
pub trait HostSurface {
    /// Drawable size in pixels.
    fn size(&self) -> (u32, u32);

    /// Keep `state` current from the surface's pointer events.
    fn attach_pointer_listener(&self, state: Rc<Cell<PointerState>>);
}

/// Handle for pushing pointer events when there is no surface.
#[derive(Clone, Debug)]
pub struct PointerFeed {
    state: Rc<Cell<PointerState>>,
}

impl PointerFeed {
    pub fn move_to(&self, x: f32, y: f32) {
        let mut s = self.state.get();
        s.x = x;
        s.y = y;
        self.state.set(s);
    }

    pub fn set_down(&self, down: bool) {
        let mut s = self.state.get();
        s.down = down;
        self.state.set(s);
    }
}

/// Per-host state shared by all built-in samplers.
pub struct HostContext {
    surface: Option<Box<dyn HostSurface>>,
    resolution: Cell<(u32, u32)>,
    pointer: Rc<Cell<PointerState>>,
    listener_attached: Cell<bool>,
    frame: Cell<u64>,
    clock: Option<Box<dyn Fn() -> f64>>,
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("has_surface", &self.surface.is_some())
            .field("resolution", &self.resolution.get())
            .field("pointer", &self.pointer.get())
            .field("listener_attached", &self.listener_attached.get())
            .field("frame", &self.frame.get())
            .finish()
    }
}

impl HostContext {
    pub fn new() -> Self {
        Self {
            surface: None,
            resolution: Cell::new((0, 0)),
            pointer: Rc::new(Cell::new(PointerState::default())),
            listener_attached: Cell::new(false),
            frame: Cell::new(0),
            clock: None,
        }
    }

    pub fn with_surface(surface: Box<dyn HostSurface>) -> Self {
        Self {
            surface: Some(surface),
            ..Self::new()
        }
    }

    /// Replace the wall clock (seconds since UTC midnight).
    pub fn with_clock(mut self, clock: impl Fn() -> f64 + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Resolution reported when there is no surface.
    pub fn set_resolution(&self, width: u32, height: u32) {
        self.resolution.set((width, height));
    }

    pub fn resolution(&self) -> (u32, u32) {
        match &self.surface {
            Some(surface) => surface.size(),
            None => self.resolution.get(),
        }
    }

    /// Global fallback feed used when no surface is attached.
    pub fn pointer_feed(&self) -> PointerFeed {
        PointerFeed {
            state: Rc::clone(&self.pointer),
        }
    }

    pub fn listener_attached(&self) -> bool {
        self.listener_attached.get()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame.get()
    }

    fn pointer(&self) -> PointerState {
        if !self.listener_attached.replace(true) {
            match &self.surface {
                Some(surface) => surface.attach_pointer_listener(Rc::clone(&self.pointer)),
                None => log::debug!("no host surface, pointer uniforms read the fallback feed"),
            }
        }
        self.pointer.get()
    }

    fn next_frame(&self) -> u64 {
        let current = self.frame.get();
        self.frame.set(current + 1);
        current
    }

    fn utc_seconds(&self) -> f64 {
        if let Some(clock) = &self.clock {
            return clock();
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        now % 86_400.0
    }
}

/// How a built-in uniform obtains its value.
#[derive(Clone, Debug, PartialEq)]
pub enum BuiltinSampler {
    ResolutionX,
    ResolutionY,
    PointerX,
    PointerY,
    PointerDown,
    /// Pre-increment frame counter.
    Frame,
    /// Seconds since UTC midnight.
    UtcTime,
    Constant(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinUniform {
    pub name: String,
    pub ty: WgslType,
    pub sampler: BuiltinSampler,
}

impl BuiltinUniform {
    pub fn new(name: impl Into<String>, ty: WgslType, sampler: BuiltinSampler) -> Self {
        Self {
            name: name.into(),
            ty,
            sampler,
        }
    }

    pub fn sample(&self, ctx: &HostContext) -> UniformValue {
        let v = match self.sampler {
            BuiltinSampler::ResolutionX => f64::from(ctx.resolution().0),
            BuiltinSampler::ResolutionY => f64::from(ctx.resolution().1),
            BuiltinSampler::PointerX => f64::from(ctx.pointer().x),
            BuiltinSampler::PointerY => f64::from(ctx.pointer().y),
            BuiltinSampler::PointerDown => {
                if ctx.pointer().down {
                    1.0
                } else {
                    0.0
                }
            }
            BuiltinSampler::Frame => ctx.next_frame() as f64,
            BuiltinSampler::UtcTime => ctx.utc_seconds(),
            BuiltinSampler::Constant(v) => v,
        };
        UniformValue::Scalar(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinRegistry {
    entries: Vec<BuiltinUniform>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl BuiltinRegistry {
    pub fn standard() -> Self {
        let f32 = WgslType::F32;
        Self {
            entries: vec![
                BuiltinUniform::new("resX", f32.clone(), BuiltinSampler::ResolutionX),
                BuiltinUniform::new("resY", f32.clone(), BuiltinSampler::ResolutionY),
                BuiltinUniform::new("mouseX", f32.clone(), BuiltinSampler::PointerX),
                BuiltinUniform::new("mouseY", f32.clone(), BuiltinSampler::PointerY),
                BuiltinUniform::new(
                    "clicked",
                    WgslType::Scalar(Scalar::I32),
                    BuiltinSampler::PointerDown,
                ),
                BuiltinUniform::new("frame", f32.clone(), BuiltinSampler::Frame),
                BuiltinUniform::new("utcTime", f32, BuiltinSampler::UtcTime),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, entry: BuiltinUniform) -> Self {
        self.entries.retain(|e| e.name != entry.name);
        self.entries.push(entry);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinUniform> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuiltinUniform> {
        self.entries.iter()
    }

    pub fn sample(&self, name: &str, ctx: &HostContext) -> Option<UniformValue> {
        self.get(name).map(|e| e.sample(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSurface {
        attached: Rc<Cell<u32>>,
    }

    impl HostSurface for FakeSurface {
        fn size(&self) -> (u32, u32) {
            (640, 480)
        }

        fn attach_pointer_listener(&self, state: Rc<Cell<PointerState>>) {
            self.attached.set(self.attached.get() + 1);
            state.set(PointerState {
                x: 10.0,
                y: 20.0,
                down: true,
            });
        }
    }

    #[test]
    fn test_frame_counter_returns_pre_increment_value() {
        let reg = BuiltinRegistry::standard();
        let ctx = HostContext::new();
        assert_eq!(reg.sample("frame", &ctx), Some(UniformValue::Scalar(0.0)));
        assert_eq!(reg.sample("frame", &ctx), Some(UniformValue::Scalar(1.0)));
        assert_eq!(ctx.frame_count(), 2);
    }

    #[test]
    fn test_pointer_listener_attaches_once() {
        let attached = Rc::new(Cell::new(0));
        let ctx = HostContext::with_surface(Box::new(FakeSurface {
            attached: Rc::clone(&attached),
        }));
        let reg = BuiltinRegistry::standard();
        assert!(!ctx.listener_attached());
        assert_eq!(reg.sample("mouseX", &ctx), Some(UniformValue::Scalar(10.0)));
        assert_eq!(reg.sample("clicked", &ctx), Some(UniformValue::Scalar(1.0)));
        assert_eq!(reg.sample("resX", &ctx), Some(UniformValue::Scalar(640.0)));
        assert_eq!(attached.get(), 1);
    }

    #[test]
    fn test_fallback_feed_without_surface() {
        let ctx = HostContext::new();
        let feed = ctx.pointer_feed();
        feed.move_to(3.0, 4.0);
        let reg = BuiltinRegistry::standard();
        assert_eq!(reg.sample("mouseY", &ctx), Some(UniformValue::Scalar(4.0)));
        assert!(ctx.listener_attached());
    }

    #[test]
    fn test_custom_registry_with_constant() {
        let reg = BuiltinRegistry::empty().with(BuiltinUniform::new(
            "gravity",
            WgslType::F32,
            BuiltinSampler::Constant(9.8),
        ));
        assert!(!reg.contains("resX"));
        let ctx = HostContext::new().with_clock(|| 12.0);
        assert_eq!(reg.sample("gravity", &ctx), Some(UniformValue::Scalar(9.8)));
        let std_reg = BuiltinRegistry::standard();
        assert_eq!(
            std_reg.sample("utcTime", &ctx),
            Some(UniformValue::Scalar(12.0))
        );
    }
}
