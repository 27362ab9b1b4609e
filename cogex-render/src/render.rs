use anyhow::{anyhow, Context, Result};
use cogex_core::{ArrowDirection, StimulusType};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Arrow pointing right, in units of half its extent. Other directions are
/// rotations of this outline.
const ARROW_OUTLINE: [(f32, f32); 7] = [
    (-1.0, -0.2),
    (0.1, -0.2),
    (0.1, -0.6),
    (1.0, 0.0),
    (0.1, 0.6),
    (0.1, 0.2),
    (-1.0, 0.2),
];

/// Pixel rectangle clamped to the canvas, half-open on the far edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Region {
    fn clamped(x: i32, y: i32, w: u32, h: u32, width: u32, height: u32) -> Option<Self> {
        let x0 = x.max(0) as usize;
        let y0 = y.max(0) as usize;
        let x1 = (x + w as i32).clamp(0, width as i32) as usize;
        let y1 = (y + h as i32).clamp(0, height as i32) as usize;
        (x1 > x0 && y1 > y0).then_some(Self { x0, y0, x1, y1 })
    }

    fn union(self, other: Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Offscreen RGBA canvas that draws one stimulus at a time, centered.
///
/// Stimuli are rasterized once into a cache so that showing one at onset is
/// a single blit. Only regions changed since the last
/// [`present_into`](Self::present_into) are copied out.
pub struct StimulusCanvas {
    width: u32,
    height: u32,
    canvas: Pixmap,
    cache: Vec<(StimulusType, Pixmap)>,
    /// Area of the canvas currently holding a stimulus.
    drawn: Option<Region>,
    /// Area changed since the last present.
    dirty: Option<Region>,
    full_copy: bool,
}

impl StimulusCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let mut canvas = Self {
            width,
            height,
            canvas: blank(width, height)?,
            cache: Vec::with_capacity(8),
            drawn: None,
            dirty: None,
            full_copy: true,
        };
        canvas.prewarm([&StimulusType::fixation()])?;
        Ok(canvas)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Recreates the canvas. The stimulus cache survives.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = blank(width, height)?;
        self.width = width;
        self.height = height;
        self.drawn = None;
        self.dirty = None;
        self.full_copy = true;
        Ok(())
    }

    /// Rasterizes every stimulus not cached yet. Returns how many were added.
    pub fn prewarm<'a>(&mut self, stimuli: impl IntoIterator<Item = &'a StimulusType>) -> Result<usize> {
        let mut added = 0;
        for stimulus in stimuli {
            if stimulus.is_blank() || self.lookup(stimulus).is_some() {
                continue;
            }
            let pixmap = rasterize(stimulus)
                .with_context(|| format!("rasterizing {}", stimulus.describe()))?;
            self.cache.push((stimulus.clone(), pixmap));
            added += 1;
        }
        Ok(added)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Replaces whatever is on the canvas with `stimulus`, centered.
    /// Uncached stimuli are rasterized on the spot.
    pub fn show(&mut self, stimulus: &StimulusType) -> Result<()> {
        self.clear();
        if stimulus.is_blank() {
            return Ok(());
        }
        let index = match self.lookup(stimulus) {
            Some(i) => i,
            None => {
                self.prewarm([stimulus])?;
                self.cache.len() - 1
            }
        };

        let pixmap = &self.cache[index].1;
        let x = (self.width as i32 - pixmap.width() as i32) / 2;
        let y = (self.height as i32 - pixmap.height() as i32) / 2;
        self.canvas.draw_pixmap(
            x,
            y,
            pixmap.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        let region = Region::clamped(x, y, pixmap.width(), pixmap.height(), self.width, self.height);
        self.drawn = region;
        self.mark(region);
        Ok(())
    }

    pub fn show_fixation(&mut self) -> Result<()> {
        self.show(&StimulusType::fixation())
    }

    /// Paints the previous stimulus over with the background.
    pub fn clear(&mut self) {
        let Some(region) = self.drawn.take() else {
            return;
        };
        let stride = self.width as usize * 4;
        let data = self.canvas.data_mut();
        for row in region.y0..region.y1 {
            let start = row * stride + region.x0 * 4;
            let end = row * stride + region.x1 * 4;
            for px in data[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&BACKGROUND);
            }
        }
        self.mark(Some(region));
    }

    /// Premultiplied RGBA; the background is opaque, so this is plain RGBA.
    pub fn pixels(&self) -> &[u8] {
        self.canvas.data()
    }

    /// Copies everything changed since the last call into `frame`, which must
    /// be a `width * height * 4` RGBA buffer. Returns the number of bytes
    /// copied.
    pub fn present_into(&mut self, frame: &mut [u8]) -> Result<usize> {
        let data = self.canvas.data();
        if frame.len() != data.len() {
            return Err(anyhow!(
                "frame buffer holds {} bytes, canvas needs {}",
                frame.len(),
                data.len()
            ));
        }
        if std::mem::take(&mut self.full_copy) {
            self.dirty = None;
            frame.copy_from_slice(data);
            return Ok(data.len());
        }
        let Some(region) = self.dirty.take() else {
            return Ok(0);
        };
        let stride = self.width as usize * 4;
        let mut copied = 0;
        for row in region.y0..region.y1 {
            let start = row * stride + region.x0 * 4;
            let end = row * stride + region.x1 * 4;
            frame[start..end].copy_from_slice(&data[start..end]);
            copied += end - start;
        }
        Ok(copied)
    }

    fn mark(&mut self, region: Option<Region>) {
        self.dirty = match (self.dirty, region) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        };
    }

    fn lookup(&self, stimulus: &StimulusType) -> Option<usize> {
        self.cache.iter().position(|(s, _)| s == stimulus)
    }
}

fn blank(width: u32, height: u32) -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("invalid canvas size {width}x{height}"))?;
    let [r, g, b, a] = BACKGROUND;
    pixmap.fill(Color::from_rgba8(r, g, b, a));
    Ok(pixmap)
}

fn paint(color: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.anti_alias = true;
    paint.set_color(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    paint
}

fn pixmap(width: f32, height: f32) -> Result<Pixmap> {
    let (w, h) = (width.ceil().max(1.0) as u32, height.ceil().max(1.0) as u32);
    Pixmap::new(w, h).ok_or_else(|| anyhow!("invalid stimulus size {w}x{h}"))
}

fn push_arrow(pb: &mut PathBuilder, cx: f32, cy: f32, half: f32, direction: ArrowDirection) {
    let rotate = |(x, y): (f32, f32)| match direction {
        ArrowDirection::Right => (x, y),
        ArrowDirection::Left => (-x, y),
        ArrowDirection::Up => (y, -x),
        ArrowDirection::Down => (-y, x),
    };
    for (i, point) in ARROW_OUTLINE.iter().copied().map(rotate).enumerate() {
        let (x, y) = (cx + point.0 * half, cy + point.1 * half);
        if i == 0 {
            pb.move_to(x, y);
        } else {
            pb.line_to(x, y);
        }
    }
    pb.close();
}

fn fill(pixmap: &mut Pixmap, pb: PathBuilder, color: [u8; 4]) -> Result<()> {
    let path = pb.finish().context("empty stimulus outline")?;
    pixmap.fill_path(&path, &paint(color), FillRule::Winding, Transform::identity(), None);
    Ok(())
}

fn rasterize(stimulus: &StimulusType) -> Result<Pixmap> {
    match *stimulus {
        StimulusType::Blank => pixmap(1.0, 1.0),
        StimulusType::Fixation { size, color } => {
            let mut pm = pixmap(size, size)?;
            let bar = (size / 20.0).max(2.0);
            let brush = paint(color);
            let h = Rect::from_xywh(0.0, (size - bar) * 0.5, size, bar).context("fixation bar")?;
            let v = Rect::from_xywh((size - bar) * 0.5, 0.0, bar, size).context("fixation bar")?;
            pm.fill_rect(h, &brush, Transform::identity(), None);
            pm.fill_rect(v, &brush, Transform::identity(), None);
            Ok(pm)
        }
        StimulusType::Circle { radius, color } => {
            let mut pm = pixmap(radius * 2.0, radius * 2.0)?;
            let mut pb = PathBuilder::new();
            pb.push_circle(radius, radius, radius);
            fill(&mut pm, pb, color)?;
            Ok(pm)
        }
        StimulusType::Rectangle { width, height, color } => {
            let mut pm = pixmap(width, height)?;
            let rect = Rect::from_xywh(0.0, 0.0, width, height).context("rectangle size")?;
            pm.fill_rect(rect, &paint(color), Transform::identity(), None);
            Ok(pm)
        }
        StimulusType::Arrow { direction, size, color } => {
            let mut pm = pixmap(size * 2.0, size * 2.0)?;
            let mut pb = PathBuilder::new();
            push_arrow(&mut pb, size, size, size, direction);
            fill(&mut pm, pb, color)?;
            Ok(pm)
        }
        StimulusType::Flanker { target, flankers, size, color } => {
            let gap = size * 0.5;
            let step = size * 2.0 + gap;
            let mut pm = pixmap(step * 5.0 - gap, size * 2.0)?;
            let mut pb = PathBuilder::new();
            for slot in 0..5 {
                let direction = if slot == 2 { target } else { flankers };
                push_arrow(&mut pb, size + slot as f32 * step, size, size, direction);
            }
            fill(&mut pm, pb, color)?;
            Ok(pm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn pixel(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    }

    fn circle() -> StimulusType {
        StimulusType::Circle { radius: 20.0, color: RED }
    }

    #[test]
    fn prewarm_caches_each_stimulus_once() {
        let mut c = StimulusCanvas::new(200, 100).unwrap();
        assert_eq!(c.cached(), 1);
        let stimuli = [circle(), circle(), StimulusType::Blank, StimulusType::fixation()];
        assert_eq!(c.prewarm(&stimuli).unwrap(), 1);
        assert_eq!(c.cached(), 2);
    }

    #[test]
    fn show_draws_centered_and_clears_previous() {
        let mut c = StimulusCanvas::new(200, 100).unwrap();
        c.show(&circle()).unwrap();
        assert_eq!(pixel(c.pixels(), 200, 100, 50), RED);
        assert_eq!(pixel(c.pixels(), 200, 5, 5), BACKGROUND);

        c.show(&StimulusType::Blank).unwrap();
        assert_eq!(pixel(c.pixels(), 200, 100, 50), BACKGROUND);
        // Showing an uncached stimulus caches it.
        assert_eq!(c.cached(), 2);
    }

    #[test]
    fn present_copies_only_changes() {
        let mut c = StimulusCanvas::new(200, 100).unwrap();
        let mut frame = vec![7u8; 200 * 100 * 4];
        assert_eq!(c.present_into(&mut frame).unwrap(), frame.len());
        assert_eq!(pixel(&frame, 200, 0, 0), BACKGROUND);
        assert_eq!(c.present_into(&mut frame).unwrap(), 0);

        c.show(&circle()).unwrap();
        let copied = c.present_into(&mut frame).unwrap();
        assert_eq!(copied, 40 * 40 * 4);
        assert_eq!(pixel(&frame, 200, 100, 50), RED);

        c.show_fixation().unwrap();
        c.present_into(&mut frame).unwrap();
        assert_eq!(pixel(&frame, 200, 85, 35), BACKGROUND);
        assert_eq!(frame, c.pixels());
    }

    #[test]
    fn wrong_frame_size_is_an_error() {
        let mut c = StimulusCanvas::new(20, 10).unwrap();
        let mut frame = vec![0u8; 10];
        assert!(c.present_into(&mut frame).is_err());
    }

    #[test]
    fn flanker_row_points_both_ways() {
        let mut c = StimulusCanvas::new(400, 100).unwrap();
        let flanker = StimulusType::Flanker {
            target: ArrowDirection::Left,
            flankers: ArrowDirection::Right,
            size: 20.0,
            color: RED,
        };
        c.show(&flanker).unwrap();
        // Row is 5 * 40 + 4 * 10 = 240 px wide, starting at x = 80.
        // Centre arrow tip points left, so its left edge is filled at mid height.
        assert_eq!(pixel(c.pixels(), 400, 80 + 2 * 50 + 3, 50), RED);
        assert_eq!(pixel(c.pixels(), 400, 80 + 2 * 50 + 37, 50), RED);
        assert_eq!(pixel(c.pixels(), 400, 60, 50), BACKGROUND);
    }

    #[test]
    fn resize_keeps_cache() {
        let mut c = StimulusCanvas::new(200, 100).unwrap();
        c.show(&circle()).unwrap();
        c.resize(100, 50).unwrap();
        assert_eq!(c.size(), (100, 50));
        assert_eq!(c.pixels().len(), 100 * 50 * 4);
        assert_eq!(c.cached(), 2);
        assert!(c.resize(0, 10).is_err());
    }
}
