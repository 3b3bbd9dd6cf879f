//! Software drawing of the per-frame feedback on top of the camera image.

use crate::types::{FingerStates, Frame, HandFrame, MappedControl};

pub type Color = [u8; 4];

pub const MAGENTA: Color = [255, 0, 255, 255];
pub const GREEN: Color = [0, 255, 0, 255];
pub const BLUE: Color = [0, 0, 255, 255];
const SKELETON_LINE: Color = [56, 189, 248, 255];
const SKELETON_POINT: Color = [248, 113, 113, 255];

pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

const SKELETON_LINE_THICKNESS: i32 = 2;
const SKELETON_POINT_RADIUS: i32 = 4;
const TIP_RADIUS: i32 = 15;
const PINCH_LINE_THICKNESS: i32 = 3;

pub const BAR_LEFT: i32 = 50;
pub const BAR_RIGHT: i32 = 85;
pub const BAR_TOP: i32 = 150;
pub const BAR_BOTTOM: i32 = 400;
const BAR_OUTLINE_THICKNESS: i32 = 3;

const TEXT_SCALE: i32 = 5;

/// Thumb tip, index tip and their midpoint for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinchIndicator {
    pub thumb: (i32, i32),
    pub index: (i32, i32),
    pub center: (i32, i32),
    pub closed: bool,
}

/// Everything drawn on top of a frame.
#[derive(Clone, Debug)]
pub struct Feedback<'a> {
    pub hand: Option<&'a HandFrame>,
    pub pinch: Option<PinchIndicator>,
    pub control: MappedControl,
    pub fingers: Option<FingerStates>,
    pub handedness_label: &'static str,
    pub fps: Option<f32>,
}

/// Drawing primitives over an RGBA buffer. Anything outside the buffer is
/// clipped.
pub struct Canvas<'a> {
    buffer: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut Frame) -> Self {
        Self {
            buffer: &mut frame.rgba,
            width: frame.width,
            height: frame.height,
        }
    }

    pub fn line(&mut self, p0: (i32, i32), p1: (i32, i32), color: Color, thickness: i32) {
        let (mut x0, mut y0) = p0;
        let (x1, y1) = p1;
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (thickness.max(1) - 1) / 2;

        loop {
            if radius > 0 {
                self.circle((x0, y0), radius, color);
            } else {
                self.put_pixel(x0, y0, color);
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Filled disc.
    pub fn circle(&mut self, center: (i32, i32), radius: i32, color: Color) {
        let (cx, cy) = center;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    pub fn rect(&mut self, p0: (i32, i32), p1: (i32, i32), color: Color, thickness: i32) {
        let (x0, y0) = (p0.0.min(p1.0), p0.1.min(p1.1));
        let (x1, y1) = (p0.0.max(p1.0), p0.1.max(p1.1));
        let t = thickness.max(1);
        self.fill_rect((x0, y0), (x1, y0 + t - 1), color);
        self.fill_rect((x0, y1 - t + 1), (x1, y1), color);
        self.fill_rect((x0, y0), (x0 + t - 1, y1), color);
        self.fill_rect((x1 - t + 1, y0), (x1, y1), color);
    }

    /// Inclusive of both corners.
    pub fn fill_rect(&mut self, p0: (i32, i32), p1: (i32, i32), color: Color) {
        let (x0, x1) = (p0.0.min(p1.0), p0.0.max(p1.0));
        let (y0, y1) = (p0.1.min(p1.1), p0.1.max(p1.1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.put_pixel(x, y, color);
            }
        }
    }

    /// Draws `text` with its top-left corner at `origin`; each font pixel
    /// becomes a `scale`×`scale` block.
    pub fn text(&mut self, text: &str, origin: (i32, i32), scale: i32, color: Color) {
        let scale = scale.max(1);
        let mut x = origin.0;
        for ch in text.chars() {
            for (row, bits) in glyph(ch).iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                        let px = x + col * scale;
                        let py = origin.1 + row as i32 * scale;
                        self.fill_rect((px, py), (px + scale - 1, py + scale - 1), color);
                    }
                }
            }
            x += (GLYPH_WIDTH + 1) * scale;
        }
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        let idx = self.index(x, y)?;
        let mut color = [0u8; 4];
        color.copy_from_slice(&self.buffer[idx..idx + 4]);
        Some(color)
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: Color) {
        if let Some(idx) = self.index(x, y) {
            self.buffer[idx..idx + 4].copy_from_slice(&color);
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let idx = ((y as u32 * self.width + x as u32) as usize) * 4;
        (idx + 3 < self.buffer.len()).then_some(idx)
    }
}

pub fn draw_feedback(frame: &mut Frame, feedback: &Feedback<'_>) {
    let mut canvas = Canvas::new(frame);

    if let Some(hand) = feedback.hand {
        draw_skeleton(&mut canvas, hand);
    }

    if let Some(pinch) = feedback.pinch {
        canvas.circle(pinch.thumb, TIP_RADIUS, MAGENTA);
        canvas.circle(pinch.index, TIP_RADIUS, MAGENTA);
        canvas.line(pinch.thumb, pinch.index, MAGENTA, PINCH_LINE_THICKNESS);
        let center_color = if pinch.closed { GREEN } else { MAGENTA };
        canvas.circle(pinch.center, TIP_RADIUS, center_color);
    }

    canvas.rect(
        (BAR_LEFT, BAR_TOP),
        (BAR_RIGHT, BAR_BOTTOM),
        BLUE,
        BAR_OUTLINE_THICKNESS,
    );
    canvas.fill_rect(
        (BAR_LEFT, feedback.control.display_bar as i32),
        (BAR_RIGHT, BAR_BOTTOM),
        BLUE,
    );
    canvas.text(
        &format!("{} %", feedback.control.display_percent as i32),
        (40, 430),
        TEXT_SCALE,
        BLUE,
    );

    let fps = feedback.fps.map(|fps| fps as i32).unwrap_or(0);
    canvas.text(&format!("FPS: {fps}"), (40, 30), TEXT_SCALE, BLUE);

    if let Some(fingers) = feedback.fingers {
        let bits: String = fingers.bits().iter().map(|b| b.to_string()).collect();
        let label = format!("{} {bits}", feedback.handedness_label);
        canvas.text(label.trim_start(), (300, 30), TEXT_SCALE, MAGENTA);
    }
}

fn draw_skeleton(canvas: &mut Canvas<'_>, hand: &HandFrame) {
    let points = hand.landmarks();
    for &(a, b) in CONNECTIONS {
        if let (Some(pa), Some(pb)) = (points.get(a), points.get(b)) {
            canvas.line(
                (pa.x, pa.y),
                (pb.x, pb.y),
                SKELETON_LINE,
                SKELETON_LINE_THICKNESS,
            );
        }
    }
    for lm in points {
        canvas.circle((lm.x, lm.y), SKELETON_POINT_RADIUS, SKELETON_POINT);
    }
}

const GLYPH_WIDTH: i32 = 3;

// 3×5 bitmap font, one row per byte, most significant of the low three bits
// on the left.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'E' => [0b111, 0b100, 0b111, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b111, 0b100, 0b100],
        'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        ' ' => [0b000; 5],
        _ => [0b000, 0b000, 0b010, 0b000, 0b000],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resting_control() -> MappedControl {
        MappedControl {
            raw_value: -65.25,
            display_bar: 400.0,
            display_percent: 0.0,
        }
    }

    #[test]
    fn clipped_drawing_does_not_panic() {
        let mut frame = Frame::blank(20, 20);
        let mut canvas = Canvas::new(&mut frame);
        canvas.circle((-5, -5), 10, GREEN);
        canvas.line((-100, 10), (100, 10), BLUE, 3);
        canvas.fill_rect((15, 15), (40, 40), MAGENTA);
        canvas.text("FPS: 99", (-10, 16), 3, BLUE);
        assert_eq!(canvas.pixel(0, 0), Some(GREEN));
        assert_eq!(canvas.pixel(19, 19), Some(MAGENTA));
        assert_eq!(canvas.pixel(20, 0), None);
    }

    #[test]
    fn rect_outline_leaves_inside_untouched() {
        let mut frame = Frame::blank(50, 50);
        let mut canvas = Canvas::new(&mut frame);
        canvas.rect((10, 10), (40, 40), BLUE, 2);
        assert_eq!(canvas.pixel(10, 25), Some(BLUE));
        assert_eq!(canvas.pixel(39, 25), Some(BLUE));
        assert_eq!(canvas.pixel(25, 25), Some([0, 0, 0, 255]));
    }

    #[test]
    fn bar_fill_follows_display_bar() {
        let mut frame = Frame::blank(640, 480);
        let control = MappedControl {
            display_bar: 275.0,
            ..resting_control()
        };
        draw_feedback(
            &mut frame,
            &Feedback {
                hand: None,
                pinch: None,
                control,
                fingers: None,
                handedness_label: "",
                fps: None,
            },
        );
        let canvas = Canvas::new(&mut frame);
        assert_eq!(canvas.pixel(67, 300), Some(BLUE));
        assert_eq!(canvas.pixel(67, 200), Some([0, 0, 0, 255]));
    }

    #[test]
    fn closed_pinch_turns_center_green() {
        let mut frame = Frame::blank(640, 480);
        let pinch = PinchIndicator {
            thumb: (300, 100),
            index: (300, 150),
            center: (300, 125),
            closed: true,
        };
        draw_feedback(
            &mut frame,
            &Feedback {
                hand: None,
                pinch: Some(pinch),
                control: resting_control(),
                fingers: None,
                handedness_label: "",
                fps: Some(30.0),
            },
        );
        let canvas = Canvas::new(&mut frame);
        assert_eq!(canvas.pixel(300, 125), Some(GREEN));
        assert_eq!(canvas.pixel(300, 90), Some(MAGENTA));
    }

    #[test]
    fn open_pinch_center_stays_magenta() {
        let mut frame = Frame::blank(640, 480);
        let pinch = PinchIndicator {
            thumb: (300, 100),
            index: (300, 300),
            center: (300, 200),
            closed: false,
        };
        draw_feedback(
            &mut frame,
            &Feedback {
                hand: None,
                pinch: Some(pinch),
                control: resting_control(),
                fingers: None,
                handedness_label: "",
                fps: None,
            },
        );
        assert_eq!(Canvas::new(&mut frame).pixel(300, 200), Some(MAGENTA));
    }
}
