//! Frame Source: renders the current status text onto a solid background, one frame per call.

use crate::frame::{Frame, Rgb, VideoFormat};
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use tokio::sync::watch;

/// Glyph cell size of the bitmap font, before scaling.
const GLYPH_SIZE: u32 = 8;

/// Where the status text comes from.
///
/// Implementations are polled once per frame, so reading should be cheap and must not block.
pub trait StatusSource {
    /// The text to draw on the next frame. Lines are separated by `\n`.
    fn current(&mut self) -> String;
}

impl StatusSource for String {
    fn current(&mut self) -> String {
        self.clone()
    }
}

impl StatusSource for &'static str {
    fn current(&mut self) -> String {
        (*self).to_string()
    }
}

/// The latest value published on the channel. A closed channel keeps showing the last value.
impl StatusSource for watch::Receiver<String> {
    fn current(&mut self) -> String {
        self.borrow_and_update().clone()
    }
}

/// How status text is laid out on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    pub background: Rgb,
    pub color: Rgb,
    /// Left edge of every line, in pixels.
    pub margin_left: u32,
    /// Top edge of the first line, in pixels.
    pub margin_top: u32,
    /// Distance between the tops of consecutive lines.
    pub line_spacing: u32,
    /// Integer scale applied to the 8x8 glyphs.
    pub scale: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            background: Rgb::BLACK,
            color: Rgb::WHITE,
            margin_left: 10,
            margin_top: 30,
            line_spacing: 30,
            scale: 2,
        }
    }
}

/// An endless, pull-based sequence of frames.
///
/// There is no end-of-sequence: every call to [`FrameSource::next_frame`] renders a new frame.
/// Pacing is up to the caller.
#[derive(Debug)]
pub struct FrameSource<S> {
    /// Pre-filled canvas that every frame starts from.
    background: Frame,
    style: TextStyle,
    status: S,
}

impl<S: StatusSource> FrameSource<S> {
    pub fn new(format: VideoFormat, status: S) -> Self {
        Self::with_style(format, status, TextStyle::default())
    }

    pub fn with_style(format: VideoFormat, status: S, style: TextStyle) -> Self {
        Self {
            background: Frame::filled(format.width, format.height, style.background),
            style,
            status,
        }
    }

    /// Renders the current status text into a fresh frame.
    pub fn next_frame(&mut self) -> Frame {
        let mut frame = self.background.clone();
        let text = self.status.current();
        let mut top = self.style.margin_top;
        for line in text.lines() {
            draw_line(&mut frame, self.style.margin_left, top, line, &self.style);
            top = top.saturating_add(self.style.line_spacing);
        }
        frame
    }
}

fn draw_line(frame: &mut Frame, left: u32, top: u32, line: &str, style: &TextStyle) {
    let advance = GLYPH_SIZE * style.scale;
    let mut x = left;
    for c in line.chars() {
        if x >= frame.width() {
            break;
        }
        draw_glyph(frame, x, top, glyph(c), style);
        x = x.saturating_add(advance);
    }
}

fn draw_glyph(frame: &mut Frame, left: u32, top: u32, glyph: [u8; 8], style: &TextStyle) {
    for (row, bits) in (0u32..).zip(glyph) {
        for col in 0..GLYPH_SIZE {
            if bits & (1 << col) == 0 {
                continue;
            }
            let x0 = left.saturating_add(col * style.scale);
            let y0 = top.saturating_add(row * style.scale);
            for dy in 0..style.scale {
                for dx in 0..style.scale {
                    frame.put_pixel(x0.saturating_add(dx), y0.saturating_add(dy), style.color);
                }
            }
        }
    }
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_pixels(frame: &Frame, color: Rgb) -> usize {
        let mut n = 0;
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                if frame.pixel(x, y) == Some(color) {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn frame_length_matches_format() {
        for (width, height) in [(640, 480), (1280, 720), (2, 2), (1, 1), (17, 3)] {
            let format = VideoFormat {
                width,
                height,
                fps: 30,
            };
            let mut source = FrameSource::new(format, "Your console output here\nline two");
            let frame = source.next_frame();
            assert_eq!(frame.as_bytes().len(), width as usize * height as usize * 3);
            assert_eq!(frame.as_bytes().len(), format.frame_len());
        }
    }

    #[test]
    fn never_runs_dry() {
        let mut source = FrameSource::new(VideoFormat::default(), "tick");
        let first = source.next_frame();
        for _ in 0..200 {
            assert_eq!(source.next_frame(), first);
        }
    }

    #[test]
    fn empty_status_is_plain_background() {
        let format = VideoFormat::default();
        let mut source = FrameSource::new(format, "");
        assert_eq!(
            source.next_frame(),
            Frame::filled(format.width, format.height, Rgb::BLACK)
        );

        let style = TextStyle {
            background: Rgb(10, 20, 30),
            ..TextStyle::default()
        };
        let mut source = FrameSource::with_style(format, String::new(), style);
        assert_eq!(
            source.next_frame(),
            Frame::filled(format.width, format.height, Rgb(10, 20, 30))
        );
    }

    #[test]
    fn text_is_drawn_inside_margins() {
        let mut source = FrameSource::new(VideoFormat::default(), "Hi");
        let frame = source.next_frame();
        assert!(lit_pixels(&frame, Rgb::WHITE) > 0);

        // nothing above the first line or left of the margin
        for y in 0..30 {
            for x in 0..640 {
                assert_eq!(frame.pixel(x, y), Some(Rgb::BLACK), "({x}, {y})");
            }
        }
        for y in 0..480 {
            for x in 0..10 {
                assert_eq!(frame.pixel(x, y), Some(Rgb::BLACK), "({x}, {y})");
            }
        }
        // a single line of 2x glyphs stays within 16 rows of the top margin
        for y in 46..480 {
            for x in 0..640 {
                assert_eq!(frame.pixel(x, y), Some(Rgb::BLACK), "({x}, {y})");
            }
        }
    }

    #[test]
    fn lines_are_stacked_with_spacing() {
        let mut source = FrameSource::new(VideoFormat::default(), "A\nA");
        let frame = source.next_frame();
        for y in 30..46 {
            for x in 10..26 {
                assert_eq!(
                    frame.pixel(x, y),
                    frame.pixel(x, y + 30),
                    "line two differs at ({x}, {y})"
                );
            }
        }
        assert!(lit_pixels(&frame, Rgb::WHITE) > 0);
    }

    #[test]
    fn text_past_the_edge_is_clipped() {
        let format = VideoFormat {
            width: 20,
            height: 36,
            fps: 30,
        };
        let long = "W".repeat(100);
        let mut source = FrameSource::new(format, format!("{long}\n{long}\n{long}"));
        let frame = source.next_frame();
        assert_eq!(frame.as_bytes().len(), format.frame_len());
    }

    #[test]
    fn unknown_characters_render_as_placeholder() {
        let format = VideoFormat::default();
        let mut unknown = FrameSource::new(format, "\u{1F600}");
        let mut question = FrameSource::new(format, "?");
        assert_eq!(unknown.next_frame(), question.next_frame());
    }

    #[test]
    fn watch_receiver_tracks_latest_value() {
        let (tx, rx) = watch::channel(String::from("first"));
        let mut source = FrameSource::new(VideoFormat::default(), rx);
        let first = source.next_frame();

        tx.send_replace(String::from("second"));
        let second = source.next_frame();
        assert_ne!(first, second);

        drop(tx);
        assert_eq!(source.next_frame(), second);
    }
}
