//! Frame presentation: replaying a decoded frame through a display driver.

use std::time::Instant;

use tracing::debug;

use crate::frame::Frame;

/// A window in display coordinates: origin top-left, y downward, edges
/// inclusive-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
}

/// The operations the presenter drives a panel with.
///
/// `set_window` frames a rectangle; pixel writes that follow fill it in
/// row-major order. Everything up to `present` forms one logical display
/// transaction, and only `present` makes the writes visible. Implementations
/// are free to batch however they like as long as the screen after
/// `present` matches what was written.
pub trait DisplayDriver {
    fn set_window(&mut self, window: Rect);
    fn write_pixels(&mut self, pixels: &[u16]);
    fn write_run(&mut self, count: usize, rgb565: u16);
    fn present(&mut self);
}

/// Replay one frame onto the display.
///
/// Keyframes window the full `width` x `height` screen; deltaframes window
/// each damaged rectangle in list order. One `present` per frame, always
/// last.
pub fn present<D: DisplayDriver + ?Sized>(frame: &Frame, width: u16, height: u16, driver: &mut D) {
    let started = Instant::now();
    let full_screen = Rect {
        left: 0,
        top: 0,
        width,
        height,
    };

    match frame {
        Frame::KeyframeRaw { pixels } => {
            driver.set_window(full_screen);
            driver.write_pixels(pixels);
        }
        Frame::KeyframeRle { runs } => {
            driver.set_window(full_screen);
            for run in runs {
                driver.write_run(run.count as usize, run.rgb565);
            }
        }
        Frame::DeltaframeRaw { rects } => {
            for rect in rects {
                driver.set_window(Rect {
                    left: rect.x.into(),
                    top: rect.y.into(),
                    width: rect.width.into(),
                    height: rect.height.into(),
                });
                driver.write_pixels(&rect.pixels);
            }
        }
        Frame::DeltaframeRle { rects } => {
            for rect in rects {
                driver.set_window(Rect {
                    left: rect.x.into(),
                    top: rect.y.into(),
                    width: rect.width.into(),
                    height: rect.height.into(),
                });
                for run in &rect.runs {
                    driver.write_run(run.count as usize, run.rgb565);
                }
            }
        }
    }

    driver.present();
    debug!(
        encoding = ?frame.encoding(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "presented frame"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{RawRect, RleRect, RleRun};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        SetWindow(Rect),
        WritePixels(Vec<u16>),
        WriteRun(usize, u16),
        Present,
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl DisplayDriver for Recorder {
        fn set_window(&mut self, window: Rect) {
            self.ops.push(Op::SetWindow(window));
        }
        fn write_pixels(&mut self, pixels: &[u16]) {
            self.ops.push(Op::WritePixels(pixels.to_vec()));
        }
        fn write_run(&mut self, count: usize, rgb565: u16) {
            self.ops.push(Op::WriteRun(count, rgb565));
        }
        fn present(&mut self) {
            self.ops.push(Op::Present);
        }
    }

    fn rect(left: u16, top: u16, width: u16, height: u16) -> Rect {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn raw_keyframe_is_one_window_one_write() {
        let mut driver = Recorder::default();
        present(
            &Frame::KeyframeRaw {
                pixels: vec![1, 2, 3, 4],
            },
            2,
            2,
            &mut driver,
        );
        assert_eq!(
            driver.ops,
            vec![
                Op::SetWindow(rect(0, 0, 2, 2)),
                Op::WritePixels(vec![1, 2, 3, 4]),
                Op::Present,
            ]
        );
    }

    #[test]
    fn rle_keyframe_replays_runs_in_order() {
        let mut driver = Recorder::default();
        present(
            &Frame::KeyframeRle {
                runs: vec![
                    RleRun {
                        count: 3,
                        rgb565: 0xF800,
                    },
                    RleRun {
                        count: 1,
                        rgb565: 0x07E0,
                    },
                ],
            },
            2,
            2,
            &mut driver,
        );
        assert_eq!(
            driver.ops,
            vec![
                Op::SetWindow(rect(0, 0, 2, 2)),
                Op::WriteRun(3, 0xF800),
                Op::WriteRun(1, 0x07E0),
                Op::Present,
            ]
        );
    }

    #[test]
    fn raw_deltaframe_windows_each_rect_then_presents_once() {
        let mut driver = Recorder::default();
        present(
            &Frame::DeltaframeRaw {
                rects: vec![
                    RawRect {
                        x: 0,
                        y: 0,
                        width: 1,
                        height: 1,
                        pixels: vec![0xAAAA],
                    },
                    RawRect {
                        x: 5,
                        y: 5,
                        width: 1,
                        height: 1,
                        pixels: vec![0xBBBB],
                    },
                ],
            },
            240,
            240,
            &mut driver,
        );
        assert_eq!(
            driver.ops,
            vec![
                Op::SetWindow(rect(0, 0, 1, 1)),
                Op::WritePixels(vec![0xAAAA]),
                Op::SetWindow(rect(5, 5, 1, 1)),
                Op::WritePixels(vec![0xBBBB]),
                Op::Present,
            ]
        );
    }

    #[test]
    fn rle_deltaframe_windows_each_rect_then_presents_once() {
        let mut driver = Recorder::default();
        present(
            &Frame::DeltaframeRle {
                rects: vec![
                    RleRect {
                        x: 1,
                        y: 2,
                        width: 2,
                        height: 2,
                        runs: vec![RleRun {
                            count: 4,
                            rgb565: 0x1234,
                        }],
                    },
                    RleRect {
                        x: 9,
                        y: 9,
                        width: 1,
                        height: 2,
                        runs: vec![
                            RleRun {
                                count: 1,
                                rgb565: 0x5678,
                            },
                            RleRun {
                                count: 1,
                                rgb565: 0x9ABC,
                            },
                        ],
                    },
                ],
            },
            240,
            240,
            &mut driver,
        );
        assert_eq!(
            driver.ops,
            vec![
                Op::SetWindow(rect(1, 2, 2, 2)),
                Op::WriteRun(4, 0x1234),
                Op::SetWindow(rect(9, 9, 1, 2)),
                Op::WriteRun(1, 0x5678),
                Op::WriteRun(1, 0x9ABC),
                Op::Present,
            ]
        );
    }
}
