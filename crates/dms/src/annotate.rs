//! Processed-frame overlay

use crate::analysis::FrameAnalysis;
use crate::landmarks::{Landmarks, LEFT_EYE, MOUTH, RIGHT_EYE};
use crate::DmsError;
use camera_capture::VideoFrame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

const FACE: Rgb<u8> = Rgb([0, 200, 255]);
const FEATURE: Rgb<u8> = Rgb([255, 255, 0]);
const HAND: Rgb<u8> = Rgb([255, 0, 255]);
const CALLING: Rgb<u8> = Rgb([255, 0, 0]);
const BAR_HEIGHT: u32 = 12;
const PIXEL_BLOCK: u32 = 12;

/// Draw landmarks and a status bar of `status_color` onto a copy of the
/// frame. With `masking`, the face region is pixelated first.
pub fn annotate(
    frame: &VideoFrame,
    analysis: &FrameAnalysis,
    status_color: [u8; 3],
    masking: bool,
) -> Result<VideoFrame, DmsError> {
    let mut img = frame
        .to_rgb_image()
        .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;

    if let Some(face) = analysis.drowsiness.as_ref().and_then(|d| d.face.as_ref()) {
        if masking {
            pixelate(&mut img, face);
        }
        draw_face(&mut img, face);
    }

    if let Some(phone) = &analysis.phone {
        for state in &phone.detection {
            let color = if state.is_calling { CALLING } else { HAND };
            draw_line_segment_mut(
                &mut img,
                (state.hand.x, state.hand.y),
                (state.ear.x, state.ear.y),
                color,
            );
        }
    }

    if let Some(hands) = &analysis.hands {
        for hand in &hands.hands {
            draw_points(&mut img, hand, 2, HAND);
        }
    }

    let (width, height) = img.dimensions();
    if width > 0 {
        draw_filled_rect_mut(
            &mut img,
            Rect::at(0, 0).of_size(width, BAR_HEIGHT.min(height.max(1))),
            Rgb(status_color),
        );
    }

    Ok(VideoFrame::from_rgb_image(img, frame.timestamp_ns, frame.sequence))
}

fn draw_points(img: &mut RgbImage, lm: &Landmarks, radius: i32, color: Rgb<u8>) {
    for p in &lm.points {
        draw_filled_circle_mut(img, (p.x as i32, p.y as i32), radius, color);
    }
}

fn draw_face(img: &mut RgbImage, face: &Landmarks) {
    if let Some((x, y, w, h)) = face.bounding_box() {
        if w >= 1.0 && h >= 1.0 {
            draw_hollow_rect_mut(img, Rect::at(x as i32, y as i32).of_size(w as u32, h as u32), FACE);
        }
    }
    for idx in LEFT_EYE.iter().chain(RIGHT_EYE.iter()).chain(MOUTH.iter()) {
        if let Some(p) = face.get(*idx) {
            draw_filled_circle_mut(img, (p.x as i32, p.y as i32), 1, FEATURE);
        }
    }
}

/// Replace the face box with block averages
fn pixelate(img: &mut RgbImage, face: &Landmarks) {
    let Some((x, y, w, h)) = face.bounding_box() else {
        return;
    };
    let (iw, ih) = img.dimensions();
    let x0 = (x.max(0.0) as u32).min(iw);
    let y0 = (y.max(0.0) as u32).min(ih);
    let x1 = ((x + w).ceil().max(0.0) as u32).min(iw);
    let y1 = ((y + h).ceil().max(0.0) as u32).min(ih);

    for by in (y0..y1).step_by(PIXEL_BLOCK as usize) {
        for bx in (x0..x1).step_by(PIXEL_BLOCK as usize) {
            let ex = (bx + PIXEL_BLOCK).min(x1);
            let ey = (by + PIXEL_BLOCK).min(y1);

            let mut sum = [0u32; 3];
            let mut n = 0u32;
            for py in by..ey {
                for px in bx..ex {
                    let p = img.get_pixel(px, py);
                    for c in 0..3 {
                        sum[c] += p[c] as u32;
                    }
                    n += 1;
                }
            }
            if n == 0 {
                continue;
            }
            let avg = Rgb([(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8]);
            for py in by..ey {
                for px in bx..ex {
                    img.put_pixel(px, py, avg);
                }
            }
        }
    }
}
